//! Energie-basierte Sprach-Erkennung (VAD)
//!
//! Sammelt µ-law Frames des Anrufers und schneidet ein Sprachsegment ab,
//! sobald nach Sprache eine ausreichend lange Stille folgt oder das Segment
//! die Maximallaenge erreicht. Zu kurze Segmente (Klicks, Atmen) verfallen.

use serde::{Deserialize, Serialize};

use crate::mulaw::{self, CARRIER_RATE};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VadConfig {
    /// RMS-Schwelle, ab der ein Frame als Sprache gilt
    pub rms_schwelle: u32,
    /// Stille nach Sprache, die ein Segment beendet
    pub stille_ms: u64,
    /// Kuerzere Segmente werden verworfen
    pub min_sprache_ms: u64,
    /// Laengere Segmente werden zwangsweise beendet
    pub max_sprache_ms: u64,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            rms_schwelle: 500,
            stille_ms: 700,
            min_sprache_ms: 200,
            max_sprache_ms: 15_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Zustand {
    Ruhe,
    Sprache,
}

#[derive(Debug)]
pub struct EnergieVad {
    config: VadConfig,
    zustand: Zustand,
    samples: Vec<i16>,
    /// Laenge von `samples` beim letzten Sprach-Frame
    letzte_stimme: usize,
    stille_ms: u64,
    gesamt_ms: u64,
}

impl EnergieVad {
    pub fn neu(config: VadConfig) -> Self {
        Self {
            config,
            zustand: Zustand::Ruhe,
            samples: Vec::new(),
            letzte_stimme: 0,
            stille_ms: 0,
            gesamt_ms: 0,
        }
    }

    /// Verarbeitet einen µ-law Frame
    ///
    /// Gibt ein abgeschlossenes Segment (16-Bit PCM, 8kHz, ohne
    /// nachlaufende Stille) zurueck.
    pub fn verarbeiten(&mut self, frame: &[u8]) -> Option<Vec<i16>> {
        let frame_ms = frame.len() as u64 * 1000 / CARRIER_RATE as u64;
        if frame_ms == 0 {
            return None;
        }
        let pcm = mulaw::puffer_dekodieren(frame);
        let ist_stimme = rms(&pcm) >= self.config.rms_schwelle;

        match self.zustand {
            Zustand::Ruhe => {
                if ist_stimme {
                    self.zustand = Zustand::Sprache;
                    self.samples.extend_from_slice(&pcm);
                    self.letzte_stimme = self.samples.len();
                    self.stille_ms = 0;
                    self.gesamt_ms = frame_ms;
                }
                None
            }
            Zustand::Sprache => {
                self.samples.extend_from_slice(&pcm);
                self.gesamt_ms += frame_ms;
                if ist_stimme {
                    self.letzte_stimme = self.samples.len();
                    self.stille_ms = 0;
                } else {
                    self.stille_ms += frame_ms;
                }

                if self.stille_ms >= self.config.stille_ms
                    || self.gesamt_ms >= self.config.max_sprache_ms
                {
                    return self.segment_abschliessen();
                }
                None
            }
        }
    }

    /// true waehrend gerade gesprochen wird
    pub fn spricht(&self) -> bool {
        self.zustand == Zustand::Sprache
    }

    /// Bisherige Sprachdauer des laufenden Segments ohne nachlaufende Stille
    pub fn sprache_ms(&self) -> u64 {
        self.letzte_stimme as u64 * 1000 / CARRIER_RATE as u64
    }

    /// Samples des laufenden Segments bis zum letzten Sprach-Frame
    pub fn laufende_sprache(&self) -> &[i16] {
        &self.samples[..self.letzte_stimme]
    }

    fn segment_abschliessen(&mut self) -> Option<Vec<i16>> {
        let laenge = self.letzte_stimme;
        let sprache_ms = laenge as u64 * 1000 / CARRIER_RATE as u64;
        let segment = (laenge > 0 && sprache_ms >= self.config.min_sprache_ms)
            .then(|| self.samples[..laenge].to_vec());

        self.zustand = Zustand::Ruhe;
        self.samples.clear();
        self.letzte_stimme = 0;
        self.stille_ms = 0;
        self.gesamt_ms = 0;

        if segment.is_none() {
            tracing::trace!(sprache_ms, "Zu kurzes Segment verworfen");
        }
        segment
    }
}

fn rms(pcm: &[i16]) -> u32 {
    if pcm.is_empty() {
        return 0;
    }
    let summe: u64 = pcm.iter().map(|&s| (s as i64 * s as i64) as u64).sum();
    ((summe / pcm.len() as u64) as f64).sqrt() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 20ms Frame mit konstantem Pegel
    fn frame(pegel: i16) -> Vec<u8> {
        vec![mulaw::kodieren(pegel); 160]
    }

    fn vad() -> EnergieVad {
        EnergieVad::neu(VadConfig {
            rms_schwelle: 500,
            stille_ms: 200,
            min_sprache_ms: 100,
            max_sprache_ms: 1000,
        })
    }

    #[test]
    fn segment_nach_stille_ohne_nachlauf() {
        let mut vad = vad();
        for _ in 0..5 {
            assert!(vad.verarbeiten(&frame(4000)).is_none());
        }
        assert!(vad.spricht());
        let mut segment = None;
        for _ in 0..10 {
            if let Some(s) = vad.verarbeiten(&frame(0)) {
                segment = Some(s);
                break;
            }
        }
        let segment = segment.unwrap();
        assert_eq!(segment.len(), 5 * 160);
        assert!(!vad.spricht());
    }

    #[test]
    fn laufende_sprache_waechst_mit_jedem_sprach_frame() {
        let mut vad = vad();
        assert_eq!(vad.sprache_ms(), 0);
        for _ in 0..3 {
            vad.verarbeiten(&frame(4000));
        }
        assert_eq!(vad.sprache_ms(), 60);
        // Stille verlaengert die Sprache nicht
        vad.verarbeiten(&frame(0));
        assert_eq!(vad.sprache_ms(), 60);
        assert_eq!(vad.laufende_sprache().len(), 3 * 160);
    }

    #[test]
    fn kurzes_geraeusch_wird_verworfen() {
        let mut vad = vad();
        vad.verarbeiten(&frame(4000));
        for _ in 0..20 {
            assert!(vad.verarbeiten(&frame(0)).is_none());
        }
    }

    #[test]
    fn stille_allein_startet_kein_segment() {
        let mut vad = vad();
        for _ in 0..100 {
            assert!(vad.verarbeiten(&frame(10)).is_none());
        }
        assert!(!vad.spricht());
    }

    #[test]
    fn maximallaenge_beendet_segment() {
        let mut vad = vad();
        let mut segmente = 0;
        for _ in 0..60 {
            if vad.verarbeiten(&frame(4000)).is_some() {
                segmente += 1;
            }
        }
        // 60 Frames a 20ms = 1200ms, Maximum 1000ms
        assert_eq!(segmente, 1);
    }
}
