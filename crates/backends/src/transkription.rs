//! Segmentierende HTTP-Transkription
//!
//! Der Dienst kennt keine Streaming-Verbindung. Eine "Verbindung" ist hier
//! ein Task, der Audio per [`EnergieVad`] in Segmente schneidet und jedes
//! Segment als WAV hochlaedt. Der erkannte Text wird erst als vorlaeufige,
//! dann als finale Erkennung gemeldet. Schlaegt ein Upload fehl, endet die
//! Verbindung mit einem Fehler; die Pipeline verbindet dann neu.
//!
//! ## Vorlaeufige Erkennung
//! Waehrend noch gesprochen wird, geht der bisherige Teil des Segments alle
//! `zwischen_ms` Sprache zusaetzlich als eigener Upload raus. Das Ergebnis
//! kommt als [`Erkennung::Zwischen`] und erlaubt das Unterbrechen der
//! Wiedergabe, bevor das Segment endet. Es laeuft hoechstens ein solcher
//! Upload gleichzeitig; endet das Segment, wird er abgebrochen.

use async_trait::async_trait;
use bytes::Bytes;
use parlor_pipeline::{
    Erkennung, PipelineError, PipelineResult, Transkription, TranskriptionsVerbindung,
};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::mulaw::{self, CARRIER_RATE};
use crate::vad::{EnergieVad, VadConfig};

const AUDIO_KANAL_KAPAZITAET: usize = 256;
const ERKENNUNGS_KANAL_KAPAZITAET: usize = 16;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranskriptionsDienstConfig {
    /// Vollstaendige URL des Transkriptions-Endpunkts
    pub url: String,
    pub modell: String,
    /// Optionaler Sprachcode (z.B. "de", "en")
    pub sprache: Option<String>,
    #[serde(skip)]
    pub api_key: Option<String>,
    pub vad: VadConfig,
    /// Sprachdauer bis zur ersten und zwischen weiteren vorlaeufigen Erkennungen
    pub zwischen_ms: u64,
}

impl Default for TranskriptionsDienstConfig {
    fn default() -> Self {
        Self {
            url: "https://api.openai.com/v1/audio/transcriptions".into(),
            modell: "whisper-1".into(),
            sprache: None,
            api_key: None,
            vad: VadConfig::default(),
            zwischen_ms: 600,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TranskriptionsAntwort {
    #[serde(default)]
    text: String,
}

#[derive(Clone)]
pub struct SegmentTranskription {
    client: reqwest::Client,
    config: TranskriptionsDienstConfig,
}

impl SegmentTranskription {
    pub fn neu(config: TranskriptionsDienstConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client, config }
    }

    /// Laedt ein Segment hoch und liefert den erkannten Text
    async fn segment_transkribieren(&self, samples: &[i16]) -> PipelineResult<String> {
        let wav = mulaw::wav_kodieren(samples, CARRIER_RATE)
            .map_err(|e| PipelineError::Transkription(format!("WAV-Kodierung: {e}")))?;

        let datei = reqwest::multipart::Part::bytes(wav)
            .file_name("segment.wav")
            .mime_str("audio/wav")
            .map_err(|e| PipelineError::Transkription(e.to_string()))?;
        let mut formular = reqwest::multipart::Form::new()
            .part("file", datei)
            .text("model", self.config.modell.clone())
            .text("response_format", "json");
        if let Some(sprache) = &self.config.sprache {
            formular = formular.text("language", sprache.clone());
        }

        let mut anfrage = self.client.post(&self.config.url).multipart(formular);
        if let Some(key) = &self.config.api_key {
            anfrage = anfrage.bearer_auth(key);
        }
        let antwort = anfrage
            .send()
            .await
            .map_err(|e| PipelineError::Transkription(e.to_string()))?;
        if !antwort.status().is_success() {
            return Err(PipelineError::Transkription(
                crate::fehler_aus_antwort(antwort).await,
            ));
        }
        let inhalt: TranskriptionsAntwort = antwort
            .json()
            .await
            .map_err(|e| PipelineError::Transkription(e.to_string()))?;
        Ok(inhalt.text.trim().to_string())
    }

    /// Laedt den bisherigen Teil eines laufenden Segments hoch
    ///
    /// Fehler beenden die Verbindung nicht, das Segment wird am Ende ohnehin
    /// vollstaendig hochgeladen.
    async fn zwischenstand_melden(
        self,
        samples: Vec<i16>,
        erkennungen: mpsc::Sender<PipelineResult<Erkennung>>,
    ) {
        match self.segment_transkribieren(&samples).await {
            Ok(text) if text.is_empty() => {}
            Ok(text) => {
                tracing::trace!(text = %text, "Vorlaeufige Erkennung");
                let _ = erkennungen.send(Ok(Erkennung::Zwischen(text))).await;
            }
            Err(e) => tracing::debug!(fehler = %e, "Vorlaeufige Erkennung fehlgeschlagen"),
        }
    }

    async fn segment_schleife(
        self,
        mut audio: mpsc::Receiver<Bytes>,
        erkennungen: mpsc::Sender<PipelineResult<Erkennung>>,
    ) {
        let mut vad = EnergieVad::neu(self.config.vad.clone());
        let schritt_ms = self.config.zwischen_ms.max(self.config.vad.min_sprache_ms).max(1);
        let mut naechster_zwischenstand_ms = schritt_ms;
        let mut zwischenstand: Option<JoinHandle<()>> = None;

        while let Some(frame) = audio.recv().await {
            let ergebnis = vad.verarbeiten(&frame);
            if !vad.spricht() {
                if let Some(laufend) = zwischenstand.take() {
                    laufend.abort();
                }
                naechster_zwischenstand_ms = schritt_ms;
            }

            let Some(segment) = ergebnis else {
                let frei = zwischenstand.as_ref().map_or(true, JoinHandle::is_finished);
                if vad.spricht() && frei && vad.sprache_ms() >= naechster_zwischenstand_ms {
                    naechster_zwischenstand_ms = vad.sprache_ms() + schritt_ms;
                    zwischenstand = Some(tokio::spawn(self.clone().zwischenstand_melden(
                        vad.laufende_sprache().to_vec(),
                        erkennungen.clone(),
                    )));
                }
                continue;
            };
            tracing::debug!(samples = segment.len(), "Sprachsegment erkannt");

            match self.segment_transkribieren(&segment).await {
                Ok(text) if text.is_empty() => {}
                Ok(text) => {
                    if erkennungen.send(Ok(Erkennung::Zwischen(text.clone()))).await.is_err()
                        || erkennungen.send(Ok(Erkennung::Final(text))).await.is_err()
                    {
                        return;
                    }
                }
                Err(e) => {
                    let _ = erkennungen.send(Err(e)).await;
                    return;
                }
            }
        }
        if let Some(laufend) = zwischenstand {
            laufend.abort();
        }
    }
}

#[async_trait]
impl Transkription for SegmentTranskription {
    async fn verbinden(&self) -> PipelineResult<TranskriptionsVerbindung> {
        let (audio_tx, audio_rx) = mpsc::channel(AUDIO_KANAL_KAPAZITAET);
        let (erkennungen_tx, erkennungen_rx) = mpsc::channel(ERKENNUNGS_KANAL_KAPAZITAET);
        tokio::spawn(self.clone().segment_schleife(audio_rx, erkennungen_tx));
        Ok(TranskriptionsVerbindung {
            audio: audio_tx,
            erkennungen: erkennungen_rx,
        })
    }
}
