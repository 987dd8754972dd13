//! Antwort-Generator
//!
//! Oeffnet pro Anfrage einen gestreamten Modell-Aufruf und schneidet die
//! eintreffenden Deltas in sprechbare Fragmente. Die Fragmente gehen als
//! [`PipelineEreignis::TextAbschnitt`] an die Session; erst dort vergibt
//! [`ResponseGenerator::nummerieren`] den Sequenz-Index. So bleibt der Index
//! pro Interaktion streng monoton, auch wenn dieselbe Interaktion mehrfach
//! generiert wird (Startnachricht und erster Anrufer-Turn).
//!
//! ## Werkzeuge
//! Fordert das Modell Werkzeuge an, werden sie nach Ende des Streams
//! ausgefuehrt und das Modell mit den Ergebnissen erneut aufgerufen
//! (hoechstens `max_werkzeugrunden` Mal).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use parlor_core::{InteraktionsId, PipelineEreignis, ResponseFragment};
use tokio::sync::mpsc;

use crate::error::{PipelineError, PipelineResult};
use crate::segmentierung::FragmentSchneider;
use crate::verlauf::{Nachricht, Verlauf};
use crate::werkzeug::{WerkzeugBeschreibung, Werkzeugaufruf, Werkzeugkasten};

// ---------------------------------------------------------------------------
// Modell-Schnittstelle
// ---------------------------------------------------------------------------

/// Eine Anfrage an das Sprachmodell
#[derive(Debug, Clone, PartialEq)]
pub struct ModellAnfrage {
    pub nachrichten: Vec<Nachricht>,
    pub werkzeuge: Vec<WerkzeugBeschreibung>,
}

/// Inkrementelle Ausgabe des Modells
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModellEreignis {
    /// Neues Text-Delta
    Text(String),
    /// Vollstaendig empfangener Werkzeugaufruf
    Werkzeugaufruf(Werkzeugaufruf),
}

/// Gestreamtes Sprachmodell
#[async_trait]
pub trait Sprachmodell: Send + Sync {
    /// Startet einen Stream. Der Kanal endet mit dem Ende der Antwort.
    async fn streamen(
        &self,
        anfrage: ModellAnfrage,
    ) -> PipelineResult<mpsc::Receiver<PipelineResult<ModellEreignis>>>;
}

// ---------------------------------------------------------------------------
// Konfiguration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub system_prompt: String,
    /// Maximale Anzahl Nachrichten im Verlauf
    pub max_verlauf: usize,
    pub max_werkzeugrunden: usize,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            system_prompt: String::new(),
            max_verlauf: 20,
            max_werkzeugrunden: 4,
        }
    }
}

// ---------------------------------------------------------------------------
// ResponseGenerator
// ---------------------------------------------------------------------------

/// Erzeugt Antwort-Fragmente aus einem gestreamten Sprachmodell
pub struct ResponseGenerator {
    modell: Arc<dyn Sprachmodell>,
    werkzeuge: Arc<Werkzeugkasten>,
    verlauf: Arc<Mutex<Verlauf>>,
    config: GeneratorConfig,
    /// Naechster freier Index pro Interaktion
    zaehler: HashMap<InteraktionsId, u32>,
    ereignisse: mpsc::Sender<PipelineEreignis>,
}

impl ResponseGenerator {
    pub fn neu(
        modell: Arc<dyn Sprachmodell>,
        werkzeuge: Arc<Werkzeugkasten>,
        config: GeneratorConfig,
        ereignisse: mpsc::Sender<PipelineEreignis>,
    ) -> Self {
        let verlauf = Verlauf::neu(config.system_prompt.clone(), config.max_verlauf);
        Self {
            modell,
            werkzeuge,
            verlauf: Arc::new(Mutex::new(verlauf)),
            config,
            zaehler: HashMap::new(),
            ereignisse,
        }
    }

    /// Startet die Generierung einer Antwort auf `text`
    ///
    /// Kehrt sofort zurueck; Ergebnisse kommen als Ereignisse.
    pub fn generieren(&self, text: &str, interaktion: InteraktionsId) {
        let kontext = self.verlauf.lock().kontext(text);
        let lauf = GenerierungsLauf {
            modell: Arc::clone(&self.modell),
            werkzeuge: Arc::clone(&self.werkzeuge),
            verlauf: Arc::clone(&self.verlauf),
            ereignisse: self.ereignisse.clone(),
            max_werkzeugrunden: self.config.max_werkzeugrunden,
            interaktion,
            anfrage: text.to_string(),
        };
        tracing::debug!(interaktion, "Antwort-Generierung gestartet");

        tokio::spawn(async move {
            match lauf.ausfuehren(kontext).await {
                Ok(()) | Err(PipelineError::Getrennt) => {}
                Err(e) => {
                    tracing::warn!(interaktion, fehler = %e, "Antwort-Generierung abgebrochen");
                }
            }
        });
    }

    /// Vergibt den naechsten Sequenz-Index fuer einen Textabschnitt
    pub fn nummerieren(
        &mut self,
        interaktion: InteraktionsId,
        text: String,
        ist_final: bool,
    ) -> ResponseFragment {
        let zaehler = self.zaehler.entry(interaktion).or_insert(0);
        let index = *zaehler;
        *zaehler += 1;
        ResponseFragment {
            interaktion,
            index: Some(index),
            text,
            ist_final,
        }
    }

    /// Hoechster bisher vergebener Index pro Interaktion
    pub fn hoechste_indizes(&self) -> HashMap<InteraktionsId, u32> {
        self.zaehler
            .iter()
            .filter(|(_, naechster)| **naechster > 0)
            .map(|(interaktion, naechster)| (*interaktion, naechster - 1))
            .collect()
    }

    /// Anzahl Nachrichten im Verlauf
    pub fn verlauf_laenge(&self) -> usize {
        self.verlauf.lock().len()
    }
}

// ---------------------------------------------------------------------------
// Ein einzelner Generierungslauf (laeuft als eigener Task)
// ---------------------------------------------------------------------------

struct GenerierungsLauf {
    modell: Arc<dyn Sprachmodell>,
    werkzeuge: Arc<Werkzeugkasten>,
    verlauf: Arc<Mutex<Verlauf>>,
    ereignisse: mpsc::Sender<PipelineEreignis>,
    max_werkzeugrunden: usize,
    interaktion: InteraktionsId,
    anfrage: String,
}

impl GenerierungsLauf {
    async fn ausfuehren(self, mut nachrichten: Vec<Nachricht>) -> PipelineResult<()> {
        let beschreibungen = self.werkzeuge.beschreibungen();
        let mut schneider = FragmentSchneider::neu();
        let mut antwort = String::new();

        for runde in 0..=self.max_werkzeugrunden {
            let anfrage = ModellAnfrage {
                nachrichten: nachrichten.clone(),
                werkzeuge: beschreibungen.clone(),
            };
            let mut stream = self.modell.streamen(anfrage).await?;
            let mut aufrufe = Vec::new();
            let mut runden_text = String::new();

            while let Some(ereignis) = stream.recv().await {
                match ereignis? {
                    ModellEreignis::Text(delta) => {
                        runden_text.push_str(&delta);
                        for fragment in schneider.hinzufuegen(&delta) {
                            self.abschnitt_senden(fragment, false).await?;
                        }
                    }
                    ModellEreignis::Werkzeugaufruf(aufruf) => aufrufe.push(aufruf),
                }
            }
            antwort.push_str(&runden_text);

            if aufrufe.is_empty() {
                break;
            }
            if runde == self.max_werkzeugrunden {
                tracing::warn!(
                    interaktion = self.interaktion,
                    runden = runde,
                    "Maximale Anzahl Werkzeugrunden erreicht"
                );
                break;
            }

            nachrichten.push(Nachricht::werkzeug_anforderung(runden_text, aufrufe.clone()));
            for aufruf in &aufrufe {
                tracing::debug!(interaktion = self.interaktion, werkzeug = %aufruf.name, "Werkzeugaufruf");
                let ergebnis = self.werkzeuge.aufrufen(aufruf).await;
                nachrichten.push(Nachricht::werkzeug_ergebnis(aufruf.id.clone(), ergebnis));
            }
        }

        if let Some(rest) = schneider.abschliessen() {
            self.abschnitt_senden(rest, true).await?;
        }

        let antwort = antwort.trim().to_string();
        self.verlauf.lock().interaktion_anhaengen(&self.anfrage, &antwort);
        self.ereignisse
            .send(PipelineEreignis::AntwortAbgeschlossen {
                interaktion: self.interaktion,
                anfrage: self.anfrage.clone(),
                antwort,
            })
            .await
            .map_err(|_| PipelineError::Getrennt)
    }

    async fn abschnitt_senden(&self, text: String, ist_final: bool) -> PipelineResult<()> {
        self.ereignisse
            .send(PipelineEreignis::TextAbschnitt {
                interaktion: self.interaktion,
                text,
                ist_final,
            })
            .await
            .map_err(|_| PipelineError::Getrennt)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
