//! Sprachsynthese
//!
//! Jedes Fragment wird sofort als eigener Task synthetisiert, ohne interne
//! Warteschlange. Die Ergebnisse kommen daher in beliebiger Reihenfolge
//! zurueck; sortiert wird erst im Multiplexer.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parlor_core::{AudioChunk, InteraktionsId, PipelineEreignis, ResponseFragment};
use tokio::sync::mpsc;

use crate::error::{PipelineError, PipelineResult};
use crate::segmentierung::TRENNZEICHEN;

/// Text-zu-Sprache Backend
#[async_trait]
pub trait Sprachsynthese: Send + Sync {
    /// Liefert Audio im Ausgabeformat des Carriers
    async fn synthetisieren(&self, text: &str) -> PipelineResult<Bytes>;
}

/// Faechert Fragmente auf parallele Synthese-Anfragen auf
#[derive(Clone)]
pub struct SpeechSynthesizer {
    backend: Arc<dyn Sprachsynthese>,
    ereignisse: mpsc::Sender<PipelineEreignis>,
}

impl SpeechSynthesizer {
    pub fn neu(backend: Arc<dyn Sprachsynthese>, ereignisse: mpsc::Sender<PipelineEreignis>) -> Self {
        Self { backend, ereignisse }
    }

    /// Startet die Synthese eines Fragments
    ///
    /// Erfolg meldet [`PipelineEreignis::Audio`], ein Fehlschlag
    /// [`PipelineEreignis::SyntheseAusfall`] fuer genau diesen Index.
    pub fn generieren(&self, fragment: ResponseFragment, interaktion: InteraktionsId) {
        let backend = Arc::clone(&self.backend);
        let ereignisse = self.ereignisse.clone();
        let index = fragment.index;

        tokio::spawn(async move {
            let ereignis = match synthese_ausfuehren(backend.as_ref(), &fragment.text).await {
                Ok(audio) => {
                    tracing::debug!(interaktion, ?index, bytes = audio.len(), "Fragment synthetisiert");
                    PipelineEreignis::Audio(AudioChunk {
                        interaktion,
                        index,
                        label: AudioChunk::label_fuer(interaktion, index),
                        audio,
                    })
                }
                Err(e) => {
                    tracing::warn!(interaktion, ?index, fehler = %e, "Synthese fehlgeschlagen, Fragment verworfen");
                    PipelineEreignis::SyntheseAusfall { interaktion, index }
                }
            };
            // Session bereits beendet: Ergebnis verfaellt
            let _ = ereignisse.send(ereignis).await;
        });
    }
}

/// Bereinigt den Text und ruft das Backend genau einmal auf
async fn synthese_ausfuehren(backend: &dyn Sprachsynthese, text: &str) -> PipelineResult<Bytes> {
    let text = text.replace(TRENNZEICHEN, " ");
    let text = text.trim();
    if text.is_empty() {
        return Err(PipelineError::Synthese("leerer Text".into()));
    }
    let audio = backend.synthetisieren(text).await?;
    if audio.is_empty() {
        return Err(PipelineError::Synthese("leeres Audio".into()));
    }
    Ok(audio)
}
