//! parlor-backends – Konkrete Dienst-Anbindungen
//!
//! Implementiert die Backend-Traits aus `parlor-pipeline` ueber HTTP:
//! - [`OpenAiChat`] – gestreamte Chat-Completion (SSE)
//! - [`HttpSynthese`] – Text-zu-Sprache, Ausgabe als 8kHz µ-law
//! - [`SegmentTranskription`] – Energie-VAD plus Segment-Upload
//!
//! Dazu den Carrier-Adapter [`RestAnrufInitiator`] fuer ausgehende Anrufe.

pub mod anruf;
pub mod chat;
pub mod mulaw;
pub mod sprache;
pub mod transkription;
pub mod vad;

pub use anruf::{CarrierConfig, RestAnrufInitiator};
pub use chat::{ChatConfig, OpenAiChat};
pub use sprache::{HttpSynthese, SyntheseConfig};
pub use transkription::{SegmentTranskription, TranskriptionsDienstConfig};
pub use vad::{EnergieVad, VadConfig};

/// Fehlertext einer HTTP-Antwort ohne Erfolgsstatus
pub(crate) async fn fehler_aus_antwort(antwort: reqwest::Response) -> String {
    let status = antwort.status();
    let text = antwort.text().await.unwrap_or_default();
    let text: String = text.chars().take(200).collect();
    format!("HTTP {status}: {text}")
}
