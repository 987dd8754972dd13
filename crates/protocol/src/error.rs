//! Fehler beim Parsen von Stream-Nachrichten

use thiserror::Error;

pub type ProtokollResult<T> = std::result::Result<T, ProtokollFehler>;

/// Protokollverletzungen einer einzelnen Nachricht
///
/// Die Session ignoriert betroffene Nachrichten, der Zustand bleibt
/// unveraendert.
#[derive(Debug, Error)]
pub enum ProtokollFehler {
    #[error("Ungueltiges JSON oder unbekanntes Ereignis: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Ungueltige Base64-Nutzlast: {0}")]
    Base64(#[from] base64::DecodeError),
}

impl From<ProtokollFehler> for parlor_core::ParlorError {
    fn from(e: ProtokollFehler) -> Self {
        parlor_core::ParlorError::UngueltigeNachricht(e.to_string())
    }
}
