//! Fehlertypen der Pipeline-Komponenten
//!
//! Upstream-Fehler werden an der Komponentengrenze geloggt und verworfen.
//! Die Session laeuft weiter.

use thiserror::Error;

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Transkription fehlgeschlagen: {0}")]
    Transkription(String),

    #[error("Sprachmodell fehlgeschlagen: {0}")]
    Sprachmodell(String),

    #[error("Synthese fehlgeschlagen: {0}")]
    Synthese(String),

    #[error("Werkzeug fehlgeschlagen: {0}")]
    Werkzeug(String),

    /// Der Ereigniskanal der Session ist geschlossen
    #[error("Session beendet")]
    Getrennt,
}

impl From<PipelineError> for parlor_core::ParlorError {
    fn from(e: PipelineError) -> Self {
        match e {
            PipelineError::Getrennt => parlor_core::ParlorError::Getrennt("Session".into()),
            PipelineError::Transkription(grund) => {
                parlor_core::ParlorError::dienst("transkription", grund)
            }
            PipelineError::Sprachmodell(grund) => {
                parlor_core::ParlorError::dienst("sprachmodell", grund)
            }
            PipelineError::Synthese(grund) => parlor_core::ParlorError::dienst("synthese", grund),
            PipelineError::Werkzeug(grund) => parlor_core::ParlorError::dienst("werkzeug", grund),
        }
    }
}
