//! Fehlertypen fuer die Session-Schicht

use parlor_core::ParlorError;
use parlor_protocol::ProtokollFehler;
use thiserror::Error;

/// Fehlertyp fuer eine Medien-Session
#[derive(Debug, Error)]
pub enum SessionError {
    /// WebSocket-Fehler beim Lesen oder Schreiben
    #[error("WebSocket-Fehler: {0}")]
    WebSocket(String),

    /// Verbindung wurde getrennt
    #[error("Verbindung getrennt")]
    VerbindungGetrennt,

    /// Nachricht nicht kodierbar/dekodierbar
    #[error("Protokollfehler: {0}")]
    Protokoll(#[from] ProtokollFehler),
}

pub type SessionResult<T> = Result<T, SessionError>;

impl From<SessionError> for ParlorError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::Protokoll(p) => ParlorError::UngueltigeNachricht(p.to_string()),
            andere => ParlorError::Getrennt(andere.to_string()),
        }
    }
}
