//! Fehlertypen fuer Parlor
//!
//! Zentraler Fehler-Enum fuer alles, was ueber die Grenzen einer einzelnen
//! Pipeline-Komponente hinausgeht. Untermodule koennen eigene Fehler
//! definieren und via `#[from]` konvertieren.

use thiserror::Error;

/// Globaler Result-Alias fuer Parlor
pub type Result<T> = std::result::Result<T, ParlorError>;

/// Alle moeglichen Fehler im Parlor-System
#[derive(Debug, Error)]
pub enum ParlorError {
    // --- Verbindung & Netzwerk ---
    #[error("Verbindung fehlgeschlagen: {0}")]
    Verbindung(String),

    #[error("Verbindung getrennt: {0}")]
    Getrennt(String),

    #[error("Zeitlimit ueberschritten: {0}")]
    Zeitlimit(String),

    // --- Protokoll ---
    #[error("Ungueltige Nachricht: {0}")]
    UngueltigeNachricht(String),

    // --- Externe Dienste ---
    #[error("Dienst '{dienst}' fehlgeschlagen: {grund}")]
    Dienst { dienst: String, grund: String },

    // --- Konfiguration ---
    #[error("Konfigurationsfehler: {0}")]
    Konfiguration(String),

    // --- Intern ---
    #[error("Interner Fehler: {0}")]
    Intern(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl ParlorError {
    /// Erstellt einen internen Fehler aus einer beliebigen Nachricht
    pub fn intern(msg: impl Into<String>) -> Self {
        Self::Intern(msg.into())
    }

    /// Erstellt einen Fehler eines externen Dienstes
    pub fn dienst(dienst: impl Into<String>, grund: impl Into<String>) -> Self {
        Self::Dienst {
            dienst: dienst.into(),
            grund: grund.into(),
        }
    }

    /// Gibt true zurueck wenn der Fehler wiederholbar sein koennte
    pub fn ist_wiederholbar(&self) -> bool {
        matches!(
            self,
            Self::Zeitlimit(_) | Self::Verbindung(_) | Self::Getrennt(_)
        )
    }
}
