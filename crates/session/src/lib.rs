//! parlor-session – Ein Anruf, eine Session
//!
//! Dieses Crate verbindet den Medien-Stream des Carriers mit der Pipeline:
//! - `controller` – Zustand eines Anrufs, Barge-in, Verdrahtung der Komponenten
//! - `connection` – WebSocket-Hauptschleife pro Verbindung
//! - `registry` – prozessweites Verzeichnis der laufenden Sessions

pub mod connection;
pub mod controller;
pub mod error;
pub mod registry;

#[cfg(test)]
mod testhilfen;

pub use connection::{MediaVerbindung, SessionState};
pub use controller::{Dienste, SessionController, SessionEinstellungen, STANDARD_BEGRUESSUNG};
pub use error::{SessionError, SessionResult};
pub use registry::{SessionEintrag, SessionInfo, SessionRegistry};
