//! parlor-core – Gemeinsame Typen, Ports und Fehlertypen
//!
//! Dieses Crate stellt die fundamentalen Bausteine bereit, die von allen
//! anderen Parlor-Crates gemeinsam genutzt werden: das Datenmodell einer
//! Anruf-Session (Fragmente, Audio-Chunks, Identifikatoren), die
//! Komponenten-Ereignisse und den Port fuer ausgehende Anrufe.

pub mod anruf;
pub mod error;
pub mod event;
pub mod types;

// Re-Exporte fuer bequemen Zugriff
pub use anruf::AnrufInitiator;
pub use error::{ParlorError, Result};
pub use event::PipelineEreignis;
pub use types::{AudioChunk, CallSid, InteraktionsId, ResponseFragment, StreamSid};
