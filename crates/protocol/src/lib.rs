//! parlor-protocol – Wire-Formate des Carriers
//!
//! Dieses Crate definiert die JSON-Nachrichten, die ueber den
//! bidirektionalen Medien-Stream ausgetauscht werden, sowie das
//! XML-Anweisungsdokument, mit dem der Carrier den Stream oeffnet.

pub mod anweisung;
pub mod error;
pub mod media;

pub use anweisung::StreamAnweisung;
pub use error::{ProtokollFehler, ProtokollResult};
pub use media::{AusgehendeNachricht, EingehendeNachricht, StartDaten};
