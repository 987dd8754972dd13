//! parlor-pipeline – Die vier Komponenten eines Gespraechs
//!
//! Dieses Crate enthaelt:
//! - `transkription` – Audio rein, vorlaeufige und finale Erkennungen raus
//! - `generator` – gestreamte Modell-Antworten in sprechbare Fragmente schneiden
//! - `synthese` – Fragmente parallel in Audio-Chunks umwandeln
//! - `multiplexer` – Chunks wieder in Index-Reihenfolge bringen und ausgeben
//!
//! ## Architektur
//! ```text
//! Audio ──► TranscriptionPipeline ──► SessionController ──► ResponseGenerator
//!                                            │                    │
//!                                            ▼                    ▼
//!   Carrier ◄── PlaybackMultiplexer ◄── SpeechSynthesizer ◄── Fragmente
//! ```
//!
//! Alle Komponenten melden ihre Ergebnisse als [`PipelineEreignis`] ueber
//! einen gemeinsamen Kanal an den Session-Controller.
//!
//! [`PipelineEreignis`]: parlor_core::PipelineEreignis

pub mod error;
pub mod generator;
pub mod multiplexer;
pub mod reorder;
pub mod segmentierung;
pub mod synthese;
pub mod transkription;
pub mod verlauf;
pub mod werkzeug;

pub use error::{PipelineError, PipelineResult};
pub use generator::{GeneratorConfig, ModellAnfrage, ModellEreignis, ResponseGenerator, Sprachmodell};
pub use multiplexer::{MultiplexerConfig, PlaybackMultiplexer};
pub use reorder::{ReorderBuffer, ReorderStatistik};
pub use segmentierung::FragmentSchneider;
pub use synthese::{SpeechSynthesizer, Sprachsynthese};
pub use transkription::{
    Erkennung, TranscriptionPipeline, Transkription, TranskriptionsConfig,
    TranskriptionsVerbindung,
};
pub use verlauf::{Nachricht, Rolle, Verlauf};
pub use werkzeug::{Werkzeug, WerkzeugBeschreibung, Werkzeugaufruf, Werkzeugkasten};
