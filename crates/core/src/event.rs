//! Komponenten-Ereignisse
//!
//! Alle Pipeline-Komponenten melden ihre Ergebnisse ueber einen einzigen
//! tokio-Kanal pro Session. Der Session-Controller ist der einzige
//! Abonnent und verarbeitet die Ereignisse strikt in Eingangsreihenfolge.

use crate::types::{AudioChunk, InteraktionsId};

/// Ausgabe-Ereignisse der Transkription, des Generators und der Synthese
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEreignis {
    /// Vorlaeufige Erkennung (niedrige Latenz, kann sich noch aendern)
    Aeusserung(String),
    /// Finalisierte Transkription eines Anrufer-Turns
    Transkription(String),
    /// Ungezaehlter Textabschnitt aus dem Antwort-Stream
    ///
    /// Der Sequenz-Index wird erst beim Controller vergeben, damit die
    /// Nummerierung pro Interaktion auch ueber mehrere Aufrufe hinweg
    /// streng monoton bleibt.
    TextAbschnitt {
        interaktion: InteraktionsId,
        text: String,
        ist_final: bool,
    },
    /// Antwort-Stream vollstaendig abgeschlossen (fuer den Verlauf)
    AntwortAbgeschlossen {
        interaktion: InteraktionsId,
        anfrage: String,
        antwort: String,
    },
    /// Synthese eines Fragments erfolgreich
    Audio(AudioChunk),
    /// Synthese eines Fragments endgueltig fehlgeschlagen
    SyntheseAusfall {
        interaktion: InteraktionsId,
        index: Option<u32>,
    },
}
