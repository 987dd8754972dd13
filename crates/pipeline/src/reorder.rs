//! Reorder-Buffer fuer Audio-Chunks einer Interaktion
//!
//! Die Synthese liefert Chunks in beliebiger Reihenfolge. Der Buffer gibt sie
//! strikt nach Sequenz-Index sortiert wieder aus:
//! - Index == Cursor: sofort ausgeben, Cursor weiterschieben, Puffer leeren
//!   solange der naechste Index bereits vorliegt
//! - Index > Cursor: puffern bis die Luecke geschlossen ist
//! - Index < Cursor: verspaetet, verwerfen
//!
//! Luecken werden von aussen geschlossen: entweder durch eine gemeldete
//! Synthese-Panne (`ausfall_melden`) oder durch den Timeout des Multiplexers
//! (`luecke_ueberspringen`).
//!
//! ## Performance-Eigenschaften
//! - O(log n) Einfuegen (BTreeMap nach Index sortiert)
//! - Keine Locks (pro Session single-threaded verwendet)

use parlor_core::AudioChunk;
use std::collections::{BTreeMap, BTreeSet};

// ---------------------------------------------------------------------------
// Statistiken
// ---------------------------------------------------------------------------

/// Statistiken des Reorder-Buffers (Snapshot)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReorderStatistik {
    /// Anzahl angenommener Chunks gesamt
    pub empfangen: u64,
    /// Anzahl in Reihenfolge ausgegebener Chunks
    pub ausgegeben: u64,
    /// Anzahl verworfener Duplikate
    pub duplikate: u64,
    /// Anzahl zu spaet angekommener Chunks (Index bereits passiert)
    pub verspaetet: u64,
    /// Anzahl uebersprungener Indizes (Ausfall oder Timeout)
    pub uebersprungen: u64,
    /// Anzahl Out-of-Order Chunks (gepuffert statt sofort ausgegeben)
    pub out_of_order: u64,
    /// Aktueller Fuellstand
    pub fuellstand: usize,
}

// ---------------------------------------------------------------------------
// ReorderBuffer
// ---------------------------------------------------------------------------

/// Sortiert Audio-Chunks einer Interaktion nach Sequenz-Index
#[derive(Debug)]
pub struct ReorderBuffer {
    /// Gepufferte Chunks, sortiert nach Index
    chunks: BTreeMap<u32, AudioChunk>,
    /// Naechster erwarteter Index; `None` = frischer Stream, der erste
    /// ankommende Index setzt den Cursor
    naechster: Option<u32>,
    /// Alles bis einschliesslich dieses Index gehoert zu einer
    /// unterbrochenen Antwort und wird verworfen
    verworfen_bis: Option<u32>,
    /// Gemeldete Synthese-Ausfaelle ab Cursor
    ausgefallen: BTreeSet<u32>,
    statistik: ReorderStatistik,
}

impl Default for ReorderBuffer {
    fn default() -> Self {
        Self::neu()
    }
}

impl ReorderBuffer {
    /// Erstellt einen Buffer mit Cursor 0
    pub fn neu() -> Self {
        Self {
            chunks: BTreeMap::new(),
            naechster: Some(0),
            verworfen_bis: None,
            ausgefallen: BTreeSet::new(),
            statistik: ReorderStatistik::default(),
        }
    }

    /// Nimmt einen Chunk an und gibt alle jetzt abspielbaren Chunks zurueck
    ///
    /// Chunks ohne Index gehoeren nicht in den Buffer und werden unveraendert
    /// durchgereicht.
    pub fn push(&mut self, chunk: AudioChunk) -> Vec<AudioChunk> {
        let Some(index) = chunk.index else {
            return vec![chunk];
        };
        self.statistik.empfangen += 1;

        if self.verworfen_bis.is_some_and(|grenze| index <= grenze) {
            self.statistik.verspaetet += 1;
            tracing::trace!(interaktion = chunk.interaktion, index, "Chunk einer unterbrochenen Antwort verworfen");
            return Vec::new();
        }

        let cursor = *self.naechster.get_or_insert(index);
        if index < cursor {
            self.statistik.verspaetet += 1;
            tracing::debug!(interaktion = chunk.interaktion, index, erwartet = cursor, "Verspaeteter Chunk verworfen");
            return Vec::new();
        }

        if self.chunks.contains_key(&index) {
            self.statistik.duplikate += 1;
            return Vec::new();
        }

        if index > cursor {
            self.statistik.out_of_order += 1;
            tracing::debug!(interaktion = chunk.interaktion, index, erwartet = cursor, "Chunk vor Luecke gepuffert");
        }

        self.chunks.insert(index, chunk);
        self.abspielbare_entnehmen()
    }

    /// Markiert einen Index als endgueltig fehlend (Synthese fehlgeschlagen)
    pub fn ausfall_melden(&mut self, index: u32) -> Vec<AudioChunk> {
        if self.verworfen_bis.is_some_and(|grenze| index <= grenze) {
            return Vec::new();
        }
        // Frischer Stream: ohne Startpunkt gibt es noch keine Luecke
        let Some(cursor) = self.naechster else {
            return Vec::new();
        };
        if index < cursor {
            return Vec::new();
        }
        self.ausgefallen.insert(index);
        self.abspielbare_entnehmen()
    }

    /// Springt mit dem Cursor zum kleinsten gepufferten Index
    ///
    /// Wird vom Multiplexer nach Ablauf des Luecken-Timeouts aufgerufen.
    pub fn luecke_ueberspringen(&mut self) -> Vec<AudioChunk> {
        let Some((&kleinster, _)) = self.chunks.iter().next() else {
            return Vec::new();
        };
        let cursor = self.naechster.unwrap_or(kleinster);
        if kleinster > cursor {
            let luecke = (kleinster - cursor) as u64;
            self.statistik.uebersprungen += luecke;
            tracing::debug!(von = cursor, bis = kleinster, luecke, "Luecke uebersprungen");
        }
        self.ausgefallen = self.ausgefallen.split_off(&kleinster);
        self.naechster = Some(kleinster);
        self.abspielbare_entnehmen()
    }

    /// Verwirft alle gepufferten Chunks nach einer Unterbrechung
    ///
    /// `grenze` ist der hoechste Index, der bereits zur Synthese unterwegs
    /// war. Spaeter eintreffende Ergebnisse bis dahin werden verworfen, der
    /// Cursor wartet auf den Index direkt dahinter. Ohne Grenze setzt der
    /// erste ankommende Chunk den Cursor.
    pub fn zuruecksetzen(&mut self, grenze: Option<u32>) {
        let verworfen = self.chunks.len();
        self.chunks.clear();
        self.ausgefallen.clear();
        self.naechster = match grenze {
            Some(grenze) => {
                let grenze = self.verworfen_bis.map_or(grenze, |alt| alt.max(grenze));
                self.verworfen_bis = Some(grenze);
                Some(grenze.saturating_add(1))
            }
            None => None,
        };
        self.statistik.fuellstand = 0;
        if verworfen > 0 {
            tracing::debug!(verworfen, "Reorder-Buffer geleert");
        }
    }

    /// true wenn Chunks hinter einer Luecke warten
    pub fn hat_luecke(&self) -> bool {
        !self.chunks.is_empty()
    }

    /// Naechster erwarteter Index (`None` nach einer Unterbrechung ohne Grenze)
    pub fn naechster(&self) -> Option<u32> {
        self.naechster
    }

    pub fn fuellstand(&self) -> usize {
        self.chunks.len()
    }

    pub fn statistik(&self) -> &ReorderStatistik {
        &self.statistik
    }

    // -----------------------------------------------------------------------
    // Interne Hilfsfunktionen
    // -----------------------------------------------------------------------

    /// Entnimmt alle Chunks ab Cursor bis zur naechsten Luecke
    fn abspielbare_entnehmen(&mut self) -> Vec<AudioChunk> {
        let mut ausgabe = Vec::new();
        while let Some(cursor) = self.naechster {
            if let Some(chunk) = self.chunks.remove(&cursor) {
                ausgabe.push(chunk);
            } else if self.ausgefallen.remove(&cursor) {
                self.statistik.uebersprungen += 1;
                tracing::debug!(index = cursor, "Ausgefallener Index uebersprungen");
            } else {
                break;
            }
            self.naechster = Some(cursor.saturating_add(1));
        }
        self.statistik.ausgegeben += ausgabe.len() as u64;
        self.statistik.fuellstand = self.chunks.len();
        ausgabe
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
