//! Abspiel-Multiplexer
//!
//! Einziger Punkt, an dem Audio-Chunks wieder in Reihenfolge gebracht werden.
//! Pro Interaktion existiert ein [`ReorderBuffer`]. Jeder ausgegebene Chunk
//! wird als `media`-Nachricht plus `mark`-Nachricht mit seinem Label an den
//! Carrier geschickt.
//!
//! ## Luecken-Timeout
//! Sobald ein Chunk hinter einem fehlenden Index gepuffert wird, laeuft eine
//! Frist. Macht die Interaktion bis dahin keinen Fortschritt, springt der
//! Cursor ueber die Luecke. Der Multiplexer besitzt selbst keinen Timer: der
//! Aufrufer fragt [`PlaybackMultiplexer::naechste_frist`] ab und ruft
//! [`PlaybackMultiplexer::fristen_pruefen`] auf.
//!
//! ## Aufraeumen
//! Es bleiben hoechstens [`MAX_INTERAKTIONEN`] Buffer erhalten. Darueber
//! hinaus werden die aeltesten Buffer entfernt, solange sie leer sind und
//! keine Frist laeuft. Ein Buffer mit Luecke haelt das Aufraeumen an.
//! Spaete Chunks entfernter Interaktionen zaehlen als verworfen.

use std::collections::HashMap;
use std::time::Duration;

use parlor_core::{AudioChunk, InteraktionsId, StreamSid};
use parlor_protocol::AusgehendeNachricht;
use tokio::time::Instant;

use crate::reorder::ReorderBuffer;

/// Obergrenze fuer gleichzeitig gehaltene Reorder-Buffer
pub const MAX_INTERAKTIONEN: usize = 8;

// ---------------------------------------------------------------------------
// Konfiguration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct MultiplexerConfig {
    /// Wartezeit auf einen fehlenden Index, bevor er uebersprungen wird
    pub luecken_timeout: Duration,
}

impl Default for MultiplexerConfig {
    fn default() -> Self {
        Self {
            luecken_timeout: Duration::from_millis(2000),
        }
    }
}

/// Zaehler des Multiplexers ueber alle Interaktionen
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultiplexerStatistik {
    /// Ausgegebene Chunks (inkl. Chunks ohne Index)
    pub gesendet: u64,
    /// Durch Timeout oder Ausfall uebersprungene Indizes
    pub uebersprungen: u64,
    /// Verworfene Chunks (verspaetet, Duplikat, unterbrochen)
    pub verworfen: u64,
    /// Ausgeloeste Unterbrechungen
    pub unterbrechungen: u64,
}

// ---------------------------------------------------------------------------
// PlaybackMultiplexer
// ---------------------------------------------------------------------------

/// Serialisiert Audio-Chunks in Index-Reihenfolge auf den Ausgangskanal
#[derive(Debug)]
pub struct PlaybackMultiplexer {
    config: MultiplexerConfig,
    stream_sid: Option<StreamSid>,
    puffer: HashMap<InteraktionsId, ReorderBuffer>,
    /// Ablaufzeitpunkt des Luecken-Timeouts pro Interaktion
    fristen: HashMap<InteraktionsId, Instant>,
    /// Interaktionen bis einschliesslich dieser Id sind abgeschlossen
    entfernt_bis: Option<InteraktionsId>,
    statistik: MultiplexerStatistik,
}

impl PlaybackMultiplexer {
    pub fn neu(config: MultiplexerConfig) -> Self {
        Self {
            config,
            stream_sid: None,
            puffer: HashMap::new(),
            fristen: HashMap::new(),
            entfernt_bis: None,
            statistik: MultiplexerStatistik::default(),
        }
    }

    /// Setzt die Stream-Kennung fuer ausgehende Nachrichten
    pub fn stream_sid_setzen(&mut self, stream_sid: StreamSid) {
        self.stream_sid = Some(stream_sid);
    }

    /// Nimmt einen synthetisierten Chunk an
    ///
    /// Gibt die Nachrichten zurueck, die sofort an den Carrier gehen.
    pub fn chunk_annehmen(&mut self, chunk: AudioChunk, jetzt: Instant) -> Vec<AusgehendeNachricht> {
        if chunk.index.is_none() {
            return self.ausgeben(vec![chunk]);
        }
        let interaktion = chunk.interaktion;
        if self.ist_entfernt(interaktion) {
            self.statistik.verworfen += 1;
            tracing::debug!(label = %chunk.label, "Chunk einer abgeschlossenen Interaktion verworfen");
            return Vec::new();
        }
        let puffer = self.puffer.entry(interaktion).or_default();
        let vorher = puffer.statistik().clone();
        let bereit = puffer.push(chunk);
        let nachher = puffer.statistik().clone();
        self.statistik.verworfen +=
            (nachher.duplikate + nachher.verspaetet) - (vorher.duplikate + vorher.verspaetet);
        self.nach_fortschritt(interaktion, !bereit.is_empty(), jetzt, vorher.uebersprungen);
        let nachrichten = self.ausgeben(bereit);
        self.aufraeumen();
        nachrichten
    }

    /// Meldet einen Index, dessen Synthese fehlgeschlagen ist
    pub fn ausfall_melden(
        &mut self,
        interaktion: InteraktionsId,
        index: Option<u32>,
        jetzt: Instant,
    ) -> Vec<AusgehendeNachricht> {
        let Some(index) = index else {
            return Vec::new();
        };
        if self.ist_entfernt(interaktion) {
            return Vec::new();
        }
        let puffer = self.puffer.entry(interaktion).or_default();
        let vorher = puffer.statistik().uebersprungen;
        let bereit = puffer.ausfall_melden(index);
        self.nach_fortschritt(interaktion, !bereit.is_empty(), jetzt, vorher);
        self.ausgeben(bereit)
    }

    /// Ueberspringt alle Luecken, deren Frist abgelaufen ist
    pub fn fristen_pruefen(&mut self, jetzt: Instant) -> Vec<AusgehendeNachricht> {
        let abgelaufen: Vec<InteraktionsId> = self
            .fristen
            .iter()
            .filter(|(_, frist)| **frist <= jetzt)
            .map(|(interaktion, _)| *interaktion)
            .collect();

        let mut nachrichten = Vec::new();
        for interaktion in abgelaufen {
            self.fristen.remove(&interaktion);
            let Some(puffer) = self.puffer.get_mut(&interaktion) else {
                continue;
            };
            let vorher = puffer.statistik().uebersprungen;
            let bereit = puffer.luecke_ueberspringen();
            tracing::warn!(
                interaktion,
                naechster = ?puffer.naechster(),
                "Luecken-Timeout abgelaufen, fehlendes Audio uebersprungen"
            );
            self.nach_fortschritt(interaktion, true, jetzt, vorher);
            nachrichten.extend(self.ausgeben(bereit));
        }
        self.aufraeumen();
        nachrichten
    }

    /// Fruehester Zeitpunkt, zu dem [`Self::fristen_pruefen`] etwas tun wird
    pub fn naechste_frist(&self) -> Option<Instant> {
        self.fristen.values().min().copied()
    }

    /// Verwirft alle gepufferten Chunks aller Interaktionen
    ///
    /// `grenzen` enthaelt pro Interaktion den hoechsten bereits zur Synthese
    /// gegebenen Index. Gibt die `clear`-Nachricht fuer den Carrier zurueck.
    pub fn unterbrechen(&mut self, grenzen: &HashMap<InteraktionsId, u32>) -> Option<AusgehendeNachricht> {
        for (interaktion, puffer) in self.puffer.iter_mut() {
            self.statistik.verworfen += puffer.fuellstand() as u64;
            puffer.zuruecksetzen(grenzen.get(interaktion).copied());
        }
        for (interaktion, grenze) in grenzen {
            if self.ist_entfernt(*interaktion) {
                continue;
            }
            self.puffer
                .entry(*interaktion)
                .or_insert_with(|| {
                    let mut puffer = ReorderBuffer::neu();
                    puffer.zuruecksetzen(Some(*grenze));
                    puffer
                });
        }
        self.fristen.clear();
        self.statistik.unterbrechungen += 1;
        self.aufraeumen();
        tracing::debug!(interaktionen = self.puffer.len(), "Wiedergabe unterbrochen");
        self.stream_sid.clone().map(AusgehendeNachricht::clear)
    }

    pub fn statistik(&self) -> &MultiplexerStatistik {
        &self.statistik
    }

    /// Anzahl aktuell gepufferter Chunks ueber alle Interaktionen
    pub fn fuellstand(&self) -> usize {
        self.puffer.values().map(|p| p.fuellstand()).sum()
    }

    /// Anzahl gehaltener Reorder-Buffer
    pub fn interaktionen(&self) -> usize {
        self.puffer.len()
    }

    // -----------------------------------------------------------------------
    // Interne Hilfsfunktionen
    // -----------------------------------------------------------------------

    fn ist_entfernt(&self, interaktion: InteraktionsId) -> bool {
        self.entfernt_bis.is_some_and(|grenze| interaktion <= grenze)
    }

    /// Entfernt die aeltesten leeren Buffer oberhalb von [`MAX_INTERAKTIONEN`]
    fn aufraeumen(&mut self) {
        if self.puffer.len() <= MAX_INTERAKTIONEN {
            return;
        }
        let mut ids: Vec<InteraktionsId> = self.puffer.keys().copied().collect();
        ids.sort_unstable();
        let ueberzaehlig = self.puffer.len() - MAX_INTERAKTIONEN;
        for interaktion in ids.into_iter().take(ueberzaehlig) {
            let leer = self.puffer.get(&interaktion).is_some_and(|p| p.fuellstand() == 0);
            if !leer || self.fristen.contains_key(&interaktion) {
                break;
            }
            self.puffer.remove(&interaktion);
            self.entfernt_bis = Some(interaktion);
            tracing::trace!(interaktion, "Reorder-Buffer entfernt");
        }
    }

    /// Aktualisiert Frist und Statistik nach einer Buffer-Operation
    fn nach_fortschritt(
        &mut self,
        interaktion: InteraktionsId,
        fortschritt: bool,
        jetzt: Instant,
        uebersprungen_vorher: u64,
    ) {
        let Some(puffer) = self.puffer.get(&interaktion) else {
            return;
        };
        self.statistik.uebersprungen += puffer.statistik().uebersprungen - uebersprungen_vorher;

        if !puffer.hat_luecke() {
            self.fristen.remove(&interaktion);
            return;
        }
        let neue_frist = jetzt + self.config.luecken_timeout;
        if fortschritt {
            self.fristen.insert(interaktion, neue_frist);
        } else {
            self.fristen.entry(interaktion).or_insert(neue_frist);
        }
    }

    /// Wandelt abspielbare Chunks in `media` + `mark` Nachrichten um
    fn ausgeben(&mut self, chunks: Vec<AudioChunk>) -> Vec<AusgehendeNachricht> {
        let Some(stream_sid) = self.stream_sid.clone() else {
            if !chunks.is_empty() {
                tracing::warn!(anzahl = chunks.len(), "Audio ohne Stream-Kennung verworfen");
            }
            return Vec::new();
        };
        let mut nachrichten = Vec::with_capacity(chunks.len() * 2);
        for chunk in chunks {
            tracing::trace!(label = %chunk.label, bytes = chunk.audio.len(), "Chunk ausgegeben");
            nachrichten.push(AusgehendeNachricht::media(stream_sid.clone(), &chunk.audio));
            nachrichten.push(AusgehendeNachricht::mark(stream_sid.clone(), chunk.label));
            self.statistik.gesendet += 1;
        }
        nachrichten
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
