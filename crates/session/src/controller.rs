//! Session-Controller
//!
//! Besitzt den Zustand genau eines Anrufs (Kennungen, Interaktionszaehler,
//! offene Abspiel-Marker) und verdrahtet die vier Pipeline-Komponenten.
//! Alle Methoden sind synchron und geben die sofort faelligen Nachrichten an
//! den Carrier zurueck; Netzwerkarbeit laeuft in den Tasks der Komponenten,
//! deren Ergebnisse spaeter als [`PipelineEreignis`] eintreffen.

use std::collections::HashSet;
use std::sync::Arc;

use parlor_core::{CallSid, InteraktionsId, PipelineEreignis, ResponseFragment, StreamSid};
use parlor_observability::ParlorMetriken;
use parlor_pipeline::multiplexer::MultiplexerStatistik;
use parlor_pipeline::{
    GeneratorConfig, MultiplexerConfig, PlaybackMultiplexer, ResponseGenerator, SpeechSynthesizer,
    Sprachmodell, Sprachsynthese, TranscriptionPipeline, Transkription, TranskriptionsConfig,
    Werkzeugkasten,
};
use parlor_protocol::{AusgehendeNachricht, EingehendeNachricht, StartDaten};
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Kapazitaet des gemeinsamen Ereigniskanals einer Session
const EREIGNIS_QUEUE_KAPAZITAET: usize = 256;

/// Begruessung, wenn der Anruf ohne Startnachricht beginnt
pub const STANDARD_BEGRUESSUNG: &str = "Hello, thanks for calling. • How can I help you today?";

// ---------------------------------------------------------------------------
// Konfiguration
// ---------------------------------------------------------------------------

/// Die externen Dienste, die jede Session nutzt
#[derive(Clone)]
pub struct Dienste {
    pub sprachmodell: Arc<dyn Sprachmodell>,
    pub werkzeuge: Arc<Werkzeugkasten>,
    pub synthese: Arc<dyn Sprachsynthese>,
    pub transkription: Arc<dyn Transkription>,
}

/// Einstellungen, die fuer alle Sessions gleich sind
#[derive(Debug, Clone)]
pub struct SessionEinstellungen {
    /// Wird ohne Generator direkt synthetisiert
    pub begruessung: String,
    /// Mindestlaenge (Zeichen) einer Aeusserung fuer Barge-in
    pub unterbrechung_min_zeichen: usize,
    pub generator: GeneratorConfig,
    pub multiplexer: MultiplexerConfig,
    pub transkription: TranskriptionsConfig,
}

impl Default for SessionEinstellungen {
    fn default() -> Self {
        Self {
            begruessung: STANDARD_BEGRUESSUNG.to_string(),
            unterbrechung_min_zeichen: 6,
            generator: GeneratorConfig::default(),
            multiplexer: MultiplexerConfig::default(),
            transkription: TranskriptionsConfig::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// SessionController
// ---------------------------------------------------------------------------

/// Zustand und Verdrahtung eines einzelnen Anrufs
pub struct SessionController {
    einstellungen: Arc<SessionEinstellungen>,
    transkriptions_backend: Arc<dyn Transkription>,
    ereignisse: mpsc::Sender<PipelineEreignis>,
    metriken: Option<ParlorMetriken>,

    stream_sid: Option<StreamSid>,
    call_sid: Option<CallSid>,
    anrufer: Option<String>,
    /// Naechste Interaktion fuer eine Transkription
    interaktion: InteraktionsId,
    /// Gesendete, noch nicht bestaetigte Marker-Labels
    marker: HashSet<String>,
    beendet: bool,

    generator: ResponseGenerator,
    synthesizer: SpeechSynthesizer,
    multiplexer: PlaybackMultiplexer,
    /// Laeuft erst ab dem `start`-Ereignis
    transkription: Option<TranscriptionPipeline>,
    /// Bereits an die Metriken gemeldete Luecken
    luecken_gemeldet: u64,
}

impl SessionController {
    /// Erstellt eine Session samt Ereigniskanal
    ///
    /// Der Empfaenger muss vom Aufrufer geleert und jedes Ereignis an
    /// [`Self::ereignis_verarbeiten`] uebergeben werden.
    pub fn neu(
        dienste: Dienste,
        einstellungen: Arc<SessionEinstellungen>,
        metriken: Option<ParlorMetriken>,
    ) -> (Self, mpsc::Receiver<PipelineEreignis>) {
        let (tx, rx) = mpsc::channel(EREIGNIS_QUEUE_KAPAZITAET);
        let generator = ResponseGenerator::neu(
            dienste.sprachmodell,
            dienste.werkzeuge,
            einstellungen.generator.clone(),
            tx.clone(),
        );
        let synthesizer = SpeechSynthesizer::neu(dienste.synthese, tx.clone());
        let multiplexer = PlaybackMultiplexer::neu(einstellungen.multiplexer.clone());

        let controller = Self {
            einstellungen,
            transkriptions_backend: dienste.transkription,
            ereignisse: tx,
            metriken,
            stream_sid: None,
            call_sid: None,
            anrufer: None,
            interaktion: 0,
            marker: HashSet::new(),
            beendet: false,
            generator,
            synthesizer,
            multiplexer,
            transkription: None,
            luecken_gemeldet: 0,
        };
        (controller, rx)
    }

    // -----------------------------------------------------------------------
    // Eingang vom Carrier
    // -----------------------------------------------------------------------

    /// Verarbeitet eine Nachricht des Medien-Streams
    pub fn nachricht_verarbeiten(&mut self, nachricht: EingehendeNachricht) -> Vec<AusgehendeNachricht> {
        match nachricht {
            EingehendeNachricht::Connected => {
                tracing::debug!("Carrier verbunden, warte auf start");
            }
            EingehendeNachricht::Start { start } => self.stream_starten(start),
            EingehendeNachricht::Media { media } => {
                let Some(transkription) = &self.transkription else {
                    tracing::trace!("Audio vor start ignoriert");
                    return Vec::new();
                };
                match media.audio() {
                    Ok(audio) => transkription.senden(audio),
                    Err(e) => tracing::debug!(fehler = %e, "Ungueltige Audio-Nutzlast ignoriert"),
                }
            }
            EingehendeNachricht::Mark { mark, sequenz } => {
                if self.stream_sid.is_none() {
                    tracing::debug!(label = %mark.name, "Marker vor start ignoriert");
                    return Vec::new();
                }
                self.marker_bestaetigen(&mark.name, sequenz.and_then(|s| s.als_zahl()));
            }
            EingehendeNachricht::Stop => {
                tracing::info!(stream_sid = ?self.stream_sid, "Medien-Stream beendet");
                self.beendet = true;
            }
        }
        Vec::new()
    }

    fn stream_starten(&mut self, start: StartDaten) {
        if self.stream_sid.is_some() {
            tracing::warn!(stream_sid = %start.stream_sid, "Erneutes start-Ereignis, Session-Zustand wird zurueckgesetzt");
        }
        self.interaktion = 0;
        self.marker.clear();
        self.anrufer = start.anrufer().map(str::to_string);
        let erste_nachricht = start.erste_nachricht().map(str::to_string);
        self.multiplexer.stream_sid_setzen(start.stream_sid.clone());
        self.call_sid = start.call_sid;
        self.stream_sid = Some(start.stream_sid);

        tracing::info!(
            stream_sid = ?self.stream_sid,
            call_sid = ?self.call_sid,
            anrufer = ?self.anrufer,
            "Medien-Stream gestartet"
        );

        if self.transkription.is_none() {
            self.transkription = Some(TranscriptionPipeline::starten(
                Arc::clone(&self.transkriptions_backend),
                self.einstellungen.transkription.clone(),
                self.ereignisse.clone(),
            ));
        }

        match erste_nachricht {
            Some(text) => {
                tracing::debug!(text = %text, "Startnachricht geht an den Generator");
                self.generator.generieren(&text, self.interaktion);
            }
            None => {
                let begruessung =
                    ResponseFragment::komplett(self.interaktion, self.einstellungen.begruessung.clone());
                self.synthesizer.generieren(begruessung, self.interaktion);
            }
        }
    }

    fn marker_bestaetigen(&mut self, label: &str, sequenz: Option<u64>) {
        if self.marker.remove(label) {
            tracing::trace!(label, ?sequenz, offen = self.marker.len(), "Marker abgespielt");
        } else {
            tracing::debug!(label, ?sequenz, "Unbekannter Marker bestaetigt");
        }
    }

    // -----------------------------------------------------------------------
    // Ereignisse der Komponenten
    // -----------------------------------------------------------------------

    /// Verarbeitet ein Ereignis aus Transkription, Generator oder Synthese
    pub fn ereignis_verarbeiten(&mut self, ereignis: PipelineEreignis) -> Vec<AusgehendeNachricht> {
        match ereignis {
            PipelineEreignis::Aeusserung(text) => self.aeusserung(&text),
            PipelineEreignis::Transkription(text) => {
                self.transkription_abgeschlossen(text);
                Vec::new()
            }
            PipelineEreignis::TextAbschnitt {
                interaktion,
                text,
                ist_final,
            } => {
                let fragment = self.generator.nummerieren(interaktion, text, ist_final);
                tracing::debug!(interaktion, index = ?fragment.index, ist_final, "Fragment zur Synthese");
                if let Some(m) = &self.metriken {
                    m.fragmente_gesamt.inc();
                }
                self.synthesizer.generieren(fragment, interaktion);
                Vec::new()
            }
            PipelineEreignis::AntwortAbgeschlossen {
                interaktion,
                anfrage,
                antwort,
            } => {
                tracing::info!(interaktion, anfrage = %anfrage, antwort = %antwort, "Antwort vollstaendig");
                Vec::new()
            }
            PipelineEreignis::Audio(chunk) => {
                let nachrichten = self.multiplexer.chunk_annehmen(chunk, Instant::now());
                self.ausgabe_erfassen(nachrichten)
            }
            PipelineEreignis::SyntheseAusfall { interaktion, index } => {
                if let Some(m) = &self.metriken {
                    m.synthese_ausfaelle_gesamt.inc();
                }
                let nachrichten = self.multiplexer.ausfall_melden(interaktion, index, Instant::now());
                self.ausgabe_erfassen(nachrichten)
            }
        }
    }

    /// Vorlaeufige Erkennung: einziger Ausloeser fuer Barge-in
    fn aeusserung(&mut self, text: &str) -> Vec<AusgehendeNachricht> {
        if self.marker.is_empty() {
            return Vec::new();
        }
        let zeichen = text.chars().count();
        if zeichen < self.einstellungen.unterbrechung_min_zeichen {
            tracing::debug!(zeichen, "Aeusserung zu kurz fuer Unterbrechung");
            return Vec::new();
        }
        tracing::info!(stream_sid = ?self.stream_sid, text = %text, "Anrufer unterbricht die Wiedergabe");
        self.unterbrechen()
    }

    fn transkription_abgeschlossen(&mut self, text: String) {
        if text.trim().is_empty() {
            tracing::trace!("Leere Transkription ignoriert");
            return;
        }
        tracing::info!(interaktion = self.interaktion, text = %text, "Transkription");
        self.generator.generieren(&text, self.interaktion);
        self.interaktion += 1;
    }

    /// Leert alle gepufferten und beim Carrier wartenden Audiodaten
    ///
    /// Ohne offene Marker ist nichts in Wiedergabe und der Aufruf bleibt
    /// wirkungslos.
    pub fn unterbrechen(&mut self) -> Vec<AusgehendeNachricht> {
        if self.marker.is_empty() {
            return Vec::new();
        }
        let grenzen = self.generator.hoechste_indizes();
        let clear = self.multiplexer.unterbrechen(&grenzen);
        self.marker.clear();
        if let Some(m) = &self.metriken {
            m.unterbrechungen_gesamt.inc();
        }
        clear.into_iter().collect()
    }

    // -----------------------------------------------------------------------
    // Luecken-Timeout
    // -----------------------------------------------------------------------

    /// Ueberspringt abgelaufene Luecken im Multiplexer
    pub fn fristen_pruefen(&mut self, jetzt: Instant) -> Vec<AusgehendeNachricht> {
        let nachrichten = self.multiplexer.fristen_pruefen(jetzt);
        self.ausgabe_erfassen(nachrichten)
    }

    /// Zeitpunkt des naechsten faelligen [`Self::fristen_pruefen`]
    pub fn naechste_frist(&self) -> Option<Instant> {
        self.multiplexer.naechste_frist()
    }

    /// Registriert gesendete Marker und aktualisiert die Metriken
    fn ausgabe_erfassen(&mut self, nachrichten: Vec<AusgehendeNachricht>) -> Vec<AusgehendeNachricht> {
        for nachricht in &nachrichten {
            if let Some(label) = nachricht.label() {
                self.marker.insert(label.to_string());
            }
        }
        if let Some(m) = &self.metriken {
            let gesendet = nachrichten.iter().filter(|n| n.label().is_some()).count();
            m.chunks_gesendet_gesamt.inc_by(gesendet as u64);
            let uebersprungen = self.multiplexer.statistik().uebersprungen;
            m.luecken_uebersprungen_gesamt
                .inc_by(uebersprungen.saturating_sub(self.luecken_gemeldet));
            self.luecken_gemeldet = uebersprungen;
        }
        nachrichten
    }

    // -----------------------------------------------------------------------
    // Zustand
    // -----------------------------------------------------------------------

    pub fn stream_sid(&self) -> Option<&StreamSid> {
        self.stream_sid.as_ref()
    }

    pub fn call_sid(&self) -> Option<&CallSid> {
        self.call_sid.as_ref()
    }

    pub fn anrufer(&self) -> Option<&str> {
        self.anrufer.as_deref()
    }

    pub fn interaktion(&self) -> InteraktionsId {
        self.interaktion
    }

    pub fn offene_marker(&self) -> usize {
        self.marker.len()
    }

    /// true nach dem `stop`-Ereignis
    pub fn ist_beendet(&self) -> bool {
        self.beendet
    }

    /// Handle auf die laufende Transkription (ab `start`)
    pub fn transkription(&self) -> Option<&TranscriptionPipeline> {
        self.transkription.as_ref()
    }

    pub fn multiplexer_statistik(&self) -> &MultiplexerStatistik {
        self.multiplexer.statistik()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testhilfen::{dienste, start_json, ZweiSaetze};
    use bytes::Bytes;
    use parlor_core::AudioChunk;
    use std::time::Duration;

    struct Aufbau {
        controller: SessionController,
        ereignisse: mpsc::Receiver<PipelineEreignis>,
        modell: Arc<ZweiSaetze>,
    }

    fn aufbau(metriken: Option<ParlorMetriken>) -> Aufbau {
        let (dienste, modell) = dienste();
        let (controller, ereignisse) =
            SessionController::neu(dienste, Arc::new(SessionEinstellungen::default()), metriken);
        Aufbau {
            controller,
            ereignisse,
            modell,
        }
    }

    impl Aufbau {
        /// Verarbeitet Ereignisse, bis die Pipeline zur Ruhe kommt
        async fn abarbeiten(&mut self) -> Vec<AusgehendeNachricht> {
            let mut ausgabe = Vec::new();
            while let Ok(Some(ereignis)) =
                tokio::time::timeout(Duration::from_millis(50), self.ereignisse.recv()).await
            {
                ausgabe.extend(self.controller.ereignis_verarbeiten(ereignis));
            }
            ausgabe
        }

        fn nachricht(&mut self, json: &str) -> Vec<AusgehendeNachricht> {
            let nachricht = EingehendeNachricht::parsen(json).unwrap();
            self.controller.nachricht_verarbeiten(nachricht)
        }

        fn starten(&mut self, erste_nachricht: Option<&str>) {
            let json = start_json("MZ1", erste_nachricht);
            assert!(self.nachricht(&json).is_empty());
        }
    }

    fn labels(nachrichten: &[AusgehendeNachricht]) -> Vec<String> {
        nachrichten
            .iter()
            .filter_map(|n| n.label().map(str::to_string))
            .collect()
    }

    fn chunk(interaktion: InteraktionsId, index: u32) -> AudioChunk {
        AudioChunk {
            interaktion,
            index: Some(index),
            label: AudioChunk::label_fuer(interaktion, Some(index)),
            audio: Bytes::from_static(b"\xff\xff"),
        }
    }

    // --- Start ----------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn start_ohne_startnachricht_spielt_begruessung() {
        let mut a = aufbau(None);
        a.starten(None);
        let ausgabe = a.abarbeiten().await;

        assert_eq!(labels(&ausgabe), vec!["0"]);
        assert!(matches!(ausgabe[0], AusgehendeNachricht::Media { .. }));
        assert!(a.modell.anfragen.lock().is_empty());
        assert_eq!(a.controller.offene_marker(), 1);
        assert_eq!(a.controller.interaktion(), 0);
        assert_eq!(a.controller.call_sid().map(|c| c.as_str()), Some("CA1"));
    }

    #[tokio::test(start_paused = true)]
    async fn startnachricht_geht_mit_interaktion_null_an_den_generator() {
        let mut a = aufbau(None);
        a.starten(Some("Hello"));
        assert_eq!(a.controller.anrufer(), Some("+4930123"));

        let ausgabe = a.abarbeiten().await;
        {
            let anfragen = a.modell.anfragen.lock();
            assert_eq!(anfragen.len(), 1);
            let letzte = anfragen[0].nachrichten.last().unwrap();
            assert_eq!(letzte.inhalt, "Hello");
        }
        assert_eq!(labels(&ausgabe), vec!["0-0", "0-1"]);
        // Die Startnachricht zaehlt nicht als Gespraechsrunde
        assert_eq!(a.controller.interaktion(), 0);

        a.controller
            .ereignis_verarbeiten(PipelineEreignis::Transkription("Wie spaet ist es?".into()));
        assert_eq!(a.controller.interaktion(), 1);

        // Gleiche Interaktion, Indizes laufen weiter statt neu zu beginnen
        let ausgabe = a.abarbeiten().await;
        assert_eq!(labels(&ausgabe), vec!["0-2", "0-3"]);
        assert_eq!(a.modell.anfragen.lock().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn leere_transkription_wird_ignoriert() {
        let mut a = aufbau(None);
        a.starten(Some("Hallo"));
        a.abarbeiten().await;

        a.controller
            .ereignis_verarbeiten(PipelineEreignis::Transkription("  ".into()));
        a.abarbeiten().await;
        assert_eq!(a.controller.interaktion(), 0);
        assert_eq!(a.modell.anfragen.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn transkription_erhoeht_den_zaehler_pro_runde() {
        let mut a = aufbau(None);
        a.starten(None);
        a.abarbeiten().await;

        for (runde, text) in ["Erstens", "Zweitens"].into_iter().enumerate() {
            a.controller
                .ereignis_verarbeiten(PipelineEreignis::Transkription(text.into()));
            let ausgabe = a.abarbeiten().await;
            let r = runde as u32;
            assert_eq!(labels(&ausgabe), vec![format!("{r}-0"), format!("{r}-1")]);
        }
        assert_eq!(a.controller.interaktion(), 2);
    }

    // --- Barge-in -------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn kurze_aeusserung_unterbricht_nicht() {
        let mut a = aufbau(None);
        a.starten(None);
        a.abarbeiten().await;
        assert_eq!(a.controller.offene_marker(), 1);

        let ausgabe = a
            .controller
            .ereignis_verarbeiten(PipelineEreignis::Aeusserung("hallo".into()));
        assert!(ausgabe.is_empty());
        assert_eq!(a.controller.offene_marker(), 1);
        assert_eq!(a.controller.multiplexer_statistik().unterbrechungen, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn aeusserung_ab_schwelle_unterbricht() {
        let mut a = aufbau(None);
        a.starten(None);
        a.abarbeiten().await;

        let ausgabe = a
            .controller
            .ereignis_verarbeiten(PipelineEreignis::Aeusserung("halloo".into()));
        assert_eq!(ausgabe.len(), 1);
        assert!(ausgabe[0].ist_clear());
        assert_eq!(a.controller.offene_marker(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn aeusserung_ohne_wiedergabe_unterbricht_nicht() {
        let mut a = aufbau(None);
        a.starten(None);
        // Begruessung noch nicht synthetisiert: keine Marker offen
        let ausgabe = a
            .controller
            .ereignis_verarbeiten(PipelineEreignis::Aeusserung("Moment bitte".into()));
        assert!(ausgabe.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn unterbrechen_ist_idempotent() {
        let metriken = ParlorMetriken::neu().unwrap();
        let mut a = aufbau(Some(metriken.clone()));

        // Ohne Marker: keine Nachricht, kein Zustand
        assert!(a.controller.unterbrechen().is_empty());
        assert_eq!(a.controller.multiplexer_statistik().unterbrechungen, 0);

        a.starten(None);
        a.abarbeiten().await;
        assert_eq!(a.controller.unterbrechen().len(), 1);
        assert!(a.controller.unterbrechen().is_empty());
        assert_eq!(a.controller.multiplexer_statistik().unterbrechungen, 1);
        assert_eq!(metriken.unterbrechungen_gesamt.get(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn bestaetigter_marker_verhindert_unterbrechung() {
        let mut a = aufbau(None);
        a.starten(None);
        a.abarbeiten().await;

        let ausgabe = a.nachricht(
            r#"{"event":"mark","streamSid":"MZ1","sequenceNumber":"4","mark":{"name":"0"}}"#,
        );
        assert!(ausgabe.is_empty());
        assert_eq!(a.controller.offene_marker(), 0);

        let ausgabe = a
            .controller
            .ereignis_verarbeiten(PipelineEreignis::Aeusserung("Ich habe eine Frage".into()));
        assert!(ausgabe.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn spaete_chunks_nach_unterbrechung_werden_verworfen() {
        let mut a = aufbau(None);
        a.starten(None);
        a.controller
            .ereignis_verarbeiten(PipelineEreignis::Transkription("Erzaehl was".into()));
        // Generator liefert zwei Abschnitte fuer Interaktion 0, Synthese laeuft
        let ausgabe = a.abarbeiten().await;
        assert_eq!(labels(&ausgabe), vec!["0", "0-0", "0-1"]);

        assert_eq!(a.controller.unterbrechen().len(), 1);
        // Ein verspaetetes Ergebnis fuer bereits vergebene Indizes spielt nicht mehr
        let ausgabe = a
            .controller
            .ereignis_verarbeiten(PipelineEreignis::Audio(chunk(0, 1)));
        assert!(ausgabe.is_empty());
        assert_eq!(a.controller.offene_marker(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn fortsetzung_nach_unterbrechung_bleibt_sortiert() {
        let mut a = aufbau(None);
        a.starten(Some("Hallo"));
        assert_eq!(labels(&a.abarbeiten().await), vec!["0-0", "0-1"]);

        let ausgabe = a
            .controller
            .ereignis_verarbeiten(PipelineEreignis::Aeusserung("Moment mal".into()));
        assert!(ausgabe[0].ist_clear());

        // Die Antwort laeuft weiter und bekommt die Indizes 2 und 3
        for text in ["Also gut. ", "Weiter im Text"] {
            a.controller.ereignis_verarbeiten(PipelineEreignis::TextAbschnitt {
                interaktion: 0,
                text: text.into(),
                ist_final: false,
            });
        }

        // Index 3 ist vor Index 2 fertig
        assert!(a
            .controller
            .ereignis_verarbeiten(PipelineEreignis::Audio(chunk(0, 3)))
            .is_empty());
        let ausgabe = a
            .controller
            .ereignis_verarbeiten(PipelineEreignis::Audio(chunk(0, 2)));
        assert_eq!(labels(&ausgabe), vec!["0-2", "0-3"]);

        // Die eigentlichen Syntheseergebnisse kommen danach doppelt
        assert!(a.abarbeiten().await.is_empty());
        assert_eq!(a.controller.offene_marker(), 2);
    }

    // --- Reihenfolge ----------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn umgekehrt_eintreffende_chunks_werden_sortiert() {
        let mut a = aufbau(None);
        a.starten(Some("Hallo"));

        let ausgabe = a
            .controller
            .ereignis_verarbeiten(PipelineEreignis::Audio(chunk(3, 1)));
        assert!(ausgabe.is_empty());

        let ausgabe = a
            .controller
            .ereignis_verarbeiten(PipelineEreignis::Audio(chunk(3, 0)));
        assert_eq!(labels(&ausgabe), vec!["3-0", "3-1"]);
        assert_eq!(ausgabe.len(), 4);
        assert_eq!(a.controller.offene_marker(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn luecke_wird_nach_frist_uebersprungen() {
        let metriken = ParlorMetriken::neu().unwrap();
        let mut a = aufbau(Some(metriken.clone()));
        a.starten(Some("Hallo"));

        assert!(a
            .controller
            .ereignis_verarbeiten(PipelineEreignis::Audio(chunk(5, 1)))
            .is_empty());
        let frist = a.controller.naechste_frist().unwrap();
        assert!(a.controller.fristen_pruefen(frist - Duration::from_millis(1)).is_empty());

        let ausgabe = a.controller.fristen_pruefen(frist);
        assert_eq!(labels(&ausgabe), vec!["5-1"]);
        assert!(a.controller.naechste_frist().is_none());
        assert_eq!(metriken.luecken_uebersprungen_gesamt.get(), 1);
        assert_eq!(metriken.chunks_gesendet_gesamt.get(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn gemeldeter_ausfall_gibt_nachfolger_frei() {
        let mut a = aufbau(None);
        a.starten(Some("Hallo"));
        a.controller
            .ereignis_verarbeiten(PipelineEreignis::Audio(chunk(2, 1)));
        let ausgabe = a.controller.ereignis_verarbeiten(PipelineEreignis::SyntheseAusfall {
            interaktion: 2,
            index: Some(0),
        });
        assert_eq!(labels(&ausgabe), vec!["2-1"]);
    }

    // --- Protokoll ------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn media_und_mark_vor_start_werden_ignoriert() {
        let mut a = aufbau(None);
        assert!(a
            .nachricht(r#"{"event":"media","media":{"payload":"//8="}}"#)
            .is_empty());
        assert!(a
            .nachricht(r#"{"event":"mark","mark":{"name":"0"}}"#)
            .is_empty());
        assert!(a.controller.transkription().is_none());
        assert!(a.controller.stream_sid().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_beendet_die_session() {
        let mut a = aufbau(None);
        a.starten(None);
        assert!(a.controller.transkription().is_some());
        assert!(!a.controller.ist_beendet());
        a.nachricht(r#"{"event":"stop","streamSid":"MZ1"}"#);
        assert!(a.controller.ist_beendet());
    }

    #[tokio::test(start_paused = true)]
    async fn fragmente_werden_gezaehlt() {
        let metriken = ParlorMetriken::neu().unwrap();
        let mut a = aufbau(Some(metriken.clone()));
        a.starten(Some("Hallo"));
        a.abarbeiten().await;
        assert_eq!(metriken.fragmente_gesamt.get(), 2);
        assert_eq!(metriken.chunks_gesendet_gesamt.get(), 2);
    }
}
