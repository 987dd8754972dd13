//! Transkriptions-Pipeline
//!
//! Nimmt rohe Audio-Frames des Anrufers entgegen und meldet vorlaeufige
//! Erkennungen ([`PipelineEreignis::Aeusserung`]) sowie finale Transkripte
//! ([`PipelineEreignis::Transkription`]).
//!
//! ## Wiederverbindung
//! Bricht die Verbindung zum Backend ab, verbindet ein Worker-Task mit
//! exponentiellem Backoff neu. Gelingt das innerhalb des
//! Wiederverbindungs-Fensters, wird das seit dem letzten finalen Transkript
//! gepufferte Audio erneut gesendet. Sonst bleibt die Transkription
//! deaktiviert, bis [`TranscriptionPipeline::zuruecksetzen`] aufgerufen wird.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parlor_core::PipelineEreignis;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::error::PipelineResult;

/// Kapazitaet der Steuer-Queue (Audio-Frames a 20ms)
const STEUER_QUEUE_KAPAZITAET: usize = 1024;

// ---------------------------------------------------------------------------
// Backend-Schnittstelle
// ---------------------------------------------------------------------------

/// Erkennung aus dem Backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Erkennung {
    /// Vorlaeufig, kann sich noch aendern
    Zwischen(String),
    /// Abgeschlossene Aeusserung
    Final(String),
}

/// Eine offene Verbindung zum Transkriptions-Backend
///
/// Endet `erkennungen` oder liefert es einen Fehler, gilt die Verbindung
/// als abgebrochen.
pub struct TranskriptionsVerbindung {
    pub audio: mpsc::Sender<Bytes>,
    pub erkennungen: mpsc::Receiver<PipelineResult<Erkennung>>,
}

#[async_trait]
pub trait Transkription: Send + Sync {
    async fn verbinden(&self) -> PipelineResult<TranskriptionsVerbindung>;
}

// ---------------------------------------------------------------------------
// Konfiguration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct TranskriptionsConfig {
    /// Zeitfenster fuer Wiederverbindungsversuche
    pub wiederverbindungs_fenster: Duration,
    pub backoff_start: Duration,
    pub backoff_max: Duration,
    /// Obergrenze des Replay-Puffers in Bytes
    pub max_replay_bytes: usize,
}

impl Default for TranskriptionsConfig {
    fn default() -> Self {
        Self {
            wiederverbindungs_fenster: Duration::from_secs(5),
            backoff_start: Duration::from_millis(100),
            backoff_max: Duration::from_secs(1),
            max_replay_bytes: 320 * 1024,
        }
    }
}

// ---------------------------------------------------------------------------
// TranscriptionPipeline
// ---------------------------------------------------------------------------

#[derive(Debug)]
enum Steuerung {
    Audio(Bytes),
    Zuruecksetzen,
}

/// Handle auf den Transkriptions-Worker einer Session
///
/// Klonbar; der Worker endet, sobald alle Handles verworfen sind.
#[derive(Clone)]
pub struct TranscriptionPipeline {
    steuerung: mpsc::Sender<Steuerung>,
}

impl TranscriptionPipeline {
    /// Startet den Worker-Task und verbindet zum Backend
    pub fn starten(
        backend: Arc<dyn Transkription>,
        config: TranskriptionsConfig,
        ereignisse: mpsc::Sender<PipelineEreignis>,
    ) -> Self {
        let (steuerung, steuer_rx) = mpsc::channel(STEUER_QUEUE_KAPAZITAET);
        let worker = Worker {
            replay: ReplayPuffer::neu(config.max_replay_bytes),
            backend,
            config,
            steuerung: steuer_rx,
            ereignisse,
        };
        tokio::spawn(worker.laufen());
        Self { steuerung }
    }

    /// Reicht einen Audio-Frame weiter, blockiert nie
    pub fn senden(&self, audio: Bytes) {
        if self.steuerung.try_send(Steuerung::Audio(audio)).is_err() {
            tracing::trace!("Transkriptions-Queue voll, Audio-Frame verworfen");
        }
    }

    /// Aktiviert eine deaktivierte Transkription wieder bzw. erzwingt eine
    /// neue Verbindung
    pub fn zuruecksetzen(&self) {
        if self.steuerung.try_send(Steuerung::Zuruecksetzen).is_err() {
            tracing::warn!("Zuruecksetzen der Transkription nicht zustellbar");
        }
    }
}

// ---------------------------------------------------------------------------
// Replay-Puffer
// ---------------------------------------------------------------------------

/// Audio seit dem letzten finalen Transkript, nach Bytes begrenzt
#[derive(Debug)]
struct ReplayPuffer {
    frames: VecDeque<Bytes>,
    bytes: usize,
    max_bytes: usize,
}

impl ReplayPuffer {
    fn neu(max_bytes: usize) -> Self {
        Self {
            frames: VecDeque::new(),
            bytes: 0,
            max_bytes,
        }
    }

    fn anhaengen(&mut self, frame: Bytes) {
        self.bytes += frame.len();
        self.frames.push_back(frame);
        while self.bytes > self.max_bytes {
            match self.frames.pop_front() {
                Some(alt) => self.bytes -= alt.len(),
                None => break,
            }
        }
    }

    fn leeren(&mut self) {
        self.frames.clear();
        self.bytes = 0;
    }
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

enum Verbindungsergebnis {
    Verbunden(TranskriptionsVerbindung),
    Abgelaufen,
    Beendet,
}

enum Betriebsende {
    Abgebrochen,
    Neustart,
    Beendet,
}

struct Worker {
    backend: Arc<dyn Transkription>,
    config: TranskriptionsConfig,
    steuerung: mpsc::Receiver<Steuerung>,
    ereignisse: mpsc::Sender<PipelineEreignis>,
    replay: ReplayPuffer,
}

impl Worker {
    async fn laufen(mut self) {
        loop {
            let verbindung = match self.verbinden().await {
                Verbindungsergebnis::Verbunden(v) => v,
                Verbindungsergebnis::Beendet => return,
                Verbindungsergebnis::Abgelaufen => {
                    tracing::warn!(
                        fenster_ms = self.config.wiederverbindungs_fenster.as_millis() as u64,
                        "Transkription deaktiviert, Backend nicht erreichbar"
                    );
                    self.replay.leeren();
                    if !self.deaktiviert_warten().await {
                        return;
                    }
                    tracing::info!("Transkription wird wieder aktiviert");
                    continue;
                }
            };

            match self.betrieb(verbindung).await {
                Betriebsende::Beendet => return,
                Betriebsende::Abgebrochen => {
                    tracing::warn!("Transkriptions-Verbindung abgebrochen, verbinde neu");
                }
                Betriebsende::Neustart => {
                    self.replay.leeren();
                    tracing::info!("Transkription zurueckgesetzt, verbinde neu");
                }
            }
        }
    }

    /// Verbindet mit Backoff innerhalb des Wiederverbindungs-Fensters
    async fn verbinden(&mut self) -> Verbindungsergebnis {
        let frist = Instant::now() + self.config.wiederverbindungs_fenster;
        let mut backoff = self.config.backoff_start;

        loop {
            match self.backend.verbinden().await {
                Ok(verbindung) => {
                    if self.replay_senden(&verbindung).await {
                        return Verbindungsergebnis::Verbunden(verbindung);
                    }
                    tracing::warn!("Replay in neue Verbindung fehlgeschlagen");
                }
                Err(e) => {
                    tracing::warn!(fehler = %e, backoff_ms = backoff.as_millis() as u64, "Verbindung zur Transkription fehlgeschlagen");
                }
            }

            if Instant::now() + backoff > frist {
                return Verbindungsergebnis::Abgelaufen;
            }
            if !self.puffernd_warten(backoff).await {
                return Verbindungsergebnis::Beendet;
            }
            backoff = (backoff * 2).min(self.config.backoff_max);
        }
    }

    /// Sendet das gepufferte Audio in eine frische Verbindung
    async fn replay_senden(&self, verbindung: &TranskriptionsVerbindung) -> bool {
        if !self.replay.frames.is_empty() {
            tracing::debug!(
                frames = self.replay.frames.len(),
                bytes = self.replay.bytes,
                "Gepuffertes Audio wird erneut gesendet"
            );
        }
        for frame in &self.replay.frames {
            if verbindung.audio.send(frame.clone()).await.is_err() {
                return false;
            }
        }
        true
    }

    /// Wartet `dauer` und puffert dabei eintreffendes Audio
    ///
    /// Gibt false zurueck wenn die Session beendet wurde.
    async fn puffernd_warten(&mut self, dauer: Duration) -> bool {
        let schlaf = tokio::time::sleep(dauer);
        tokio::pin!(schlaf);
        loop {
            tokio::select! {
                _ = &mut schlaf => return true,
                steuerung = self.steuerung.recv() => match steuerung {
                    Some(Steuerung::Audio(frame)) => self.replay.anhaengen(frame),
                    Some(Steuerung::Zuruecksetzen) => {}
                    None => return false,
                },
            }
        }
    }

    /// Verwirft Audio bis zum naechsten Zuruecksetzen
    async fn deaktiviert_warten(&mut self) -> bool {
        while let Some(steuerung) = self.steuerung.recv().await {
            if let Steuerung::Zuruecksetzen = steuerung {
                return true;
            }
        }
        false
    }

    /// Normalbetrieb: Audio weiterreichen, Erkennungen melden
    async fn betrieb(&mut self, mut verbindung: TranskriptionsVerbindung) -> Betriebsende {
        loop {
            tokio::select! {
                steuerung = self.steuerung.recv() => match steuerung {
                    Some(Steuerung::Audio(frame)) => {
                        self.replay.anhaengen(frame.clone());
                        if verbindung.audio.send(frame).await.is_err() {
                            return Betriebsende::Abgebrochen;
                        }
                    }
                    Some(Steuerung::Zuruecksetzen) => return Betriebsende::Neustart,
                    None => return Betriebsende::Beendet,
                },
                erkennung = verbindung.erkennungen.recv() => {
                    let ereignis = match erkennung {
                        Some(Ok(Erkennung::Zwischen(text))) => PipelineEreignis::Aeusserung(text),
                        Some(Ok(Erkennung::Final(text))) => {
                            self.replay.leeren();
                            PipelineEreignis::Transkription(text)
                        }
                        Some(Err(e)) => {
                            tracing::warn!(fehler = %e, "Transkriptions-Backend meldet Fehler");
                            return Betriebsende::Abgebrochen;
                        }
                        None => return Betriebsende::Abgebrochen,
                    };
                    if self.ereignisse.send(ereignis).await.is_err() {
                        return Betriebsende::Beendet;
                    }
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use parking_lot::Mutex;

    /// Gegenstelle einer Fake-Verbindung im Test
    struct Gegenstelle {
        audio: mpsc::Receiver<Bytes>,
        erkennungen: mpsc::Sender<PipelineResult<Erkennung>>,
    }

    /// Backend, das eine feste Anzahl Verbindungsversuche scheitern laesst
    struct FakeTranskription {
        fehlversuche: Mutex<u32>,
        versuche: Mutex<u32>,
        gegenstellen: mpsc::UnboundedSender<Gegenstelle>,
    }

    impl FakeTranskription {
        fn neu(fehlversuche: u32) -> (Arc<Self>, mpsc::UnboundedReceiver<Gegenstelle>) {
            let (tx, rx) = mpsc::unbounded_channel();
            let backend = Arc::new(Self {
                fehlversuche: Mutex::new(fehlversuche),
                versuche: Mutex::new(0),
                gegenstellen: tx,
            });
            (backend, rx)
        }

        fn fehlschlaege_setzen(&self, anzahl: u32) {
            *self.fehlversuche.lock() = anzahl;
        }
    }

    #[async_trait]
    impl Transkription for FakeTranskription {
        async fn verbinden(&self) -> PipelineResult<TranskriptionsVerbindung> {
            *self.versuche.lock() += 1;
            {
                let mut fehl = self.fehlversuche.lock();
                if *fehl > 0 {
                    *fehl -= 1;
                    return Err(PipelineError::Transkription("nicht erreichbar".into()));
                }
            }
            let (audio_tx, audio_rx) = mpsc::channel(64);
            let (erk_tx, erk_rx) = mpsc::channel(16);
            let _ = self.gegenstellen.send(Gegenstelle {
                audio: audio_rx,
                erkennungen: erk_tx,
            });
            Ok(TranskriptionsVerbindung {
                audio: audio_tx,
                erkennungen: erk_rx,
            })
        }
    }

    fn pipeline(
        backend: Arc<FakeTranskription>,
    ) -> (TranscriptionPipeline, mpsc::Receiver<PipelineEreignis>) {
        let (tx, rx) = mpsc::channel(16);
        let pipeline = TranscriptionPipeline::starten(backend, TranskriptionsConfig::default(), tx);
        (pipeline, rx)
    }

    #[tokio::test(start_paused = true)]
    async fn audio_weiterreichen_und_erkennungen_melden() {
        let (backend, mut gegenstellen) = FakeTranskription::neu(0);
        let (pipeline, mut rx) = pipeline(backend);
        let mut gegen = gegenstellen.recv().await.unwrap();

        pipeline.senden(Bytes::from_static(b"abc"));
        assert_eq!(gegen.audio.recv().await.unwrap().as_ref(), b"abc");

        gegen.erkennungen.send(Ok(Erkennung::Zwischen("Hal".into()))).await.unwrap();
        gegen.erkennungen.send(Ok(Erkennung::Final("Hallo".into()))).await.unwrap();
        assert_eq!(rx.recv().await, Some(PipelineEreignis::Aeusserung("Hal".into())));
        assert_eq!(rx.recv().await, Some(PipelineEreignis::Transkription("Hallo".into())));
    }

    #[tokio::test(start_paused = true)]
    async fn abbruch_verbindet_neu_und_spielt_audio_erneut_ab() {
        let (backend, mut gegenstellen) = FakeTranskription::neu(0);
        let (pipeline, _rx) = pipeline(Arc::clone(&backend));
        let mut erste = gegenstellen.recv().await.unwrap();

        pipeline.senden(Bytes::from_static(b"eins"));
        pipeline.senden(Bytes::from_static(b"zwei"));
        erste.audio.recv().await.unwrap();
        erste.audio.recv().await.unwrap();

        // Zwei Fehlversuche, dann klappt es innerhalb des Fensters
        backend.fehlschlaege_setzen(2);
        erste
            .erkennungen
            .send(Err(PipelineError::Transkription("Socket zu".into())))
            .await
            .unwrap();

        let mut zweite = gegenstellen.recv().await.unwrap();
        assert_eq!(zweite.audio.recv().await.unwrap().as_ref(), b"eins");
        assert_eq!(zweite.audio.recv().await.unwrap().as_ref(), b"zwei");
        assert_eq!(*backend.versuche.lock(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn finales_transkript_leert_replay() {
        let (backend, mut gegenstellen) = FakeTranskription::neu(0);
        let (pipeline, mut rx) = pipeline(backend);
        let mut erste = gegenstellen.recv().await.unwrap();

        pipeline.senden(Bytes::from_static(b"alt"));
        erste.audio.recv().await.unwrap();
        erste.erkennungen.send(Ok(Erkennung::Final("fertig".into()))).await.unwrap();
        rx.recv().await.unwrap();

        pipeline.senden(Bytes::from_static(b"neu"));
        erste.audio.recv().await.unwrap();
        drop(erste);

        let mut zweite = gegenstellen.recv().await.unwrap();
        assert_eq!(zweite.audio.recv().await.unwrap().as_ref(), b"neu");
    }

    #[tokio::test(start_paused = true)]
    async fn deaktiviert_nach_fenster_bis_zuruecksetzen() {
        let (backend, mut gegenstellen) = FakeTranskription::neu(u32::MAX);
        let (pipeline, _rx) = pipeline(Arc::clone(&backend));

        // Fenster von 5s verstreicht ohne Verbindung
        tokio::time::sleep(Duration::from_secs(10)).await;
        let versuche = *backend.versuche.lock();
        assert!(versuche > 1 && versuche < 20, "versuche = {versuche}");
        pipeline.senden(Bytes::from_static(b"verworfen"));
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(*backend.versuche.lock(), versuche);

        backend.fehlschlaege_setzen(0);
        pipeline.zuruecksetzen();
        let mut gegen = gegenstellen.recv().await.unwrap();

        // Audio aus der deaktivierten Phase wird nicht nachgespielt
        pipeline.senden(Bytes::from_static(b"frisch"));
        assert_eq!(gegen.audio.recv().await.unwrap().as_ref(), b"frisch");
    }

    #[test]
    fn replay_puffer_begrenzt_bytes() {
        let mut puffer = ReplayPuffer::neu(10);
        for _ in 0..4 {
            puffer.anhaengen(Bytes::from_static(b"abcd"));
        }
        assert_eq!(puffer.frames.len(), 2);
        assert_eq!(puffer.bytes, 8);
        puffer.leeren();
        assert_eq!(puffer.bytes, 0);
    }
}
