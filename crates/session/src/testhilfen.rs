//! Test-Backends fuer Controller- und Verbindungstests

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use parlor_pipeline::{
    Erkennung, ModellAnfrage, ModellEreignis, PipelineResult, Sprachmodell, Sprachsynthese,
    Transkription, TranskriptionsVerbindung, Werkzeugkasten,
};
use tokio::sync::mpsc;

use crate::controller::Dienste;

/// Antwortet auf jede Anfrage mit zwei Saetzen
pub(crate) struct ZweiSaetze {
    pub(crate) anfragen: Mutex<Vec<ModellAnfrage>>,
}

#[async_trait]
impl Sprachmodell for ZweiSaetze {
    async fn streamen(
        &self,
        anfrage: ModellAnfrage,
    ) -> PipelineResult<mpsc::Receiver<PipelineResult<ModellEreignis>>> {
        self.anfragen.lock().push(anfrage);
        let (tx, rx) = mpsc::channel(4);
        let _ = tx.try_send(Ok(ModellEreignis::Text("Gern. ".into())));
        let _ = tx.try_send(Ok(ModellEreignis::Text("Bis bald".into())));
        Ok(rx)
    }
}

/// Liefert den Text als "Audio" zurueck
pub(crate) struct EchoSynthese;

#[async_trait]
impl Sprachsynthese for EchoSynthese {
    async fn synthetisieren(&self, text: &str) -> PipelineResult<Bytes> {
        Ok(Bytes::from(text.as_bytes().to_vec()))
    }
}

type Gegenstelle = (mpsc::Receiver<Bytes>, mpsc::Sender<PipelineResult<Erkennung>>);

/// Haelt jede Verbindung offen, erkennt aber nie etwas
#[derive(Default)]
pub(crate) struct StilleTranskription {
    gegenstellen: Mutex<Vec<Gegenstelle>>,
}

#[async_trait]
impl Transkription for StilleTranskription {
    async fn verbinden(&self) -> PipelineResult<TranskriptionsVerbindung> {
        let (audio_tx, audio_rx) = mpsc::channel(64);
        let (erk_tx, erk_rx) = mpsc::channel(4);
        self.gegenstellen.lock().push((audio_rx, erk_tx));
        Ok(TranskriptionsVerbindung {
            audio: audio_tx,
            erkennungen: erk_rx,
        })
    }
}

pub(crate) fn dienste() -> (Dienste, Arc<ZweiSaetze>) {
    let modell = Arc::new(ZweiSaetze {
        anfragen: Mutex::new(Vec::new()),
    });
    let dienste = Dienste {
        sprachmodell: Arc::clone(&modell) as Arc<dyn Sprachmodell>,
        werkzeuge: Arc::new(Werkzeugkasten::neu()),
        synthese: Arc::new(EchoSynthese),
        transkription: Arc::new(StilleTranskription::default()),
    };
    (dienste, modell)
}

/// `start`-Ereignis wie vom Carrier, optional mit Startnachricht
pub(crate) fn start_json(stream_sid: &str, erste_nachricht: Option<&str>) -> String {
    let parameter = match erste_nachricht {
        Some(text) => format!(r#"{{"firstMessage":"{text}","callerNumber":"+4930123"}}"#),
        None => "{}".to_string(),
    };
    format!(
        r#"{{"event":"start","sequenceNumber":"1","start":{{"streamSid":"{stream_sid}","callSid":"CA1","customParameters":{parameter}}},"streamSid":"{stream_sid}"}}"#
    )
}
