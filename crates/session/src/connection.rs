//! Medien-Verbindung – eine WebSocket-Verbindung des Carriers
//!
//! Jede Verbindung besitzt genau einen [`SessionController`]. Die
//! Hauptschleife wartet gleichzeitig auf:
//! - Nachrichten des Carriers (start/media/mark/stop)
//! - Ereignisse der Pipeline-Komponenten
//! - die naechste Frist des Luecken-Timeouts
//!
//! und schreibt alle daraus entstehenden Nachrichten in Reihenfolge zurueck.

use std::fmt::Display;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{future, Sink, SinkExt, Stream, StreamExt};
use parlor_core::StreamSid;
use parlor_observability::ParlorMetriken;
use parlor_protocol::{AusgehendeNachricht, EingehendeNachricht};
use tokio::time::Instant;

use crate::controller::{Dienste, SessionController, SessionEinstellungen};
use crate::error::{SessionError, SessionResult};
use crate::registry::{SessionEintrag, SessionRegistry};

/// Gemeinsamer Zustand aller Medien-Verbindungen
#[derive(Clone)]
pub struct SessionState {
    pub dienste: Dienste,
    pub einstellungen: Arc<SessionEinstellungen>,
    pub registry: SessionRegistry,
    pub metriken: Option<ParlorMetriken>,
}

/// Bedient eine einzelne Carrier-Verbindung
pub struct MediaVerbindung {
    state: SessionState,
    peer: String,
}

impl MediaVerbindung {
    pub fn neu(state: SessionState, peer: impl Into<String>) -> Self {
        Self {
            state,
            peer: peer.into(),
        }
    }

    /// Bedient einen axum-WebSocket bis zum Ende der Session
    pub async fn websocket_bedienen(self, socket: WebSocket) {
        let (sender, empfaenger) = socket.split();

        let eingang = empfaenger
            .take_while(|frame| future::ready(!matches!(frame, Ok(Message::Close(_)))))
            .filter_map(|frame| {
                future::ready(match frame {
                    Ok(Message::Text(text)) => Some(Ok(text)),
                    // Binary, Ping, Pong: der Carrier spricht nur JSON-Text
                    Ok(_) => None,
                    Err(e) => Some(Err(SessionError::WebSocket(e.to_string()))),
                })
            });
        let ausgang =
            sender.with(|text: String| future::ready(Ok::<_, axum::Error>(Message::Text(text))));

        self.verarbeiten(eingang, ausgang).await;
    }

    /// Hauptschleife der Session
    ///
    /// `eingang` liefert die Textnachrichten des Carriers, `ausgang` nimmt
    /// die serialisierten Antworten entgegen.
    pub async fn verarbeiten<E, A>(self, eingang: E, ausgang: A)
    where
        E: Stream<Item = SessionResult<String>>,
        A: Sink<String>,
        A::Error: Display,
    {
        futures_util::pin_mut!(eingang);
        futures_util::pin_mut!(ausgang);

        let (mut controller, mut ereignisse) = SessionController::neu(
            self.state.dienste.clone(),
            Arc::clone(&self.state.einstellungen),
            self.state.metriken.clone(),
        );
        let mut angemeldet: Option<StreamSid> = None;

        tracing::info!(peer = %self.peer, "Neue Medien-Verbindung");

        loop {
            let frist = controller.naechste_frist();

            let nachrichten = tokio::select! {
                // Nachricht vom Carrier
                eingehend = eingang.next() => match eingehend {
                    Some(Ok(text)) => match EingehendeNachricht::parsen(&text) {
                        Ok(nachricht) => {
                            let ist_start = matches!(nachricht, EingehendeNachricht::Start { .. });
                            let nachrichten = controller.nachricht_verarbeiten(nachricht);
                            if ist_start {
                                self.anmelden(&controller, &mut angemeldet);
                            }
                            nachrichten
                        }
                        Err(e) => {
                            tracing::debug!(peer = %self.peer, fehler = %e, "Ungueltige Nachricht ignoriert");
                            continue;
                        }
                    },
                    Some(Err(e)) => {
                        tracing::warn!(peer = %self.peer, fehler = %e, "Lesefehler");
                        break;
                    }
                    None => {
                        tracing::info!(peer = %self.peer, "Verbindung vom Carrier getrennt");
                        break;
                    }
                },

                // Ergebnis einer Pipeline-Komponente
                Some(ereignis) = ereignisse.recv() => controller.ereignis_verarbeiten(ereignis),

                // Luecken-Timeout im Multiplexer
                _ = frist_abwarten(frist) => controller.fristen_pruefen(Instant::now()),
            };

            if let Err(e) = nachrichten_senden(&mut ausgang, nachrichten).await {
                tracing::warn!(peer = %self.peer, fehler = %e, "Senden fehlgeschlagen");
                break;
            }

            if controller.ist_beendet() {
                break;
            }
        }

        // Cleanup beim Verbindungsende
        if let Some(stream_sid) = angemeldet {
            self.state.registry.abmelden(&stream_sid);
        }
        tracing::info!(
            peer = %self.peer,
            stream_sid = ?controller.stream_sid(),
            statistik = ?controller.multiplexer_statistik(),
            "Medien-Verbindung beendet"
        );
    }

    /// Traegt die Session nach `start` in die Registry ein
    fn anmelden(&self, controller: &SessionController, angemeldet: &mut Option<StreamSid>) {
        let Some(stream_sid) = controller.stream_sid().cloned() else {
            return;
        };
        if let Some(alt) = angemeldet.take() {
            if alt != stream_sid {
                self.state.registry.abmelden(&alt);
            }
        }
        let eintrag = SessionEintrag::neu(
            controller.call_sid().cloned(),
            controller.anrufer().map(str::to_string),
            controller.transkription().cloned(),
        );
        self.state.registry.anmelden(stream_sid.clone(), eintrag);
        *angemeldet = Some(stream_sid);
    }
}

/// Wartet bis zur Frist; ohne Frist nie
async fn frist_abwarten(frist: Option<Instant>) {
    match frist {
        Some(frist) => tokio::time::sleep_until(frist).await,
        None => future::pending().await,
    }
}

/// Serialisiert und sendet alle Nachrichten, dann ein Flush
async fn nachrichten_senden<S>(ausgang: &mut S, nachrichten: Vec<AusgehendeNachricht>) -> SessionResult<()>
where
    S: Sink<String> + Unpin,
    S::Error: Display,
{
    if nachrichten.is_empty() {
        return Ok(());
    }
    for nachricht in nachrichten {
        let json = nachricht.zu_json()?;
        ausgang
            .feed(json)
            .await
            .map_err(|e| SessionError::WebSocket(e.to_string()))?;
    }
    ausgang
        .flush()
        .await
        .map_err(|e| SessionError::WebSocket(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testhilfen::{dienste, start_json};
    use futures_util::{sink, stream};
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn state(metriken: Option<ParlorMetriken>) -> SessionState {
        let (dienste, _modell) = dienste();
        SessionState {
            dienste,
            einstellungen: Arc::new(SessionEinstellungen::default()),
            registry: SessionRegistry::neu(metriken.clone()),
            metriken,
        }
    }

    fn eingang(
        nachrichten: Vec<String>,
    ) -> impl Stream<Item = SessionResult<String>> {
        stream::iter(nachrichten.into_iter().map(Ok)).chain(stream::pending())
    }

    /// Ausgang, der jede gesendete Nachricht in einen Kanal legt
    fn ausgang() -> (
        impl Sink<String, Error = mpsc::error::SendError<String>>,
        mpsc::UnboundedReceiver<String>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let ausgang = sink::unfold(tx, |tx, text: String| async move {
            tx.send(text).map(|()| tx)
        });
        (ausgang, rx)
    }

    fn gesendet(rx: &mut mpsc::UnboundedReceiver<String>) -> Vec<String> {
        let mut nachrichten = Vec::new();
        while let Ok(text) = rx.try_recv() {
            nachrichten.push(text);
        }
        nachrichten
    }

    #[tokio::test(start_paused = true)]
    async fn begruessung_wird_als_json_gesendet() {
        let state = state(None);
        let registry = state.registry.clone();
        let (ausgang, mut rx) = ausgang();

        let verbindung = MediaVerbindung::neu(state, "test");
        let nachrichten = vec![
            r#"{"event":"connected","protocol":"Call","version":"1.0.0"}"#.to_string(),
            "kein json".to_string(),
            start_json("MZ7", None),
        ];
        // Ohne stop laeuft die Session weiter, bis das Zeitlimit greift
        let _ = tokio::time::timeout(
            Duration::from_secs(1),
            verbindung.verarbeiten(eingang(nachrichten), ausgang),
        )
        .await;

        let ausgang = gesendet(&mut rx);
        assert_eq!(ausgang.len(), 2);
        let media: serde_json::Value = serde_json::from_str(&ausgang[0]).unwrap();
        assert_eq!(media["event"], "media");
        assert_eq!(media["streamSid"], "MZ7");
        let mark: serde_json::Value = serde_json::from_str(&ausgang[1]).unwrap();
        assert_eq!(mark["event"], "mark");
        assert_eq!(mark["mark"]["name"], "0");
        assert!(registry.enthaelt(&StreamSid::from("MZ7")));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_meldet_session_ab() {
        let metriken = ParlorMetriken::neu().unwrap();
        let state = state(Some(metriken.clone()));
        let registry = state.registry.clone();
        let (ausgang, _rx) = ausgang();

        let nachrichten = vec![
            start_json("MZ8", Some("Hallo")),
            r#"{"event":"stop","streamSid":"MZ8"}"#.to_string(),
        ];
        tokio::time::timeout(
            Duration::from_secs(1),
            MediaVerbindung::neu(state, "test").verarbeiten(eingang(nachrichten), ausgang),
        )
        .await
        .unwrap();

        assert_eq!(registry.anzahl(), 0);
        assert_eq!(metriken.sessions_gesamt.get(), 1);
        assert_eq!(metriken.sessions_aktiv.get(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn lesefehler_beendet_die_session() {
        let state = state(None);
        let registry = state.registry.clone();
        let (ausgang, _rx) = ausgang();

        let eingang = stream::iter(vec![
            Ok(start_json("MZ9", None)),
            Err(SessionError::VerbindungGetrennt),
        ]);
        tokio::time::timeout(
            Duration::from_secs(1),
            MediaVerbindung::neu(state, "test").verarbeiten(eingang, ausgang),
        )
        .await
        .unwrap();

        assert_eq!(registry.anzahl(), 0);
    }
}
