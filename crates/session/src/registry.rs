//! Session-Registry – Verzeichnis aller laufenden Gespraeche
//!
//! Eintraege entstehen beim `start`-Ereignis und verschwinden mit `stop` oder
//! dem Schliessen des Sockets. Die Registry speist `/health`, den
//! Sessions-Gauge und die Admin-Routen.

use dashmap::DashMap;
use parlor_core::{CallSid, StreamSid};
use parlor_observability::ParlorMetriken;
use parlor_pipeline::TranscriptionPipeline;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

/// Eintrag einer laufenden Session
#[derive(Clone)]
pub struct SessionEintrag {
    pub call_sid: Option<CallSid>,
    pub anrufer: Option<String>,
    pub gestartet: Instant,
    /// Fuer das manuelle Zuruecksetzen einer deaktivierten Transkription
    pub transkription: Option<TranscriptionPipeline>,
}

impl SessionEintrag {
    pub fn neu(
        call_sid: Option<CallSid>,
        anrufer: Option<String>,
        transkription: Option<TranscriptionPipeline>,
    ) -> Self {
        Self {
            call_sid,
            anrufer,
            gestartet: Instant::now(),
            transkription,
        }
    }
}

/// Oeffentliche Sicht auf eine Session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub stream_sid: StreamSid,
    pub call_sid: Option<CallSid>,
    pub anrufer: Option<String>,
    pub dauer_sekunden: u64,
}

/// Prozessweites Verzeichnis der Sessions
///
/// Clone teilt den inneren Zustand.
#[derive(Clone)]
pub struct SessionRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    sessions: DashMap<StreamSid, SessionEintrag>,
    metriken: Option<ParlorMetriken>,
}

impl SessionRegistry {
    pub fn neu(metriken: Option<ParlorMetriken>) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                sessions: DashMap::new(),
                metriken,
            }),
        }
    }

    /// Traegt eine Session ein; ein erneuter `start` ersetzt den Eintrag
    pub fn anmelden(&self, stream_sid: StreamSid, eintrag: SessionEintrag) {
        let neu = self.inner.sessions.insert(stream_sid.clone(), eintrag).is_none();
        if neu {
            if let Some(m) = &self.inner.metriken {
                m.sessions_gesamt.inc();
                m.sessions_aktiv.inc();
            }
        }
        tracing::debug!(stream_sid = %stream_sid, neu, aktiv = self.anzahl(), "Session angemeldet");
    }

    /// Entfernt eine Session; unbekannte Kennungen werden ignoriert
    pub fn abmelden(&self, stream_sid: &StreamSid) {
        if let Some((_, eintrag)) = self.inner.sessions.remove(stream_sid) {
            if let Some(m) = &self.inner.metriken {
                m.sessions_aktiv.dec();
            }
            tracing::debug!(
                stream_sid = %stream_sid,
                dauer_sek = eintrag.gestartet.elapsed().as_secs(),
                "Session abgemeldet"
            );
        }
    }

    pub fn anzahl(&self) -> usize {
        self.inner.sessions.len()
    }

    pub fn enthaelt(&self, stream_sid: &StreamSid) -> bool {
        self.inner.sessions.contains_key(stream_sid)
    }

    /// Alle Sessions, sortiert nach Stream-Kennung
    pub fn liste(&self) -> Vec<SessionInfo> {
        let mut liste: Vec<SessionInfo> = self
            .inner
            .sessions
            .iter()
            .map(|e| SessionInfo {
                stream_sid: e.key().clone(),
                call_sid: e.call_sid.clone(),
                anrufer: e.anrufer.clone(),
                dauer_sekunden: e.gestartet.elapsed().as_secs(),
            })
            .collect();
        liste.sort_by(|a, b| a.stream_sid.as_str().cmp(b.stream_sid.as_str()));
        liste
    }

    /// Setzt die Transkription einer Session zurueck
    ///
    /// Gibt `false` zurueck, wenn die Session unbekannt ist oder noch keine
    /// Transkription laeuft.
    pub fn transkription_zuruecksetzen(&self, stream_sid: &StreamSid) -> bool {
        let Some(eintrag) = self.inner.sessions.get(stream_sid) else {
            return false;
        };
        match &eintrag.transkription {
            Some(transkription) => {
                tracing::info!(stream_sid = %stream_sid, "Transkription manuell zurueckgesetzt");
                transkription.zuruecksetzen();
                true
            }
            None => false,
        }
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::neu(None)
    }
}
