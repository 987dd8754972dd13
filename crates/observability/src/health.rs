//! Health-Check-Endpunkt fuer Parlor
//!
//! Endpoint: `GET /health`
//! Response: JSON mit Status, Version, Uptime und Anzahl laufender Gespraeche

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use crate::metrics::ParlorMetriken;

/// Status des Health-Checks
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Antwort des Health-Check-Endpunkts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_seconds: u64,
    pub active_sessions: i64,
    pub backends_configured: bool,
}

/// Geteilter Zustand fuer den Health-Check-Handler
#[derive(Clone)]
pub struct HealthState {
    pub start_time: Arc<Instant>,
    pub backends_bereit: Arc<AtomicBool>,
    metriken: ParlorMetriken,
}

impl HealthState {
    pub fn neu(metriken: ParlorMetriken) -> Self {
        Self {
            start_time: Arc::new(Instant::now()),
            backends_bereit: Arc::new(AtomicBool::new(true)),
            metriken,
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Laufende Gespraeche laut Session-Gauge
    pub fn aktive_sessions(&self) -> i64 {
        self.metriken.sessions_aktiv.get()
    }

    pub fn backends_konfiguriert(&self) -> bool {
        self.backends_bereit.load(Ordering::Relaxed)
    }

    /// Markiert fehlende Zugangsdaten fuer externe Dienste
    pub fn backend_status_setzen(&self, bereit: bool) {
        self.backends_bereit.store(bereit, Ordering::Relaxed);
    }

    pub fn antwort(&self) -> HealthResponse {
        let backends_configured = self.backends_konfiguriert();
        HealthResponse {
            status: if backends_configured {
                HealthStatus::Healthy
            } else {
                HealthStatus::Degraded
            },
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: self.uptime_seconds(),
            active_sessions: self.aktive_sessions(),
            backends_configured,
        }
    }
}

/// Axum-Router fuer den `/health`-Endpunkt
pub fn health_router(state: HealthState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .with_state(state)
}

/// `GET /health` – gibt den Serverstatus zurueck
async fn health_handler(State(state): State<HealthState>) -> impl IntoResponse {
    let response = state.antwort();
    let http_status = match response.status {
        // 200 auch bei degraded (Probe soll nicht failen)
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (http_status, Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> HealthState {
        HealthState::neu(ParlorMetriken::neu().unwrap())
    }

    #[test]
    fn health_state_frisch_erstellt() {
        let state = state();
        assert!(state.uptime_seconds() < 5);
        assert!(state.backends_konfiguriert());
        assert_eq!(state.aktive_sessions(), 0);
    }

    #[test]
    fn aktive_sessions_folgen_dem_gauge() {
        let metriken = ParlorMetriken::neu().unwrap();
        let state = HealthState::neu(metriken.clone());
        metriken.sessions_aktiv.set(3);
        assert_eq!(state.antwort().active_sessions, 3);
    }

    #[test]
    fn fehlende_backends_ergeben_degraded() {
        let state = state();
        state.backend_status_setzen(false);
        let antwort = state.antwort();
        assert_eq!(antwort.status, HealthStatus::Degraded);
        assert!(!antwort.backends_configured);
    }

    #[test]
    fn health_response_serialisierung() {
        let response = HealthResponse {
            status: HealthStatus::Healthy,
            version: "0.1.0".to_string(),
            uptime_seconds: 3600,
            active_sessions: 2,
            backends_configured: true,
        };

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"status\":\"healthy\""));
        assert!(json.contains("\"version\":\"0.1.0\""));
        assert!(json.contains("\"uptime_seconds\":3600"));
        assert!(json.contains("\"active_sessions\":2"));
    }

    #[test]
    fn health_response_deserialisierung() {
        let json = r#"{"status":"degraded","version":"0.1.0","uptime_seconds":100,"active_sessions":0,"backends_configured":false}"#;
        let response: HealthResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.status, HealthStatus::Degraded);
        assert_eq!(response.uptime_seconds, 100);
        assert!(!response.backends_configured);
    }
}
