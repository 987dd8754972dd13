//! parlor-server – Bibliotheks-Root
//!
//! Deklariert alle Server-Module und stellt den oeffentlichen Einstiegspunkt
//! fuer Integrationstests bereit.

pub mod config;
pub mod routes;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use config::ServerConfig;
use parlor_backends::{HttpSynthese, OpenAiChat, RestAnrufInitiator, SegmentTranskription};
use parlor_core::AnrufInitiator;
use parlor_observability::{
    observability_router, request_timing_layer, timing_middleware, HealthState, ParlorMetriken,
};
use parlor_pipeline::Werkzeugkasten;
use parlor_session::{Dienste, SessionRegistry, SessionState};
use routes::AppState;

/// Haelt den laufenden Server-Zustand zusammen
pub struct Server {
    pub config: ServerConfig,
}

impl Server {
    /// Erstellt einen neuen Server aus der gegebenen Konfiguration
    pub fn neu(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Startet den HTTP-Server und laeuft bis zum Shutdown-Signal
    ///
    /// Reihenfolge:
    /// 1. Metriken und Session-Registry anlegen
    /// 2. Backends aus der Konfiguration bauen
    /// 3. Router zusammensetzen
    /// 4. Listener binden, bis Ctrl-C bedienen
    pub async fn starten(self) -> Result<()> {
        let metriken = ParlorMetriken::neu()?;
        let health = HealthState::neu(metriken.clone());

        let fehlend = fehlende_zugangsdaten(&self.config);
        if !fehlend.is_empty() {
            tracing::warn!(
                fehlend = ?fehlend,
                "Zugangsdaten fehlen, betroffene Dienste werden fehlschlagen"
            );
        }
        health.backend_status_setzen(fehlend.is_empty());

        let anrufe: Arc<dyn AnrufInitiator> =
            Arc::new(RestAnrufInitiator::neu(self.config.carrier_config()));
        let session = SessionState {
            dienste: dienste_aufbauen(&self.config),
            einstellungen: Arc::new(self.config.session_einstellungen()),
            registry: SessionRegistry::neu(Some(metriken.clone())),
            metriken: Some(metriken.clone()),
        };

        let adresse = self.config.bind_adresse();
        let state = AppState {
            config: Arc::new(self.config),
            session,
            anrufe,
        };
        let app = app_aufbauen(state, metriken, health);

        let listener = tokio::net::TcpListener::bind(&adresse)
            .await
            .with_context(|| format!("Bind auf {adresse} fehlgeschlagen"))?;
        tracing::info!(adresse = %adresse, "Parlor lauscht");

        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await?;

        tracing::info!("Server beendet");
        Ok(())
    }
}

/// Baut die Backend-Adapter fuer neue Sessions
pub fn dienste_aufbauen(config: &ServerConfig) -> Dienste {
    Dienste {
        sprachmodell: Arc::new(OpenAiChat::neu(config.chat_config())),
        werkzeuge: Arc::new(Werkzeugkasten::neu()),
        synthese: Arc::new(HttpSynthese::neu(config.synthese_config())),
        transkription: Arc::new(SegmentTranskription::neu(config.transkriptions_config())),
    }
}

/// Setzt Anruf-, Admin- und Observability-Routen zu einem Router zusammen
pub fn app_aufbauen(state: AppState, metriken: ParlorMetriken, health: HealthState) -> Router {
    let observability = state.config.observability.clone();

    let mut app = routes::router(observability.admin_routen).with_state(state);
    if observability.aktiviert {
        app = app.merge(observability_router(metriken.clone(), health));
    }
    app.route_layer(axum::middleware::from_fn_with_state(
        metriken,
        timing_middleware,
    ))
    .layer(request_timing_layer())
}

/// Namen der Umgebungsvariablen, deren Geheimnis fehlt
fn fehlende_zugangsdaten(config: &ServerConfig) -> Vec<String> {
    [
        &config.sprachmodell.api_key_env,
        &config.synthese.api_key_env,
        &config.transkription.api_key_env,
        &config.carrier.auth_token_env,
    ]
    .into_iter()
    .filter(|variable| config::geheimnis_lesen(variable).is_none())
    .cloned()
    .collect()
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(fehler = %e, "Ctrl-C-Handler nicht verfuegbar");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown-Signal empfangen, Server wird beendet");
}

#[cfg(test)]
mod tests {
    use super::*;
    use parlor_session::SessionEinstellungen;

    fn state(config: ServerConfig) -> AppState {
        let config = Arc::new(config);
        AppState {
            session: SessionState {
                dienste: dienste_aufbauen(&config),
                einstellungen: Arc::new(SessionEinstellungen::default()),
                registry: SessionRegistry::default(),
                metriken: None,
            },
            anrufe: Arc::new(RestAnrufInitiator::neu(config.carrier_config())),
            config,
        }
    }

    async fn antwort(app: Router, pfad: &str) -> (u16, String) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let adresse = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            .unwrap();
        });

        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        let mut stream = tokio::net::TcpStream::connect(adresse).await.unwrap();
        let anfrage = format!("GET {pfad} HTTP/1.1\r\nHost: test\r\nConnection: close\r\n\r\n");
        stream.write_all(anfrage.as_bytes()).await.unwrap();
        let mut roh = String::new();
        stream.read_to_string(&mut roh).await.unwrap();

        let status = roh
            .split_whitespace()
            .nth(1)
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);
        (status, roh)
    }

    #[tokio::test]
    async fn health_und_metrics_sind_eingehaengt() {
        let metriken = ParlorMetriken::neu().unwrap();
        let health = HealthState::neu(metriken.clone());
        let app = app_aufbauen(state(ServerConfig::default()), metriken.clone(), health);

        let (status, roh) = antwort(app.clone(), "/health").await;
        assert_eq!(status, 200);
        assert!(roh.contains("\"active_sessions\":0"));

        let (status, roh) = antwort(app, "/metrics").await;
        assert_eq!(status, 200);
        assert!(roh.contains("parlor_sessions_active"));
        assert!(metriken.exportieren().unwrap().contains("path=\"/health\""));
    }

    #[tokio::test]
    async fn admin_routen_lassen_sich_abschalten() {
        let mut config = ServerConfig::default();
        config.observability.admin_routen = false;
        let metriken = ParlorMetriken::neu().unwrap();
        let health = HealthState::neu(metriken.clone());
        let app = app_aufbauen(state(config), metriken, health);

        let (status, _) = antwort(app, "/sessions").await;
        assert_eq!(status, 404);
    }

    #[tokio::test]
    async fn sessions_liste_ist_leer() {
        let metriken = ParlorMetriken::neu().unwrap();
        let health = HealthState::neu(metriken.clone());
        let app = app_aufbauen(state(ServerConfig::default()), metriken, health);

        let (status, roh) = antwort(app, "/sessions").await;
        assert_eq!(status, 200);
        assert!(roh.ends_with("[]"));
    }

    #[test]
    fn fehlende_zugangsdaten_werden_gemeldet() {
        let mut config = ServerConfig::default();
        config.sprachmodell.api_key_env = "PARLOR_TEST_FEHLT_LLM".into();
        config.synthese.api_key_env = "PARLOR_TEST_FEHLT_TTS".into();
        config.transkription.api_key_env = "PARLOR_TEST_FEHLT_STT".into();
        config.carrier.auth_token_env = "PARLOR_TEST_VORHANDEN".into();
        std::env::set_var("PARLOR_TEST_VORHANDEN", "token");

        let fehlend = fehlende_zugangsdaten(&config);
        assert_eq!(
            fehlend,
            vec![
                "PARLOR_TEST_FEHLT_LLM".to_string(),
                "PARLOR_TEST_FEHLT_TTS".to_string(),
                "PARLOR_TEST_FEHLT_STT".to_string(),
            ]
        );
        std::env::remove_var("PARLOR_TEST_VORHANDEN");
    }
}
