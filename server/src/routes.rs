//! HTTP-Oberflaeche des Servers
//!
//! - `POST /incoming` – Anweisungsdokument fuer eingehende Anrufe
//! - `/outgoing-call-twiml` – Anweisungsdokument fuer ausgehende Anrufe
//! - `POST /outgoing-call` – startet einen ausgehenden Anruf beim Carrier
//! - `GET /connection` – WebSocket des Carrier-Medien-Streams
//! - `/sessions/...` – Admin-Routen ueber die Session-Registry

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Path, Query, State, WebSocketUpgrade},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{any, get, post},
    Router,
};
use parlor_core::{AnrufInitiator, StreamSid};
use parlor_protocol::StreamAnweisung;
use parlor_session::{MediaVerbindung, SessionState};
use serde::Deserialize;
use serde_json::json;

use crate::config::ServerConfig;

/// Startnachricht, wenn `/outgoing-call-twiml` keine mitbekommt
pub const STANDARD_ERSTE_NACHRICHT: &str = "Hi, how are you?";
/// Anrufer, wenn `/outgoing-call-twiml` keine Nummer mitbekommt
pub const UNBEKANNTE_NUMMER: &str = "Unknown";

/// Axum-State aller Routen
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub session: SessionState,
    pub anrufe: Arc<dyn AnrufInitiator>,
}

/// Erstellt den Router mit allen Anruf- und Admin-Routen
pub fn router(admin_routen: bool) -> Router<AppState> {
    let router = Router::new()
        .route("/incoming", post(incoming))
        .route("/outgoing-call-twiml", any(outgoing_call_twiml))
        .route("/outgoing-call", post(outgoing_call))
        .route("/connection", get(connection));

    if !admin_routen {
        return router;
    }
    router
        .route("/sessions", get(list_sessions))
        .route(
            "/sessions/:stream_sid/transkription/reset",
            post(reset_transkription),
        )
}

// ---------------------------------------------------------------------------
// Anweisungsdokumente
// ---------------------------------------------------------------------------

pub async fn incoming(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let Some(host) = oeffentlicher_host(&state.config, &headers) else {
        return host_fehlt();
    };
    tracing::info!(host = %host, "Eingehender Anruf");
    xml_antwort(StreamAnweisung::neu(format!("wss://{host}/connection")).als_xml())
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnweisungsParameter {
    pub first_message: Option<String>,
    pub number: Option<String>,
}

pub async fn outgoing_call_twiml(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(parameter): Query<AnweisungsParameter>,
) -> Response {
    let Some(host) = oeffentlicher_host(&state.config, &headers) else {
        return host_fehlt();
    };
    let erste_nachricht = parameter
        .first_message
        .unwrap_or_else(|| STANDARD_ERSTE_NACHRICHT.to_string());
    let nummer = parameter
        .number
        .unwrap_or_else(|| UNBEKANNTE_NUMMER.to_string());

    let anweisung = StreamAnweisung::neu(format!("wss://{host}/connection"))
        .parameter("firstMessage", erste_nachricht)
        .parameter("callerNumber", nummer);
    xml_antwort(anweisung.als_xml())
}

// ---------------------------------------------------------------------------
// Ausgehende Anrufe
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnrufBody {
    pub number: String,
    #[serde(default)]
    pub first_message: Option<String>,
}

pub async fn outgoing_call(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<AnrufBody>,
) -> Response {
    let Some(host) = oeffentlicher_host(&state.config, &headers) else {
        return host_fehlt();
    };

    let mut parameter = Vec::with_capacity(2);
    if let Some(text) = &body.first_message {
        parameter.push(("firstMessage", text.as_str()));
    }
    parameter.push(("number", body.number.as_str()));

    let anweisungs_url = match reqwest::Url::parse_with_params(
        &format!("https://{host}/outgoing-call-twiml"),
        &parameter,
    ) {
        Ok(url) => url,
        Err(e) => {
            tracing::warn!(host = %host, fehler = %e, "Anweisungs-URL ungueltig");
            return anruf_fehlgeschlagen();
        }
    };

    match state
        .anrufe
        .anruf_starten(&body.number, anweisungs_url.as_str())
        .await
    {
        Ok(call_sid) => {
            tracing::info!(ziel = %body.number, call_sid = %call_sid, "Ausgehender Anruf gestartet");
            (
                StatusCode::OK,
                Json(json!({ "message": "Call initiated", "callSid": call_sid })),
            )
                .into_response()
        }
        Err(e) => {
            tracing::warn!(ziel = %body.number, fehler = %e, "Ausgehender Anruf fehlgeschlagen");
            anruf_fehlgeschlagen()
        }
    }
}

// ---------------------------------------------------------------------------
// Medien-Stream
// ---------------------------------------------------------------------------

pub async fn connection(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| {
        MediaVerbindung::neu(state.session, peer.to_string()).websocket_bedienen(socket)
    })
}

// ---------------------------------------------------------------------------
// Admin
// ---------------------------------------------------------------------------

pub async fn list_sessions(State(state): State<AppState>) -> Response {
    (StatusCode::OK, Json(state.session.registry.liste())).into_response()
}

pub async fn reset_transkription(
    State(state): State<AppState>,
    Path(stream_sid): Path<String>,
) -> Response {
    let stream_sid = StreamSid(stream_sid);
    if state.session.registry.transkription_zuruecksetzen(&stream_sid) {
        StatusCode::NO_CONTENT.into_response()
    } else {
        (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("Keine Transkription fuer Session '{stream_sid}'") })),
        )
            .into_response()
    }
}

// ---------------------------------------------------------------------------
// Hilfsfunktionen
// ---------------------------------------------------------------------------

/// Konfigurierter Host, sonst der `Host`-Header der Anfrage
fn oeffentlicher_host(config: &ServerConfig, headers: &HeaderMap) -> Option<String> {
    if !config.server.oeffentlicher_host.is_empty() {
        return Some(config.server.oeffentlicher_host.clone());
    }
    headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .map(str::to_string)
}

fn xml_antwort(xml: String) -> Response {
    (StatusCode::OK, [(header::CONTENT_TYPE, "text/xml")], xml).into_response()
}

fn host_fehlt() -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": "Host header missing" })),
    )
        .into_response()
}

fn anruf_fehlgeschlagen() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "Failed to initiate call" })),
    )
        .into_response()
}
