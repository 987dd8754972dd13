//! Prometheus-kompatible Metriken fuer Parlor
//!
//! Registrierte Metriken:
//! - `parlor_sessions_active` – Gauge: Aktuell laufende Gespraeche
//! - `parlor_sessions_total` – Counter: Gestartete Gespraeche
//! - `parlor_interrupts_total` – Counter: Ausgeloeste Unterbrechungen (Barge-in)
//! - `parlor_chunks_emitted_total` – Counter: An den Carrier gesendete Audio-Chunks
//! - `parlor_gaps_skipped_total` – Counter: Uebersprungene fehlende Indizes
//! - `parlor_synthesis_failures_total` – Counter: Fehlgeschlagene Synthesen
//! - `parlor_response_fragments_total` – Counter: Erzeugte Antwort-Fragmente
//! - `parlor_http_requests_total` – Counter: HTTP-Anfragen (method, path, status)
//! - `parlor_http_request_duration_seconds` – Histogram: HTTP-Antwortzeit

use anyhow::Result;
use axum::{extract::State, response::IntoResponse, routing::get, Router};
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;

/// Alle Parlor-Prometheus-Metriken
#[derive(Clone)]
pub struct ParlorMetriken {
    pub registry: Arc<Registry>,

    // Session-Metriken
    pub sessions_aktiv: IntGauge,
    pub sessions_gesamt: IntCounter,
    pub unterbrechungen_gesamt: IntCounter,

    // Pipeline-Metriken
    pub chunks_gesendet_gesamt: IntCounter,
    pub luecken_uebersprungen_gesamt: IntCounter,
    pub synthese_ausfaelle_gesamt: IntCounter,
    pub fragmente_gesamt: IntCounter,

    // HTTP-Metriken
    pub http_requests_total: IntCounterVec,
    pub http_request_duration_seconds: HistogramVec,
}

impl ParlorMetriken {
    /// Erstellt und registriert alle Metriken in einer neuen Registry
    pub fn neu() -> Result<Self> {
        let registry = Registry::new();

        // --- Session-Metriken ---
        let sessions_aktiv = IntGauge::with_opts(Opts::new(
            "parlor_sessions_active",
            "Anzahl aktuell laufender Gespraeche",
        ))?;
        registry.register(Box::new(sessions_aktiv.clone()))?;

        let sessions_gesamt = zaehler(
            &registry,
            "parlor_sessions_total",
            "Gesamtanzahl gestarteter Gespraeche",
        )?;
        let unterbrechungen_gesamt = zaehler(
            &registry,
            "parlor_interrupts_total",
            "Gesamtanzahl ausgeloester Unterbrechungen",
        )?;

        // --- Pipeline-Metriken ---
        let chunks_gesendet_gesamt = zaehler(
            &registry,
            "parlor_chunks_emitted_total",
            "Gesamtanzahl gesendeter Audio-Chunks",
        )?;
        let luecken_uebersprungen_gesamt = zaehler(
            &registry,
            "parlor_gaps_skipped_total",
            "Gesamtanzahl uebersprungener Sequenz-Indizes",
        )?;
        let synthese_ausfaelle_gesamt = zaehler(
            &registry,
            "parlor_synthesis_failures_total",
            "Gesamtanzahl fehlgeschlagener Synthesen",
        )?;
        let fragmente_gesamt = zaehler(
            &registry,
            "parlor_response_fragments_total",
            "Gesamtanzahl erzeugter Antwort-Fragmente",
        )?;

        // --- HTTP-Metriken ---
        let http_requests_total = IntCounterVec::new(
            Opts::new("parlor_http_requests_total", "Gesamtanzahl HTTP-Anfragen"),
            &["method", "path", "status"],
        )?;
        registry.register(Box::new(http_requests_total.clone()))?;

        let http_request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "parlor_http_request_duration_seconds",
                "HTTP-Antwortzeit in Sekunden",
            )
            .buckets(vec![
                0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5,
            ]),
            &["method", "path"],
        )?;
        registry.register(Box::new(http_request_duration_seconds.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            sessions_aktiv,
            sessions_gesamt,
            unterbrechungen_gesamt,
            chunks_gesendet_gesamt,
            luecken_uebersprungen_gesamt,
            synthese_ausfaelle_gesamt,
            fragmente_gesamt,
            http_requests_total,
            http_request_duration_seconds,
        })
    }

    /// Exportiert alle Metriken im Prometheus-Textformat
    pub fn exportieren(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

fn zaehler(registry: &Registry, name: &str, hilfe: &str) -> Result<IntCounter> {
    let zaehler = IntCounter::with_opts(Opts::new(name, hilfe))?;
    registry.register(Box::new(zaehler.clone()))?;
    Ok(zaehler)
}

/// Axum-Router fuer den `/metrics`-Endpunkt
pub fn metrics_router(metriken: ParlorMetriken) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metriken)
}

async fn metrics_handler(State(metriken): State<ParlorMetriken>) -> impl IntoResponse {
    match metriken.exportieren() {
        Ok(text) => (
            axum::http::StatusCode::OK,
            [(
                axum::http::header::CONTENT_TYPE,
                "text/plain; version=0.0.4",
            )],
            text,
        )
            .into_response(),
        Err(err) => {
            tracing::error!("Metriken-Export fehlgeschlagen: {err}");
            axum::http::StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metriken_erstellen_erfolgreich() {
        let metriken = ParlorMetriken::neu().unwrap();
        assert!(!metriken.registry.gather().is_empty());
    }

    #[test]
    fn gauge_aktive_sessions_setzen() {
        let metriken = ParlorMetriken::neu().unwrap();
        metriken.sessions_aktiv.inc();
        metriken.sessions_aktiv.inc();
        metriken.sessions_aktiv.dec();
        assert_eq!(metriken.sessions_aktiv.get(), 1);
    }

    #[test]
    fn zwei_instanzen_sind_unabhaengig() {
        let a = ParlorMetriken::neu().unwrap();
        let b = ParlorMetriken::neu().unwrap();
        a.unterbrechungen_gesamt.inc_by(3);
        assert_eq!(a.unterbrechungen_gesamt.get(), 3);
        assert_eq!(b.unterbrechungen_gesamt.get(), 0);
    }

    #[test]
    fn http_counter_mit_labels() {
        let metriken = ParlorMetriken::neu().unwrap();
        metriken
            .http_requests_total
            .with_label_values(&["POST", "/incoming", "200"])
            .inc();
        let wert = metriken
            .http_requests_total
            .with_label_values(&["POST", "/incoming", "200"])
            .get();
        assert_eq!(wert, 1);
    }

    #[test]
    fn metriken_export_prometheus_format() {
        let metriken = ParlorMetriken::neu().unwrap();
        metriken.sessions_aktiv.set(2);
        metriken.chunks_gesendet_gesamt.inc();

        let output = metriken.exportieren().unwrap();
        assert!(output.contains("parlor_sessions_active 2"));
        assert!(output.contains("parlor_chunks_emitted_total 1"));
        assert!(output.contains("# HELP"));
        assert!(output.contains("# TYPE"));
    }

    #[test]
    fn alle_metriken_in_registry_registriert() {
        let metriken = ParlorMetriken::neu().unwrap();

        // Vec-Metriken erscheinen in gather() erst nach dem ersten Label-Zugriff
        metriken
            .http_requests_total
            .with_label_values(&["GET", "/health", "200"])
            .inc();
        metriken
            .http_request_duration_seconds
            .with_label_values(&["GET", "/health"])
            .observe(0.01);

        let families = metriken.registry.gather();
        let namen: Vec<&str> = families.iter().map(|f| f.get_name()).collect();

        for erwartet in [
            "parlor_sessions_active",
            "parlor_sessions_total",
            "parlor_interrupts_total",
            "parlor_chunks_emitted_total",
            "parlor_gaps_skipped_total",
            "parlor_synthesis_failures_total",
            "parlor_response_fragments_total",
            "parlor_http_requests_total",
            "parlor_http_request_duration_seconds",
        ] {
            assert!(namen.contains(&erwartet), "{erwartet} fehlt");
        }
    }
}
