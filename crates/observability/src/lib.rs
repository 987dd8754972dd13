//! # parlor-observability
//!
//! Observability-Crate fuer Parlor:
//! - Prometheus-kompatible Metriken (`/metrics`)
//! - Health-Check-Endpunkt (`/health`)
//! - Structured Logging via tracing-subscriber
//! - Request-Timing Middleware

pub mod health;
pub mod logging;
pub mod metrics;
pub mod middleware;

pub use health::{HealthResponse, HealthState, HealthStatus, health_router};
pub use logging::{
    filter_bauen, log_format_gueltig, logging_initialisieren, FilterFehler, LogFormat,
};
pub use metrics::{ParlorMetriken, metrics_router};
pub use middleware::{request_timing_layer, timing_middleware};

use axum::Router;

/// Router mit `/metrics` und `/health`, zum Einhaengen in den Haupt-Router
pub fn observability_router(metriken: ParlorMetriken, health: HealthState) -> Router {
    Router::new()
        .merge(metrics_router(metriken))
        .merge(health_router(health))
}
