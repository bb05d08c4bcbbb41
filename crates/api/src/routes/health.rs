//! Health check endpoint.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;

use herald_notifier::correlation::CorrelationStore;

use crate::state::AppState;

/// Key probed to confirm the correlation store answers.
const PROBE_KEY: &str = "apns:health";

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}

/// GET /health: service liveness plus a correlation store round-trip.
async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let (status, store) = match state.store.exists(PROBE_KEY).await {
        Ok(_) => (StatusCode::OK, "ok"),
        Err(e) => {
            tracing::error!(error = %e, "Correlation store health probe failed");
            (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
        }
    };

    (
        status,
        Json(json!({
            "status": if status == StatusCode::OK { "ok" } else { "degraded" },
            "service": "herald-api",
            "version": env!("CARGO_PKG_VERSION"),
            "correlation_store": store,
        })),
    )
}
