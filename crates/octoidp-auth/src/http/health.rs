//! Liveness endpoint.

use axum::{Json, extract::State, response::IntoResponse};
use serde_json::json;

use super::IdpState;

/// Handler for `GET /health`.
///
/// Always 200 while the process serves requests. `status` is `degraded`
/// when a connector is unhealthy or no signing key is installed yet.
pub async fn health_handler(State(state): State<IdpState>) -> impl IntoResponse {
    let server = &state.server;
    let connectors = server.connectors().health_report();
    let signing = server.keys().active_signer().is_ok();

    let status = if signing && connectors.values().all(|h| h.healthy) {
        "ok"
    } else {
        "degraded"
    };

    Json(json!({
        "status": status,
        "signing_key": signing,
        "connectors": connectors,
    }))
}
