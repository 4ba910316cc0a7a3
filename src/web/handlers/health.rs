//! Liveness endpoint.

use crate::web::state::AppState;
use axum::extract::State;
use axum::Json;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub near_capacity: bool,
    pub connection_available: bool,
    pub fallback_mode: bool,
}

/// `GET /health` — degraded connection state is reported but does not
/// make the service unhealthy; exception processing continues in
/// fallback mode.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "UP",
        near_capacity: state.admission.is_system_near_capacity(),
        connection_available: state.connection.is_connection_available().await,
        fallback_mode: state.connection.is_fallback_mode(),
    })
}
