//! Connection manager surface.

use crate::client::ConnectionStatus;
use crate::web::errors::ApiResult;
use crate::web::state::AppState;
use axum::extract::State;
use axum::Json;

/// `GET /api/v1/connection/status`
pub async fn status(State(state): State<AppState>) -> ApiResult<Json<ConnectionStatus>> {
    Ok(Json(state.connection.get_connection_status().await))
}

/// `POST /api/v1/connection/reconnect` — forced reconnection. Failure
/// surfaces as fallback mode in the returned status, not as an error.
pub async fn reconnect(State(state): State<AppState>) -> ApiResult<Json<ConnectionStatus>> {
    state.connection.force_reconnect().await;
    Ok(Json(state.connection.get_connection_status().await))
}
