use axum::{extract::State, response::IntoResponse, Json};

use crate::AppState;

/// GET /api/health - liveness for monitoring
///
/// Does not call JoFotara.
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let client = state.invoices.client();
    let config = client.config();
    Json(serde_json::json!({
        "status": "ok",
        "service": "jofotara_connector",
        "auth_mode": client.auth_mode().as_str(),
        "payload_format": config.payload_format.as_str(),
        "auto_send": config.auto_send,
        "timestamp": chrono::Utc::now(),
    }))
}
