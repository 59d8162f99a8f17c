use crate::transport::http::types::{AppState, HealthResponse};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service status; `degraded` when Odoo is unreachable", body = HealthResponse)
    )
)]
pub async fn healthcheck_handler(State(state): State<AppState>) -> impl IntoResponse {
    let odoo = match state.odoo.authenticate().await {
        Ok(_) => "connected".to_string(),
        Err(e) => format!("error: {}", e),
    };

    let mercury = match &state.mercury {
        Some(m) => {
            if m.bank.health_check().await.connected {
                "connected".to_string()
            } else {
                "disconnected".to_string()
            }
        }
        None => "not_configured".to_string(),
    };

    Json(HealthResponse {
        status: if odoo == "connected" { "healthy" } else { "degraded" }.to_string(),
        odoo,
        mercury,
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}
