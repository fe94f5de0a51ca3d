use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use tracing::info;

use poflow_core::api_types::HealthResponse;

use crate::state::AppState;

const VERSION: &str = env!("CARGO_PKG_VERSION");

pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    info!(model = %state.config.semantic_model, "Health check requested");

    let intent_labels = state.pipeline.classifier().config().await.actions().len();
    let status = if state.store_connected && state.semantic_configured {
        "ok".to_string()
    } else {
        "degraded".to_string()
    };

    let response = HealthResponse {
        status,
        version: VERSION.to_string(),
        store_connected: state.store_connected,
        semantic_configured: state.semantic_configured,
        intent_labels,
    };

    (StatusCode::OK, Json(response))
}
