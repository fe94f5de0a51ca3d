use axum::{extract::State, response::IntoResponse, Json};
use tracing::info;

use poflow_core::api_types::ReloadResponse;

use crate::state::AppState;

/// POST /api/intent/reload: re-read intent labels and keywords from the store.
pub async fn reload_intents(State(state): State<AppState>) -> impl IntoResponse {
    let config = state.pipeline.classifier().reload(state.store.as_ref()).await;
    let labels: Vec<String> = config.labels().into_iter().map(str::to_string).collect();
    info!(labels = labels.len(), "Intent configuration reloaded");
    Json(ReloadResponse { labels })
}
