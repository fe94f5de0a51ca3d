use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers;
use crate::state::AppState;

pub fn create_router() -> Router<AppState> {
    Router::new()
        // Health
        .route("/api/health", get(handlers::health::health_check))
        // Emails
        .route("/api/emails/process", post(handlers::emails::process_email))
        .route("/api/emails/classify", post(handlers::emails::classify_email))
        // Intent configuration
        .route("/api/intent/reload", post(handlers::intent::reload_intents))
        // Change logs and amendments
        .route("/api/change-logs", post(handlers::amendments::create_change_log))
        .route("/api/amendments", post(handlers::amendments::apply_amendment))
}
