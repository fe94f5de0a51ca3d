use axum::{
    extract::{Json, State},
    response::IntoResponse,
};
use tracing::{error, info, instrument};

use poflow_core::api_types::{ClassifyRequest, ClassifyResponse, ProcessEmailRequest};
use poflow_intent::extract_subject;

use crate::handlers::error_response;
use crate::state::AppState;

/// POST /api/emails/process: run one email through the pipeline.
#[instrument(skip_all, fields(bytes = req.email_text.len()))]
pub async fn process_email(State(state): State<AppState>, Json(req): Json<ProcessEmailRequest>) -> impl IntoResponse {
    match state.pipeline.process(&req.email_text).await {
        Ok(outcome) => {
            info!(
                status = ?outcome.status,
                po_number = %outcome.po_number,
                items = outcome.items.len(),
                "Email processed"
            );
            Ok(Json(outcome))
        }
        Err(e) => {
            error!(error = %e, "Email processing failed");
            Err(error_response("Email processing failed", &e))
        }
    }
}

/// POST /api/emails/classify: intent only, nothing is written.
pub async fn classify_email(State(state): State<AppState>, Json(req): Json<ClassifyRequest>) -> impl IntoResponse {
    let subject = req
        .subject
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| extract_subject(&req.email_text));

    let classifier = state.pipeline.classifier();
    let intent = classifier.classify(&req.email_text, &subject).await;
    let flags = classifier
        .config()
        .await
        .labels()
        .into_iter()
        .map(|label| (label.to_string(), label == intent.label()))
        .collect();

    Json(ClassifyResponse { intent, subject, flags })
}
