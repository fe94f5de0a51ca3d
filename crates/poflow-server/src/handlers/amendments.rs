use axum::{
    extract::{Json, State},
    response::IntoResponse,
};
use tracing::{error, info, instrument};

use poflow_core::api_types::{ChangeLogRequest, ChangeLogResponse};
use poflow_core::ChangeLog;

use crate::handlers::error_response;
use crate::state::AppState;

/// POST /api/change-logs: derive and store the change log for an amendment email.
pub async fn create_change_log(
    State(state): State<AppState>,
    Json(req): Json<ChangeLogRequest>,
) -> impl IntoResponse {
    match state.pipeline.change_logs().produce(&req.email_text).await {
        Ok((change_log, document_id)) => Ok(Json(ChangeLogResponse {
            change_log,
            document_id,
        })),
        Err(e) => {
            error!(error = %e, "Change log production failed");
            Err(error_response("Change log production failed", &e))
        }
    }
}

/// POST /api/amendments: apply a change log to its stored PO.
#[instrument(skip_all, fields(po_no = %log.po_no))]
pub async fn apply_amendment(State(state): State<AppState>, Json(log): Json<ChangeLog>) -> impl IntoResponse {
    match state.pipeline.amendments().apply_amendment(&log).await {
        Ok(report) => {
            info!(state = ?report.state, versions = ?report.versions, "Amendment handled");
            Ok(Json(report))
        }
        Err(e) => {
            error!(error = %e, "Amendment failed");
            Err(error_response("Amendment failed", &e))
        }
    }
}
