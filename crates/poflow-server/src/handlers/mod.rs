pub mod amendments;
pub mod emails;
pub mod health;
pub mod intent;

use axum::{http::StatusCode, Json};
use serde_json::{json, Value};

use poflow_core::PoflowError;

/// Status code and JSON body for a failed request.
pub fn error_response(context: &str, e: &PoflowError) -> (StatusCode, Json<Value>) {
    let status = match e {
        PoflowError::NotFound(_) | PoflowError::AmendmentLocateFailed(_) | PoflowError::ReferencedPoNotFound(_) => {
            StatusCode::NOT_FOUND
        }
        PoflowError::MissingPoNumber | PoflowError::AmendmentMergeFailed { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        PoflowError::VersionConflict { .. } => StatusCode::CONFLICT,
        PoflowError::Store(_) | PoflowError::SemanticUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(json!({ "error": format!("{context}: {e}") })))
}
