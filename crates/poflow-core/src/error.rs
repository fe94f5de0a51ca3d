use thiserror::Error;

#[derive(Error, Debug)]
pub enum PoflowError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Document store error: {0}")]
    Store(String),

    #[error("Semantic service unavailable: {0}")]
    SemanticUnavailable(String),

    #[error("Malformed semantic response: {0}")]
    MalformedSemanticResponse(String),

    #[error("No PO number could be extracted")]
    MissingPoNumber,

    #[error("Referenced PO {0} has no existing record")]
    ReferencedPoNotFound(String),

    #[error("No record found to amend for PO {0}")]
    AmendmentLocateFailed(String),

    #[error("Amendment merge failed at {stage} stage for PO {po_number}")]
    AmendmentMergeFailed { po_number: String, stage: String },

    #[error("Version conflict for PO {po_number}: expected latest {expected}, found {found}")]
    VersionConflict {
        po_number: String,
        expected: String,
        found: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, PoflowError>;
