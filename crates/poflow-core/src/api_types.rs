use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::change_log::ChangeLog;
use crate::extraction::ItemQuantity;
use crate::intent::Intent;

// --- Health ---

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub store_connected: bool,
    pub semantic_configured: bool,
    pub intent_labels: usize,
}

// --- Email processing ---

#[derive(Debug, Serialize, Deserialize)]
pub struct ProcessEmailRequest {
    pub email_text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Created,
    ItemsAttached,
    Amended,
    NoChangeDetected,
    MissingPoNumber,
    ReferencedPoNotFound,
    NotAnOrder,
}

/// Result of running one inbound email through the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailOutcome {
    pub status: OutcomeStatus,
    pub intent: Intent,
    pub po_found: bool,
    pub is_new_po: bool,
    pub is_reference_po: bool,
    pub po_number: String,
    pub items: Vec<ItemQuantity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amendment: Option<AmendmentReport>,
}

impl EmailOutcome {
    pub fn new(status: OutcomeStatus, intent: Intent) -> Self {
        Self {
            status,
            intent,
            po_found: false,
            is_new_po: false,
            is_reference_po: false,
            po_number: String::new(),
            items: Vec::new(),
            record: None,
            document_id: None,
            amendment: None,
        }
    }
}

// --- Intent ---

#[derive(Debug, Serialize, Deserialize)]
pub struct ClassifyRequest {
    pub email_text: String,
    #[serde(default)]
    pub subject: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ClassifyResponse {
    pub intent: Intent,
    pub subject: String,
    pub flags: BTreeMap<String, bool>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReloadResponse {
    pub labels: Vec<String>,
}

// --- Change logs and amendments ---

#[derive(Debug, Serialize, Deserialize)]
pub struct ChangeLogRequest {
    pub email_text: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChangeLogResponse {
    pub change_log: ChangeLog,
    pub document_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmendmentState {
    NoChangeDetected,
    Persisted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmendmentReport {
    pub po_no: String,
    pub state: AmendmentState,
    /// Versions of the records written, in write order.
    pub versions: Vec<String>,
    pub document_ids: Vec<String>,
}
