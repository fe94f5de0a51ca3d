use std::sync::Arc;

use poflow_core::{AppConfig, DocumentStore};
use poflow_reconcile::EmailPipeline;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub store: Arc<dyn DocumentStore>,
    pub store_connected: bool,
    pub semantic_configured: bool,
    pub pipeline: Arc<EmailPipeline>,
}
