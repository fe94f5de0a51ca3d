pub mod api_types;
pub mod change_log;
pub mod config;
pub mod error;
pub mod extraction;
pub mod intent;
pub mod lenient;
pub mod path;
pub mod record;
pub mod response;
pub mod semantic;
pub mod store;
pub mod version;

pub use change_log::{ChangeLog, FieldChanges, FieldDelta};
pub use config::AppConfig;
pub use error::{PoflowError, Result};
pub use extraction::{ExtractionResult, ExtractionSource, ItemQuantity};
pub use intent::Intent;
pub use record::{LineItem, PurchaseOrderRecord};
pub use semantic::{complete_with_retry, RetryPolicy, SemanticService};
pub use store::{
    collections, CustomerDirectory, CustomerProfile, Document, DocumentStore, Filter,
    GuardedWrite, VersionGuard,
};
