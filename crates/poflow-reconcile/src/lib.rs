pub mod amendment;
pub mod change_log;
pub mod pipeline;
pub mod reconciler;

pub use amendment::AmendmentEngine;
pub use change_log::ChangeLogProducer;
pub use pipeline::EmailPipeline;
pub use reconciler::{Reconciler, Reconciliation};
