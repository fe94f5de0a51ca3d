pub mod classifier;
pub mod config;
pub mod detectors;

pub use classifier::{extract_subject, IntentClassifier};
pub use config::{ClassifierConfig, IntentAction};
