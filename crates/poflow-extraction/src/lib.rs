pub mod anthropic;
pub mod coordinator;
pub mod pattern;
pub mod po_number;
pub mod po_type;
pub mod semantic;
pub mod tables;
pub mod tiers;

pub use anthropic::AnthropicService;
pub use coordinator::{union, ExtractionCoordinator};
pub use pattern::PatternExtractor;
pub use po_type::PoType;
pub use semantic::SemanticExtractor;
