use std::sync::Arc;

use poflow_core::extraction::{ExtractionResult, ExtractionSource};

/// Runs the deterministic and semantic sources side by side and folds their
/// answers into one result.
pub struct ExtractionCoordinator {
    pattern: Arc<dyn ExtractionSource>,
    semantic: Arc<dyn ExtractionSource>,
}

impl ExtractionCoordinator {
    pub fn new(pattern: Arc<dyn ExtractionSource>, semantic: Arc<dyn ExtractionSource>) -> Self {
        Self { pattern, semantic }
    }

    #[tracing::instrument(skip_all, fields(text_len = text.len()))]
    pub async fn coordinate(&self, text: &str) -> ExtractionResult {
        let (pattern, semantic) = tokio::join!(self.pattern.extract(text), self.semantic.extract(text));

        tracing::debug!(
            pattern_source = self.pattern.name(),
            semantic_source = self.semantic.name(),
            pattern_items = pattern.items().len(),
            semantic_items = semantic.items().len(),
            "Both extraction sources finished"
        );

        union(&pattern, &semantic)
    }
}

/// Pattern answer first: its PO number wins when present and its items come
/// first. The reference flag is the AND of both sources.
pub fn union(pattern: &ExtractionResult, semantic: &ExtractionResult) -> ExtractionResult {
    let po_number = if pattern.po_number.is_empty() {
        semantic.po_number.clone()
    } else {
        pattern.po_number.clone()
    };

    let mut merged = ExtractionResult::new(po_number, pattern.is_reference && semantic.is_reference);
    for item in pattern.items().iter().chain(semantic.items()) {
        merged.push_item(item.item_code.clone(), item.quantity.clone());
    }
    merged
}
