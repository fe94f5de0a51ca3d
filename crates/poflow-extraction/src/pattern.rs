use async_trait::async_trait;

use poflow_core::extraction::{ExtractionResult, ExtractionSource};

use crate::po_number::{body_of, extract_po_number};
use crate::po_type::determine_po_type;
use crate::tables::{bullet_items, extract_item_table};
use crate::tiers::{normalize_lines, TierCascade};

/// Deterministic extraction: PO number, new/reference decision and items,
/// all from fixed patterns.
pub struct PatternExtractor {
    cascade: TierCascade,
}

impl Default for PatternExtractor {
    fn default() -> Self {
        Self::new(TierCascade::standard())
    }
}

impl PatternExtractor {
    pub fn new(cascade: TierCascade) -> Self {
        Self { cascade }
    }

    /// Items only: the tier cascade, then item-table rows, then the bullet
    /// sweep. The PO number is left empty.
    pub fn extract_items(&self, text: &str) -> ExtractionResult {
        let mut result = ExtractionResult::default();

        for (code, qty) in self.cascade.run(&normalize_lines(text)) {
            result.push_item(code, qty);
        }
        for (code, qty) in extract_item_table(text).items() {
            result.push_item(code, qty);
        }
        for (code, qty) in bullet_items(text) {
            result.push_item(code, qty);
        }

        result
    }

    pub fn analyze(&self, text: &str) -> ExtractionResult {
        let text = text.replace("\r\n", "\n");
        let Some(po_number) = extract_po_number(&text) else {
            tracing::info!("No PO number found by pattern extraction");
            return ExtractionResult::default();
        };

        let body = body_of(&text);
        let po_type = determine_po_type(body, &po_number);
        let items = self.extract_items(body);

        let mut result = ExtractionResult::new(po_number, po_type.is_reference());
        for item in items.items() {
            result.push_item(item.item_code.clone(), item.quantity.clone());
        }

        tracing::info!(
            po_number = %result.po_number,
            is_reference = result.is_reference,
            items = result.items().len(),
            "Pattern extraction complete"
        );
        result
    }
}

#[async_trait]
impl ExtractionSource for PatternExtractor {
    fn name(&self) -> &str {
        "pattern"
    }

    async fn extract(&self, text: &str) -> ExtractionResult {
        self.analyze(text)
    }
}
