use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::lenient;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemQuantity {
    pub item_code: String,
    pub quantity: String,
}

/// Output of one extraction source. Item codes are unique in insertion order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ExtractionWire", into = "ExtractionWire")]
pub struct ExtractionResult {
    pub po_number: String,
    pub is_reference: bool,
    items: Vec<ItemQuantity>,
}

/// The all-empty result: no PO number, no items, reference flag set.
impl Default for ExtractionResult {
    fn default() -> Self {
        Self {
            po_number: String::new(),
            is_reference: true,
            items: Vec::new(),
        }
    }
}

impl ExtractionResult {
    pub fn new(po_number: impl Into<String>, is_reference: bool) -> Self {
        Self {
            po_number: po_number.into(),
            is_reference,
            items: Vec::new(),
        }
    }

    pub fn items(&self) -> &[ItemQuantity] {
        &self.items
    }

    pub fn contains_item(&self, item_code: &str) -> bool {
        self.items.iter().any(|i| i.item_code == item_code)
    }

    /// Append unless the code is empty or already present. Returns whether
    /// the item was added.
    pub fn push_item(&mut self, item_code: impl Into<String>, quantity: impl Into<String>) -> bool {
        let item_code = item_code.into().trim().to_string();
        if item_code.is_empty() || self.contains_item(&item_code) {
            return false;
        }
        self.items.push(ItemQuantity {
            item_code,
            quantity: quantity.into().trim().to_string(),
        });
        true
    }

    pub fn with_item(mut self, item_code: impl Into<String>, quantity: impl Into<String>) -> Self {
        self.push_item(item_code, quantity);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.po_number.is_empty() && self.items.is_empty()
    }
}

/// `{"po_number", "is_reference_po", "items": [..], "quantities": [..]}`
#[derive(Debug, Serialize, Deserialize)]
struct ExtractionWire {
    #[serde(default, deserialize_with = "lenient::text")]
    po_number: String,
    #[serde(default = "default_reference", deserialize_with = "lenient::flag")]
    is_reference_po: bool,
    #[serde(default, deserialize_with = "lenient::text_list")]
    items: Vec<String>,
    #[serde(default, deserialize_with = "lenient::text_list")]
    quantities: Vec<String>,
}

fn default_reference() -> bool {
    true
}

impl From<ExtractionWire> for ExtractionResult {
    fn from(wire: ExtractionWire) -> Self {
        let mut result = ExtractionResult::new(wire.po_number, wire.is_reference_po);
        // An item without a quantity at the same index is dropped.
        for (code, qty) in wire.items.into_iter().zip(wire.quantities) {
            result.push_item(code, qty);
        }
        result
    }
}

impl From<ExtractionResult> for ExtractionWire {
    fn from(result: ExtractionResult) -> Self {
        let (items, quantities) = result
            .items
            .into_iter()
            .map(|i| (i.item_code, i.quantity))
            .unzip();
        Self {
            po_number: result.po_number,
            is_reference_po: result.is_reference,
            items,
            quantities,
        }
    }
}

/// One independent producer of [`ExtractionResult`]s. Implementations never
/// fail; unusable input yields the all-empty default.
#[async_trait]
pub trait ExtractionSource: Send + Sync {
    fn name(&self) -> &str;
    async fn extract(&self, text: &str) -> ExtractionResult;
}
