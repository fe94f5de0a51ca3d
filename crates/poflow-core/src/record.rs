use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::extraction::ItemQuantity;
use crate::lenient;
use crate::version::INITIAL_VERSION;

pub const INTENT_NEW: &str = "new";
pub const INTENT_CHANGED: &str = "changed_po";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoHeader {
    #[serde(deserialize_with = "lenient::text")]
    pub po_number: String,
    pub quotation_number: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrderTerms {
    pub order_date: String,
    pub delivery_terms: String,
    pub payment_terms: String,
    pub delivery_date: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CustomerGroup {
    pub customer_name: String,
    pub customer_address: String,
    pub customer_city: String,
    pub customer_country: String,
    #[serde(deserialize_with = "lenient::text")]
    pub customer_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupplierGroup {
    pub supplier_name: String,
    pub supplier_address: String,
    pub supplier_city: String,
    pub supplier_country: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryGroup {
    pub delivery_name: String,
    pub delivery_address: String,
    pub delivery_city: String,
    pub delivery_country: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostGroup {
    pub net_amount: String,
    pub tax: String,
    pub total_amount: String,
    pub currency: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OtherDetails {
    pub supplier_instructions: String,
    pub invoicing_instructions: String,
    pub notes: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShippingDetails {
    pub shipping_method: String,
    pub shipping_agent: String,
    pub shipping_service: String,
}

/// One order line. Only the manufacturer code and quantity are always
/// written; the rest appear once something fills them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LineItem {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub customer_item_id: String,
    pub manufacturer_item_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub item_description: String,
    #[serde(deserialize_with = "lenient::text")]
    pub quantity: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub unit_price: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub total_price: String,
}

impl From<&ItemQuantity> for LineItem {
    fn from(item: &ItemQuantity) -> Self {
        Self {
            manufacturer_item_id: item.item_code.clone(),
            quantity: item.quantity.clone(),
            ..Default::default()
        }
    }
}

pub fn line_items(items: &[ItemQuantity]) -> Vec<LineItem> {
    items.iter().map(LineItem::from).collect()
}

/// The durable purchase-order document. Fields this model does not name are
/// kept in `extra` so a read-modify-write never drops them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PurchaseOrderRecord {
    pub po: PoHeader,
    pub order: OrderTerms,
    pub customer: CustomerGroup,
    pub supplier: SupplierGroup,
    pub delivery: DeliveryGroup,
    pub item: Vec<LineItem>,
    pub cost: CostGroup,
    pub other_details: OtherDetails,
    pub shipping_details: ShippingDetails,
    pub version: String,
    pub intent_type: String,
    pub created_at: String,
    pub updated_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub so_number: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PurchaseOrderRecord {
    /// A fresh `V1` record with every group present and the standard
    /// commercial defaults.
    pub fn skeleton(po_number: &str, items: &[ItemQuantity], now: DateTime<Utc>) -> Self {
        let stamp = timestamp(now);
        Self {
            po: PoHeader {
                po_number: po_number.to_string(),
                quotation_number: "NA".into(),
            },
            order: OrderTerms {
                order_date: now.format("%m%d%Y").to_string(),
                delivery_terms: "DAPDESTINATION".into(),
                payment_terms: "Net60Days".into(),
                delivery_date: String::new(),
            },
            item: line_items(items),
            cost: CostGroup {
                tax: "NA".into(),
                currency: "USD".into(),
                ..Default::default()
            },
            version: INITIAL_VERSION.into(),
            intent_type: INTENT_NEW.into(),
            created_at: stamp.clone(),
            updated_at: stamp,
            ..Default::default()
        }
    }

    pub fn po_number(&self) -> &str {
        &self.po.po_number
    }

    /// Fill the customer group and mirror it into delivery as the default
    /// ship-to.
    pub fn apply_customer(&mut self, customer: CustomerGroup) {
        self.delivery = DeliveryGroup {
            delivery_name: customer.customer_name.clone(),
            delivery_address: customer.customer_address.clone(),
            delivery_city: customer.customer_city.clone(),
            delivery_country: customer.customer_country.clone(),
        };
        self.customer = customer;
    }
}

/// `updated_at` / `created_at` stamp: second precision plus centiseconds.
pub fn timestamp(now: DateTime<Utc>) -> String {
    let centis = now.timestamp_subsec_millis() / 10;
    format!("{}.{:02}Z", now.format("%Y-%m-%dT%H:%M:%S"), centis)
}
