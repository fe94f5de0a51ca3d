use std::sync::{Arc, LazyLock};

use chrono::Utc;
use regex::Regex;
use serde_json::{json, Map, Value};

use poflow_core::error::{PoflowError, Result};
use poflow_core::extraction::{ExtractionResult, ItemQuantity};
use poflow_core::path;
use poflow_core::record::{line_items, CustomerGroup, PurchaseOrderRecord};
use poflow_core::store::{collections, CustomerDirectory, CustomerProfile, Document, DocumentStore, Filter};

static SENDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^\s*From:\s*(?:.*?<)?([^<>\s]+@[^<>\s]+)>?").expect("static pattern compiles")
});

/// Sender address from the first `From:` header, if any.
pub fn extract_sender_email(email_text: &str) -> Option<String> {
    SENDER.captures(email_text).map(|c| c[1].trim().to_string())
}

/// Query shapes a stored PO may have been written under, tried in order.
pub fn po_lookup_filters(po_number: &str) -> Vec<Filter> {
    let mut nested = Map::new();
    nested.insert("po_number".into(), json!(po_number));
    vec![
        Filter::eq("po_number", po_number),
        Filter::eq("purchase_order_number", po_number),
        Filter::eq("po.po_number", po_number),
        Filter::object("po", nested),
    ]
}

const OVERLAY_GROUPS: [&str; 3] = ["supplier", "other_details", "shipping_details"];

fn sales_order_filters(po_number: &str) -> Vec<Filter> {
    vec![
        Filter::eq("purchase_order", po_number),
        Filter::eq("header_information.purchase_order", po_number),
    ]
}

/// What reconciliation did with one extraction result.
#[derive(Debug, Clone, PartialEq)]
pub enum Reconciliation {
    /// An existing document matched; `record` is it with the email's items
    /// attached. Nothing is written.
    Attached {
        collection: &'static str,
        document_id: String,
        record: Value,
    },
    /// No document matched and a new PO record was stored.
    Created { document_id: String, record: Value },
}

impl Reconciliation {
    pub fn record(&self) -> &Value {
        match self {
            Reconciliation::Attached { record, .. } | Reconciliation::Created { record, .. } => record,
        }
    }

    pub fn document_id(&self) -> &str {
        match self {
            Reconciliation::Attached { document_id, .. } | Reconciliation::Created { document_id, .. } => {
                document_id
            }
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, Reconciliation::Created { .. })
    }
}

pub struct Reconciler {
    store: Arc<dyn DocumentStore>,
    customers: Arc<dyn CustomerDirectory>,
}

impl Reconciler {
    pub fn new(store: Arc<dyn DocumentStore>, customers: Arc<dyn CustomerDirectory>) -> Self {
        Self { store, customers }
    }

    async fn first_hit(&self, collection: &str, filters: Vec<Filter>) -> Result<Option<Document>> {
        for filter in filters {
            if let Some(doc) = self.store.find_one(collection, &filter).await? {
                return Ok(Some(doc));
            }
        }
        Ok(None)
    }

    #[tracing::instrument(skip_all, fields(po_number = %extraction.po_number))]
    pub async fn reconcile(&self, extraction: &ExtractionResult, email_text: &str) -> Result<Reconciliation> {
        let po_number = extraction.po_number.trim();
        if po_number.is_empty() {
            return Err(PoflowError::MissingPoNumber);
        }
        let items = serde_json::to_value(line_items(extraction.items()))?;

        if let Some(doc) = self.first_hit(collections::PURCHASE_ORDERS, po_lookup_filters(po_number)).await? {
            tracing::info!(document_id = %doc.id, "Attaching items to existing PO");
            let mut record = doc.body;
            if let Value::Object(map) = &mut record {
                map.insert("item".into(), items);
            }
            return Ok(Reconciliation::Attached {
                collection: collections::PURCHASE_ORDERS,
                document_id: doc.id,
                record,
            });
        }

        if let Some(doc) = self.first_hit(collections::SALES_ORDERS, sales_order_filters(po_number)).await? {
            tracing::info!(document_id = %doc.id, "Attaching items to sales order");
            let mut record = doc.body;
            if record.get("order_details").is_some_and(|d| !d.is_object()) {
                record["order_details"] = json!({});
            }
            path::set(&mut record, "order_details.item_list", items);
            return Ok(Reconciliation::Attached {
                collection: collections::SALES_ORDERS,
                document_id: doc.id,
                record,
            });
        }

        if extraction.is_reference {
            tracing::warn!("Referenced PO has no stored record");
            return Err(PoflowError::ReferencedPoNotFound(po_number.to_string()));
        }

        let body = self.new_record(po_number, extraction.items(), email_text).await?;
        let document_id = self.store.insert_one(collections::PURCHASE_ORDERS, body.clone()).await?;
        tracing::info!(
            document_id = %document_id,
            items = body["item"].as_array().map_or(0, Vec::len),
            "Created new PO record"
        );
        Ok(Reconciliation::Created { document_id, record: body })
    }

    async fn new_record(
        &self,
        po_number: &str,
        items: &[ItemQuantity],
        email_text: &str,
    ) -> Result<Value> {
        let mut record = PurchaseOrderRecord::skeleton(po_number, items, Utc::now());

        let Some(sender) = extract_sender_email(email_text) else {
            tracing::debug!("No sender address in email");
            return Ok(serde_json::to_value(&record)?);
        };
        let Some(profile) = self.customers.find_by_email(&sender).await? else {
            tracing::debug!(sender = %sender, "Sender is not a known customer");
            return Ok(serde_json::to_value(&record)?);
        };

        record.apply_customer(customer_group(&profile));
        let mut body = serde_json::to_value(&record)?;
        if !profile.customer_id.is_empty() {
            self.overlay_from_previous_order(&mut body, &profile.customer_id).await?;
        }
        Ok(body)
    }

    /// Copy supplier, other and shipping details verbatim from an earlier PO
    /// of the same customer. Null fields and unknown keys are kept as stored.
    async fn overlay_from_previous_order(&self, body: &mut Value, customer_id: &str) -> Result<()> {
        let filter = Filter::eq("customer.customer_id", customer_id);
        let Some(previous) = self.store.find_one(collections::PURCHASE_ORDERS, &filter).await? else {
            return Ok(());
        };
        let Value::Object(target) = body else {
            return Ok(());
        };

        for group in OVERLAY_GROUPS {
            if let Some(value) = previous.body.get(group).filter(|v| v.is_object()) {
                target.insert(group.to_string(), value.clone());
            }
        }
        tracing::debug!(customer_id, source = %previous.id, "Enriched new PO from earlier order");
        Ok(())
    }
}

fn customer_group(profile: &CustomerProfile) -> CustomerGroup {
    CustomerGroup {
        customer_name: profile.name.clone(),
        customer_address: profile.address.clone(),
        customer_city: profile.city.clone(),
        customer_country: profile.country.clone(),
        customer_id: profile.customer_id.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use poflow_store::{InMemoryStore, StoreCustomerDirectory};

    fn reconciler(store: &Arc<InMemoryStore>) -> Reconciler {
        let customers = Arc::new(StoreCustomerDirectory::new(store.clone()));
        Reconciler::new(store.clone(), customers)
    }

    #[test]
    fn test_extract_sender_email() {
        let text = "Date: today\nFrom: Dana Buyer <Dana@Acme.com>\nTo: x@y.com";
        assert_eq!(extract_sender_email(text).as_deref(), Some("Dana@Acme.com"));
        assert_eq!(
            extract_sender_email("from: plain@example.com").as_deref(),
            Some("plain@example.com")
        );
        assert_eq!(extract_sender_email("no sender"), None);
    }

    #[tokio::test]
    async fn test_missing_po_number() {
        let store = Arc::new(InMemoryStore::new());
        let err = reconciler(&store)
            .reconcile(&ExtractionResult::default(), "")
            .await
            .unwrap_err();
        assert!(matches!(err, PoflowError::MissingPoNumber));
    }

    #[tokio::test]
    async fn test_existing_record_gets_items_only() {
        let store = Arc::new(InMemoryStore::new());
        let id = store
            .insert_one(
                collections::PURCHASE_ORDERS,
                json!({"po": {"po_number": "4500012"}, "version": "V2",
                       "item": [{"manufacturer_item_id": "OLD-1", "quantity": "1"}]}),
            )
            .await
            .unwrap();

        let extraction = ExtractionResult::new("4500012", true).with_item("HX-440", "2");
        let outcome = reconciler(&store).reconcile(&extraction, "").await.unwrap();

        assert!(!outcome.is_new());
        assert_eq!(outcome.document_id(), id);
        assert_eq!(outcome.record()["version"], "V2");
        assert_eq!(
            outcome.record()["item"],
            json!([{"manufacturer_item_id": "HX-440", "quantity": "2"}])
        );
        // The stored document is not rewritten.
        assert_eq!(store.count(collections::PURCHASE_ORDERS).await, 1);
        let stored = store.all(collections::PURCHASE_ORDERS).await;
        assert_eq!(stored[0].body["item"][0]["manufacturer_item_id"], "OLD-1");
    }

    #[tokio::test]
    async fn test_sales_order_fallback() {
        let store = Arc::new(InMemoryStore::new());
        store
            .insert_one(
                collections::SALES_ORDERS,
                json!({"header_information": {"purchase_order": "778899"}, "order_details": {"so": "SO-1"}}),
            )
            .await
            .unwrap();

        let extraction = ExtractionResult::new("778899", true).with_item("RING-9", "4");
        let outcome = reconciler(&store).reconcile(&extraction, "").await.unwrap();
        assert_eq!(
            outcome.record()["order_details"],
            json!({"so": "SO-1", "item_list": [{"manufacturer_item_id": "RING-9", "quantity": "4"}]})
        );
    }

    #[tokio::test]
    async fn test_unknown_reference_is_not_fabricated() {
        let store = Arc::new(InMemoryStore::new());
        let extraction = ExtractionResult::new("4500012", true);
        let err = reconciler(&store).reconcile(&extraction, "").await.unwrap_err();
        assert!(matches!(err, PoflowError::ReferencedPoNotFound(po) if po == "4500012"));
        assert_eq!(store.count(collections::PURCHASE_ORDERS).await, 0);
    }

    #[tokio::test]
    async fn test_new_record_enriched_from_customer() {
        let store = Arc::new(InMemoryStore::new());
        store
            .insert_one(
                collections::CUSTOMERS,
                json!({"customer_email": "dana@acme.com", "customer_id": "C-001",
                       "customer_name": "Acme Industrial", "customer_city": "Pune",
                       "customer_country": "India", "customer_address": "Plot 4"}),
            )
            .await
            .unwrap();
        store
            .insert_one(
                collections::PURCHASE_ORDERS,
                json!({"po": {"po_number": "OLD-9"}, "customer": {"customer_id": "C-001"},
                       "supplier": {"supplier_name": "Steelworks"},
                       "shipping_details": {"shipping_method": "Road"}}),
            )
            .await
            .unwrap();

        let extraction = ExtractionResult::new("L21335", false).with_item("iron rod bar", "1500");
        let outcome = reconciler(&store)
            .reconcile(&extraction, "From: Dana <dana@acme.com>\n\nhello")
            .await
            .unwrap();

        assert!(outcome.is_new());
        let record = outcome.record();
        assert_eq!(record["customer"]["customer_name"], "Acme Industrial");
        assert_eq!(record["delivery"]["delivery_city"], "Pune");
        assert_eq!(record["supplier"]["supplier_name"], "Steelworks");
        assert_eq!(record["shipping_details"]["shipping_method"], "Road");
        assert_eq!(record["intent_type"], "new");
        assert_eq!(store.count(collections::PURCHASE_ORDERS).await, 2);
    }

    #[tokio::test]
    async fn test_previous_order_groups_copied_verbatim() {
        let store = Arc::new(InMemoryStore::new());
        store
            .insert_one(
                collections::CUSTOMERS,
                json!({"customer_email": "dana@acme.com", "customer_id": "C-001", "customer_name": "Acme"}),
            )
            .await
            .unwrap();
        store
            .insert_one(
                collections::PURCHASE_ORDERS,
                json!({"po": {"po_number": "OLD-9"}, "customer": {"customer_id": "C-001"},
                       "supplier": {"supplier_name": "Steelworks", "supplier_city": null, "supplier_vat": "EU123"},
                       "other_details": {"incoterm_year": 2020}}),
            )
            .await
            .unwrap();

        let extraction = ExtractionResult::new("L21336", false).with_item("HX-440", "2");
        let outcome = reconciler(&store)
            .reconcile(&extraction, "From: dana@acme.com\n\nhello")
            .await
            .unwrap();

        let record = outcome.record();
        assert_eq!(
            record["supplier"],
            json!({"supplier_name": "Steelworks", "supplier_city": null, "supplier_vat": "EU123"})
        );
        assert_eq!(record["other_details"]["incoterm_year"], 2020);
        assert_eq!(record["po"]["po_number"], "L21336");

        let stored = store.find_one(collections::PURCHASE_ORDERS, &Filter::eq("po.po_number", "L21336")).await;
        assert_eq!(stored.unwrap().unwrap().body["supplier"]["supplier_vat"], "EU123");
    }
}
