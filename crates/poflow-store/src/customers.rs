use std::sync::Arc;

use async_trait::async_trait;

use poflow_core::error::Result;
use poflow_core::store::{collections, CustomerDirectory, CustomerProfile, DocumentStore, Filter};

/// Sender lookup over the customer master-data collection, keyed by
/// `customer_email`.
pub struct StoreCustomerDirectory {
    store: Arc<dyn DocumentStore>,
}

impl StoreCustomerDirectory {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl CustomerDirectory for StoreCustomerDirectory {
    async fn find_by_email(&self, email: &str) -> Result<Option<CustomerProfile>> {
        let filter = Filter::eq("customer_email", email.trim().to_lowercase());
        let Some(doc) = self.store.find_one(collections::CUSTOMERS, &filter).await? else {
            tracing::debug!(email, "No customer profile for sender");
            return Ok(None);
        };
        Ok(Some(serde_json::from_value(doc.body)?))
    }
}
