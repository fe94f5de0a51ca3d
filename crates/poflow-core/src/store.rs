use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;
use crate::lenient;
use crate::path;

pub mod collections {
    pub const PURCHASE_ORDERS: &str = "po_data";
    pub const SALES_ORDERS: &str = "sales_orders";
    pub const CHANGE_LOGS: &str = "po_change_logs";
    pub const CUSTOMERS: &str = "customer_master_data";
    pub const INTENT_ACTIONS: &str = "intent_actions";
}

/// A stored document. `id` and `revision` are assigned by the store and are
/// never part of `body`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub revision: u64,
    pub body: Value,
}

/// Field-path predicate over document bodies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Filter {
    /// The value at `path` equals `value`, or is an array containing it.
    Eq { path: String, value: Value },
    /// The value at `path` is exactly this object.
    Object { path: String, expected: Map<String, Value> },
}

impl Filter {
    pub fn eq(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Eq {
            path: path.into(),
            value: value.into(),
        }
    }

    pub fn object(path: impl Into<String>, expected: Map<String, Value>) -> Self {
        Filter::Object {
            path: path.into(),
            expected,
        }
    }

    pub fn matches(&self, body: &Value) -> bool {
        match self {
            Filter::Eq { path, value } => match path::get(body, path) {
                Some(Value::Array(items)) if !value.is_array() => items.contains(value),
                Some(found) => found == value,
                None => false,
            },
            Filter::Object { path, expected } => {
                matches!(path::get(body, path), Some(Value::Object(found)) if found == expected)
            }
        }
    }

    /// Index keys a matching document is guaranteed to carry. Callers still
    /// confirm with [`Filter::matches`].
    pub fn lookup_keys(&self) -> Vec<String> {
        match self {
            Filter::Eq { path, value } => vec![lookup_key(path, value)],
            Filter::Object { path, expected } => expected
                .iter()
                .filter(|(_, v)| is_indexable(v))
                .map(|(k, v)| lookup_key(&path::join(path, k), v))
                .collect(),
        }
    }
}

/// Scalars nested this deep or shallower are indexed.
pub const LOOKUP_DEPTH: usize = 3;

pub fn lookup_key(path: &str, value: &Value) -> String {
    format!("{path}={value}")
}

fn is_indexable(value: &Value) -> bool {
    matches!(value, Value::String(_) | Value::Number(_) | Value::Bool(_))
}

/// Every `path=value` key for scalars up to [`LOOKUP_DEPTH`], including the
/// scalar members of arrays.
pub fn document_lookup_keys(body: &Value) -> Vec<String> {
    fn walk(prefix: &str, value: &Value, depth: usize, out: &mut Vec<String>) {
        match value {
            Value::Object(map) if depth < LOOKUP_DEPTH => {
                for (k, v) in map {
                    walk(&path::join(prefix, k), v, depth + 1, out);
                }
            }
            Value::Array(items) if !prefix.is_empty() => {
                for item in items.iter().filter(|v| is_indexable(v)) {
                    out.push(lookup_key(prefix, item));
                }
            }
            v if is_indexable(v) && !prefix.is_empty() => out.push(lookup_key(prefix, v)),
            _ => {}
        }
    }

    let mut keys = Vec::new();
    walk("", body, 0, &mut keys);
    keys.sort();
    keys.dedup();
    keys
}

/// Precondition of an atomic write: the latest version among documents
/// matching `lineage` is still `expected_latest`.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionGuard {
    pub po_number: String,
    pub lineage: Filter,
    pub expected_latest: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GuardedWrite {
    Insert { body: Value },
    /// Delete `id` (which must still be at `revision`) and insert `body` as a
    /// fresh document.
    Replace { id: String, revision: u64, body: Value },
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn find_many(&self, collection: &str, filter: &Filter) -> Result<Vec<Document>>;

    async fn find_one(&self, collection: &str, filter: &Filter) -> Result<Option<Document>> {
        Ok(self.find_many(collection, filter).await?.into_iter().next())
    }

    async fn insert_one(&self, collection: &str, body: Value) -> Result<String>;

    async fn delete_by_id(&self, collection: &str, id: &str) -> Result<bool>;

    /// Check `guard` and apply every write as one atomic step. Returns the new
    /// document ids in write order, or `VersionConflict` with nothing written.
    async fn write_guarded(
        &self,
        collection: &str,
        guard: &VersionGuard,
        writes: Vec<GuardedWrite>,
    ) -> Result<Vec<String>>;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CustomerProfile {
    #[serde(deserialize_with = "lenient::text")]
    pub customer_id: String,
    #[serde(alias = "customer_name")]
    pub name: String,
    #[serde(alias = "customer_address")]
    pub address: String,
    #[serde(alias = "customer_city")]
    pub city: String,
    #[serde(alias = "customer_country")]
    pub country: String,
}

#[async_trait]
pub trait CustomerDirectory: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<CustomerProfile>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_eq_filter_on_nested_path() {
        let doc = json!({"po": {"po_number": "L21335"}});
        assert!(Filter::eq("po.po_number", "L21335").matches(&doc));
        assert!(!Filter::eq("po_number", "L21335").matches(&doc));
    }

    #[test]
    fn test_eq_filter_matches_array_member() {
        let doc = json!({"keyword": ["cancel", "void"]});
        assert!(Filter::eq("keyword", "void").matches(&doc));
    }

    #[test]
    fn test_object_filter_requires_exact_object() {
        let doc = json!({"po": {"po_number": "L21335", "quotation_number": "NA"}});
        let mut expected = Map::new();
        expected.insert("po_number".into(), json!("L21335"));
        assert!(!Filter::object("po", expected.clone()).matches(&doc));

        let exact = json!({"po": {"po_number": "L21335"}});
        assert!(Filter::object("po", expected).matches(&exact));
    }

    #[test]
    fn test_document_keys_cover_filter_keys() {
        let doc = json!({
            "po": {"po_number": "L21335"},
            "customer": {"customer_id": 42},
            "is_active": true,
            "keyword": ["cancel"]
        });
        let keys = document_lookup_keys(&doc);
        for filter in [
            Filter::eq("po.po_number", "L21335"),
            Filter::eq("customer.customer_id", 42),
            Filter::eq("is_active", true),
            Filter::eq("keyword", "cancel"),
        ] {
            for key in filter.lookup_keys() {
                assert!(keys.contains(&key), "missing {key}");
            }
        }
    }

    #[test]
    fn test_customer_profile_accepts_master_data_field_names() {
        let profile: CustomerProfile = serde_json::from_value(json!({
            "customer_id": 1001,
            "customer_name": "TechNova Solutions",
            "customer_city": "Navi Mumbai"
        }))
        .unwrap();
        assert_eq!(profile.customer_id, "1001");
        assert_eq!(profile.name, "TechNova Solutions");
        assert_eq!(profile.city, "Navi Mumbai");
    }
}
