use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::lenient;
use crate::path;

/// One field-level delta.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldDelta {
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub previous_value: Value,
    #[serde(default)]
    pub new_value: Value,
}

impl FieldDelta {
    pub fn new(previous_value: impl Into<Value>, new_value: impl Into<Value>) -> Self {
        Self {
            previous_value: previous_value.into(),
            new_value: new_value.into(),
        }
    }

    pub fn has_new_value(&self) -> bool {
        !path::is_blank(&self.new_value)
    }
}

/// `field_path -> {previous_value, new_value}`. Nested change objects and
/// per-line `item` lists are flattened into paths on the way in
/// (`item[0].quantity`), so every entry addresses exactly one field. An
/// `item[i]` index counts lines of the change log, not of the stored record.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct FieldChanges(BTreeMap<String, FieldDelta>);

impl FieldChanges {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<String>, delta: FieldDelta) {
        self.0.insert(path.into(), delta);
    }

    pub fn get(&self, path: &str) -> Option<&FieldDelta> {
        self.0.get(path)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldDelta)> {
        self.0.iter()
    }

    pub fn from_value(value: &Value) -> Self {
        let mut changes = Self::new();
        if value.is_object() {
            collect(String::new(), value, &mut changes);
        }
        changes
    }

    /// Drop entries without a usable `new_value`; an empty value never
    /// overwrites a populated field.
    pub fn without_blank(&self) -> Self {
        Self(
            self.0
                .iter()
                .filter(|(_, d)| d.has_new_value())
                .map(|(k, d)| (k.clone(), d.clone()))
                .collect(),
        )
    }

    /// Split into entries whose path already exists in `record` and those
    /// that do not.
    pub fn partition_by_presence(&self, record: &Value) -> (Self, Self) {
        let (present, missing): (BTreeMap<_, _>, BTreeMap<_, _>) = self
            .0
            .iter()
            .map(|(k, d)| (k.clone(), d.clone()))
            .partition(|(k, _)| path::get(record, k).is_some());
        (Self(present), Self(missing))
    }
}

fn is_delta_shape(map: &Map<String, Value>) -> bool {
    map.contains_key("new_value") || map.contains_key("previous_value")
}

fn collect(prefix: String, value: &Value, out: &mut FieldChanges) {
    match value {
        Value::Object(map) if !prefix.is_empty() && is_delta_shape(map) => {
            out.insert(
                prefix,
                FieldDelta {
                    previous_value: map.get("previous_value").cloned().unwrap_or(Value::Null),
                    new_value: map.get("new_value").cloned().unwrap_or(Value::Null),
                },
            );
        }
        Value::Object(map) => {
            for (key, child) in map {
                collect(path::join(&prefix, key), child, out);
            }
        }
        Value::Array(items) => {
            for (i, child) in items.iter().enumerate() {
                collect(format!("{prefix}[{i}]"), child, out);
            }
        }
        scalar if !prefix.is_empty() => {
            out.insert(prefix, FieldDelta::new(Value::Null, scalar.clone()));
        }
        _ => {}
    }
}

impl<'de> Deserialize<'de> for FieldChanges {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(Self::from_value(&value))
    }
}

/// Structured description of what an amended PO email changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeLog {
    #[serde(
        default,
        alias = "po_change_exists",
        deserialize_with = "lenient::flag",
        serialize_with = "lenient::flag_text"
    )]
    pub po_change_exist: bool,
    #[serde(default, deserialize_with = "lenient::text")]
    pub po_no: String,
    #[serde(default)]
    pub recognized_changes: FieldChanges,
    #[serde(default)]
    pub extra_changes: FieldChanges,
    #[serde(default)]
    pub timestamp: String,
}

impl ChangeLog {
    pub fn no_change(po_no: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            po_change_exist: false,
            po_no: po_no.into(),
            recognized_changes: FieldChanges::new(),
            extra_changes: FieldChanges::new(),
            timestamp: now.to_rfc3339(),
        }
    }

    pub fn has_changes(&self) -> bool {
        !self.recognized_changes.is_empty() || !self.extra_changes.is_empty()
    }

    pub fn without_blank_entries(&self) -> Self {
        Self {
            recognized_changes: self.recognized_changes.without_blank(),
            extra_changes: self.extra_changes.without_blank(),
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_nested_changes_flatten_to_paths() {
        let raw = json!({
            "DeliveryDate": {"previous_value": "", "new_value": "July 10, 2025"},
            "cost": {"tax_percentage": {"previous_value": "5", "new_value": "7"}},
            "item": [{"quantity": {"previous_value": "10", "new_value": "12"}}]
        });
        let changes = FieldChanges::from_value(&raw);
        assert_eq!(changes.len(), 3);
        assert_eq!(changes.get("DeliveryDate").unwrap().new_value, "July 10, 2025");
        assert_eq!(changes.get("cost.tax_percentage").unwrap().previous_value, "5");
        assert_eq!(changes.get("item[0].quantity").unwrap().new_value, "12");
    }

    #[test]
    fn test_without_blank_drops_empty_new_values() {
        let mut changes = FieldChanges::new();
        changes.insert("payment_terms", FieldDelta::new("Net30", ""));
        changes.insert("incoterm", FieldDelta::new("EXW", Value::Null));
        changes.insert("delivery_date", FieldDelta::new("", "2025-07-10"));
        let kept = changes.without_blank();
        assert_eq!(kept.len(), 1);
        assert!(kept.get("delivery_date").is_some());
    }

    #[test]
    fn test_change_flag_accepts_string_or_bool() {
        let a: ChangeLog = serde_json::from_value(json!({"po_change_exist": "true", "po_no": 9876543})).unwrap();
        let b: ChangeLog = serde_json::from_value(json!({"po_change_exists": false, "po_no": "1"})).unwrap();
        assert!(a.po_change_exist);
        assert_eq!(a.po_no, "9876543");
        assert!(!b.po_change_exist);
    }

    #[test]
    fn test_change_flag_serializes_as_text() {
        let log = ChangeLog::no_change("123456", Utc::now());
        let json = serde_json::to_value(&log).unwrap();
        assert_eq!(json["po_change_exist"], "false");
        assert_eq!(json["recognized_changes"], json!({}));
    }

    #[test]
    fn test_partition_by_presence() {
        let record = json!({"order": {"delivery_date": ""}, "version": "V1"});
        let mut changes = FieldChanges::new();
        changes.insert("order.delivery_date", FieldDelta::new("", "July 10, 2025"));
        changes.insert("DeliveryDate", FieldDelta::new("", "July 10, 2025"));
        let (present, missing) = changes.partition_by_presence(&record);
        assert!(present.get("order.delivery_date").is_some());
        assert!(missing.get("DeliveryDate").is_some());
    }
}
