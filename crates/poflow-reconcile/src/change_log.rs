use std::sync::{Arc, LazyLock};

use chrono::Utc;
use regex::Regex;
use serde_json::{Map, Value};

use poflow_core::change_log::{ChangeLog, FieldChanges, FieldDelta};
use poflow_core::error::Result;
use poflow_core::lenient::{value_flag, value_text};
use poflow_core::path;
use poflow_core::record::PurchaseOrderRecord;
use poflow_core::response::json_object;
use poflow_core::semantic::{complete_with_retry, RetryPolicy, SemanticService};
use poflow_core::store::{collections, DocumentStore};
use poflow_extraction::po_number::extract_po_number;

const CHANGE_PHRASES: &[&str] = &[
    "order change",
    "changed the order",
    "changed an order",
    "order modification",
    "modified order",
    "update to order",
    "order update",
    "order amendment",
    "revised order",
    "order revision",
    "order changed",
    "(changed)",
    "revised po",
    "po revision",
    "po modification",
    "purchase order modification",
    "has been modified",
    "order has been changed",
];

pub fn is_order_change_email(text: &str) -> bool {
    let lower = text.to_lowercase();
    CHANGE_PHRASES.iter().any(|p| lower.contains(p))
}

// ── PO number ──

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(p).expect("static pattern compiles"))
        .collect()
}

/// Shapes that look numeric but are dates, phone numbers or dial codes.
static NOT_A_PO: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"\d{1,4}[-/.]\d{1,4}[-/.]\d{1,4}",
        r"\(\d{3}\)\s*\d{3}-\d{4}",
        r"\+\d",
        r"(?i)\b\d{1,2}\s+(?:jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\s+\d{4}\b",
        r"(?i)\b(?:jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\s+\d{1,2},?\s+\d{4}\b",
    ])
});

static NUMERIC_CONTEXTS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"Purchase Order\s*(?:\(Changed\))?\s*(\d+)",
        r"PO\s*(?:Number|#|No\.?|No:)\s*[#:]?\s*(\d+)",
        r"Purchase Order\s*(?:Number|#|No\.?|No:)?\s*[#:]?\s*(\d+)",
        r"Order\s*(?:Number|#|No\.?|No:)\s*[#:]?\s*(\d+)",
        r"P\.?O\.?\s*(?:Number|#|No\.?|No:)?\s*[#:]?\s*(\d+)",
        r"(?:Subject|RE|FW):\s*.*?(?:PO|Purchase Order)\s*[#:]?\s*(\d+)",
        r"(?m)^PO:?\s*(\d+)\s*$",
        r"(?m)^Purchase Order:?\s*(\d+)\s*$",
    ])
});

static PO_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)PO|Purchase Order|Order Number").expect("static pattern compiles"));
static DIGIT_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b\d{5,10}\b").expect("static pattern compiles"));

pub fn is_likely_po_number(candidate: &str) -> bool {
    let digits = candidate.chars().filter(char::is_ascii_digit).count();
    (5..=15).contains(&digits) && !NOT_A_PO.iter().any(|re| re.is_match(candidate))
}

/// Numeric PO number for change emails, which tend to quote an ERP number
/// rather than a free-form reference.
pub fn extract_numeric_po_number(text: &str) -> Option<String> {
    for re in NUMERIC_CONTEXTS.iter() {
        for caps in re.captures_iter(text) {
            let candidate = &caps[1];
            if is_likely_po_number(candidate) {
                return Some(candidate.to_string());
            }
        }
    }

    text.lines()
        .filter(|line| PO_LINE.is_match(line))
        .flat_map(|line| DIGIT_RUN.find_iter(line))
        .map(|m| m.as_str())
        .find(|c| is_likely_po_number(c))
        .map(str::to_string)
}

// ── Deterministic fallback ──

static PRICE_UPDATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)price updated to \$(\d+(?:\.\d+)?)").expect("static pattern compiles"));
static QUANTITY_UPDATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)quantity updated to (\d+)").expect("static pattern compiles"));
static DELIVERY_UPDATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)delivery date changed to (\d{1,2} \w+ \d{4})").expect("static pattern compiles")
});
static EDITED_DATES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:Edited|Changed).*?(\d{1,2} \w+ \d{4}).*?(\d{1,2} \w+ \d{4})").expect("static pattern compiles")
});

/// Changes recognisable without the semantic service.
pub fn fallback_changes(text: &str) -> FieldChanges {
    let mut changes = FieldChanges::new();
    if let Some(caps) = PRICE_UPDATE.captures(text) {
        changes.insert("unit_price", FieldDelta::new(Value::Null, &caps[1]));
    }
    if let Some(caps) = QUANTITY_UPDATE.captures(text) {
        changes.insert("quantity", FieldDelta::new(Value::Null, &caps[1]));
    }
    if let Some(caps) = DELIVERY_UPDATE.captures(text) {
        changes.insert("delivery_date", FieldDelta::new(Value::Null, &caps[1]));
    } else if let Some(caps) = EDITED_DATES.captures(text) {
        changes.insert("delivery_date", FieldDelta::new(&caps[1], &caps[2]));
    }
    changes
}

// ── Semantic reply ──

const ENVELOPE_KEYS: &[&str] = &[
    "po_change_exist",
    "po_change_exists",
    "po_no",
    "purchase_order_number",
    "recognized_changes",
    "extra_changes",
    "timestamp",
];

fn delta_text(value: &Value) -> String {
    match value {
        Value::Object(map) => map
            .get("new_value")
            .or_else(|| map.get("previous_value"))
            .map(value_text)
            .unwrap_or_default(),
        other => value_text(other),
    }
}

/// Bring a semantic reply into `ChangeLog` shape. Empty strings are pruned
/// first, and changes the model left at top level are filed under
/// `recognized_changes`.
pub fn normalize_reply(reply: &Value, detected_po: &str) -> ChangeLog {
    let reply = path::prune_empty(reply);
    let field = |key: &str| reply.get(key).map(delta_text).filter(|s| !s.trim().is_empty());

    let po_no = field("po_no")
        .or_else(|| field("purchase_order_number"))
        .or_else(|| path::get(&reply, "recognized_changes.purchase_order_number").map(delta_text))
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| detected_po.to_string());

    let section = |key: &str| reply.get(key).map(FieldChanges::from_value).unwrap_or_default();
    let mut recognized = section("recognized_changes");
    let extra = section("extra_changes");

    if recognized.is_empty() && extra.is_empty() {
        let loose: Map<String, Value> = reply
            .as_object()
            .map(|map| {
                map.iter()
                    .filter(|(k, v)| !ENVELOPE_KEYS.contains(&k.as_str()) && (v.is_object() || v.is_array()))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect()
            })
            .unwrap_or_default();
        recognized = FieldChanges::from_value(&Value::Object(loose));
    }

    let flagged = reply
        .get("po_change_exist")
        .or_else(|| reply.get("po_change_exists"))
        .is_some_and(value_flag);

    let mut log = ChangeLog::no_change(po_no, Utc::now());
    log.recognized_changes = recognized;
    log.extra_changes = extra;
    log.po_change_exist = flagged || log.has_changes();
    log
}

fn build_prompt(email_text: &str) -> Result<String> {
    let template = serde_json::to_string_pretty(&PurchaseOrderRecord::default())?;
    Ok(format!(
        r#"The email below amends an existing purchase order. Identify every field it changes.

Record fields:
{template}

Rules:
1. For each change that maps to one of the record fields, add an entry under
   "recognized_changes" keyed by the field name: {{"previous_value": "...", "new_value": "..."}}.
   Use an empty previous_value when the email does not state it.
2. Changes that fit none of the record fields go under "extra_changes" in the same shape.
3. Report item changes as "item": [{{"manufacturer_item_id": {{...}}, "quantity": {{...}}}}].
4. Set "po_change_exist" to "true" only when at least one change was found.

Return ONLY valid JSON:
{{"po_change_exist": "true", "po_no": "string", "recognized_changes": {{}}, "extra_changes": {{}}}}

Email:
{email_text}"#
    ))
}

/// Turns amendment emails into persisted change logs.
pub struct ChangeLogProducer {
    store: Arc<dyn DocumentStore>,
    semantic: Option<Arc<dyn SemanticService>>,
    retry: RetryPolicy,
}

impl ChangeLogProducer {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            semantic: None,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_semantic(mut self, service: Arc<dyn SemanticService>, retry: RetryPolicy) -> Self {
        self.semantic = Some(service);
        self.retry = retry;
        self
    }

    async fn ask_semantic(&self, email_text: &str, detected_po: &str) -> Result<Option<ChangeLog>> {
        let Some(service) = self.semantic.as_ref() else {
            return Ok(None);
        };
        let prompt = build_prompt(email_text)?;
        let Some(raw) = complete_with_retry(service.as_ref(), &prompt, &self.retry, "change_log").await else {
            return Ok(None);
        };
        match json_object(&raw) {
            Some(reply) => Ok(Some(normalize_reply(&reply, detected_po))),
            None => {
                tracing::warn!("Change-log reply held no JSON object");
                Ok(None)
            }
        }
    }

    /// Build the change log for one email and persist it. Returns the log
    /// and its document id.
    #[tracing::instrument(skip_all)]
    pub async fn produce(&self, email_text: &str) -> Result<(ChangeLog, String)> {
        let text = email_text.replace("\r\n", "\n");
        let detected_po = extract_numeric_po_number(&text)
            .or_else(|| extract_po_number(&text))
            .unwrap_or_default();

        let log = if is_order_change_email(&text) {
            let mut log = self
                .ask_semantic(&text, &detected_po)
                .await?
                .unwrap_or_else(|| ChangeLog::no_change(detected_po.clone(), Utc::now()));
            if log.recognized_changes.is_empty() {
                let fallback = fallback_changes(&text);
                if !fallback.is_empty() {
                    tracing::info!(fields = fallback.len(), "Using pattern fallback for change log");
                    log.recognized_changes = fallback;
                }
            }
            log.po_change_exist = log.po_change_exist || log.has_changes();
            log
        } else {
            tracing::info!(po_no = %detected_po, "Email does not describe an order change");
            ChangeLog::no_change(detected_po, Utc::now())
        };

        let document_id = self
            .store
            .insert_one(collections::CHANGE_LOGS, serde_json::to_value(&log)?)
            .await?;
        tracing::info!(
            po_no = %log.po_no,
            po_change_exist = log.po_change_exist,
            recognized = log.recognized_changes.len(),
            extra = log.extra_changes.len(),
            document_id = %document_id,
            "Change log stored"
        );
        Ok((log, document_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use poflow_core::error::PoflowError;
    use poflow_store::InMemoryStore;
    use serde_json::json;

    struct Reply(String);

    #[async_trait]
    impl SemanticService for Reply {
        async fn complete(&self, _prompt: &str) -> Result<String> {
            Ok(self.0.clone())
        }
    }

    struct Down;

    #[async_trait]
    impl SemanticService for Down {
        async fn complete(&self, _prompt: &str) -> Result<String> {
            Err(PoflowError::SemanticUnavailable("offline".into()))
        }
    }

    #[test]
    fn test_is_order_change_email() {
        assert!(is_order_change_email("Subject: Purchase Order (Changed) 4500012"));
        assert!(is_order_change_email("Your order has been modified as requested"));
        assert!(!is_order_change_email("Please find our new purchase order attached"));
    }

    #[test]
    fn test_is_likely_po_number() {
        assert!(is_likely_po_number("9876543"));
        assert!(!is_likely_po_number("1234"));
        assert!(!is_likely_po_number("2025-07-10"));
        assert!(!is_likely_po_number("(555) 123-4567"));
        assert!(!is_likely_po_number("+4915112345"));
        assert!(!is_likely_po_number("1234567890123456"));
    }

    #[test]
    fn test_extract_numeric_po_number() {
        assert_eq!(
            extract_numeric_po_number("Purchase Order (Changed) 9876543 was updated").as_deref(),
            Some("9876543")
        );
        assert_eq!(extract_numeric_po_number("PO Number: 4500012").as_deref(), Some("4500012"));
        assert_eq!(
            extract_numeric_po_number("Call +49 1511 2345\nRegarding order number ref 88123456 today").as_deref(),
            Some("88123456")
        );
        assert_eq!(extract_numeric_po_number("PO 12 only"), None);
    }

    #[test]
    fn test_fallback_changes() {
        let text = "The price updated to $12.50 and quantity updated to 40.\nDelivery date changed to 10 July 2025.";
        let changes = fallback_changes(text);
        assert_eq!(changes.get("unit_price").unwrap().new_value, json!("12.50"));
        assert_eq!(changes.get("quantity").unwrap().new_value, json!("40"));
        assert_eq!(changes.get("delivery_date").unwrap().new_value, json!("10 July 2025"));

        let edited = fallback_changes("Changed delivery from 1 June 2025 to 15 June 2025");
        let delta = edited.get("delivery_date").unwrap();
        assert_eq!(delta.previous_value, json!("1 June 2025"));
        assert_eq!(delta.new_value, json!("15 June 2025"));
    }

    #[test]
    fn test_normalize_reply_reads_po_from_nested_field() {
        let reply = json!({
            "po_change_exist": "true",
            "recognized_changes": {
                "purchase_order_number": {"previous_value": "", "new_value": "9876543"},
                "payment_terms": {"previous_value": "NET 30", "new_value": "Net 75 Days to pay the bill"},
                "tax_percentage": {"previous_value": "", "new_value": ""}
            },
            "extra_changes": {"ShippingMethod": {"new_value": "Expedited"}}
        });
        let log = normalize_reply(&reply, "");
        assert_eq!(log.po_no, "9876543");
        assert!(log.po_change_exist);
        assert_eq!(
            log.recognized_changes.get("payment_terms").unwrap().new_value,
            json!("Net 75 Days to pay the bill")
        );
        assert!(log.recognized_changes.get("tax_percentage").is_none());
        assert_eq!(log.extra_changes.get("ShippingMethod").unwrap().new_value, json!("Expedited"));
    }

    #[test]
    fn test_normalize_reply_collects_loose_deltas() {
        let reply = json!({
            "po_no": 4500012,
            "DeliveryDate": {"previous_value": "", "new_value": "July 10, 2025"},
            "note": "free text"
        });
        let log = normalize_reply(&reply, "fallback");
        assert_eq!(log.po_no, "4500012");
        assert_eq!(log.recognized_changes.len(), 1);
        assert_eq!(
            log.recognized_changes.get("DeliveryDate").unwrap().new_value,
            json!("July 10, 2025")
        );
    }

    #[tokio::test]
    async fn test_non_change_email_is_logged_without_changes() {
        let store = Arc::new(InMemoryStore::new());
        let producer = ChangeLogProducer::new(store.clone());
        let (log, _) = producer.produce("PO Number: 4500012\n\nPlease ship as planned.").await.unwrap();

        assert!(!log.po_change_exist);
        assert_eq!(log.po_no, "4500012");
        assert!(!log.has_changes());
        let stored = store.all(collections::CHANGE_LOGS).await;
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].body["po_change_exist"], "false");
    }

    #[tokio::test]
    async fn test_change_email_uses_semantic_reply() {
        let store = Arc::new(InMemoryStore::new());
        let reply = r#"Sure:
```json
{"po_change_exist": "true", "po_no": "9876543",
 "recognized_changes": {"DeliveryDate": {"previous_value": "", "new_value": "July 10, 2025"}},
 "extra_changes": {}}
```"#;
        let producer = ChangeLogProducer::new(store.clone())
            .with_semantic(Arc::new(Reply(reply.into())), RetryPolicy::immediate(1));
        let (log, id) = producer
            .produce("Subject: Purchase Order (Changed) 9876543\n\nDelivery moved to July 10, 2025.")
            .await
            .unwrap();

        assert!(log.po_change_exist);
        assert_eq!(log.po_no, "9876543");
        assert_eq!(
            log.recognized_changes.get("DeliveryDate").unwrap().new_value,
            json!("July 10, 2025")
        );
        assert_eq!(store.all(collections::CHANGE_LOGS).await[0].id, id);
    }

    #[tokio::test]
    async fn test_change_email_falls_back_to_patterns() {
        let store = Arc::new(InMemoryStore::new());
        let producer = ChangeLogProducer::new(store).with_semantic(Arc::new(Down), RetryPolicy::immediate(2));
        let (log, _) = producer
            .produce("Subject: Order update for PO Number 4500012\n\nThe quantity updated to 25.")
            .await
            .unwrap();

        assert!(log.po_change_exist);
        assert_eq!(log.po_no, "4500012");
        assert_eq!(log.recognized_changes.get("quantity").unwrap().new_value, json!("25"));
    }
}
