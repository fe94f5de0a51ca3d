use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use serde_json::{Map, Value};

use poflow_core::api_types::{AmendmentReport, AmendmentState};
use poflow_core::change_log::{ChangeLog, FieldChanges, FieldDelta};
use poflow_core::error::{PoflowError, Result};
use poflow_core::lenient::value_text;
use poflow_core::path;
use poflow_core::record::{timestamp, INTENT_CHANGED};
use poflow_core::response::json_objects;
use poflow_core::semantic::{complete_with_retry, RetryPolicy, SemanticService};
use poflow_core::store::{collections, Document, DocumentStore, Filter, GuardedWrite, VersionGuard};
use poflow_core::version::{document_version, latest_by, next_version};

const RECOGNIZED_STAGE: &str = "recognized_changes";
const EXTRA_STAGE: &str = "extra_changes";

/// Key shapes an amendable PO may be stored under, tried in order.
fn lineage_filters(po_no: &str) -> Vec<Filter> {
    vec![
        Filter::eq("purchase_order_number", po_no),
        Filter::eq("po_number", po_no),
        Filter::eq("po.po_number", po_no),
    ]
}

/// Sales-order linked records keep the old version and get a new one.
fn has_sales_order(record: &Value) -> bool {
    record.get("so_number").map(value_text).is_some_and(|so| !so.is_empty() && so != "None")
}

/// Copy every field of `reply` that differs from `base` into `base`.
/// Returns how many fields changed. Fields missing from the reply are kept,
/// and a blank reply value never replaces a populated one.
fn overlay(base: &mut Value, reply: &Value) -> usize {
    match (base, reply) {
        (Value::Object(base), Value::Object(reply)) => {
            let mut changed = 0;
            for (key, value) in reply {
                if key == "_id" || key == "version" {
                    continue;
                }
                match base.get_mut(key) {
                    Some(existing) => changed += overlay(existing, value),
                    None if !path::is_blank(value) => {
                        base.insert(key.clone(), value.clone());
                        changed += 1;
                    }
                    None => {}
                }
            }
            changed
        }
        (Value::Array(base), Value::Array(reply)) => {
            let mut changed = 0;
            for (i, value) in reply.iter().enumerate() {
                match base.get_mut(i) {
                    Some(existing) => changed += overlay(existing, value),
                    None => {
                        base.push(value.clone());
                        changed += 1;
                    }
                }
            }
            changed
        }
        (base, reply) => {
            if base == reply || (path::is_blank(reply) && !path::is_blank(base)) {
                0
            } else {
                *base = reply.clone();
                1
            }
        }
    }
}

/// Write each change's new value at its path under `prefix`. Returns the
/// paths that could not be written.
fn enforce(record: &mut Value, prefix: &str, changes: &FieldChanges) -> Vec<String> {
    changes
        .iter()
        .filter(|(field, delta)| !path::set(record, &path::join(prefix, field), delta.new_value.clone()))
        .map(|(field, _)| field.clone())
        .collect()
}

/// `item[i].field` split into the change log's line index and the field.
fn item_entry(path: &str) -> Option<(usize, &str)> {
    let (index, field) = path.strip_prefix("item[")?.split_once(']')?;
    Some((index.parse().ok()?, field.strip_prefix('.')?))
}

/// The stored line an item change describes. A `manufacturer_item_id` in the
/// change decides alone; otherwise exactly one line must hold every
/// non-blank previous value.
fn matching_line(lines: &[Value], group: &[(&str, &FieldDelta)]) -> Option<usize> {
    let text = |line: &Value, field: &str| path::get(line, field).map(value_text).unwrap_or_default();

    let id = group
        .iter()
        .find(|(field, _)| *field == "manufacturer_item_id")
        .map(|(_, delta)| match value_text(&delta.previous_value) {
            previous if previous.trim().is_empty() => value_text(&delta.new_value),
            previous => previous,
        })
        .filter(|id| !id.trim().is_empty());
    if let Some(id) = id {
        return lines
            .iter()
            .position(|line| text(line, "manufacturer_item_id").trim().eq_ignore_ascii_case(id.trim()));
    }

    let expected: Vec<(&str, String)> = group
        .iter()
        .map(|(field, delta)| (*field, value_text(&delta.previous_value)))
        .filter(|(_, previous)| !previous.trim().is_empty())
        .collect();
    if expected.is_empty() {
        return None;
    }
    let mut hits = lines
        .iter()
        .enumerate()
        .filter(|(_, line)| expected.iter().all(|(field, previous)| text(*line, *field).trim() == previous.trim()))
        .map(|(i, _)| i);
    match (hits.next(), hits.next()) {
        (Some(i), None) => Some(i),
        _ => None,
    }
}

/// Re-address item changes at the stored line they describe. Returns
/// `(bound, unbound)`; non-item changes are always bound, and item changes
/// that match no single line are left for the semantic merge.
fn bind_item_lines(record: &Value, changes: &FieldChanges) -> (FieldChanges, FieldChanges) {
    let lines = record.get("item").and_then(Value::as_array).map_or(&[][..], Vec::as_slice);
    let mut bound = FieldChanges::new();
    let mut groups: BTreeMap<usize, Vec<(&str, &FieldDelta)>> = BTreeMap::new();
    for (field, delta) in changes.iter() {
        match item_entry(field) {
            Some((index, item_field)) => groups.entry(index).or_default().push((item_field, delta)),
            None => bound.insert(field.clone(), delta.clone()),
        }
    }

    let mut unbound = FieldChanges::new();
    for (index, group) in groups {
        let (target, line) = match matching_line(lines, &group) {
            Some(line) => (&mut bound, line),
            None => {
                tracing::debug!(index, "Item change matches no stored line");
                (&mut unbound, index)
            }
        };
        for (field, delta) in group {
            target.insert(format!("item[{line}].{field}"), delta.clone());
        }
    }
    (bound, unbound)
}

fn recognized_prompt(record: &Value, changes: &FieldChanges) -> Result<String> {
    let record = serde_json::to_string_pretty(&path::prune_empty(record))?;
    let changes = serde_json::to_string_pretty(changes)?;
    Ok(format!(
        r#"Apply purchase order changes to the record below.

For every change, in this order:
1. If a field with exactly that name exists, update it.
2. Otherwise update the field that means the same thing (for example
   "DeliveryDate" is order.delivery_date).
3. Otherwise create the field at the place in the record where it fits best.
Requests for additional handling (for example "please add an invoice") are
appended to the record's instructions.

Do not change or drop any other field.

Record:
{record}

Changes (field -> previous_value / new_value):
{changes}

Return ONLY the complete updated record as valid JSON."#
    ))
}

fn extra_prompt(record: &Value, changes: &FieldChanges) -> Result<String> {
    let record = serde_json::to_string_pretty(record)?;
    let changes = serde_json::to_string_pretty(changes)?;
    Ok(format!(
        r#"Apply the extra changes below to the record's "extra_changes" object only.

For every change: if the field already exists inside "extra_changes", update its
value; otherwise create it inside "extra_changes". Never touch any field outside
"extra_changes".

Record:
{record}

Extra changes (field -> previous_value / new_value):
{changes}

Return ONLY the complete updated record as valid JSON."#
    ))
}

/// Applies change logs to stored purchase orders: merge, version, and one
/// guarded write per amendment.
pub struct AmendmentEngine {
    store: Arc<dyn DocumentStore>,
    semantic: Option<Arc<dyn SemanticService>>,
    retry: RetryPolicy,
}

impl AmendmentEngine {
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

    /// The latest-version document for `po_no` plus the filter its lineage
    /// was found under.
    async fn locate(&self, po_no: &str) -> Result<(Filter, Document)> {
        for filter in lineage_filters(po_no) {
            let docs = self.store.find_many(collections::PURCHASE_ORDERS, &filter).await?;
            if let Some(latest) = latest_by(&docs, |d| document_version(&d.body)) {
                tracing::debug!(
                    candidates = docs.len(),
                    version = %document_version(&latest.body),
                    "Located amendment target"
                );
                return Ok((filter, latest.clone()));
            }
        }
        Err(PoflowError::AmendmentLocateFailed(po_no.to_string()))
    }

    async fn merge_reply(&self, prompt: &str, po_no: &str, stage: &str) -> Result<Value> {
        let failed = || PoflowError::AmendmentMergeFailed {
            po_number: po_no.to_string(),
            stage: stage.to_string(),
        };
        let service = self.semantic.as_ref().ok_or_else(failed)?;
        let raw = complete_with_retry(service.as_ref(), prompt, &self.retry, stage)
            .await
            .ok_or_else(failed)?;
        let mut objects = json_objects(&raw);
        if objects.len() > 1 {
            tracing::debug!(objects = objects.len(), stage, "Merge reply held several records; using the first");
        }
        if objects.is_empty() {
            tracing::warn!(stage, "Merge reply held no JSON object");
            return Err(failed());
        }
        Ok(objects.swap_remove(0))
    }

    async fn merge_recognized(&self, record: &mut Value, po_no: &str, changes: &FieldChanges) -> Result<()> {
        if changes.is_empty() {
            return Ok(());
        }
        let (bound, unbound) = bind_item_lines(record, changes);
        let (present, mut missing) = bound.partition_by_presence(record);
        for (field, delta) in unbound.iter() {
            missing.insert(field.clone(), delta.clone());
        }

        // Fields that already exist are written directly; only the rest need
        // the semantic service to decide where they belong.
        if !missing.is_empty() {
            let prompt = recognized_prompt(record, &missing)?;
            let reply = self.merge_reply(&prompt, po_no, RECOGNIZED_STAGE).await?;
            let changed = overlay(record, &reply);
            tracing::debug!(changed, requested = missing.len(), "Merged recognized changes");
        }

        let unwritten = enforce(record, "", &present);
        if !unwritten.is_empty() {
            tracing::warn!(fields = ?unwritten, "Recognized changes could not be written");
            return Err(PoflowError::AmendmentMergeFailed {
                po_number: po_no.to_string(),
                stage: RECOGNIZED_STAGE.to_string(),
            });
        }
        Ok(())
    }

    async fn merge_extra(&self, record: &mut Value, po_no: &str, changes: &FieldChanges) -> Result<()> {
        if changes.is_empty() {
            return Ok(());
        }
        let prompt = extra_prompt(record, changes)?;
        let reply = self.merge_reply(&prompt, po_no, EXTRA_STAGE).await?;
        let Some(section) = reply.get(EXTRA_STAGE).filter(|v| v.is_object()) else {
            tracing::warn!("Merge reply has no extra_changes object");
            return Err(PoflowError::AmendmentMergeFailed {
                po_number: po_no.to_string(),
                stage: EXTRA_STAGE.to_string(),
            });
        };

        let Value::Object(map) = &mut *record else {
            return Err(PoflowError::Internal("stored PO is not a JSON object".into()));
        };
        let target = map
            .entry(EXTRA_STAGE.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !target.is_object() {
            *target = Value::Object(Map::new());
        }
        overlay(target, section);

        let unwritten = enforce(record, EXTRA_STAGE, changes);
        if !unwritten.is_empty() {
            tracing::warn!(fields = ?unwritten, "Extra changes could not be written");
            return Err(PoflowError::AmendmentMergeFailed {
                po_number: po_no.to_string(),
                stage: EXTRA_STAGE.to_string(),
            });
        }
        Ok(())
    }

    /// Apply one change log. Either every write lands or none does.
    #[tracing::instrument(skip_all, fields(po_no = %log.po_no))]
    pub async fn apply_amendment(&self, log: &ChangeLog) -> Result<AmendmentReport> {
        let log = log.without_blank_entries();
        let po_no = log.po_no.trim().to_string();

        if !log.po_change_exist || !log.has_changes() {
            tracing::info!("No change detected; nothing to amend");
            return Ok(AmendmentReport {
                po_no,
                state: AmendmentState::NoChangeDetected,
                versions: Vec::new(),
                document_ids: Vec::new(),
            });
        }
        if po_no.is_empty() {
            return Err(PoflowError::AmendmentLocateFailed(po_no));
        }

        let (lineage, located) = self.locate(&po_no).await?;
        let expected_latest = document_version(&located.body).to_string();
        let mut record = located.body.clone();
        if !record.is_object() {
            return Err(PoflowError::Internal(format!("stored PO {} is not a JSON object", located.id)));
        }

        self.merge_recognized(&mut record, &po_no, &log.recognized_changes).await?;
        self.merge_extra(&mut record, &po_no, &log.extra_changes).await?;

        record["intent_type"] = Value::from(INTENT_CHANGED);
        record["updated_at"] = Value::from(timestamp(Utc::now()));

        let write = if has_sales_order(&record) {
            if let Some(next) = next_version(&expected_latest) {
                record["version"] = Value::from(next);
            }
            GuardedWrite::Insert { body: record }
        } else {
            GuardedWrite::Replace {
                id: located.id.clone(),
                revision: located.revision,
                body: record,
            }
        };
        let version = match &write {
            GuardedWrite::Insert { body } | GuardedWrite::Replace { body, .. } => document_version(body).to_string(),
        };

        let guard = VersionGuard {
            po_number: po_no.clone(),
            lineage,
            expected_latest,
        };
        let document_ids = self
            .store
            .write_guarded(collections::PURCHASE_ORDERS, &guard, vec![write])
            .await?;

        tracing::info!(version = %version, replaced = %located.id, "Amendment persisted");
        Ok(AmendmentReport {
            po_no,
            state: AmendmentState::Persisted,
            versions: vec![version],
            document_ids,
        })
    }
}
