use serde::{Deserialize, Serialize};

use poflow_core::error::Result;
use poflow_core::intent::{LABEL_NEW_PO, LABEL_OTHER, LABEL_PO_CANCELLATION, LABEL_PO_CHANGE};
use poflow_core::lenient;
use poflow_core::store::{collections, Document, DocumentStore, Filter};

const FALLBACK_LABELS: [&str; 6] = [
    LABEL_NEW_PO,
    "quotation requirement",
    "invoice inquiry",
    LABEL_PO_CANCELLATION,
    LABEL_PO_CHANGE,
    LABEL_OTHER,
];

const OTHER_KEYWORDS: [&str; 4] = ["miscellaneous", "general", "information", "query"];

/// One configured intent label with its scoring keywords (lowercased).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentAction {
    pub label: String,
    pub keywords: Vec<String>,
}

impl IntentAction {
    pub fn new(label: impl Into<String>, keywords: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            label: label.into(),
            keywords: keywords
                .into_iter()
                .map(|k| k.into().trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }
}

/// A stored `intent_actions` document.
#[derive(Debug, Deserialize)]
struct IntentActionDocument {
    #[serde(default, deserialize_with = "lenient::text")]
    action_name: String,
    #[serde(default, deserialize_with = "lenient::text_list")]
    keyword: Vec<String>,
    #[serde(default, deserialize_with = "lenient::flag")]
    is_active: bool,
}

/// The label set and keywords the classifier works from. Always contains
/// an "other" label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassifierConfig {
    actions: Vec<IntentAction>,
}

impl ClassifierConfig {
    pub fn new(actions: Vec<IntentAction>) -> Self {
        let mut config = Self { actions };
        if !config.has_label(LABEL_OTHER) {
            config.actions.push(IntentAction::new(LABEL_OTHER, OTHER_KEYWORDS));
        } else if let Some(other) = config
            .actions
            .iter_mut()
            .find(|a| a.label == LABEL_OTHER && a.keywords.is_empty())
        {
            other.keywords = OTHER_KEYWORDS.iter().map(|k| k.to_string()).collect();
        }
        config
    }

    /// The built-in label list, used when no configuration is stored.
    pub fn fallback() -> Self {
        Self::new(
            FALLBACK_LABELS
                .iter()
                .map(|label| IntentAction::new(*label, Vec::<String>::new()))
                .collect(),
        )
    }

    /// Active documents only; an empty set falls back to the built-ins.
    pub fn from_documents(documents: &[Document]) -> Self {
        let actions: Vec<IntentAction> = documents
            .iter()
            .filter_map(|doc| {
                match serde_json::from_value::<IntentActionDocument>(doc.body.clone()) {
                    Ok(action) => Some(action),
                    Err(e) => {
                        tracing::warn!(id = %doc.id, error = %e, "Skipping malformed intent action");
                        None
                    }
                }
            })
            .filter(|action| action.is_active && !action.action_name.is_empty())
            .map(|action| IntentAction::new(action.action_name, action.keyword))
            .collect();

        if actions.is_empty() {
            Self::fallback()
        } else {
            Self::new(actions)
        }
    }

    pub async fn try_load(store: &dyn DocumentStore) -> Result<Self> {
        let documents = store
            .find_many(collections::INTENT_ACTIONS, &Filter::eq("is_active", true))
            .await?;
        Ok(Self::from_documents(&documents))
    }

    /// Like [`try_load`](Self::try_load), but an unreachable store yields
    /// the fallback configuration.
    pub async fn load(store: &dyn DocumentStore) -> Self {
        match Self::try_load(store).await {
            Ok(config) => {
                tracing::info!(labels = config.actions.len(), "Loaded intent configuration");
                config
            }
            Err(e) => {
                tracing::warn!(error = %e, "Intent configuration unavailable, using built-in labels");
                Self::fallback()
            }
        }
    }

    pub fn actions(&self) -> &[IntentAction] {
        &self.actions
    }

    pub fn labels(&self) -> Vec<&str> {
        self.actions.iter().map(|a| a.label.as_str()).collect()
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.actions.iter().any(|a| a.label == label)
    }

    pub fn default_label(&self) -> &str {
        LABEL_OTHER
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self::fallback()
    }
}
