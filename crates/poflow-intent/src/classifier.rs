use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use tokio::sync::RwLock;

use poflow_core::intent::{Intent, LABEL_NEW_PO, LABEL_PO_CANCELLATION, LABEL_PO_CHANGE};
use poflow_core::semantic::{complete_with_retry, RetryPolicy, SemanticService};
use poflow_core::store::DocumentStore;

use crate::config::ClassifierConfig;
use crate::detectors::{standard_detectors, IntentDetector};

static SUBJECT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)Subject:\s*(.*)").expect("static pattern compiles"));

/// First `Subject:` header value, with folded continuation lines joined and
/// whitespace collapsed.
pub fn extract_subject(email_text: &str) -> String {
    let mut lines = email_text.lines();
    while let Some(line) = lines.next() {
        let Some(caps) = SUBJECT.captures(line) else {
            continue;
        };
        let mut subject = caps[1].to_string();
        for folded in lines.by_ref() {
            if folded.trim().is_empty() || !folded.starts_with([' ', '\t']) {
                break;
            }
            subject.push(' ');
            subject.push_str(folded);
        }
        return clean(&subject, false);
    }
    String::new()
}

fn clean(text: &str, lowercase: bool) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if lowercase {
        collapsed.to_lowercase()
    } else {
        collapsed
    }
}

/// Lowercase and collapse whitespace.
pub fn clean_text(text: &str) -> String {
    clean(text, true)
}

/// (subject hit, body hit) points for a label.
fn keyword_weights(label: &str) -> (u32, u32) {
    match Intent::from_label(label) {
        Intent::PoCancellation => (5, 3),
        Intent::PoChange => (4, 2),
        Intent::NewPo => (3, 2),
        _ => (3, 1),
    }
}

const TIE_PRIORITY: [Intent; 3] = [Intent::PoCancellation, Intent::PoChange, Intent::NewPo];

/// Highest keyword score, or `None` when nothing scored.
pub fn keyword_match(config: &ClassifierConfig, subject: &str, body: &str) -> Option<String> {
    let subject = clean_text(subject);
    let body = clean_text(body);

    let scores: Vec<(&str, u32)> = config
        .actions()
        .iter()
        .map(|action| {
            let (in_subject, in_body) = keyword_weights(&action.label);
            let score = action
                .keywords
                .iter()
                .map(|k| {
                    let mut points = 0;
                    if subject.contains(k.as_str()) {
                        points += in_subject;
                    }
                    if body.contains(k.as_str()) {
                        points += in_body;
                    }
                    points
                })
                .sum();
            (action.label.as_str(), score)
        })
        .collect();

    let best = scores.iter().map(|(_, s)| *s).max().unwrap_or(0);
    if best == 0 {
        return None;
    }
    let tied: Vec<&str> = scores
        .iter()
        .filter(|(_, s)| *s == best)
        .map(|(label, _)| *label)
        .collect();

    TIE_PRIORITY
        .iter()
        .find_map(|p| tied.iter().find(|l| Intent::from_label(l) == *p))
        .or_else(|| tied.first())
        .map(|l| l.to_string())
}

/// Map a free-text semantic reply onto a configured label.
pub fn map_reply(config: &ClassifierConfig, reply: &str) -> Option<String> {
    let reply = reply.trim();
    if config.has_label(reply) {
        return Some(reply.to_string());
    }

    let lower = reply.to_lowercase();
    if let Some(label) = config.labels().into_iter().find(|l| lower.contains(&l.to_lowercase())) {
        return Some(label.to_string());
    }

    const CANONICAL: [(&[&str], &str); 3] = [
        (&["cancel", "terminat", "revoke"], LABEL_PO_CANCELLATION),
        (&["change", "modify", "amend", "revise"], LABEL_PO_CHANGE),
        (&["new", "create", "request", "submit"], LABEL_NEW_PO),
    ];
    CANONICAL
        .iter()
        .filter(|(_, label)| config.has_label(label))
        .find(|(terms, _)| terms.iter().any(|t| lower.contains(t)))
        .map(|(_, label)| label.to_string())
}

fn build_prompt(config: &ClassifierConfig, email_text: &str, subject: &str) -> String {
    let labels = config
        .labels()
        .iter()
        .map(|l| format!("- {l}"))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Analyze the email below.\n\nSubject: {subject}\n\nContent:\n{email_text}\n\n\
         Choose EXACTLY ONE of these labels:\n{labels}\n\n\
         Reply with the exact label text and nothing else."
    )
}

/// Classifies emails against a reloadable label configuration: phrase
/// detectors first, then keyword scoring, then the semantic service.
pub struct IntentClassifier {
    config: RwLock<Arc<ClassifierConfig>>,
    detectors: Vec<Box<dyn IntentDetector>>,
    semantic: Option<Arc<dyn SemanticService>>,
    retry: RetryPolicy,
}

impl IntentClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self {
            config: RwLock::new(Arc::new(config)),
            detectors: standard_detectors(),
            semantic: None,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_semantic(mut self, service: Arc<dyn SemanticService>, retry: RetryPolicy) -> Self {
        self.semantic = Some(service);
        self.retry = retry;
        self
    }

    pub async fn config(&self) -> Arc<ClassifierConfig> {
        self.config.read().await.clone()
    }

    pub async fn replace_config(&self, config: ClassifierConfig) {
        *self.config.write().await = Arc::new(config);
    }

    /// Re-read the label configuration from the store.
    pub async fn reload(&self, store: &dyn DocumentStore) -> Arc<ClassifierConfig> {
        let config = Arc::new(ClassifierConfig::load(store).await);
        *self.config.write().await = config.clone();
        config
    }

    fn detect(&self, config: &ClassifierConfig, email_text: &str, subject: &str) -> Option<String> {
        let body = email_text.to_lowercase();
        let subject = subject.to_lowercase();
        self.detectors
            .iter()
            .filter(|d| config.has_label(d.intent().label()))
            .find(|d| d.fires(&body) || d.fires(&subject))
            .map(|d| d.intent().label().to_string())
    }

    async fn ask_semantic(&self, config: &ClassifierConfig, email_text: &str, subject: &str) -> Option<String> {
        let service = self.semantic.as_ref()?;
        let prompt = build_prompt(config, email_text, subject);
        let reply = complete_with_retry(service.as_ref(), &prompt, &self.retry, "intent").await?;
        let mapped = map_reply(config, &reply);
        if mapped.is_none() {
            tracing::debug!(reply = %reply.trim(), "Semantic intent reply matched no label");
        }
        mapped
    }

    /// The configured label for an email.
    pub async fn classify_label(&self, email_text: &str, subject: &str) -> String {
        let config = self.config().await;

        if let Some(label) = self.detect(&config, email_text, subject) {
            tracing::debug!(label = %label, "Intent decided by phrase detector");
            return label;
        }
        if let Some(label) = keyword_match(&config, subject, email_text) {
            tracing::debug!(label = %label, "Intent decided by keyword score");
            return label;
        }
        if let Some(label) = self.ask_semantic(&config, email_text, subject).await {
            tracing::debug!(label = %label, "Intent decided by semantic service");
            return label;
        }
        config.default_label().to_string()
    }

    #[tracing::instrument(skip_all, fields(subject = %subject))]
    pub async fn classify(&self, email_text: &str, subject: &str) -> Intent {
        let intent = Intent::from_label(&self.classify_label(email_text, subject).await);
        tracing::info!(intent = %intent, "Email classified");
        intent
    }

    pub async fn detect_email_intent(&self, email_text: &str) -> Intent {
        self.classify(email_text, &extract_subject(email_text)).await
    }

    /// Every configured label mapped to whether it is the detected one.
    pub async fn intent_flags(&self, email_text: &str) -> BTreeMap<String, bool> {
        let detected = self.classify_label(email_text, &extract_subject(email_text)).await;
        let config = self.config().await;
        config
            .labels()
            .into_iter()
            .map(|label| (label.to_string(), label == detected))
            .collect()
    }
}
