//! Deterministic phrase detectors, checked before any keyword scoring.

use std::sync::LazyLock;

use regex::Regex;

use poflow_core::intent::Intent;

static PO_WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bpo\b").expect("static pattern compiles"));
static CHANGED_PO: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"purchase\s+order\s*\(changed\)").expect("static pattern compiles"));
static PLACE_ORDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:process|place|submit)\s+.{0,20}\s*order").expect("static pattern compiles"));
static PURCHASE_ORDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"purchase\s+order").expect("static pattern compiles"));
static ALTERED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"changed|cancelled|canceled|modified|amended").expect("static pattern compiles"));

pub trait IntentDetector: Send + Sync {
    fn intent(&self) -> Intent;
    /// `lower` is the lowercased text under test.
    fn fires(&self, lower: &str) -> bool;
}

fn sentences(lower: &str) -> impl Iterator<Item = &str> {
    lower.split(['.', '!', '?'])
}

fn mentions_order(sentence: &str) -> bool {
    sentence.contains("order") || sentence.contains("purchase") || PO_WORD.is_match(sentence)
}

fn contains_any(text: &str, terms: &[&str]) -> bool {
    terms.iter().any(|t| text.contains(t))
}

pub struct CancellationDetector;

impl IntentDetector for CancellationDetector {
    fn intent(&self) -> Intent {
        Intent::PoCancellation
    }

    fn fires(&self, lower: &str) -> bool {
        const PHRASES: &[&str] = &[
            "cancelled an order",
            "cancel an order",
            "has been cancelled",
            "order cancelled",
            "po cancelled",
            "purchase order cancelled",
            "cancel order",
            "cancellation of",
            "order cancellation",
        ];
        contains_any(lower, PHRASES)
            || sentences(lower).any(|s| s.contains("cancel") && mentions_order(s))
    }
}

pub struct ChangeDetector;

impl IntentDetector for ChangeDetector {
    fn intent(&self) -> Intent {
        Intent::PoChange
    }

    fn fires(&self, lower: &str) -> bool {
        const PHRASES: &[&str] = &[
            "changed the po",
            "changed an order",
            "purchase order (changed)",
            "po has been changed",
            "order has been modified",
            "order change notification",
            "modified purchase order",
            "amended order",
            "to change",
            "order change",
            "purchase order amendment",
        ];
        const TERMS: &[&str] = &["changed", "modified", "amended", "revised"];
        contains_any(lower, PHRASES)
            || sentences(lower).any(|s| contains_any(s, TERMS) && mentions_order(s))
            || CHANGED_PO.is_match(lower)
    }
}

pub struct NewPoDetector;

impl IntentDetector for NewPoDetector {
    fn intent(&self) -> Intent {
        Intent::NewPo
    }

    fn fires(&self, lower: &str) -> bool {
        const PHRASES: &[&str] = &[
            "new purchase order",
            "create purchase order",
            "create po",
            "new po",
            "po creation",
            "po request",
            "submit po",
            "request for purchase order",
            "purchase order request",
            "requesting a purchase order",
            "new order request",
            "create a new order",
            "process an order",
            "order from",
            "this is an order",
        ];
        const TERMS: &[&str] = &["new", "create", "submit", "request", "need", "process"];
        const EXCLUDED: &[&str] = &["cancel", "chang", "modif", "amend"];

        if contains_any(lower, PHRASES) {
            return true;
        }
        if sentences(lower)
            .any(|s| contains_any(s, TERMS) && mentions_order(s) && !contains_any(s, EXCLUDED))
        {
            return true;
        }
        !ALTERED.is_match(lower) && (PLACE_ORDER.is_match(lower) || PURCHASE_ORDER.is_match(lower))
    }
}

/// Cancellation, then change, then new-PO.
pub fn standard_detectors() -> Vec<Box<dyn IntentDetector>> {
    vec![
        Box::new(CancellationDetector),
        Box::new(ChangeDetector),
        Box::new(NewPoDetector),
    ]
}
