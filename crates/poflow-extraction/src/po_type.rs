//! Decides whether an email places a new order or refers to an existing one.

use std::sync::LazyLock;

use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoType {
    New,
    Reference,
}

impl PoType {
    pub fn is_reference(self) -> bool {
        self == PoType::Reference
    }
}

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(&format!("(?i){p}")).expect("static pattern compiles"))
        .collect()
}

static NEW_INDICATORS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"buy\s",
        r"new\s+po\b",
        r"new\s+purchase\s+order\b",
        r"(?:would|want|wish)\s+to\s+(?:place|submit|create)\s+(?:an?|the)?\s+order",
        r"(?:would|want|wish)\s+to\s+order",
        r"(?:placing|submitting|creating)\s+(?:an?|the)?\s+(?:new)?\s+order",
        r"(?:please|kindly)\s+process\s+this\s+order",
        r"attached\s+(?:is|are)\s+(?:an?|the|our)\s+(?:new)?\s+order",
    ])
});

static REFERENCE_INDICATORS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"(?:referring|reference|regarding)\s+to\s+(?:po|purchase\s+order)",
        r"with\s+reference\s+to\s+(?:po|purchase\s+order)",
        r"follow(?:[-\s]?up)?\s+(?:on|regarding|about)\s+(?:po|purchase\s+order)",
        r"status\s+(?:of|on|for|about)\s+(?:po|purchase\s+order)",
        r"update\s+(?:on|for|about)\s+(?:po|purchase\s+order)",
        r"(?:existing|previous|prior|earlier)\s+(?:po|purchase\s+order)",
        r"track(?:ing)?\s+(?:po|purchase\s+order)",
        r"(?:^|\s)use\s+PO\s+([A-Za-z0-9\-_/]{3,})(?:\s|$)",
        r"(?:inquiry|enquiry|question)\s+(?:about|on|regarding)\s+(?:po|purchase\s+order)",
    ])
});

static ORDERING_PHRASES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"i\s+(?:am|'m)\s+(?:placing|submitting)\s+(?:an?|the)?\s+order",
        r"(?:please|kindly)\s+find\s+(?:an?|the|our|attached)?\s+order",
        r"(?:please|kindly)\s+process\s+(?:an?|the|this|our)?\s+order",
        r"i\s+(?:would|want|wish)\s+to\s+order\b",
        r"(?:please|kindly)\s+(?:consider|treat)\s+this\s+(?:as|like)\s+(?:an?|the)?\s+order",
        r"(?:here|attached)\s+is\s+(?:an?|the|our)?\s+order",
    ])
});

const DIRECT_PHRASES: [&str; 4] = ["placing an order", "place an order", "new order", "i like to order"];

const CONTEXT_RADIUS: usize = 50;

/// The text within fifty characters either side of the PO number, or the first
/// line mentioning it, or the whole text.
fn context_around<'a>(lower: &'a str, po_lower: &str) -> &'a str {
    if po_lower.is_empty() {
        return lower;
    }
    match lower.find(po_lower) {
        Some(at) => {
            let after = at + po_lower.len();
            let start = lower[..at]
                .char_indices()
                .rev()
                .nth(CONTEXT_RADIUS - 1)
                .map_or(0, |(i, _)| i);
            let end = lower[after..]
                .char_indices()
                .nth(CONTEXT_RADIUS)
                .map_or(lower.len(), |(i, _)| after + i);
            &lower[start..end]
        }
        None => lower.lines().find(|l| l.contains(po_lower)).unwrap_or(lower),
    }
}

pub fn determine_po_type(text: &str, po_number: &str) -> PoType {
    let lower = text.to_lowercase();
    let context = context_around(&lower, &po_number.to_lowercase());

    let verdict = if context.contains("new po") || context.contains("new purchase order") {
        Some((PoType::New, "context"))
    } else if NEW_INDICATORS.iter().any(|r| r.is_match(&lower)) {
        Some((PoType::New, "new_indicator"))
    } else if REFERENCE_INDICATORS.iter().any(|r| r.is_match(&lower)) {
        Some((PoType::Reference, "reference_indicator"))
    } else if ORDERING_PHRASES.iter().any(|r| r.is_match(&lower)) {
        Some((PoType::New, "ordering_phrase"))
    } else if DIRECT_PHRASES.iter().any(|p| lower.contains(p)) {
        Some((PoType::New, "direct_phrase"))
    } else {
        None
    };

    match verdict {
        Some((po_type, rule)) => {
            tracing::debug!(po_number, ?po_type, rule, "PO type decided");
            po_type
        }
        None => {
            tracing::debug!(po_number, "No order indicators, treating as reference");
            PoType::Reference
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_po_in_context() {
        let text = "Hi team,\nPlease raise a new PO L21335 for the items below.";
        assert_eq!(determine_po_type(text, "L21335"), PoType::New);
    }

    #[test]
    fn test_new_indicator_anywhere() {
        let text = "Hello,\nWe want to place an order.\n\n\n\nRef 4500012 applies.";
        assert_eq!(determine_po_type(text, "4500012"), PoType::New);
    }

    #[test]
    fn test_reference_indicator() {
        let text = "Regarding our existing PO 4500012, can you share the shipping status?";
        assert_eq!(determine_po_type(text, "4500012"), PoType::Reference);
    }

    #[test]
    fn test_direct_phrase() {
        let text = "This is a new order for our plant. PO number: L21335";
        assert_eq!(determine_po_type(text, "L21335"), PoType::New);
    }

    #[test]
    fn test_default_is_reference() {
        let text = "PO 4500012: please confirm the delivery address.";
        assert_eq!(determine_po_type(text, "4500012"), PoType::Reference);
        assert!(PoType::Reference.is_reference());
    }

    #[test]
    fn test_context_window_respects_multibyte_text() {
        let text = "₹₹₹₹₹₹₹₹₹₹₹₹₹₹₹₹₹₹₹₹₹₹ total for PO 778899 ₹₹₹₹₹₹₹₹₹₹₹₹₹₹₹₹₹₹₹₹";
        let lower = text.to_lowercase();
        let context = context_around(&lower, "778899");
        assert!(context.contains("778899"));
    }

    #[test]
    fn test_context_window_counts_characters() {
        let rupees = |n: usize| "₹".repeat(n);
        let near = format!("new po {} 778899 {} new po", rupees(40), rupees(40));
        let context = context_around(&near, "778899");
        assert!(context.starts_with("new po "));
        assert!(context.ends_with(" new po"));

        let far = format!("new po {} 778899 {} new po", rupees(60), rupees(60));
        let context = context_around(&far, "778899");
        assert!(!context.contains("new po"));
        assert_eq!(context.chars().count(), 50 + "778899".len() + 50);
    }
}
