use std::sync::LazyLock;

use regex::Regex;

static EXPLICIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)PO\s+number:?\s+([A-Za-z0-9\-_/]{3,})").expect("static pattern compiles"));

static CANDIDATES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)(?:^|\s)PO\s*(?:number|#|no|num)?[:.\s]*\s*([A-Za-z0-9\-_/]{3,})(?:\s|$)",
        r"(?i)(?:^|\s)(?:purchase\s+order|reference\s+po)[\s:]*([A-Za-z0-9\-_/]{3,})(?:\s|$)",
        r"(?i)(?:^|\s)(?:ref|reference)\s*(?:number|#|no)?[\s:]*([A-Za-z0-9\-_/]{3,})(?:\s|$)",
        r"(?i)(?:^|\s)(?:order|confirmation)\s*(?:number|#|no)?[\s:]*([A-Za-z0-9\-_/]{3,})(?:\s|$)",
        r"(?i)(?:^|\s)purchase\s+order[:\s]*(?:#|no\.?)?[:\s]*([A-Za-z0-9\-_/]{3,})(?:\s|$)",
        r"(?i)(?:^|\s)use\s+PO\s+([A-Za-z0-9\-_/]{3,})(?:\s|$)",
        r"(?i)(?:^|\s)new\s+PO\s+([A-Za-z0-9\-_/]{3,})(?:\s|$)",
        r"(?i)(?:^|\s)new\s+order\s+([A-Za-z0-9\-_/]{3,})(?:\s|$)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static pattern compiles"))
    .collect()
});

static SUBJECT_CANDIDATES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)purchase\s+order\s+([A-Za-z0-9\-_/]+)",
        r"(?i)\bPO\s*(?:number|#|no|num)?[:\s]*([A-Za-z0-9\-_/]+)",
        r"(?i)\bORDER\s+([A-Za-z0-9\-_/]+)",
        r"(?i)\bPO\s+([A-Za-z0-9\-_/]+)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static pattern compiles"))
    .collect()
});

/// Everything after the first blank line; the whole text when there is none.
pub fn body_of(text: &str) -> &str {
    text.split_once("\n\n").map_or(text, |(_, body)| body)
}

fn has_digit(candidate: &str) -> bool {
    candidate.chars().any(|c| c.is_ascii_digit())
}

fn first_candidate(pattern: &Regex, text: &str, min_len: usize) -> Option<String> {
    pattern
        .captures_iter(text)
        .map(|c| c[1].to_string())
        .find(|c| c.len() >= min_len && has_digit(c))
}

/// Locate the PO number. An explicit "PO number: X" in the body wins, then
/// the labelled patterns over the body, then any `Subject:` line.
pub fn extract_po_number(text: &str) -> Option<String> {
    let body = body_of(text);

    if let Some(caps) = EXPLICIT.captures(body) {
        return Some(caps[1].to_string());
    }

    if let Some(found) = CANDIDATES.iter().find_map(|p| first_candidate(p, body, 3)) {
        return Some(found);
    }

    text.lines()
        .filter(|l| l.to_lowercase().contains("subject:"))
        .find_map(|line| SUBJECT_CANDIDATES.iter().find_map(|p| first_candidate(p, line, 1)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_label_wins() {
        let text = "Subject: Order 111222\n\nHello,\nPO number: L21335\nOrder 998877 attached";
        assert_eq!(extract_po_number(text).as_deref(), Some("L21335"));
    }

    #[test]
    fn test_labelled_patterns_need_a_digit() {
        let text = "Subject: hi\n\nPlease see the pointer below. Kindly use PO 4500012 for billing.";
        assert_eq!(extract_po_number(text).as_deref(), Some("4500012"));
    }

    #[test]
    fn test_purchase_order_label() {
        let text = "Header\n\nWe send Purchase Order #: 7788-A today.";
        assert_eq!(extract_po_number(text).as_deref(), Some("7788-A"));
    }

    #[test]
    fn test_subject_line_fallback() {
        let text = "Subject: Re: PO 9876543 quantity update\n\nPlease raise the pump count to 6.";
        assert_eq!(extract_po_number(text).as_deref(), Some("9876543"));
    }

    #[test]
    fn test_subject_words_without_digits_are_ignored() {
        let text = "Subject: Order Confirmation\n\nThanks for the call.";
        assert_eq!(extract_po_number(text), None);
    }

    #[test]
    fn test_no_blank_line_uses_whole_text() {
        assert_eq!(body_of("one line only"), "one line only");
        assert_eq!(body_of("head\n\nbody\n\nmore"), "body\n\nmore");
    }
}
