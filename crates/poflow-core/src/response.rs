//! Tolerant parsing of semantic-service replies: code fences, stray prose
//! around the JSON, and replies carrying several objects.

use serde_json::Value;

/// Return the contents of the first triple-backtick block, or the trimmed
/// input when there is none.
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(open) = trimmed.find("```") else {
        return trimmed;
    };
    let after_open = &trimmed[open + 3..];
    // Skip the language tag on the opening fence line.
    let body_start = after_open.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &after_open[body_start..];
    match body.find("```") {
        Some(close) => body[..close].trim(),
        None => body.trim(),
    }
}

/// Top-level balanced `{...}` spans, skipping braces inside JSON strings.
pub fn balanced_objects(text: &str) -> Vec<&str> {
    let mut spans = Vec::new();
    let mut depth = 0usize;
    let mut start = None;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' if depth > 0 => in_string = true,
            '{' => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    if let Some(s) = start.take() {
                        spans.push(&text[s..=i]);
                    }
                }
            }
            _ => {}
        }
    }

    spans
}

/// Every JSON object found in a reply. A top-level array contributes its
/// object elements.
pub fn json_objects(raw: &str) -> Vec<Value> {
    let candidate = strip_code_fences(raw);
    match serde_json::from_str::<Value>(candidate) {
        Ok(Value::Object(map)) => return vec![Value::Object(map)],
        Ok(Value::Array(items)) => {
            let objects: Vec<Value> = items.into_iter().filter(Value::is_object).collect();
            if !objects.is_empty() {
                return objects;
            }
        }
        _ => {}
    }

    balanced_objects(raw)
        .into_iter()
        .filter_map(|span| serde_json::from_str::<Value>(span).ok())
        .filter(Value::is_object)
        .collect()
}

/// The single JSON object a reply is expected to carry.
pub fn json_object(raw: &str) -> Option<Value> {
    let cleaned = strip_code_fences(raw);
    if let Ok(v @ Value::Object(_)) = serde_json::from_str::<Value>(cleaned) {
        return Some(v);
    }

    // First `{` to last `}` covers prose on both sides of one object.
    if let (Some(start), Some(end)) = (raw.find('{'), raw.rfind('}')) {
        if start < end {
            if let Ok(v @ Value::Object(_)) = serde_json::from_str::<Value>(&raw[start..=end]) {
                return Some(v);
            }
        }
    }

    json_objects(raw).into_iter().next()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_strip_fences_with_language_tag() {
        let raw = "```json\n{\"po_number\": \"A-100\"}\n```";
        assert_eq!(strip_code_fences(raw), "{\"po_number\": \"A-100\"}");
    }

    #[test]
    fn test_strip_fences_without_fence_returns_trimmed() {
        assert_eq!(strip_code_fences("  {\"a\": 1}\n"), "{\"a\": 1}");
    }

    #[test]
    fn test_json_object_with_surrounding_prose() {
        let raw = "Sure! Here is the result:\n{\"po_number\": \"7781\", \"items\": []}\nLet me know.";
        assert_eq!(json_object(raw), Some(json!({"po_number": "7781", "items": []})));
    }

    #[test]
    fn test_json_object_rejects_non_json() {
        assert_eq!(json_object("I could not find a purchase order."), None);
        assert_eq!(json_object(""), None);
    }

    #[test]
    fn test_balanced_objects_ignores_braces_in_strings() {
        let raw = r#"first {"note": "a } brace"} then {"b": {"c": 2}}"#;
        let spans = balanced_objects(raw);
        assert_eq!(spans, vec![r#"{"note": "a } brace"}"#, r#"{"b": {"c": 2}}"#]);
    }

    #[test]
    fn test_json_objects_collects_several_documents() {
        let raw = "Record one:\n{\"version\": \"V2\"}\nRecord two:\n{\"version\": \"V3\"}";
        let objects = json_objects(raw);
        assert_eq!(objects.len(), 2);
        assert_eq!(objects[1]["version"], "V3");
    }

    #[test]
    fn test_json_objects_unwraps_top_level_array() {
        let raw = "```\n[{\"a\": 1}, 5, {\"b\": 2}]\n```";
        assert_eq!(json_objects(raw), vec![json!({"a": 1}), json!({"b": 2})]);
    }
}
