use serde_json::Value;

pub const INITIAL_VERSION: &str = "V1";

/// Numeric suffix of a `V<n>` tag. Anything else ranks as 0.
pub fn version_number(tag: &str) -> u64 {
    tag.trim()
        .strip_prefix(|c: char| c == 'V' || c == 'v')
        .and_then(|n| n.parse().ok())
        .unwrap_or(0)
}

/// `V<n>` becomes `V<n+1>`; other shapes have no successor.
pub fn next_version(tag: &str) -> Option<String> {
    let n: u64 = tag.trim().strip_prefix('V')?.parse().ok()?;
    Some(format!("V{}", n + 1))
}

pub fn document_version(body: &Value) -> &str {
    body.get("version").and_then(Value::as_str).unwrap_or("")
}

/// The entry with the highest version number. Ties go to the later entry.
pub fn latest_by<T, F>(entries: &[T], version_of: F) -> Option<&T>
where
    F: Fn(&T) -> &str,
{
    entries.iter().max_by_key(|e| version_number(version_of(*e)))
}
