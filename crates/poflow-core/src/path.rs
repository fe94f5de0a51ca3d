//! Dotted field paths over JSON documents: `order.delivery_date`,
//! `item[2].quantity`.

use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Key(String),
    Index(usize),
}

pub fn parse(path: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    for part in path.split('.').filter(|p| !p.is_empty()) {
        let Some(open) = part.find('[') else {
            segments.push(Segment::Key(part.to_string()));
            continue;
        };
        let key = &part[..open];
        let mut indices = Vec::new();
        let mut rest = &part[open..];
        while let Some(stripped) = rest.strip_prefix('[') {
            let Some(close) = stripped.find(']') else { break };
            match stripped[..close].trim().parse::<usize>() {
                Ok(i) => indices.push(i),
                Err(_) => break,
            }
            rest = &stripped[close + 1..];
        }
        if !rest.is_empty() {
            // Not a well-formed index suffix; keep the whole part as a key.
            segments.push(Segment::Key(part.to_string()));
            continue;
        }
        if !key.is_empty() {
            segments.push(Segment::Key(key.to_string()));
        }
        segments.extend(indices.into_iter().map(Segment::Index));
    }
    segments
}

pub fn join(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

pub fn get<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    parse(path).iter().try_fold(root, |node, segment| match segment {
        Segment::Key(k) => node.get(k.as_str()),
        Segment::Index(i) => node.get(*i),
    })
}

/// Write `value` at `path`, creating intermediate objects as needed. An index
/// may address an existing element or append at the end. Returns false when
/// the path runs through a scalar or past the end of an array.
pub fn set(root: &mut Value, path: &str, value: Value) -> bool {
    set_in(root, &parse(path), value)
}

fn set_in(node: &mut Value, segments: &[Segment], value: Value) -> bool {
    let Some((first, rest)) = segments.split_first() else {
        *node = value;
        return true;
    };
    match first {
        Segment::Key(k) => {
            if node.is_null() {
                *node = Value::Object(Map::new());
            }
            let Value::Object(map) = node else {
                return false;
            };
            let child = map.entry(k.clone()).or_insert(Value::Null);
            set_in(child, rest, value)
        }
        Segment::Index(i) => {
            if node.is_null() {
                *node = Value::Array(Vec::new());
            }
            let Value::Array(items) = node else {
                return false;
            };
            if *i == items.len() {
                items.push(Value::Null);
            }
            match items.get_mut(*i) {
                Some(child) => set_in(child, rest, value),
                None => false,
            }
        }
    }
}

/// Recursively drop empty strings and nulls from objects and arrays.
pub fn prune_empty(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(_, v)| !is_blank_scalar(v))
                .map(|(k, v)| (k.clone(), prune_empty(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(
            items.iter().filter(|v| !is_blank_scalar(v)).map(prune_empty).collect(),
        ),
        other => other.clone(),
    }
}

fn is_blank_scalar(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

/// Empty string, null, or an empty container.
pub fn is_blank(value: &Value) -> bool {
    match value {
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        other => is_blank_scalar(other),
    }
}
