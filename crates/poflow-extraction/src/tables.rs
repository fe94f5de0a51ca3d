use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

const SECTION_START: &str = "**Items Ordered:**";
const SECTION_END: &str = "**Total PO Value:";
const HEADER_HINTS: [&str; 5] = ["item code", "description", "quantity", "unit price", "total"];

static TOTAL_VALUE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*Total PO Value:\*\*\s*([\d₹,\.]+)").expect("static pattern compiles"));

static BULLET_ITEM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[-•*]\s+([A-Za-z0-9\-_/]+):\s*(\d+)\s+(?i:units?|pcs?|pieces?)")
        .expect("static pattern compiles")
});

/// Rows of the markdown table under "**Items Ordered:**", keyed by the
/// lowercased header cells.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemTable {
    pub rows: Vec<BTreeMap<String, String>>,
    pub total_po_value: Option<String>,
}

impl ItemTable {
    /// (item code, quantity) for every row carrying both columns.
    pub fn items(&self) -> impl Iterator<Item = (&str, &str)> {
        self.rows.iter().filter_map(|row| {
            Some((row.get("item code")?.as_str(), row.get("quantity")?.as_str()))
        })
    }
}

fn inner_cells(line: &str) -> Vec<String> {
    let parts: Vec<&str> = line.split('|').collect();
    if parts.len() < 2 {
        return Vec::new();
    }
    parts[1..parts.len() - 1]
        .iter()
        .map(|c| c.trim().to_string())
        .collect()
}

fn is_separator(line: &str) -> bool {
    line.contains('-') && line.chars().all(|c| matches!(c, '-' | '|' | ':' | ' '))
}

pub fn extract_item_table(text: &str) -> ItemTable {
    let Some(start) = text.find(SECTION_START) else {
        return ItemTable::default();
    };
    let section = &text[start..];
    let section = section.find(SECTION_END).map_or(section, |end| &section[..end]);

    let total_po_value = TOTAL_VALUE.captures(text).map(|c| c[1].trim().to_string());
    let lines: Vec<&str> = section.lines().map(str::trim).filter(|l| !l.is_empty()).collect();

    let header_at = lines.iter().position(|line| {
        let lower = line.to_lowercase();
        line.contains('|') && HEADER_HINTS.iter().any(|h| lower.contains(h))
    });
    let Some(header_at) = header_at else {
        return ItemTable { rows: Vec::new(), total_po_value };
    };
    if !lines.get(header_at + 1).is_some_and(|l| is_separator(l)) {
        return ItemTable { rows: Vec::new(), total_po_value };
    }

    let headers: Vec<String> = inner_cells(lines[header_at])
        .into_iter()
        .map(|h| h.to_lowercase())
        .collect();

    let rows = lines[header_at + 2..]
        .iter()
        .filter(|line| line.matches('|').count() == headers.len() + 1)
        .map(|line| inner_cells(line))
        .filter(|cells| cells.len() == headers.len())
        .map(|cells| headers.iter().cloned().zip(cells).collect())
        .collect();

    ItemTable { rows, total_po_value }
}

/// "- CODE: N units" anywhere in the text, one pair per hit.
pub fn bullet_items(text: &str) -> Vec<(String, String)> {
    BULLET_ITEM
        .captures_iter(text)
        .map(|c| (c[1].to_string(), c[2].to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE_EMAIL: &str = "\
Dear Sales,

**Items Ordered:**

| Item Code | Description | Quantity | Unit Price |
|-----------|-------------|----------|------------|
| HX-440 | Heat exchanger | 2 | ₹12,000 |
| VALVE-22 | Ball valve | 8 | ₹900 |
| broken row |

**Total PO Value:** ₹31,200
";

    #[test]
    fn test_extract_item_table() {
        let table = extract_item_table(TABLE_EMAIL);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0]["description"], "Heat exchanger");
        assert_eq!(table.total_po_value.as_deref(), Some("₹31,200"));

        let items: Vec<_> = table.items().collect();
        assert_eq!(items, vec![("HX-440", "2"), ("VALVE-22", "8")]);
    }

    #[test]
    fn test_table_without_separator_yields_no_rows() {
        let text = "**Items Ordered:**\n| Item Code | Quantity |\n| HX-440 | 2 |";
        assert!(extract_item_table(text).rows.is_empty());
    }

    #[test]
    fn test_padded_separator_is_accepted() {
        let text = "**Items Ordered:**\n| Item Code | Quantity |\n| --- | :---: |\n| HX-440 | 2 |";
        let table = extract_item_table(text);
        assert_eq!(table.items().collect::<Vec<_>>(), vec![("HX-440", "2")]);
    }

    #[test]
    fn test_no_section() {
        assert_eq!(extract_item_table("| a | b |"), ItemTable::default());
    }

    #[test]
    fn test_bullet_items() {
        let text = "Need:\n- PUMP-7: 3 units\n* RING-9: 40 pcs\n- steel rod bar: 5 units";
        assert_eq!(
            bullet_items(text),
            vec![
                ("PUMP-7".to_string(), "3".to_string()),
                ("RING-9".to_string(), "40".to_string())
            ]
        );
    }
}
