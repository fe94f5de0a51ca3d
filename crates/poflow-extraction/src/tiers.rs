//! The line-oriented tier cascade. Each tier is an independent policy object
//! that may claim the line at a cursor; the cascade walks the lines and lets
//! the first claiming tier have each one.

use std::sync::LazyLock;

use regex::Regex;
use unicode_normalization::UnicodeNormalization;

fn re(pattern: &str) -> Regex {
    Regex::new(pattern).expect("static pattern compiles")
}

static UPPERCASE: LazyLock<Regex> = LazyLock::new(|| re(r"[A-Z]"));
static HEADER_WORDS: LazyLock<Regex> = LazyLock::new(|| re(r"(?i)\bdate\b|\bsubject\b|\bfrom\b|\bto\b"));
static HEADER_WORDS_FWD: LazyLock<Regex> =
    LazyLock::new(|| re(r"(?i)\bdate\b|\bsubject\b|\bfrom\b|\bto\b|\bfwd\b"));
static LEADING_DATE: LazyLock<Regex> = LazyLock::new(|| re(r"^\d{1,2}/\d{1,2}/\d{2,4}"));

/// Normalize dashes and compatibility forms, then keep trimmed non-blank lines.
pub fn normalize_lines(text: &str) -> Vec<String> {
    let dashed = text.replace(|c: char| c == '\u{2013}' || c == '\u{2014}', "-");
    let normalized: String = dashed.nfkc().collect();
    normalized
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect()
}

/// Outcome of a tier matching at a cursor. `items` may be empty when the
/// line's shape matched but the code failed acceptance; the line is still
/// claimed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claim {
    pub items: Vec<(String, String)>,
    pub consumed: usize,
}

impl Claim {
    fn single(code: &str, qty: &str) -> Self {
        Self {
            items: vec![(code.trim().to_string(), qty.trim().to_string())],
            consumed: 1,
        }
    }

    fn rejected() -> Self {
        Self { items: Vec::new(), consumed: 1 }
    }
}

pub trait Tier: Send + Sync {
    fn name(&self) -> &'static str;
    fn claim(&self, lines: &[String], at: usize) -> Option<Claim>;
}

/// Which codes a tier accepts once its shape has matched.
#[derive(Debug, Clone, Copy, Default)]
pub struct Acceptance {
    pub require_uppercase: bool,
    pub header_words: Option<&'static LazyLock<Regex>>,
    pub reject_leading_date: bool,
}

impl Acceptance {
    pub fn accepts(&self, code: &str) -> bool {
        let code = code.trim();
        if code.is_empty() {
            return false;
        }
        if self.require_uppercase && !UPPERCASE.is_match(code) {
            return false;
        }
        if let Some(words) = self.header_words {
            if words.is_match(code) {
                return false;
            }
        }
        !(self.reject_leading_date && LEADING_DATE.is_match(code))
    }
}

const PART_CODE: Acceptance = Acceptance {
    require_uppercase: true,
    header_words: None,
    reject_leading_date: false,
};

/// A single-line shape with a code group and a quantity group.
pub struct LineShapeTier {
    name: &'static str,
    shape: Regex,
    code_group: usize,
    qty_group: usize,
    acceptance: Acceptance,
}

impl LineShapeTier {
    pub fn new(
        name: &'static str,
        shape: &str,
        code_group: usize,
        qty_group: usize,
        acceptance: Acceptance,
    ) -> Self {
        Self {
            name,
            shape: re(shape),
            code_group,
            qty_group,
            acceptance,
        }
    }
}

impl Tier for LineShapeTier {
    fn name(&self) -> &'static str {
        self.name
    }

    fn claim(&self, lines: &[String], at: usize) -> Option<Claim> {
        let caps = self.shape.captures(&lines[at])?;
        let code = caps.get(self.code_group).map_or("", |m| m.as_str());
        let qty = caps.get(self.qty_group).map_or("", |m| m.as_str());
        if self.acceptance.accepts(code) && !qty.is_empty() {
            Some(Claim::single(code, qty))
        } else {
            Some(Claim::rejected())
        }
    }
}

/// "<Customer> part number N" with the vendor code on the next line and the
/// quantity within the next few lines.
pub struct PartLabelTier {
    label: Regex,
    vendor_code: Regex,
    dated_qty: Regex,
    unit_qty: Regex,
    window: usize,
}

impl Default for PartLabelTier {
    fn default() -> Self {
        Self {
            label: re(r"(?i)\bpart\s+number\s+(\d+)"),
            vendor_code: re(r"^([A-Za-z0-9\-_/]+)"),
            dated_qty: re(r"\b(\d+)\s+0\s+\d{2}/\d{2}/\d{4}"),
            unit_qty: re(r"\b(\d+)\s+(?i:units?|pcs?|pieces?)?(?:\s|$)"),
            window: 3,
        }
    }
}

impl PartLabelTier {
    fn quantity_near(&self, lines: &[String], from: usize) -> Option<String> {
        let end = (from + self.window).min(lines.len());
        let window = &lines[from..end];
        window
            .iter()
            .find_map(|l| self.dated_qty.captures(l))
            .or_else(|| window.iter().find_map(|l| self.unit_qty.captures(l)))
            .map(|c| c[1].to_string())
    }
}

impl Tier for PartLabelTier {
    fn name(&self) -> &'static str {
        "part_label"
    }

    fn claim(&self, lines: &[String], at: usize) -> Option<Claim> {
        if !self.label.is_match(&lines[at]) {
            return None;
        }
        let Some(next) = lines.get(at + 1) else {
            return Some(Claim::rejected());
        };
        let Some(code) = self.vendor_code.captures(next).map(|c| c[1].to_string()) else {
            return Some(Claim::rejected());
        };
        let items = match self.quantity_near(lines, at + 1) {
            Some(qty) if PART_CODE.accepts(&code) => vec![(code, qty)],
            _ => Vec::new(),
        };
        Some(Claim { items, consumed: 2 })
    }
}

/// A bare code line directly followed by a bare integer line.
pub struct TwoLineTier {
    code: Regex,
    qty: Regex,
}

impl Default for TwoLineTier {
    fn default() -> Self {
        Self {
            code: re(r"^[A-Za-z0-9\-_/]{3,}$"),
            qty: re(r"^\d+$"),
        }
    }
}

impl Tier for TwoLineTier {
    fn name(&self) -> &'static str {
        "two_line"
    }

    fn claim(&self, lines: &[String], at: usize) -> Option<Claim> {
        let next = lines.get(at + 1)?;
        if !self.code.is_match(&lines[at]) || !self.qty.is_match(next) {
            return None;
        }
        Some(Claim {
            items: vec![(lines[at].clone(), next.clone())],
            consumed: 2,
        })
    }
}

/// "Catalog No. X" with "Quantity N EA|PCS" within a few lines either side.
pub struct CatalogTier {
    catalog: Regex,
    qty: Regex,
    radius: usize,
}

impl Default for CatalogTier {
    fn default() -> Self {
        Self {
            catalog: re(r"(?i)Catalog No\.\s+([A-Za-z0-9\-_/]+)"),
            qty: re(r"(?i)Quantity\s+(\d+)\s+(?:EA|PCS)"),
            radius: 5,
        }
    }
}

impl Tier for CatalogTier {
    fn name(&self) -> &'static str {
        "catalog"
    }

    fn claim(&self, lines: &[String], at: usize) -> Option<Claim> {
        let code = self.catalog.captures(&lines[at])?[1].to_string();
        let start = at.saturating_sub(self.radius);
        let end = (at + self.radius).min(lines.len());
        let qty = lines[start..end]
            .iter()
            .find_map(|l| self.qty.captures(l).map(|c| c[1].to_string()));
        match qty {
            Some(qty) if PART_CODE.accepts(&code) => Some(Claim::single(&code, &qty)),
            _ => Some(Claim::rejected()),
        }
    }
}

pub struct TierCascade {
    tiers: Vec<Box<dyn Tier>>,
}

impl TierCascade {
    pub fn new(tiers: Vec<Box<dyn Tier>>) -> Self {
        Self { tiers }
    }

    /// The standard eight-family cascade, highest priority first.
    pub fn standard() -> Self {
        let header_safe = Acceptance {
            require_uppercase: true,
            header_words: Some(&HEADER_WORDS),
            reject_leading_date: false,
        };
        let table_safe = Acceptance {
            require_uppercase: true,
            header_words: Some(&HEADER_WORDS_FWD),
            reject_leading_date: true,
        };
        // Prose names are common in "- name: qty" bullets, so neither the
        // uppercase rule nor the header words apply.
        let colon_bullet = Acceptance::default();

        Self::new(vec![
            Box::new(PartLabelTier::default()),
            Box::new(LineShapeTier::new(
                "qty_prefix",
                r"(?i)^QTY-?\s*(\d+)\s*[=:]\s*([A-Za-z0-9\-_/.\s]+)$",
                2,
                1,
                PART_CODE,
            )),
            Box::new(TwoLineTier::default()),
            Box::new(LineShapeTier::new(
                "bullet_colon",
                r"^[-•*]\s+([A-Za-z0-9\-_/.\s]+):\s*(\d+)\s*(?i:units?|pcs?|pieces?)?$",
                1,
                2,
                colon_bullet,
            )),
            Box::new(LineShapeTier::new(
                "bullet",
                r"^[-•*]\s+([A-Za-z0-9\-_/.\s]+)\s+(\d+)\s*(?i:units?|pcs?|pieces?)?$",
                1,
                2,
                header_safe,
            )),
            Box::new(LineShapeTier::new(
                "table_row",
                r"^([A-Za-z0-9\-_/.\s]+?)\s{2,}(\d+)(?:\s|$)",
                1,
                2,
                table_safe,
            )),
            Box::new(LineShapeTier::new(
                "paren_qty",
                r"\(\s*(\d+)x?\s*\)\s+([A-Za-z0-9\-_/.\s]+?)(?:\s+\([^)]*\))?(?:\s|$)",
                2,
                1,
                PART_CODE,
            )),
            Box::new(CatalogTier::default()),
            Box::new(LineShapeTier::new(
                "price_line",
                r#"(?:Stainless Steel|Ferrule|[A-Za-z\s]+)\s+[A-Za-z0-9/"-]+\s+([A-Za-z0-9\-_/]+)\s+[A-Za-z]+\s+[\d.]+\s+USD\s+(\d+)\s+[A-Za-z]+"#,
                1,
                2,
                PART_CODE,
            )),
        ])
    }

    pub fn tier_names(&self) -> Vec<&'static str> {
        self.tiers.iter().map(|t| t.name()).collect()
    }

    /// First-match-wins over every line. Returns (code, qty) pairs in line
    /// order; duplicates are left for the caller to fold.
    pub fn run(&self, lines: &[String]) -> Vec<(String, String)> {
        let mut items = Vec::new();
        let mut at = 0;
        while at < lines.len() {
            let claimed = self
                .tiers
                .iter()
                .find_map(|tier| tier.claim(lines, at).map(|claim| (tier.name(), claim)));
            match claimed {
                Some((tier, claim)) => {
                    tracing::debug!(tier, line = at, items = claim.items.len(), "Tier claimed line");
                    items.extend(claim.items);
                    at += claim.consumed.max(1);
                }
                None => at += 1,
            }
        }
        items
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(text: &str) -> Vec<String> {
        normalize_lines(text)
    }

    fn claim_of(tier: &dyn Tier, text: &str) -> Option<Claim> {
        tier.claim(&lines(text), 0)
    }

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items.iter().map(|(c, q)| (c.to_string(), q.to_string())).collect()
    }

    #[test]
    fn test_normalize_lines_dashes_and_blanks() {
        assert_eq!(
            normalize_lines("  QTY\u{2013}5: AB-1 \n\n\t\n- X\u{2014}2  "),
            vec!["QTY-5: AB-1".to_string(), "- X-2".to_string()]
        );
        // Full-width digits fold under NFKC.
        assert_eq!(normalize_lines("\u{FF11}\u{FF12}"), vec!["12".to_string()]);
    }

    #[test]
    fn test_part_label_tier_dated_quantity() {
        let text = "Acme part number 100234\nVX-2201-B rev 3\n25 0 07/15/2025";
        let claim = claim_of(&PartLabelTier::default(), text).unwrap();
        assert_eq!(claim.items, pairs(&[("VX-2201-B", "25")]));
        assert_eq!(claim.consumed, 2);
    }

    #[test]
    fn test_part_label_tier_unit_quantity() {
        let text = "Acme part number 100234\nVX-2201-B\nShip 40 pcs";
        let claim = claim_of(&PartLabelTier::default(), text).unwrap();
        assert_eq!(claim.items, pairs(&[("VX-2201-B", "40")]));
    }

    #[test]
    fn test_two_line_tier() {
        let claim = claim_of(&TwoLineTier::default(), "HX-440\n12").unwrap();
        assert_eq!(claim.items, pairs(&[("HX-440", "12")]));
        assert_eq!(claim.consumed, 2);

        assert!(claim_of(&TwoLineTier::default(), "HX-440\ntwelve").is_none());
        assert!(claim_of(&TwoLineTier::default(), "HX 440\n12").is_none());
    }

    #[test]
    fn test_two_line_tier_accepts_lowercase_codes() {
        let claim = claim_of(&TwoLineTier::default(), "abc-123\n5").unwrap();
        assert_eq!(claim.items, pairs(&[("abc-123", "5")]));
    }

    #[test]
    fn test_colon_bullet_keeps_prose_with_header_words() {
        let text = "- Adapter to NPT: 4\n- Ship to plant kit: 5 units\n- Date 15";
        let items = TierCascade::standard().run(&lines(text));
        assert_eq!(items, pairs(&[("Adapter to NPT", "4"), ("Ship to plant kit", "5")]));
    }

    #[test]
    fn test_catalog_tier_window() {
        let text = "Line 1 of 2\nQuantity 20 EA\nADDITIONAL INFO Catalog No. SS-100-6 Packaging EA";
        let all = lines(text);
        let claim = CatalogTier::default().claim(&all, 2).unwrap();
        assert_eq!(claim.items, pairs(&[("SS-100-6", "20")]));
    }

    #[test]
    fn test_acceptance_rules() {
        let table = Acceptance {
            require_uppercase: true,
            header_words: Some(&HEADER_WORDS_FWD),
            reject_leading_date: true,
        };
        assert!(table.accepts("SS-100-SET"));
        assert!(!table.accepts("steel rod"));
        assert!(!table.accepts("Fwd Note"));
        assert!(!table.accepts("Date Shipped"));
        assert!(!table.accepts("07/15/2025 X"));
    }

    #[test]
    fn test_cascade_one_tier_per_line() {
        let text = "\
QTY-5: AB-100
HX-440
12
- stainless steel rod bar: 110 units
- PUMP-7 3 pcs
VALVE-22   8
(4x) RING-9 (spare)
Stainless Steel Union 1/16\" SS-100-6 EA 19.25 USD 20 EA 385.00 USD";
        let items = TierCascade::standard().run(&lines(text));
        assert_eq!(
            items,
            pairs(&[
                ("AB-100", "5"),
                ("HX-440", "12"),
                ("stainless steel rod bar", "110"),
                ("PUMP-7", "3"),
                ("VALVE-22", "8"),
                ("RING-9", "4"),
                ("SS-100-6", "20"),
            ])
        );
    }

    #[test]
    fn test_cascade_never_emits_header_lines() {
        let text = "\
From: buyer@example.com
To: sales@example.com
Date: 07/01/2025
Subject: Order 4500012
- Date 15
- Subject line 2
Fwd Message  3
07/01/2025  10";
        assert!(TierCascade::standard().run(&lines(text)).is_empty());
    }

    #[test]
    fn test_tier_order() {
        assert_eq!(
            TierCascade::standard().tier_names(),
            vec![
                "part_label",
                "qty_prefix",
                "two_line",
                "bullet_colon",
                "bullet",
                "table_row",
                "paren_qty",
                "catalog",
                "price_line"
            ]
        );
    }
}
