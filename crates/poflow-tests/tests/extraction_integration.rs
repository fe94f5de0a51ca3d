mod common;

use std::sync::Arc;

use poflow_core::extraction::ExtractionResult;
use poflow_extraction::po_number::extract_po_number;
use poflow_extraction::{union, ExtractionCoordinator, PatternExtractor};

use common::FixedSource;

fn pairs(result: &ExtractionResult) -> Vec<(String, String)> {
    result
        .items()
        .iter()
        .map(|i| (i.item_code.clone(), i.quantity.clone()))
        .collect()
}

// ---------------------------------------------------------------------------
// PO number markers
// ---------------------------------------------------------------------------

#[test]
fn explicit_po_marker_always_wins() {
    for po in ["L21335", "4500012", "PO-77A1", "AB_12/9", "xyz"] {
        for line in [format!("PO number: {po}"), format!("po number {po}")] {
            let text = format!("Subject: Order 111222\n\nHello,\nOrder 998877 attached\n{line}\nThanks");
            assert_eq!(extract_po_number(&text).as_deref(), Some(po), "marker line: {line}");
        }
    }
}

// ---------------------------------------------------------------------------
// Tier shapes
// ---------------------------------------------------------------------------

#[test]
fn every_tier_shape_recovers_its_pair() {
    let shapes = [
        ("- SS-R4S8: 2 units", "SS-R4S8", "2"),
        ("- SS-R4S8 2 pcs", "SS-R4S8", "2"),
        ("SS-R4S8    2", "SS-R4S8", "2"),
        ("(308x) SS-4-VCR-2-BL (not silver coated)", "SS-4-VCR-2-BL", "308"),
        ("SS-R4S8\n2", "SS-R4S8", "2"),
        ("QTY-5: SS-R4S8", "SS-R4S8", "5"),
    ];
    let extractor = PatternExtractor::default();
    for (text, code, qty) in shapes {
        let result = extractor.extract_items(text);
        assert_eq!(pairs(&result), vec![(code.to_string(), qty.to_string())], "shape: {text}");
    }
}

#[test]
fn colon_bullets_keep_prose_names() {
    let text = "PO number: 4500012\n- Adapter to NPT: 4\n- Ship to plant kit: 5 units\nabc-123\n7\n";
    let result = PatternExtractor::default().analyze(text);
    assert_eq!(
        pairs(&result),
        vec![
            ("Adapter to NPT".to_string(), "4".to_string()),
            ("Ship to plant kit".to_string(), "5".to_string()),
            ("abc-123".to_string(), "7".to_string()),
        ]
    );
}

#[test]
fn header_lines_are_never_items() {
    let text = "From: buyer@acme.example\nDate: 12/01/2025\nSubject: PO 4500012\n\nPO number: 4500012\n- SS-R4S8: 2 units\n";
    let result = PatternExtractor::default().analyze(text);
    assert_eq!(pairs(&result), vec![("SS-R4S8".to_string(), "2".to_string())]);
}

// ---------------------------------------------------------------------------
// Coordinator union
// ---------------------------------------------------------------------------

#[test]
fn union_is_idempotent() {
    let pattern = ExtractionResult::new("L21335", false).with_item("A-100", "1");
    let semantic = ExtractionResult::new("", true).with_item("B-200", "2").with_item("A-100", "9");

    let once = union(&pattern, &semantic);
    let twice = union(&once, &semantic);
    assert_eq!(once, twice);
    assert_eq!(once.po_number, "L21335");
    assert!(!once.is_reference);
    assert_eq!(
        pairs(&once),
        vec![("A-100".to_string(), "1".to_string()), ("B-200".to_string(), "2".to_string())]
    );
}

#[tokio::test]
async fn completion_order_does_not_change_the_result() {
    let pattern = ExtractionResult::new("", true).with_item("A-100", "1");
    let semantic = ExtractionResult::new("4500012", true).with_item("B-200", "2");

    let pattern_late = ExtractionCoordinator::new(
        Arc::new(FixedSource::new(pattern.clone()).after(30)),
        Arc::new(FixedSource::new(semantic.clone())),
    );
    let semantic_late = ExtractionCoordinator::new(
        Arc::new(FixedSource::new(pattern)),
        Arc::new(FixedSource::new(semantic).after(30)),
    );

    let a = pattern_late.coordinate("email").await;
    let b = semantic_late.coordinate("email").await;
    assert_eq!(a, b);
    assert_eq!(a.po_number, "4500012");
    assert!(a.is_reference);
    assert_eq!(a.items()[0].item_code, "A-100");
}
