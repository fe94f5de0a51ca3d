use std::sync::Arc;

use async_trait::async_trait;

use poflow_core::extraction::{ExtractionResult, ExtractionSource};
use poflow_core::response::json_object;
use poflow_core::semantic::{complete_with_retry, RetryPolicy, SemanticService};

/// Extraction by asking the semantic service for a JSON answer. Any failure
/// (unreachable service, empty reply, unparseable JSON) yields the empty
/// result.
pub struct SemanticExtractor {
    service: Arc<dyn SemanticService>,
    retry: RetryPolicy,
}

impl SemanticExtractor {
    pub fn new(service: Arc<dyn SemanticService>, retry: RetryPolicy) -> Self {
        Self { service, retry }
    }

    fn build_prompt(text: &str) -> String {
        format!(
            r#"Extract purchase order information from the email below.

Identify:
1. The PO number or reference number.
2. Whether the email places a NEW purchase order or REFERS to an existing one.
   Phrases like "new PO" or "I'd like to place an order" mean new; "regarding PO",
   "follow up on" or "status of PO" mean a reference.
3. Every part number, item code or MPN mentioned.
4. The quantity for each item, in the same order as the items.

Items can appear as:
- "QTY-5: ITEM-CODE"
- bullet points such as "- SS-R4S8: 2 units"
- "(308x) SS-4-VCR-2-BL (not silver coated)" meaning quantity 308 of SS-4-VCR-2-BL
- markdown tables with Item Code and Quantity columns

Never report email headers (From, To, Date, Subject), dates or ordinary prose as items.
Ignore parenthesized notes that follow an item code.

Return ONLY valid JSON (no markdown fences, no commentary) matching this schema:
{{"po_number": "string", "is_reference_po": true, "items": ["ITEM-CODE"], "quantities": ["2"]}}

Email:
{text}"#
        )
    }

    fn parse_reply(raw: &str) -> Option<ExtractionResult> {
        let value = json_object(raw)?;
        match serde_json::from_value::<ExtractionResult>(value) {
            Ok(result) => Some(result),
            Err(e) => {
                tracing::warn!(error = %e, "Semantic extraction reply did not fit the result shape");
                None
            }
        }
    }
}

#[async_trait]
impl ExtractionSource for SemanticExtractor {
    fn name(&self) -> &str {
        "semantic"
    }

    async fn extract(&self, text: &str) -> ExtractionResult {
        let prompt = Self::build_prompt(text);
        let Some(raw) = complete_with_retry(self.service.as_ref(), &prompt, &self.retry, "extraction").await
        else {
            return ExtractionResult::default();
        };

        match Self::parse_reply(&raw) {
            Some(result) => {
                tracing::info!(
                    po_number = %result.po_number,
                    is_reference = result.is_reference,
                    items = result.items().len(),
                    "Semantic extraction complete"
                );
                result
            }
            None => {
                tracing::warn!(response_len = raw.len(), "Discarding unusable semantic extraction reply");
                ExtractionResult::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use poflow_core::error::{PoflowError, Result};

    struct Canned(&'static str);

    #[async_trait]
    impl SemanticService for Canned {
        async fn complete(&self, _prompt: &str) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    struct Down;

    #[async_trait]
    impl SemanticService for Down {
        async fn complete(&self, _prompt: &str) -> Result<String> {
            Err(PoflowError::SemanticUnavailable("offline".into()))
        }
    }

    fn extractor(service: impl SemanticService + 'static) -> SemanticExtractor {
        SemanticExtractor::new(Arc::new(service), RetryPolicy::immediate(2))
    }

    #[tokio::test]
    async fn test_fenced_reply_is_parsed() {
        let reply = "```json\n{\"po_number\": \"L21335\", \"is_reference_po\": \"false\", \"items\": [\"SS-100-SET\"], \"quantities\": [4]}\n```";
        let result = extractor(Canned(reply)).extract("email").await;
        assert_eq!(result.po_number, "L21335");
        assert!(!result.is_reference);
        assert_eq!(result.items()[0].item_code, "SS-100-SET");
        assert_eq!(result.items()[0].quantity, "4");
    }

    #[tokio::test]
    async fn test_prose_reply_yields_empty_result() {
        let result = extractor(Canned("I could not find a purchase order.")).extract("email").await;
        assert_eq!(result, ExtractionResult::default());
    }

    #[tokio::test]
    async fn test_unreachable_service_yields_empty_result() {
        let result = extractor(Down).extract("email").await;
        assert!(result.is_empty());
        assert!(result.is_reference);
    }

    #[test]
    fn test_prompt_embeds_email() {
        let prompt = SemanticExtractor::build_prompt("PO number: 4500012");
        assert!(prompt.ends_with("PO number: 4500012"));
        assert!(prompt.contains("\"is_reference_po\": true"));
    }
}
