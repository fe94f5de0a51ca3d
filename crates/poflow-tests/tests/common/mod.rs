//! Fixtures shared by the integration test binaries. Each binary uses a
//! subset, so unused items are expected.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use poflow_core::error::{PoflowError, Result};
use poflow_core::extraction::{ExtractionResult, ExtractionSource};
use poflow_core::semantic::{RetryPolicy, SemanticService};
use poflow_extraction::{ExtractionCoordinator, PatternExtractor, SemanticExtractor};
use poflow_intent::{ClassifierConfig, IntentClassifier};
use poflow_reconcile::{AmendmentEngine, ChangeLogProducer, EmailPipeline, Reconciler};
use poflow_store::{InMemoryStore, StoreCustomerDirectory};

/// Semantic service that answers from a queue and records every prompt.
/// An exhausted queue behaves like an unreachable service.
#[derive(Default)]
pub struct ScriptedSemantic {
    replies: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedSemantic {
    pub fn new<I, S>(replies: I) -> Arc<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Arc::new(Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl SemanticService for ScriptedSemantic {
    async fn complete(&self, prompt: &str) -> Result<String> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        self.replies
            .lock()
            .ok()
            .and_then(|mut r| r.pop_front())
            .ok_or_else(|| PoflowError::SemanticUnavailable("no scripted reply".into()))
    }
}

/// Extraction source that returns a fixed result, optionally after a delay.
pub struct FixedSource {
    result: ExtractionResult,
    delay: Duration,
}

impl FixedSource {
    pub fn new(result: ExtractionResult) -> Self {
        Self {
            result,
            delay: Duration::ZERO,
        }
    }

    pub fn after(mut self, millis: u64) -> Self {
        self.delay = Duration::from_millis(millis);
        self
    }
}

#[async_trait]
impl ExtractionSource for FixedSource {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn extract(&self, _text: &str) -> ExtractionResult {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.result.clone()
    }
}

pub fn quick_retry() -> RetryPolicy {
    RetryPolicy::immediate(1)
}

/// A pipeline over `store` with every semantic call answered by `semantic`.
pub fn pipeline(store: Arc<InMemoryStore>, semantic: Arc<ScriptedSemantic>) -> EmailPipeline {
    let customers = Arc::new(StoreCustomerDirectory::new(store.clone()));
    let classifier = IntentClassifier::new(ClassifierConfig::fallback()).with_semantic(semantic.clone(), quick_retry());
    let coordinator = ExtractionCoordinator::new(
        Arc::new(PatternExtractor::default()),
        Arc::new(SemanticExtractor::new(semantic.clone(), quick_retry())),
    );

    EmailPipeline::new(
        Arc::new(classifier),
        coordinator,
        Reconciler::new(store.clone(), customers),
        ChangeLogProducer::new(store.clone()).with_semantic(semantic.clone(), quick_retry()),
        AmendmentEngine::new(store).with_semantic(semantic, quick_retry()),
    )
}
