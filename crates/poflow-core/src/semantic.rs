use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

/// A text-generation endpoint: one prompt in, free text out.
#[async_trait]
pub trait SemanticService: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Bounded retry with exponential backoff, capped by an overall deadline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub overall_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(2),
            overall_timeout: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// No waiting between attempts. Used by tests and local runs.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff: Duration::ZERO,
            overall_timeout: Duration::from_secs(5),
        }
    }
}

/// Call the service under `policy`. Failures, empty replies and a blown
/// deadline all come back as `None`; nothing is propagated.
pub async fn complete_with_retry(
    service: &dyn SemanticService,
    prompt: &str,
    policy: &RetryPolicy,
    purpose: &str,
) -> Option<String> {
    let attempts = async {
        let mut backoff = policy.initial_backoff;
        for attempt in 1..=policy.max_attempts {
            match service.complete(prompt).await {
                Ok(text) if !text.trim().is_empty() => return Some(text),
                Ok(_) => {
                    tracing::warn!(purpose, attempt, "Semantic service returned an empty reply");
                    return None;
                }
                Err(e) => {
                    tracing::warn!(
                        purpose,
                        attempt,
                        max_attempts = policy.max_attempts,
                        error = %e,
                        "Semantic service call failed"
                    );
                }
            }
            if attempt < policy.max_attempts {
                tokio::time::sleep(backoff).await;
                backoff = backoff.saturating_mul(2);
            }
        }
        None
    };

    match tokio::time::timeout(policy.overall_timeout, attempts).await {
        Ok(reply) => reply,
        Err(_) => {
            tracing::warn!(
                purpose,
                timeout_secs = policy.overall_timeout.as_secs(),
                "Semantic service call timed out"
            );
            None
        }
    }
}
