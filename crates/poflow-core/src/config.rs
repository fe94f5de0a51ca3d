use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::semantic::RetryPolicy;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub neo4j_uri: String,
    pub neo4j_user: String,
    pub neo4j_password: String,
    pub anthropic_api_key: String,
    pub semantic_model: String,
    pub semantic_max_retries: u32,
    pub semantic_backoff_ms: u64,
    pub semantic_timeout_secs: u64,
    pub server_host: String,
    pub server_port: u16,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            neo4j_uri: std::env::var("NEO4J_URI").unwrap_or_else(|_| "bolt://localhost:7687".into()),
            neo4j_user: std::env::var("NEO4J_USER").unwrap_or_else(|_| "neo4j".into()),
            neo4j_password: std::env::var("NEO4J_PASSWORD").unwrap_or_else(|_| "poflow".into()),
            anthropic_api_key: std::env::var("ANTHROPIC_API_KEY").unwrap_or_default(),
            semantic_model: std::env::var("SEMANTIC_MODEL")
                .unwrap_or_else(|_| "claude-haiku-4-5-20251001".into()),
            semantic_max_retries: env_parse("SEMANTIC_MAX_RETRIES", 3),
            semantic_backoff_ms: env_parse("SEMANTIC_BACKOFF_MS", 2000),
            semantic_timeout_secs: env_parse("SEMANTIC_TIMEOUT_SECS", 60),
            server_host: std::env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            server_port: env_parse("SERVER_PORT", 8080),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.semantic_max_retries.max(1),
            initial_backoff: Duration::from_millis(self.semantic_backoff_ms),
            overall_timeout: Duration::from_secs(self.semantic_timeout_secs),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
