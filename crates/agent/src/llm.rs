use anyhow::Result;
use async_trait::async_trait;

/// Minimal completion interface over whichever model backs the classifier
/// and composer. Transport, retries, and timeouts live behind this trait;
/// by the time an error surfaces here, retries are already exhausted.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}
