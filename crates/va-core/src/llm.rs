use async_trait::async_trait;

use crate::error::Result;

/// A single text-completion call against a configured model. Both the
/// summary and mind-map pipelines go through this one method — the
/// difference between them is entirely in the prompt they build, not in
/// how the model is invoked.
#[async_trait]
pub trait LlmInvoker: Send + Sync {
    async fn complete(&self, model: &str, prompt: &str) -> Result<String>;
}
