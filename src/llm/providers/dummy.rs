//! Dummy LLM provider: echoes the user message back prefixed with `[echo]`.
//! Used for testing the full bus round-trip without a real API key.

use crate::llm::{CompletionRequest, ProviderError};

#[derive(Debug, Clone)]
pub struct DummyProvider;

impl DummyProvider {
    pub async fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError> {
        Ok(format!("[echo] {}", request.content))
    }
}
