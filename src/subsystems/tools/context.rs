//! What a capability may reach besides its own config: the LLM, via the bus.

use crate::supervisor::bus::{BusHandle, BusPayload};

use super::error::ToolError;

/// Per-dispatch context handed to [`super::Capability::invoke`].
#[derive(Clone)]
pub struct ToolContext {
    bus: BusHandle,
    channel_id: String,
}

impl ToolContext {
    pub fn new(bus: BusHandle, channel_id: impl Into<String>) -> Self {
        Self { bus, channel_id: channel_id.into() }
    }

    /// One deterministic completion (`temperature = 0`) through `llm/complete`.
    pub async fn complete(&self, system: &str, content: String) -> Result<String, ToolError> {
        let payload = BusPayload::LlmRequest {
            channel_id: self.channel_id.clone(),
            content,
            system: Some(system.to_string()),
            history: Vec::new(),
            temperature: Some(0.0),
        };
        match self.bus.request("llm/complete", payload).await {
            Ok(Ok(BusPayload::CommsMessage { content, .. })) => Ok(content),
            Ok(Ok(other)) => Err(ToolError::Backend(format!("unexpected llm reply: {other:?}"))),
            Ok(Err(e)) => Err(ToolError::Backend(format!("llm error: {}", e.message))),
            Err(e) => Err(ToolError::Backend(e.to_string())),
        }
    }
}
