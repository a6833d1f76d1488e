//! `gpt` agent: one completion with the prompt as the user message.

use std::sync::Arc;

use tokio::sync::oneshot;

use super::{Agent, AgentRequest, AgentsState};
use crate::supervisor::bus::{BusPayload, BusResult};

const DEFAULT_TEMPERATURE: f32 = 0.8;

pub(crate) struct GptAgent;

impl Agent for GptAgent {
    fn id(&self) -> &str { "gpt" }

    fn handle(&self, request: AgentRequest, reply_tx: oneshot::Sender<BusResult>, state: Arc<AgentsState>) {
        // Spawn so the supervisor loop is not blocked on the LLM round-trip.
        tokio::spawn(async move {
            let AgentRequest { channel_id, content, temperature, .. } = request;
            let result = state
                .complete(&channel_id, &content, None, Vec::new(), Some(temperature.unwrap_or(DEFAULT_TEMPERATURE)))
                .await
                .map(|content| BusPayload::CommsMessage { channel_id, content });
            let _ = reply_tx.send(result);
        });
    }
}
