//! `chat` agent: tool-using loop over the tools catalog.
//!
//! The final answer is stored as a turn for the request owner.

use std::sync::Arc;

use tokio::sync::oneshot;

use super::{Agent, AgentRequest, AgentsState, react};
use crate::supervisor::bus::{BusPayload, BusResult};

const DEFAULT_TEMPERATURE: f32 = 0.7;

pub(crate) struct ChatAgent;

impl Agent for ChatAgent {
    fn id(&self) -> &str { "chat" }

    fn handle(&self, request: AgentRequest, reply_tx: oneshot::Sender<BusResult>, state: Arc<AgentsState>) {
        tokio::spawn(async move {
            let AgentRequest { channel_id, owner_id, content, temperature } = request;
            let temperature = Some(temperature.unwrap_or(DEFAULT_TEMPERATURE));
            let result = match react::run(&state, &channel_id, &content, temperature).await {
                Ok(answer) => state
                    .append_turn(owner_id, &content, &answer)
                    .await
                    .map(|_| BusPayload::CommsMessage { channel_id, content: answer }),
                Err(e) => Err(e),
            };
            let _ = reply_tx.send(result);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::Config;
    use crate::subsystems::agents::AgentsSubsystem;
    use crate::subsystems::agents::testing::{ScriptedLlm, ask, spawn_bus};
    use crate::subsystems::memory::MemorySubsystem;
    use crate::subsystems::tools::ToolsSubsystem;
    use crate::supervisor::bus::SupervisorBus;
    use tempfile::TempDir;

    #[tokio::test]
    async fn answers_and_stores_turn_for_owner() {
        let dir = TempDir::new().unwrap();
        let cfg = Config::test_default(dir.path());
        let llm = ScriptedLlm::new(&["Action: terminal\nAction Input: echo 4", "Final Answer: 4"]);
        let memory = MemorySubsystem::new(&cfg).unwrap();
        let store = memory.store().clone();
        let tools = ToolsSubsystem::new(&cfg.tools, SupervisorBus::new(1).handle).unwrap();
        let (bus, shutdown) = spawn_bus(vec![Box::new(llm), Box::new(memory), Box::new(tools)]);
        let agents = AgentsSubsystem::new(&cfg.agents, bus);

        match ask(&agents, "agents/chat", "what is 2+2?", None).await {
            Ok(BusPayload::CommsMessage { content, .. }) => assert_eq!(content, "4"),
            other => panic!("unexpected: {other:?}"),
        }

        let turns = store.list(cfg.agents.default_owner_id, None, None).unwrap();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].human.as_deref(), Some("what is 2+2?"));
        assert_eq!(turns[0].ai.as_deref(), Some("4"));
        shutdown.cancel();
    }

    #[tokio::test]
    async fn failed_loop_stores_nothing() {
        let dir = TempDir::new().unwrap();
        let cfg = Config::test_default(dir.path());
        let memory = MemorySubsystem::new(&cfg).unwrap();
        let store = memory.store().clone();
        let tools = ToolsSubsystem::new(&cfg.tools, SupervisorBus::new(1).handle).unwrap();
        let (bus, shutdown) = spawn_bus(vec![Box::new(ScriptedLlm::new(&[])), Box::new(memory), Box::new(tools)]);
        let agents = AgentsSubsystem::new(&cfg.agents, bus);

        assert!(ask(&agents, "agents/chat", "anything", Some(9)).await.is_err());
        assert!(store.list(9, None, None).unwrap().is_empty());
        shutdown.cancel();
    }
}
