//! `conversation` agent: chat with the owner's stored turns replayed as
//! history.  Each exchange is appended to memory after the reply.

use std::sync::Arc;

use tokio::sync::oneshot;
use tracing::warn;

use super::{Agent, AgentRequest, AgentsState};
use crate::llm::LlmMessage;
use crate::supervisor::bus::{BusError, BusPayload, BusResult, ConversationTurn};

const DEFAULT_TEMPERATURE: f32 = 0.7;
/// Most recent turns replayed into the prompt.
const HISTORY_TURNS: usize = 50;

pub(crate) struct ConversationAgent;

impl Agent for ConversationAgent {
    fn id(&self) -> &str { "conversation" }

    fn handle(&self, request: AgentRequest, reply_tx: oneshot::Sender<BusResult>, state: Arc<AgentsState>) {
        tokio::spawn(async move {
            let channel_id = request.channel_id.clone();
            let result = converse(&state, request)
                .await
                .map(|content| BusPayload::CommsMessage { channel_id, content });
            let _ = reply_tx.send(result);
        });
    }
}

async fn converse(state: &AgentsState, request: AgentRequest) -> Result<String, BusError> {
    let turns = state.recent_turns(request.owner_id, HISTORY_TURNS).await?;
    let reply = state
        .complete(
            &request.channel_id,
            &request.content,
            None,
            history(&turns),
            Some(request.temperature.unwrap_or(DEFAULT_TEMPERATURE)),
        )
        .await?;
    if let Err(e) = state.append_turn(request.owner_id, &request.content, &reply).await {
        warn!(owner_id = request.owner_id, error = %e, "failed to store conversation turn");
        return Err(e);
    }
    Ok(reply)
}

/// Flatten stored turns into alternating user/assistant messages.
fn history(turns: &[ConversationTurn]) -> Vec<LlmMessage> {
    let mut messages = Vec::with_capacity(turns.len() * 2);
    for turn in turns {
        if let Some(human) = &turn.human {
            messages.push(LlmMessage::user(human.clone()));
        }
        if let Some(ai) = &turn.ai {
            messages.push(LlmMessage::assistant(ai.clone()));
        }
    }
    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::Config;
    use crate::llm::LlmRole;
    use crate::subsystems::agents::AgentsSubsystem;
    use crate::subsystems::agents::testing::{ScriptedLlm, ask, spawn_bus};
    use crate::subsystems::memory::MemorySubsystem;
    use tempfile::TempDir;

    #[test]
    fn history_skips_missing_sides() {
        let turn = |human: Option<&str>, ai: Option<&str>| ConversationTurn {
            id: 0,
            owner_id: 1,
            human: human.map(str::to_string),
            ai: ai.map(str::to_string),
            created_at: String::new(),
        };
        let messages = history(&[turn(Some("q1"), Some("a1")), turn(None, Some("a2")), turn(Some("q3"), None)]);
        let roles: Vec<LlmRole> = messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, [LlmRole::User, LlmRole::Assistant, LlmRole::Assistant, LlmRole::User]);
    }

    #[tokio::test]
    async fn replays_owner_history_and_appends() {
        let dir = TempDir::new().unwrap();
        let cfg = Config::test_default(dir.path());
        let llm = ScriptedLlm::new(&["first reply", "second reply", "other owner"]);
        let prompts = llm.prompts.clone();
        let memory = MemorySubsystem::new(&cfg).unwrap();
        let store = memory.store().clone();
        let (bus, shutdown) = spawn_bus(vec![Box::new(llm), Box::new(memory)]);
        let agents = AgentsSubsystem::new(&cfg.agents, bus);

        ask(&agents, "agents/conversation", "hello", Some(5)).await.unwrap();
        match ask(&agents, "agents/conversation", "again", Some(5)).await {
            Ok(BusPayload::CommsMessage { content, .. }) => assert_eq!(content, "second reply"),
            other => panic!("unexpected: {other:?}"),
        }
        ask(&agents, "agents/conversation", "separate", None).await.unwrap();

        {
            let prompts = prompts.lock().unwrap();
            assert!(prompts[0].1.is_empty());
            assert_eq!(prompts[1].1, vec![LlmMessage::user("hello"), LlmMessage::assistant("first reply")]);
            // Default owner has its own history.
            assert!(prompts[2].1.is_empty());
        }

        let turns = store.list(5, None, None).unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[1].ai.as_deref(), Some("second reply"));
        assert_eq!(store.list(cfg.agents.default_owner_id, None, None).unwrap().len(), 1);
        shutdown.cancel();
    }
}
