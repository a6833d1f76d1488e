//! Agents subsystem: receives agent-targeted requests and routes to agents.
//!
//! [`Agent`] is the extension trait: each agent is a `Send + Sync` struct
//! registered in the subsystem by name.  Built-in agents:
//!
//! - `gpt`: one completion, no memory.
//! - `conversation`: replays the owner's stored turns as chat history.
//! - `chat`: tool-using agent loop over the tools catalog.
//!
//! [`AgentsSubsystem`] implements [`BusHandler`] with prefix `"agents"` and
//! is never blocked: every agent moves `reply_tx` into a spawned task.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::oneshot;
use tracing::debug;

use crate::core::config::AgentsConfig;
use crate::llm::LlmMessage;
use crate::supervisor::bus::{
    BusError, BusHandle, BusPayload, BusResult, CapabilityDescriptor, ConversationTurn, ERR_BAD_REQUEST,
    ERR_INTERNAL, ERR_METHOD_NOT_FOUND, ToolFailure,
};
use crate::supervisor::dispatch::BusHandler;

mod chat;
mod conversation;
mod gpt;
pub(crate) mod prompt;
pub(crate) mod react;

/// Agent used when the method carries no agent id (`"agents"`).
const DEFAULT_AGENT: &str = "chat";

// ── AgentsState ───────────────────────────────────────────────────────────────

/// Shared capability surface passed to agents.
///
/// The raw [`BusHandle`] is private: agents call typed methods and cannot
/// address arbitrary bus targets.
pub struct AgentsState {
    bus: BusHandle,
    /// Owner used when a request carries no `owner_id`.
    pub default_owner_id: i64,
    /// Upper bound on tool calls per `chat` request.
    pub max_steps: usize,
}

impl AgentsState {
    fn new(bus: BusHandle, config: &AgentsConfig) -> Self {
        Self { bus, default_owner_id: config.default_owner_id, max_steps: config.max_steps }
    }

    async fn call(&self, method: &str, payload: BusPayload) -> BusResult {
        match self.bus.request(method, payload).await {
            Ok(r) => r,
            Err(e) => Err(BusError::new(ERR_INTERNAL, e.to_string())),
        }
    }

    /// Forward a prompt (plus optional system prompt and history) to the LLM
    /// subsystem and return the completion text.
    pub async fn complete(
        &self,
        channel_id: &str,
        content: &str,
        system: Option<&str>,
        history: Vec<LlmMessage>,
        temperature: Option<f32>,
    ) -> Result<String, BusError> {
        let payload = BusPayload::LlmRequest {
            channel_id: channel_id.to_string(),
            content: content.to_string(),
            system: system.map(str::to_string),
            history,
            temperature,
        };
        match self.call("llm/complete", payload).await? {
            BusPayload::CommsMessage { content, .. } => Ok(content),
            other => Err(unexpected_reply("llm/complete", &other)),
        }
    }

    /// Names and guidance of every enabled tool.
    pub async fn list_tools(&self) -> Result<Vec<CapabilityDescriptor>, BusError> {
        match self.call("tools/list", BusPayload::Empty).await? {
            BusPayload::ToolCatalog { tools } => Ok(tools),
            other => Err(unexpected_reply("tools/list", &other)),
        }
    }

    /// Execute a tool through the tools subsystem.
    ///
    /// The outer `Result` is the bus call; the inner one is the tool outcome.
    pub async fn execute_tool(
        &self,
        tool: &str,
        input: &str,
        channel_id: &str,
    ) -> Result<Result<String, ToolFailure>, BusError> {
        let payload = BusPayload::ToolRequest {
            tool: tool.to_string(),
            input: input.to_string(),
            channel_id: channel_id.to_string(),
        };
        match self.call("tools/execute", payload).await? {
            BusPayload::ToolResponse { ok: true, output, .. } => Ok(Ok(output.unwrap_or_default())),
            BusPayload::ToolResponse { error, .. } => Ok(Err(error.unwrap_or_else(|| ToolFailure {
                code: "backend".into(),
                message: "tool failed without detail".into(),
                recoverable: true,
            }))),
            other => Err(unexpected_reply("tools/execute", &other)),
        }
    }

    /// Store one human/AI exchange for `owner_id`.
    pub async fn append_turn(&self, owner_id: i64, human: &str, ai: &str) -> Result<i64, BusError> {
        let payload = BusPayload::MemoryAppend {
            owner_id,
            human: Some(human.to_string()),
            ai: Some(ai.to_string()),
        };
        match self.call("memory/append", payload).await? {
            BusPayload::MemoryAppended { turn_id } => Ok(turn_id),
            other => Err(unexpected_reply("memory/append", &other)),
        }
    }

    /// The most recent `limit` turns of `owner_id`, oldest first.
    pub async fn recent_turns(&self, owner_id: i64, limit: usize) -> Result<Vec<ConversationTurn>, BusError> {
        let payload = BusPayload::MemoryList { owner_id, limit: Some(limit), offset: None };
        match self.call("memory/list", payload).await? {
            BusPayload::MemoryTurns { turns } => Ok(turns),
            other => Err(unexpected_reply("memory/list", &other)),
        }
    }
}

fn unexpected_reply(method: &str, payload: &BusPayload) -> BusError {
    BusError::new(ERR_INTERNAL, format!("unexpected reply to {method}: {payload:?}"))
}

// ── Agent trait ───────────────────────────────────────────────────────────────

/// One agent invocation, with the owner already resolved.
#[derive(Debug, Clone)]
pub struct AgentRequest {
    pub channel_id: String,
    pub owner_id: i64,
    pub content: String,
    pub temperature: Option<f32>,
}

/// An agent registered in the agents subsystem.
pub trait Agent: Send + Sync {
    fn id(&self) -> &str;

    /// Handle one request. Must not block: move `reply_tx` into a task.
    fn handle(&self, request: AgentRequest, reply_tx: oneshot::Sender<BusResult>, state: Arc<AgentsState>);
}

// ── AgentsSubsystem ───────────────────────────────────────────────────────────

pub struct AgentsSubsystem {
    state: Arc<AgentsState>,
    agents: HashMap<String, Box<dyn Agent>>,
}

impl AgentsSubsystem {
    pub fn new(config: &AgentsConfig, bus: BusHandle) -> Self {
        let mut agents: HashMap<String, Box<dyn Agent>> = HashMap::new();
        for agent in [
            Box::new(gpt::GptAgent) as Box<dyn Agent>,
            Box::new(conversation::ConversationAgent),
            Box::new(chat::ChatAgent),
        ] {
            agents.insert(agent.id().to_string(), agent);
        }
        Self { state: Arc::new(AgentsState::new(bus, config)), agents }
    }

    fn resolve_agent(&self, agent_id: Option<&str>) -> Result<&dyn Agent, BusError> {
        let id = agent_id.unwrap_or(DEFAULT_AGENT);
        self.agents
            .get(id)
            .map(|a| a.as_ref())
            .ok_or_else(|| BusError::new(ERR_METHOD_NOT_FOUND, format!("agent not found: {id}")))
    }
}

/// Split `agents[/{agent_id}]` into the optional agent id.
fn parse_method(method: &str) -> Result<Option<&str>, BusError> {
    let mut parts = method.split('/');
    if parts.next() != Some("agents") {
        return Err(BusError::new(ERR_METHOD_NOT_FOUND, format!("method not found: {method}")));
    }
    match (parts.next(), parts.next()) {
        (None, _) => Ok(None),
        (Some(id), None) if !id.is_empty() => Ok(Some(id)),
        _ => Err(BusError::new(ERR_METHOD_NOT_FOUND, format!("method not found: {method}"))),
    }
}

impl BusHandler for AgentsSubsystem {
    fn prefix(&self) -> &str {
        "agents"
    }

    fn handle_request(&self, method: &str, payload: BusPayload, reply_tx: oneshot::Sender<BusResult>) {
        let agent = match parse_method(method).and_then(|id| self.resolve_agent(id)) {
            Ok(agent) => agent,
            Err(e) => {
                let _ = reply_tx.send(Err(e));
                return;
            }
        };

        let BusPayload::AgentRequest { channel_id, owner_id, content, temperature } = payload else {
            let _ = reply_tx.send(Err(BusError::new(
                ERR_BAD_REQUEST,
                format!("unsupported payload for method: {method}"),
            )));
            return;
        };

        let owner_id = owner_id.unwrap_or(self.state.default_owner_id);
        debug!(agent = agent.id(), %channel_id, owner_id, "dispatching agent request");
        agent.handle(
            AgentRequest { channel_id, owner_id, content, temperature },
            reply_tx,
            self.state.clone(),
        );
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Bus fixtures shared by the agent tests.

    use std::collections::VecDeque;
    use std::sync::Mutex;

    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::supervisor::bus::SupervisorBus;
    use crate::supervisor::control::SupervisorControl;

    /// LLM stand-in that replies with scripted completions in order and
    /// records every prompt it receives.
    pub struct ScriptedLlm {
        replies: Mutex<VecDeque<String>>,
        pub prompts: Arc<Mutex<Vec<(String, Vec<LlmMessage>)>>>,
    }

    impl ScriptedLlm {
        pub fn new(replies: &[&str]) -> Self {
            Self {
                replies: Mutex::new(replies.iter().map(|s| s.to_string()).collect()),
                prompts: Arc::default(),
            }
        }
    }

    impl BusHandler for ScriptedLlm {
        fn prefix(&self) -> &str {
            "llm"
        }

        fn handle_request(&self, _method: &str, payload: BusPayload, reply_tx: oneshot::Sender<BusResult>) {
            let BusPayload::LlmRequest { channel_id, content, history, .. } = payload else {
                let _ = reply_tx.send(Err(BusError::new(ERR_BAD_REQUEST, "not an llm request")));
                return;
            };
            self.prompts.lock().unwrap().push((content, history));
            let reply = match self.replies.lock().unwrap().pop_front() {
                Some(content) => Ok(BusPayload::CommsMessage { channel_id, content }),
                None => Err(BusError::new(ERR_INTERNAL, "script exhausted")),
            };
            let _ = reply_tx.send(reply);
        }
    }

    /// Run a supervisor over `handlers`; cancel the token to stop it.
    pub fn spawn_bus(handlers: Vec<Box<dyn BusHandler>>) -> (BusHandle, CancellationToken) {
        let bus = SupervisorBus::new(64);
        let handle = bus.handle.clone();
        let shutdown = CancellationToken::new();
        tokio::spawn(crate::supervisor::run(bus, SupervisorControl::new(4), shutdown.clone(), handlers));
        (handle, shutdown)
    }

    pub async fn ask(sub: &AgentsSubsystem, method: &str, content: &str, owner_id: Option<i64>) -> BusResult {
        let (tx, rx) = oneshot::channel();
        sub.handle_request(
            method,
            BusPayload::AgentRequest {
                channel_id: "test".into(),
                owner_id,
                content: content.into(),
                temperature: None,
            },
            tx,
        );
        rx.await.unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{ask, spawn_bus};
    use super::*;
    use crate::core::config::Config;
    use crate::subsystems::llm::LlmSubsystem;
    use crate::subsystems::memory::MemorySubsystem;
    use tempfile::TempDir;

    #[test]
    fn parse_method_grammar() {
        assert_eq!(parse_method("agents").unwrap(), None);
        assert_eq!(parse_method("agents/gpt").unwrap(), Some("gpt"));
        assert!(parse_method("agents/").is_err());
        assert!(parse_method("agents/gpt/extra").is_err());
        assert!(parse_method("tools/list").is_err());
    }

    fn setup(dir: &TempDir) -> (AgentsSubsystem, tokio_util::sync::CancellationToken) {
        let cfg = Config::test_default(dir.path());
        let (bus, shutdown) = spawn_bus(vec![
            Box::new(LlmSubsystem::new(&cfg.llm, None).unwrap()),
            Box::new(MemorySubsystem::new(&cfg).unwrap()),
        ]);
        (AgentsSubsystem::new(&cfg.agents, bus), shutdown)
    }

    #[tokio::test]
    async fn gpt_returns_completion() {
        let dir = TempDir::new().unwrap();
        let (agents, shutdown) = setup(&dir);
        match ask(&agents, "agents/gpt", "hello", None).await {
            Ok(BusPayload::CommsMessage { content, .. }) => assert_eq!(content, "[echo] hello"),
            other => panic!("unexpected: {other:?}"),
        }
        shutdown.cancel();
    }

    #[tokio::test]
    async fn unknown_agent_is_method_not_found() {
        let dir = TempDir::new().unwrap();
        let (agents, shutdown) = setup(&dir);
        let err = ask(&agents, "agents/oracle", "hi", None).await.unwrap_err();
        assert_eq!(err.code, ERR_METHOD_NOT_FOUND);
        shutdown.cancel();
    }

    #[tokio::test]
    async fn wrong_payload_is_bad_request() {
        let dir = TempDir::new().unwrap();
        let (agents, shutdown) = setup(&dir);
        let (tx, rx) = oneshot::channel();
        agents.handle_request("agents/gpt", BusPayload::Empty, tx);
        assert_eq!(rx.await.unwrap().unwrap_err().code, ERR_BAD_REQUEST);
        shutdown.cancel();
    }
}
