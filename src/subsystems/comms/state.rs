//! Shared state for the Comms subsystem: capability boundary for channels.
//!
//! Channels receive an `Arc<CommsState>` and are restricted to the typed
//! methods below.  The raw [`BusHandle`] is private; channels cannot call
//! arbitrary bus methods or supervisor internals.
//!
//! # Intra-subsystem events
//!
//! [`CommsState::report_event`] lets a running channel signal the comms
//! subsystem manager without going through the supervisor bus.  The manager
//! owns the receiver end.

use tokio::sync::mpsc;
use tracing::warn;

use crate::core::error::AppError;
use crate::supervisor::bus::{BusError, BusHandle, BusPayload, ConversationTurn, ToolFailure};
use crate::supervisor::control::ControlHandle;

// ── Events ────────────────────────────────────────────────────────────────────

/// Events a channel sends back to the comms subsystem manager.
#[derive(Debug)]
pub enum CommsEvent {
    /// Channel is accepting requests.
    ChannelStarted { channel_id: String },
    /// Channel has stopped.
    ChannelShutdown { channel_id: String },
}

// ── Replies ───────────────────────────────────────────────────────────────────

/// Outcome of a tool run, as the channel renders it.
#[derive(Debug, Clone)]
pub struct ToolOutcome {
    pub tool: String,
    pub result: Result<String, ToolFailure>,
}

/// Supervisor liveness snapshot.
#[derive(Debug, Clone)]
pub struct HealthSnapshot {
    pub uptime_ms: u64,
    pub subsystems: Vec<String>,
}

// ── State ─────────────────────────────────────────────────────────────────────

/// Shared state passed as `Arc<CommsState>` to every channel task.
pub struct CommsState {
    /// Supervisor bus: private so channels can't call arbitrary methods.
    bus: BusHandle,
    control: ControlHandle,
    /// Owner used when a request does not carry one.
    pub default_owner_id: i64,
    event_tx: mpsc::Sender<CommsEvent>,
}

impl CommsState {
    pub fn new(
        bus: BusHandle,
        control: ControlHandle,
        default_owner_id: i64,
        event_tx: mpsc::Sender<CommsEvent>,
    ) -> Self {
        Self { bus, control, default_owner_id, event_tx }
    }

    async fn call(&self, method: &str, payload: BusPayload) -> Result<BusPayload, AppError> {
        match self.bus.request(method, payload).await {
            Err(e) => Err(AppError::Comms(format!("bus error: {e}"))),
            Ok(Err(BusError { code, message })) => {
                Err(AppError::Comms(format!("{method} failed [{code}]: {message}")))
            }
            Ok(Ok(reply)) => Ok(reply),
        }
    }

    /// Run one tool through the façade.
    pub async fn run_tool(&self, channel_id: &str, tool: &str, input: String) -> Result<ToolOutcome, AppError> {
        let payload = BusPayload::ToolRequest {
            tool: tool.to_string(),
            input,
            channel_id: channel_id.to_string(),
        };
        tool_outcome(self.call("tools/execute", payload).await?)
    }

    /// Drop the cached document index for `path`.
    pub async fn invalidate_index(&self, path: String) -> Result<ToolOutcome, AppError> {
        tool_outcome(self.call("tools/invalidate", BusPayload::IndexInvalidate { path }).await?)
    }

    /// Send `content` to `agents/{agent}` and await the reply text.
    pub async fn ask_agent(
        &self,
        agent: &str,
        channel_id: &str,
        content: String,
        owner_id: Option<i64>,
        temperature: Option<f32>,
    ) -> Result<String, AppError> {
        let payload = BusPayload::AgentRequest {
            channel_id: channel_id.to_string(),
            owner_id,
            content,
            temperature,
        };
        match self.call(&format!("agents/{agent}"), payload).await? {
            BusPayload::CommsMessage { content, .. } => Ok(content),
            _ => Err(AppError::Comms("unexpected reply payload".to_string())),
        }
    }

    /// Stored turns of `owner_id` (or the default owner), oldest first.
    pub async fn chat_history(
        &self,
        owner_id: Option<i64>,
        limit: Option<usize>,
        offset: Option<usize>,
    ) -> Result<Vec<ConversationTurn>, AppError> {
        let payload = BusPayload::MemoryList {
            owner_id: owner_id.unwrap_or(self.default_owner_id),
            limit,
            offset,
        };
        match self.call("memory/list", payload).await? {
            BusPayload::MemoryTurns { turns } => Ok(turns),
            _ => Err(AppError::Comms("unexpected reply payload".to_string())),
        }
    }

    /// Ask the supervisor control plane for uptime and registered handlers.
    pub async fn health(&self) -> Result<HealthSnapshot, AppError> {
        let report = self.control.health().await.map_err(|e| AppError::Comms(format!("control error: {e}")))?;
        Ok(HealthSnapshot { uptime_ms: report.uptime_ms, subsystems: report.handlers })
    }

    /// Report an event to the comms subsystem manager.
    ///
    /// Non-blocking: drops the event and logs a warning if the manager is not
    /// keeping up (channel full) or has already exited (closed).
    pub fn report_event(&self, event: CommsEvent) {
        if let Err(e) = self.event_tx.try_send(event) {
            warn!("comms event dropped: {e}");
        }
    }
}

fn tool_outcome(reply: BusPayload) -> Result<ToolOutcome, AppError> {
    match reply {
        BusPayload::ToolResponse { tool, ok: true, output, .. } => {
            Ok(ToolOutcome { tool, result: Ok(output.unwrap_or_default()) })
        }
        BusPayload::ToolResponse { tool, error: Some(failure), .. } => Ok(ToolOutcome { tool, result: Err(failure) }),
        _ => Err(AppError::Comms("unexpected reply payload".to_string())),
    }
}
