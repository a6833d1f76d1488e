//! Supervisor event bus: typed request/notification messages between
//! subsystems.
//!
//! Every message carries a `method` string of the form `"prefix/action"`.
//! Requests carry a oneshot reply slot; notifications are fire-and-forget.
//! Error codes follow JSON-RPC conventions.

use std::{error::Error, fmt};

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::llm::LlmMessage;

// ── Error codes ──────────────────────────────────────────────────────────────

pub const ERR_BAD_REQUEST: i32 = -32600;
pub const ERR_METHOD_NOT_FOUND: i32 = -32601;
pub const ERR_INTERNAL: i32 = -32000;

/// Error returned by a handler in place of a payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusError {
    pub code: i32,
    pub message: String,
}

impl BusError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }
}

impl fmt::Display for BusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl Error for BusError {}

pub type BusResult = Result<BusPayload, BusError>;

// ── Wire types shared by several subsystems ──────────────────────────────────

/// Name + guidance for one tool, as shown to the agent loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityDescriptor {
    pub name: String,
    pub description: String,
}

/// Failure half of a tool outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolFailure {
    /// One of `invalid_input`, `denied`, `not_found`, `backend`, `timeout`,
    /// `unavailable`.
    pub code: String,
    pub message: String,
    pub recoverable: bool,
}

/// One stored human/AI exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub id: i64,
    pub owner_id: i64,
    pub human: Option<String>,
    pub ai: Option<String>,
    /// RFC 3339.
    pub created_at: String,
}

/// Schedule shape understood by the cron service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CronScheduleSpec {
    /// Fire once at a wall-clock instant (Unix milliseconds).
    Once { at_unix_ms: u64 },
    /// Fire every `every_secs` seconds, first after one period.
    Interval { every_secs: u64 },
    /// Fire every day at the given local time.
    Daily { hour: u32, minute: u32, second: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CronEntryInfo {
    pub schedule_id: String,
    pub target_method: String,
    pub spec: CronScheduleSpec,
    /// Next fire time, Unix milliseconds.
    pub next_fire_unix_ms: u64,
}

// ── Payloads ─────────────────────────────────────────────────────────────────

/// Typed payloads carried on the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BusPayload {
    /// Acknowledgement or argument-less request.
    Empty,

    // llm
    LlmRequest {
        channel_id: String,
        content: String,
        #[serde(default)]
        system: Option<String>,
        /// Earlier messages replayed before `content`.
        #[serde(default)]
        history: Vec<LlmMessage>,
        #[serde(default)]
        temperature: Option<f32>,
    },
    /// Text reply addressed to a channel (LLM and agent replies).
    CommsMessage { channel_id: String, content: String },

    // tools
    ToolRequest { tool: String, input: String, channel_id: String },
    ToolResponse {
        tool: String,
        ok: bool,
        output: Option<String>,
        error: Option<ToolFailure>,
    },
    ToolCatalog { tools: Vec<CapabilityDescriptor> },
    IndexInvalidate { path: String },

    // memory
    MemoryAppend { owner_id: i64, human: Option<String>, ai: Option<String> },
    MemoryAppended { turn_id: i64 },
    MemoryList { owner_id: i64, limit: Option<usize>, offset: Option<usize> },
    MemoryTurns { turns: Vec<ConversationTurn> },

    // agents
    AgentRequest {
        channel_id: String,
        owner_id: Option<i64>,
        content: String,
        temperature: Option<f32>,
    },

    // cron
    CronSchedule {
        target_method: String,
        /// Serialized [`BusPayload`] delivered with each notification.
        payload_json: String,
        spec: CronScheduleSpec,
    },
    CronScheduleResult { schedule_id: String },
    CronCancel { schedule_id: String },
    CronListResult { entries: Vec<CronEntryInfo> },
}

// ── Messages ─────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum BusMessage {
    Request {
        id: Uuid,
        method: String,
        payload: BusPayload,
        reply_tx: oneshot::Sender<BusResult>,
    },
    Notification {
        method: String,
        payload: BusPayload,
    },
}

/// Cloneable client handle given to every subsystem.
#[derive(Clone)]
pub struct BusHandle {
    tx: mpsc::Sender<BusMessage>,
}

impl BusHandle {
    pub fn new(tx: mpsc::Sender<BusMessage>) -> Self {
        Self { tx }
    }

    /// Send a request and wait for the handler's reply.
    pub async fn request(
        &self,
        method: impl Into<String>,
        payload: BusPayload,
    ) -> Result<BusResult, BusCallError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(BusMessage::Request {
                id: Uuid::now_v7(),
                method: method.into(),
                payload,
                reply_tx,
            })
            .await
            .map_err(|_| BusCallError::Send)?;

        reply_rx.await.map_err(|_| BusCallError::Recv)
    }

    /// Fire-and-forget; fails fast when the queue is full.
    pub fn notify(&self, method: impl Into<String>, payload: BusPayload) -> Result<(), BusCallError> {
        self.tx
            .try_send(BusMessage::Notification { method: method.into(), payload })
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => BusCallError::Full,
                mpsc::error::TrySendError::Closed(_) => BusCallError::Send,
            })
    }
}

/// Owns the supervisor-side receiver.
pub struct SupervisorBus {
    pub rx: mpsc::Receiver<BusMessage>,
    pub handle: BusHandle,
}

impl SupervisorBus {
    pub fn new(buffer: usize) -> Self {
        let (tx, rx) = mpsc::channel(buffer);
        Self { rx, handle: BusHandle::new(tx) }
    }
}

/// Call-level transport errors for bus requests/notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusCallError {
    Send,
    Recv,
    Full,
}

impl fmt::Display for BusCallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BusCallError::Send => write!(f, "bus send failed: supervisor is not running"),
            BusCallError::Recv => write!(f, "bus recv failed: handler dropped reply sender"),
            BusCallError::Full => write!(f, "bus queue full"),
        }
    }
}

impl Error for BusCallError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_json_is_tagged() {
        let p = BusPayload::IndexInvalidate { path: "src".into() };
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json["type"], "index_invalidate");
        assert_eq!(json["path"], "src");
    }

    #[test]
    fn cron_spec_round_trips_through_json() {
        let spec = CronScheduleSpec::Daily { hour: 0, minute: 0, second: 0 };
        let json = serde_json::to_string(&spec).unwrap();
        assert!(json.contains("\"kind\":\"daily\""));
        let back: CronScheduleSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(back, spec);
    }

    #[tokio::test]
    async fn request_without_supervisor_fails_on_recv() {
        let bus = SupervisorBus::new(4);
        let handle = bus.handle.clone();
        let mut rx = bus.rx;
        tokio::spawn(async move {
            // Drop the reply sender without answering.
            let _ = rx.recv().await;
        });
        let err = handle.request("llm/complete", BusPayload::Empty).await.unwrap_err();
        assert_eq!(err, BusCallError::Recv);
    }

    #[test]
    fn notify_reports_full_queue() {
        let bus = SupervisorBus::new(1);
        bus.handle.notify("tasks/x", BusPayload::Empty).unwrap();
        let err = bus.handle.notify("tasks/x", BusPayload::Empty).unwrap_err();
        assert_eq!(err, BusCallError::Full);
    }

    #[test]
    fn notify_reports_closed_bus() {
        let bus = SupervisorBus::new(1);
        let handle = bus.handle.clone();
        drop(bus);
        assert_eq!(handle.notify("tasks/x", BusPayload::Empty).unwrap_err(), BusCallError::Send);
    }
}
