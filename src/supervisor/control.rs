//! Supervisor control plane.
//!
//! Questions about the supervisor itself (uptime, registered handler
//! prefixes) travel on their own channel so they are answered even when no
//! handler owns a matching bus prefix.

use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// What the supervisor reports about itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub uptime_ms: u64,
    /// Registered handler prefixes, sorted.
    pub handlers: Vec<String>,
}

#[derive(Debug)]
pub enum ControlMessage {
    Health(oneshot::Sender<HealthReport>),
}

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("supervisor is not running")]
    Stopped,
    #[error("supervisor dropped the reply")]
    NoReply,
}

/// Cloneable client side of the control plane.
#[derive(Clone)]
pub struct ControlHandle {
    tx: mpsc::Sender<ControlMessage>,
}

impl ControlHandle {
    pub async fn health(&self) -> Result<HealthReport, ControlError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx.send(ControlMessage::Health(reply_tx)).await.map_err(|_| ControlError::Stopped)?;
        reply_rx.await.map_err(|_| ControlError::NoReply)
    }
}

/// Supervisor side: the receiver plus a handle to give out.
pub struct SupervisorControl {
    pub rx: mpsc::Receiver<ControlMessage>,
    pub handle: ControlHandle,
}

impl SupervisorControl {
    pub fn new(buffer: usize) -> Self {
        let (tx, rx) = mpsc::channel(buffer);
        Self { rx, handle: ControlHandle { tx } }
    }
}
