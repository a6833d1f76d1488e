//! Supervisor dispatch: generic trait for subsystem request handlers.
//!
//! Each subsystem implements [`BusHandler`] and registers with the supervisor
//! under its [`BusHandler::prefix`].  The supervisor routes incoming bus
//! messages to the matching handler without knowing the concrete type.
//!
//! # Method routing
//!
//! Method strings follow the form `"prefix/action"`.  The supervisor
//! extracts the first `/`-delimited segment and looks it up in its handler
//! table.  The full method is passed verbatim to the handler, so subsystems
//! do their own secondary routing.

use tokio::sync::oneshot;

use crate::supervisor::bus::{BusError, BusPayload, BusResult, ERR_METHOD_NOT_FOUND};

/// A subsystem that can handle [`crate::supervisor::bus::BusMessage`]s.
pub trait BusHandler: Send + Sync {
    /// The method prefix this handler owns (e.g. `"tools"`, `"llm"`).
    ///
    /// Must be unique across all registered handlers.  The supervisor panics
    /// on startup if two handlers share the same prefix.
    fn prefix(&self) -> &str;

    /// Handle an incoming request, taking ownership of `reply_tx`.
    ///
    /// Implementations **must not block** the caller: either resolve
    /// `reply_tx` synchronously or move it into a `tokio::spawn` task.
    fn handle_request(&self, method: &str, payload: BusPayload, reply_tx: oneshot::Sender<BusResult>);

    /// Handle an incoming notification (fire-and-forget, no reply expected).
    ///
    /// Default: silently ignore.
    fn handle_notification(&self, _method: &str, _payload: BusPayload) {}
}

/// Standard reply for a method the handler does not know.
pub fn method_not_found(method: &str) -> BusError {
    BusError::new(ERR_METHOD_NOT_FOUND, format!("method not found: {method}"))
}
