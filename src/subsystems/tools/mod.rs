//! Tools subsystem: the tool-dispatch façade.
//!
//! Bus routes:
//! - `tools/list` → `ToolCatalog { tools }`
//! - `tools/execute` (`ToolRequest { tool, input }`) → `ToolResponse`
//! - `tools/invalidate` (`IndexInvalidate { path }`) → `ToolResponse`
//!
//! Tool failures are *replies*, not bus errors: `tools/execute` always
//! answers `Ok(ToolResponse)` with `ok = false` and a typed [`ToolFailure`]
//! so callers can tell failure kinds apart.

pub mod automation;
pub mod capability;
#[cfg(feature = "tool-code-qa")]
pub mod code_qa;
pub mod context;
pub mod database;
pub mod error;
pub mod files;
pub mod terminal;

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::oneshot;
use tracing::{debug, info};

use crate::core::config::ToolsConfig;
use crate::supervisor::bus::{BusError, BusHandle, BusPayload, BusResult, ERR_BAD_REQUEST};
use crate::supervisor::dispatch::{BusHandler, method_not_found};

pub use capability::{Capability, Catalog};
pub use context::ToolContext;
pub use error::ToolError;

pub struct ToolsSubsystem {
    catalog: Arc<Catalog>,
    bus: BusHandle,
}

impl ToolsSubsystem {
    pub fn new(config: &ToolsConfig, bus: BusHandle) -> Result<Self, ToolError> {
        let catalog = Catalog::from_config(config)?;
        let names: Vec<String> = catalog.descriptors().into_iter().map(|d| d.name).collect();
        info!(tools = ?names, "tool catalog ready");
        Ok(Self { catalog: Arc::new(catalog), bus })
    }
}

fn response(tool: String, outcome: Result<String, ToolError>) -> BusPayload {
    match outcome {
        Ok(output) => BusPayload::ToolResponse { tool, ok: true, output: Some(output), error: None },
        Err(e) => BusPayload::ToolResponse { tool, ok: false, output: None, error: Some(e.to_failure()) },
    }
}

impl BusHandler for ToolsSubsystem {
    fn prefix(&self) -> &str {
        "tools"
    }

    fn handle_request(&self, method: &str, payload: BusPayload, reply_tx: oneshot::Sender<BusResult>) {
        match (method, payload) {
            ("tools/list", _) => {
                let _ = reply_tx.send(Ok(BusPayload::ToolCatalog { tools: self.catalog.descriptors() }));
            }
            ("tools/execute", BusPayload::ToolRequest { tool, input, channel_id }) => {
                let catalog = self.catalog.clone();
                let ctx = ToolContext::new(self.bus.clone(), channel_id);
                tokio::spawn(async move {
                    let started = Instant::now();
                    let outcome = catalog.execute(&tool, &input, &ctx).await;
                    let elapsed_ms = started.elapsed().as_millis() as u64;
                    match &outcome {
                        Ok(output) => info!(%tool, elapsed_ms, output_len = output.len(), "tool ok"),
                        Err(e) => info!(%tool, elapsed_ms, code = e.code(), error = %e, "tool failed"),
                    }
                    let _ = reply_tx.send(Ok(response(tool, outcome)));
                });
            }
            ("tools/invalidate", BusPayload::IndexInvalidate { path }) => {
                let catalog = self.catalog.clone();
                tokio::task::spawn_blocking(move || {
                    let outcome = catalog.invalidate_index(&path).map(|removed| {
                        debug!(%path, removed, "index invalidate");
                        if removed { "index dropped" } else { "index not cached" }.to_string()
                    });
                    let _ = reply_tx.send(Ok(response("code_qa".into(), outcome)));
                });
            }
            ("tools/execute" | "tools/invalidate", _) => {
                let _ = reply_tx.send(Err(BusError::new(
                    ERR_BAD_REQUEST,
                    format!("unsupported payload for method: {method}"),
                )));
            }
            _ => {
                let _ = reply_tx.send(Err(method_not_found(method)));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::Config;
    use crate::supervisor::bus::SupervisorBus;
    use tempfile::TempDir;

    async fn call(sub: &ToolsSubsystem, method: &str, payload: BusPayload) -> BusResult {
        let (tx, rx) = oneshot::channel();
        sub.handle_request(method, payload, tx);
        rx.await.unwrap()
    }

    fn subsystem(dir: &TempDir) -> ToolsSubsystem {
        let cfg = Config::test_default(dir.path());
        ToolsSubsystem::new(&cfg.tools, SupervisorBus::new(4).handle).unwrap()
    }

    #[tokio::test]
    async fn list_returns_catalog() {
        let dir = TempDir::new().unwrap();
        match call(&subsystem(&dir), "tools/list", BusPayload::Empty).await {
            Ok(BusPayload::ToolCatalog { tools }) => assert!(tools.iter().any(|t| t.name == "terminal")),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn execute_success_and_failure_are_replies() {
        let dir = TempDir::new().unwrap();
        let sub = subsystem(&dir);
        let req = |input: &str| BusPayload::ToolRequest {
            tool: "terminal".into(),
            input: input.into(),
            channel_id: "test".into(),
        };

        match call(&sub, "tools/execute", req("echo hi")).await {
            Ok(BusPayload::ToolResponse { ok: true, output, .. }) => assert_eq!(output.as_deref(), Some("hi\n")),
            other => panic!("unexpected: {other:?}"),
        }
        match call(&sub, "tools/execute", req("rm -rf /")).await {
            Ok(BusPayload::ToolResponse { ok: false, error: Some(f), .. }) => {
                assert_eq!(f.code, "denied");
                assert!(!f.recoverable);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn wrong_payload_is_bad_request() {
        let dir = TempDir::new().unwrap();
        let err = call(&subsystem(&dir), "tools/execute", BusPayload::Empty).await.unwrap_err();
        assert_eq!(err.code, ERR_BAD_REQUEST);
    }

    #[cfg(feature = "tool-code-qa")]
    #[tokio::test]
    async fn invalidate_reports_through_tool_response() {
        let dir = TempDir::new().unwrap();
        let reply = call(&subsystem(&dir), "tools/invalidate", BusPayload::IndexInvalidate { path: "src".into() })
            .await
            .unwrap();
        match reply {
            BusPayload::ToolResponse { ok: true, output, .. } => {
                assert_eq!(output.as_deref(), Some("index not cached"))
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
