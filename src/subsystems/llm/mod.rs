//! LLM subsystem: routes `llm/*` bus requests to the configured provider.
//!
//! Implements [`BusHandler`] with prefix `"llm"` so the supervisor can
//! register it generically.  Each request is resolved in a spawned task;
//! the supervisor loop is never blocked on I/O.

use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::core::config::LlmConfig;
use crate::llm::providers;
use crate::llm::{CompletionRequest, LlmProvider, ProviderError};
use crate::supervisor::bus::{BusError, BusPayload, BusResult, ERR_BAD_REQUEST, ERR_INTERNAL};
use crate::supervisor::dispatch::{BusHandler, method_not_found};

pub struct LlmSubsystem {
    provider: LlmProvider,
    max_tokens: u32,
}

impl LlmSubsystem {
    /// Construct the subsystem. `api_key` comes from the environment, never TOML.
    pub fn new(config: &LlmConfig, api_key: Option<String>) -> Result<Self, ProviderError> {
        let provider = providers::build(config, api_key)?;
        Ok(Self { provider, max_tokens: config.max_tokens })
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }
}

impl BusHandler for LlmSubsystem {
    fn prefix(&self) -> &str {
        "llm"
    }

    /// Route an `llm/*` request. Ownership of `reply_tx` is moved into a
    /// spawned task: the supervisor loop returns immediately.
    fn handle_request(&self, method: &str, payload: BusPayload, reply_tx: oneshot::Sender<BusResult>) {
        if method != "llm/complete" {
            let _ = reply_tx.send(Err(method_not_found(method)));
            return;
        }

        let BusPayload::LlmRequest { channel_id, content, system, history, temperature } = payload else {
            let _ = reply_tx.send(Err(BusError::new(
                ERR_BAD_REQUEST,
                format!("unsupported payload for method: {method}"),
            )));
            return;
        };

        let provider = self.provider.clone();
        let request = CompletionRequest {
            system,
            history,
            content,
            temperature,
            max_tokens: Some(self.max_tokens),
        };
        debug!(%channel_id, history = request.history.len(), "dispatching to llm provider");

        tokio::spawn(async move {
            let result = provider
                .complete(&request)
                .await
                .map(|content| BusPayload::CommsMessage { channel_id, content })
                .map_err(|e| {
                    warn!(error = %e, "llm completion failed");
                    BusError::new(ERR_INTERNAL, e.to_string())
                });
            let _ = reply_tx.send(result);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::Config;
    use crate::supervisor::bus::ERR_METHOD_NOT_FOUND;

    fn subsystem() -> LlmSubsystem {
        let cfg = Config::test_default(std::path::Path::new("/tmp"));
        LlmSubsystem::new(&cfg.llm, None).unwrap()
    }

    #[tokio::test]
    async fn complete_echoes_through_dummy() {
        let (tx, rx) = oneshot::channel();
        subsystem().handle_request(
            "llm/complete",
            BusPayload::LlmRequest {
                channel_id: "http".into(),
                content: "ping".into(),
                system: None,
                history: vec![],
                temperature: Some(0.8),
            },
            tx,
        );
        match rx.await.unwrap() {
            Ok(BusPayload::CommsMessage { channel_id, content }) => {
                assert_eq!(channel_id, "http");
                assert_eq!(content, "[echo] ping");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn wrong_payload_is_bad_request() {
        let (tx, rx) = oneshot::channel();
        subsystem().handle_request("llm/complete", BusPayload::Empty, tx);
        assert_eq!(rx.await.unwrap().unwrap_err().code, ERR_BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_method_is_not_found() {
        let (tx, rx) = oneshot::channel();
        subsystem().handle_request("llm/stream", BusPayload::Empty, tx);
        assert_eq!(rx.await.unwrap().unwrap_err().code, ERR_METHOD_NOT_FOUND);
    }
}
