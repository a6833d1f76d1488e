//! Memory subsystem: persistence gateway for conversation turns.
//!
//! Bus routes:
//! - `memory/append` (`MemoryAppend`) → `MemoryAppended { turn_id }`
//! - `memory/list` (`MemoryList`) → `MemoryTurns { turns }`
//!
//! Turns live in `{work_dir}/memory.db`.  Every SQLite call runs on the
//! blocking pool.

pub(crate) mod sqlite;
pub mod store;

use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::core::config::Config;
use crate::core::error::AppError;
use crate::supervisor::bus::{BusError, BusPayload, BusResult, ERR_BAD_REQUEST, ERR_INTERNAL};
use crate::supervisor::dispatch::{BusHandler, method_not_found};

pub use store::ConversationStore;

pub struct MemorySubsystem {
    store: ConversationStore,
}

impl MemorySubsystem {
    pub fn new(config: &Config) -> Result<Self, AppError> {
        let db_path = config.work_dir.join("memory.db");
        let store = ConversationStore::open(&db_path, config.memory.max_turns_per_owner)?;
        debug!(path = %db_path.display(), "memory store opened");
        Ok(Self { store })
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }
}

impl BusHandler for MemorySubsystem {
    fn prefix(&self) -> &str {
        "memory"
    }

    fn handle_request(&self, method: &str, payload: BusPayload, reply_tx: oneshot::Sender<BusResult>) {
        let store = self.store.clone();
        let work: Box<dyn FnOnce() -> Result<BusPayload, AppError> + Send> = match (method, payload) {
            ("memory/append", BusPayload::MemoryAppend { owner_id, human, ai }) => Box::new(move || {
                let turn_id = store.append(owner_id, human.as_deref(), ai.as_deref())?;
                Ok(BusPayload::MemoryAppended { turn_id })
            }),
            ("memory/list", BusPayload::MemoryList { owner_id, limit, offset }) => Box::new(move || {
                let turns = store.list(owner_id, limit, offset)?;
                Ok(BusPayload::MemoryTurns { turns })
            }),
            ("memory/append" | "memory/list", _) => {
                let _ = reply_tx.send(Err(BusError::new(
                    ERR_BAD_REQUEST,
                    format!("unsupported payload for method: {method}"),
                )));
                return;
            }
            _ => {
                let _ = reply_tx.send(Err(method_not_found(method)));
                return;
            }
        };

        let method = method.to_string();
        tokio::spawn(async move {
            let result = match tokio::task::spawn_blocking(work).await {
                Ok(Ok(payload)) => Ok(payload),
                Ok(Err(e)) => {
                    warn!(%method, error = %e, "memory operation failed");
                    Err(BusError::new(ERR_INTERNAL, e.to_string()))
                }
                Err(e) => Err(BusError::new(ERR_INTERNAL, format!("memory task join: {e}"))),
            };
            let _ = reply_tx.send(result);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn call(sub: &MemorySubsystem, method: &str, payload: BusPayload) -> BusResult {
        let (tx, rx) = oneshot::channel();
        sub.handle_request(method, payload, tx);
        rx.await.unwrap()
    }

    #[tokio::test]
    async fn append_then_list_round_trip() {
        let dir = TempDir::new().unwrap();
        let sub = MemorySubsystem::new(&Config::test_default(dir.path())).unwrap();

        for _ in 0..2 {
            let reply = call(
                &sub,
                "memory/append",
                BusPayload::MemoryAppend { owner_id: 1, human: Some("q".into()), ai: Some("a".into()) },
            )
            .await;
            assert!(matches!(reply, Ok(BusPayload::MemoryAppended { .. })));
        }

        let reply = call(&sub, "memory/list", BusPayload::MemoryList { owner_id: 1, limit: None, offset: None })
            .await;
        match reply {
            Ok(BusPayload::MemoryTurns { turns }) => assert_eq!(turns.len(), 2),
            other => panic!("unexpected: {other:?}"),
        }
        assert!(dir.path().join("memory.db").exists());
    }

    #[tokio::test]
    async fn mismatched_payload_is_bad_request() {
        let dir = TempDir::new().unwrap();
        let sub = MemorySubsystem::new(&Config::test_default(dir.path())).unwrap();
        let err = call(&sub, "memory/append", BusPayload::Empty).await.unwrap_err();
        assert_eq!(err.code, ERR_BAD_REQUEST);
        let err = call(&sub, "memory/forget", BusPayload::Empty).await.unwrap_err();
        assert_eq!(err.code, crate::supervisor::bus::ERR_METHOD_NOT_FOUND);
    }
}
