//! Runs the long-lived pieces of a subsystem (today the HTTP listener) as
//! sibling tasks that share one shutdown token.
//!
//! The first component to fail or panic cancels the token. The remaining
//! ones are still drained so their shutdown logging completes before
//! [`SubsystemHandle::join`] returns the first failure.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use tokio::task::{self, JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::core::error::AppError;

pub type ComponentFuture = Pin<Box<dyn Future<Output = Result<(), AppError>> + Send + 'static>>;

/// A unit with its own run loop. State it needs is captured at construction.
pub trait Component: Send + 'static {
    /// Name used in logs and in failure messages.
    fn id(&self) -> &str;

    /// Runs until `shutdown` fires or the work is finished.
    fn run(self: Box<Self>, shutdown: CancellationToken) -> ComponentFuture;
}

pub struct SubsystemHandle {
    inner: JoinHandle<Result<(), AppError>>,
}

impl SubsystemHandle {
    /// Wait for every component and return the first failure.
    pub async fn join(self) -> Result<(), AppError> {
        self.inner
            .await
            .unwrap_or_else(|e| Err(AppError::Comms(format!("component supervisor panicked: {e}"))))
    }
}

pub fn spawn_components(components: Vec<Box<dyn Component>>, shutdown: CancellationToken) -> SubsystemHandle {
    let inner = tokio::spawn(async move {
        let mut set = JoinSet::new();
        let mut names: HashMap<task::Id, String> = HashMap::new();
        for component in components {
            let name = component.id().to_string();
            let abort = set.spawn(component.run(shutdown.clone()));
            debug!(component = %name, "component started");
            names.insert(abort.id(), name);
        }

        let mut failure: Option<AppError> = None;
        while let Some(joined) = set.join_next_with_id().await {
            let (task_id, outcome) = match joined {
                Ok((id, result)) => (id, result),
                Err(e) => (e.id(), Err(AppError::Comms(format!("panicked: {e}")))),
            };
            let name = names.remove(&task_id).unwrap_or_default();
            match outcome {
                Ok(()) => info!(component = %name, "component stopped"),
                Err(e) => {
                    error!(component = %name, error = %e, "component failed");
                    shutdown.cancel();
                    if failure.is_none() {
                        failure = Some(AppError::Comms(format!("{name}: {e}")));
                    }
                }
            }
        }
        failure.map_or(Ok(()), Err)
    });
    SubsystemHandle { inner }
}
