//! Comms subsystem: manages the external I/O channels.
//!
//! # Architecture
//!
//! Each channel implements [`runtime::Component`] and is spawned as an
//! independent concurrent task by [`start`] via
//! [`runtime::spawn_components`].  Channels capture their shared
//! [`Arc<CommsState>`] at construction time: no state is passed through the
//! generic `Component::run` signature.
//!
//! An intra-subsystem [`mpsc`] channel lets running channels signal the
//! comms manager (lifecycle events).  It is drained in a short-lived
//! background task that dies naturally when all channel senders are dropped.
//!
//! [`runtime::Component`]: crate::subsystems::runtime::Component
//! [`runtime::spawn_components`]: crate::subsystems::runtime::spawn_components

#[cfg(feature = "channel-axum")]
pub mod axum_channel;
mod state;

pub use state::{CommsEvent, CommsState, HealthSnapshot, ToolOutcome};

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::core::config::Config;
use crate::subsystems::runtime::{Component, SubsystemHandle, spawn_components};
use crate::supervisor::bus::BusHandle;
use crate::supervisor::control::ControlHandle;

/// Spawn all configured comms channels and return a [`SubsystemHandle`].
///
/// Channels start immediately.  If any channel exits with an error the shared
/// `shutdown` token is cancelled so siblings stop cooperatively.  The handle
/// resolves when all channels have exited.
pub fn start(
    config: &Config,
    bus: BusHandle,
    control: ControlHandle,
    shutdown: CancellationToken,
) -> SubsystemHandle {
    let (event_tx, event_rx) = mpsc::channel::<CommsEvent>(32);
    let state = Arc::new(CommsState::new(bus, control, config.agents.default_owner_id, event_tx));

    let mut components: Vec<Box<dyn Component>> = Vec::new();

    #[cfg(feature = "channel-axum")]
    {
        info!(bind = %config.comms.http.bind, "loading http channel");
        components.push(Box::new(axum_channel::AxumChannel::new(
            "http0",
            config.comms.http.clone(),
            state.clone(),
        )));
    }

    if components.is_empty() {
        info!("no comms channels configured, waiting for shutdown");
    }
    drop(state);

    tokio::spawn(async move {
        let mut rx = event_rx;
        while let Some(event) = rx.recv().await {
            match event {
                CommsEvent::ChannelStarted { ref channel_id } => debug!(channel_id, "channel started"),
                CommsEvent::ChannelShutdown { ref channel_id } => debug!(channel_id, "channel reported shutdown"),
            }
        }
    });

    spawn_components(components, shutdown)
}
