//! Supervisor: owns the event bus and routes messages between subsystems.

pub mod bus;
pub mod control;
pub mod dispatch;

use std::collections::HashMap;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use bus::{BusMessage, SupervisorBus};
use control::{ControlMessage, HealthReport, SupervisorControl};
use dispatch::{BusHandler, method_not_found};

/// Run the supervisor message loop until `shutdown` is cancelled.
///
/// The supervisor is a pure router: it reads each message, determines the
/// target subsystem by the first `/`-delimited method segment, and hands
/// off ownership of `reply_tx` to the matching [`BusHandler`].
///
/// # Panics
///
/// Panics on startup if two handlers share the same prefix.
pub async fn run(
    mut bus: SupervisorBus,
    mut control: SupervisorControl,
    shutdown: CancellationToken,
    handlers: Vec<Box<dyn BusHandler>>,
) {
    let mut table: HashMap<String, Box<dyn BusHandler>> = HashMap::new();
    for h in handlers {
        let prefix = h.prefix().to_string();
        debug!(%prefix, "registering bus handler");
        if table.insert(prefix.clone(), h).is_some() {
            panic!("duplicate BusHandler prefix registered: {prefix:?}");
        }
    }

    let mut handler_ids: Vec<String> = table.keys().cloned().collect();
    handler_ids.sort();
    info!(handlers = ?handler_ids, "supervisor ready");

    let started_at = Instant::now();

    loop {
        tokio::select! {
            biased;

            _ = shutdown.cancelled() => {
                info!("supervisor shutting down");
                break;
            }

            Some(ControlMessage::Health(reply_tx)) = control.rx.recv() => {
                let _ = reply_tx.send(HealthReport {
                    uptime_ms: started_at.elapsed().as_millis() as u64,
                    handlers: handler_ids.clone(),
                });
            }

            msg = bus.rx.recv() => {
                match msg {
                    Some(BusMessage::Request { id, method, payload, reply_tx }) => {
                        let prefix = method.split('/').next().unwrap_or_default();
                        match table.get(prefix) {
                            Some(handler) => {
                                debug!(%id, %method, "routing request");
                                trace!(%id, %method, payload = ?payload, "request payload");
                                handler.handle_request(&method, payload, reply_tx);
                            }
                            None => {
                                warn!(%id, %method, "unhandled request method");
                                let _ = reply_tx.send(Err(method_not_found(&method)));
                            }
                        }
                    }
                    Some(BusMessage::Notification { method, payload }) => {
                        let prefix = method.split('/').next().unwrap_or_default();
                        match table.get(prefix) {
                            Some(handler) => {
                                debug!(%method, "routing notification");
                                handler.handle_notification(&method, payload);
                            }
                            None => debug!(%method, "unhandled notification"),
                        }
                    }
                    None => {
                        info!("bus closed, supervisor exiting");
                        break;
                    }
                }
            }
        }
    }
}
