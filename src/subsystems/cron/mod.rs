//! Cron subsystem: background timer service that emits scheduled bus events.
//!
//! Registers as a [`BusHandler`] with prefix `"cron"`.  Other subsystems
//! schedule events by sending bus requests:
//!
//! - `cron/schedule`: register a one-shot, interval or daily timer.
//! - `cron/cancel`: remove an active schedule by ID.
//! - `cron/list`: list all active schedules.
//!
//! `payload_json` is decoded when the schedule is registered, so a malformed
//! payload is rejected up front. When a timer fires, the cron service emits
//! the configured `target_method` as a bus notification.  The supervisor routes it by prefix like any other
//! notification.
//!
//! The subsystem spawns a single background tokio task that parks on
//! `tokio::time::sleep_until` until the next deadline.  It wakes only when a
//! timer fires, a command arrives on its internal channel, or shutdown is
//! requested.

mod service;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::supervisor::bus::{
    BusError, BusHandle, BusPayload, BusResult, CronScheduleSpec, ERR_BAD_REQUEST, ERR_INTERNAL,
};
use crate::supervisor::dispatch::{BusHandler, method_not_found};

use service::{CronCommand, CronService};

/// Cron subsystem: owns a background timer task and exposes scheduling via
/// the supervisor bus.
pub struct CronSubsystem {
    cmd_tx: mpsc::Sender<CronCommand>,
}

impl CronSubsystem {
    /// Create the cron subsystem. Spawns the background timer task immediately.
    pub fn new(bus: BusHandle, shutdown: CancellationToken) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(64);
        let svc = CronService::new(bus, cmd_rx, shutdown);
        tokio::spawn(svc.run());
        debug!("cron subsystem started");
        Self { cmd_tx }
    }
}

/// Reject specs the timer loop cannot honour.
fn validate(spec: &CronScheduleSpec) -> Result<(), BusError> {
    match *spec {
        CronScheduleSpec::Interval { every_secs: 0 } => {
            Err(BusError::new(ERR_BAD_REQUEST, "interval every_secs must be > 0"))
        }
        CronScheduleSpec::Daily { hour, minute, second } if hour > 23 || minute > 59 || second > 59 => {
            Err(BusError::new(
                ERR_BAD_REQUEST,
                format!("invalid daily time {hour:02}:{minute:02}:{second:02}"),
            ))
        }
        _ => Ok(()),
    }
}

/// The payload emitted on each firing, decoded once when scheduled.
fn parse_payload(json: &str) -> Result<BusPayload, BusError> {
    serde_json::from_str(json).map_err(|e| BusError::new(ERR_BAD_REQUEST, format!("invalid payload_json: {e}")))
}

/// Send `cmd` to the timer task and map its acknowledgement to a reply.
fn forward<T: Send + 'static>(
    cmd_tx: mpsc::Sender<CronCommand>,
    reply_tx: oneshot::Sender<BusResult>,
    make: impl FnOnce(oneshot::Sender<T>) -> CronCommand + Send + 'static,
    finish: impl FnOnce(T) -> BusResult + Send + 'static,
) {
    tokio::spawn(async move {
        let (ack_tx, ack_rx) = oneshot::channel();
        if cmd_tx.send(make(ack_tx)).await.is_err() {
            let _ = reply_tx.send(Err(BusError::new(ERR_INTERNAL, "cron service not running")));
            return;
        }
        let result = match ack_rx.await {
            Ok(ack) => finish(ack),
            Err(_) => Err(BusError::new(ERR_INTERNAL, "cron service dropped reply")),
        };
        let _ = reply_tx.send(result);
    });
}

impl BusHandler for CronSubsystem {
    fn prefix(&self) -> &str {
        "cron"
    }

    fn handle_request(&self, method: &str, payload: BusPayload, reply_tx: oneshot::Sender<BusResult>) {
        let cmd_tx = self.cmd_tx.clone();

        match (method, payload) {
            ("cron/schedule", BusPayload::CronSchedule { target_method, payload_json, spec }) => {
                let payload = match validate(&spec).and_then(|()| parse_payload(&payload_json)) {
                    Ok(payload) => payload,
                    Err(e) => {
                        let _ = reply_tx.send(Err(e));
                        return;
                    }
                };
                forward(
                    cmd_tx,
                    reply_tx,
                    |reply| CronCommand::Schedule { target_method, payload, spec, reply },
                    |schedule_id| Ok(BusPayload::CronScheduleResult { schedule_id }),
                );
            }
            ("cron/cancel", BusPayload::CronCancel { schedule_id }) => {
                forward(
                    cmd_tx,
                    reply_tx,
                    |reply| CronCommand::Cancel { schedule_id, reply },
                    |removed| {
                        if removed {
                            Ok(BusPayload::Empty)
                        } else {
                            Err(BusError::new(ERR_BAD_REQUEST, "schedule not found"))
                        }
                    },
                );
            }
            ("cron/list", _) => {
                forward(
                    cmd_tx,
                    reply_tx,
                    |reply| CronCommand::List { reply },
                    |entries| Ok(BusPayload::CronListResult { entries }),
                );
            }
            ("cron/schedule" | "cron/cancel", _) => {
                let _ = reply_tx.send(Err(BusError::new(
                    ERR_BAD_REQUEST,
                    format!("unsupported payload for method: {method}"),
                )));
            }
            _ => {
                warn!(method, "cron: unknown method");
                let _ = reply_tx.send(Err(method_not_found(method)));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::supervisor::bus::SupervisorBus;

    async fn call(sub: &CronSubsystem, method: &str, payload: BusPayload) -> BusResult {
        let (tx, rx) = oneshot::channel();
        sub.handle_request(method, payload, tx);
        rx.await.unwrap()
    }

    fn schedule(spec: CronScheduleSpec) -> BusPayload {
        BusPayload::CronSchedule {
            target_method: "tasks/check_request_limit".into(),
            payload_json: serde_json::to_string(&BusPayload::Empty).unwrap(),
            spec,
        }
    }

    #[tokio::test]
    async fn schedule_list_cancel_over_bus() {
        let bus = SupervisorBus::new(8);
        let shutdown = CancellationToken::new();
        let cron = CronSubsystem::new(bus.handle.clone(), shutdown.clone());

        let id = match call(&cron, "cron/schedule", schedule(CronScheduleSpec::Daily { hour: 0, minute: 0, second: 0 })).await {
            Ok(BusPayload::CronScheduleResult { schedule_id }) => schedule_id,
            other => panic!("unexpected: {other:?}"),
        };
        match call(&cron, "cron/list", BusPayload::Empty).await {
            Ok(BusPayload::CronListResult { entries }) => {
                assert_eq!(entries.len(), 1);
                assert_eq!(entries[0].schedule_id, id);
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert!(call(&cron, "cron/cancel", BusPayload::CronCancel { schedule_id: id.clone() }).await.is_ok());
        let err = call(&cron, "cron/cancel", BusPayload::CronCancel { schedule_id: id }).await.unwrap_err();
        assert_eq!(err.message, "schedule not found");
        shutdown.cancel();
    }

    #[tokio::test]
    async fn invalid_specs_are_rejected() {
        let bus = SupervisorBus::new(8);
        let shutdown = CancellationToken::new();
        let cron = CronSubsystem::new(bus.handle.clone(), shutdown.clone());

        for spec in [
            CronScheduleSpec::Interval { every_secs: 0 },
            CronScheduleSpec::Daily { hour: 24, minute: 0, second: 0 },
            CronScheduleSpec::Daily { hour: 1, minute: 60, second: 0 },
        ] {
            let err = call(&cron, "cron/schedule", schedule(spec)).await.unwrap_err();
            assert_eq!(err.code, ERR_BAD_REQUEST);
        }
        let bad_payload = BusPayload::CronSchedule {
            target_method: "tasks/check_request_limit".into(),
            payload_json: "{not json".into(),
            spec: CronScheduleSpec::Interval { every_secs: 5 },
        };
        let err = call(&cron, "cron/schedule", bad_payload).await.unwrap_err();
        assert!(err.message.starts_with("invalid payload_json"), "{}", err.message);
        match call(&cron, "cron/list", BusPayload::Empty).await {
            Ok(BusPayload::CronListResult { entries }) => assert!(entries.is_empty()),
            other => panic!("unexpected: {other:?}"),
        }
        let err = call(&cron, "cron/schedule", BusPayload::Empty).await.unwrap_err();
        assert_eq!(err.code, ERR_BAD_REQUEST);
        let err = call(&cron, "cron/pause", BusPayload::Empty).await.unwrap_err();
        assert_eq!(err.code, crate::supervisor::bus::ERR_METHOD_NOT_FOUND);
        shutdown.cancel();
    }
}
