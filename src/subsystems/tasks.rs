//! Tasks subsystem: targets for scheduled maintenance jobs.
//!
//! `tasks/check_request_limit` is registered with cron at startup (daily,
//! `tasks.request_limit_check` local time).  It has no observable effect
//! yet beyond a debug record of each run.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::oneshot;
use tracing::debug;

use crate::core::config::TimeOfDay;
use crate::supervisor::bus::{BusPayload, BusResult, CronScheduleSpec};
use crate::supervisor::dispatch::{BusHandler, method_not_found};

pub const CHECK_REQUEST_LIMIT: &str = "tasks/check_request_limit";

#[derive(Default)]
pub struct TasksSubsystem {
    runs: Arc<AtomicU64>,
}

impl TasksSubsystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Times `tasks/check_request_limit` has fired since startup.
    pub fn runs(&self) -> Arc<AtomicU64> {
        self.runs.clone()
    }
}

/// The `cron/schedule` payload registering the daily request-limit check.
pub fn daily_check_schedule(at: TimeOfDay) -> Result<BusPayload, serde_json::Error> {
    Ok(BusPayload::CronSchedule {
        target_method: CHECK_REQUEST_LIMIT.to_string(),
        payload_json: serde_json::to_string(&BusPayload::Empty)?,
        spec: CronScheduleSpec::Daily { hour: at.hour, minute: at.minute, second: at.second },
    })
}

impl BusHandler for TasksSubsystem {
    fn prefix(&self) -> &str {
        "tasks"
    }

    fn handle_request(&self, method: &str, _payload: BusPayload, reply_tx: oneshot::Sender<BusResult>) {
        let _ = reply_tx.send(Err(method_not_found(method)));
    }

    fn handle_notification(&self, method: &str, _payload: BusPayload) {
        if method == CHECK_REQUEST_LIMIT {
            let run = self.runs.fetch_add(1, Ordering::Relaxed) + 1;
            debug!(run, "request limit check");
        } else {
            debug!(%method, "tasks: unknown notification");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_notification_is_counted() {
        let tasks = TasksSubsystem::new();
        let runs = tasks.runs();
        tasks.handle_notification(CHECK_REQUEST_LIMIT, BusPayload::Empty);
        tasks.handle_notification("tasks/other", BusPayload::Empty);
        assert_eq!(runs.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn schedule_targets_daily_check() {
        let payload = daily_check_schedule(TimeOfDay { hour: 0, minute: 0, second: 0 }).unwrap();
        match payload {
            BusPayload::CronSchedule { target_method, spec, payload_json } => {
                assert_eq!(target_method, CHECK_REQUEST_LIMIT);
                assert_eq!(spec, CronScheduleSpec::Daily { hour: 0, minute: 0, second: 0 });
                assert!(matches!(serde_json::from_str(&payload_json).unwrap(), BusPayload::Empty));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn requests_are_not_found() {
        let (tx, rx) = oneshot::channel();
        TasksSubsystem::new().handle_request(CHECK_REQUEST_LIMIT, BusPayload::Empty, tx);
        assert_eq!(rx.await.unwrap().unwrap_err().code, crate::supervisor::bus::ERR_METHOD_NOT_FOUND);
    }
}
