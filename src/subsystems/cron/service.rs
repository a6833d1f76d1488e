//! Timer loop behind the cron subsystem.
//!
//! Jobs live in a [`Timetable`] ordered by deadline. The loop sleeps until
//! the earliest one with `sleep_until`, so an idle timetable costs nothing.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use chrono::{Local, NaiveDateTime, NaiveTime, Utc};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::supervisor::bus::{BusHandle, BusPayload, CronEntryInfo, CronScheduleSpec};

const ONE_DAY: Duration = Duration::from_secs(24 * 60 * 60);

pub enum CronCommand {
    Schedule {
        target_method: String,
        payload: BusPayload,
        spec: CronScheduleSpec,
        reply: oneshot::Sender<String>,
    },
    Cancel {
        schedule_id: String,
        /// `false` when the id is unknown.
        reply: oneshot::Sender<bool>,
    },
    List {
        reply: oneshot::Sender<Vec<CronEntryInfo>>,
    },
}

#[derive(Debug, Clone)]
struct Job {
    id: String,
    target_method: String,
    payload: BusPayload,
    spec: CronScheduleSpec,
}

/// Jobs keyed by `(deadline, insertion sequence)`. The sequence keeps two
/// jobs due at the same instant distinct and fires them in insertion order.
#[derive(Default)]
struct Timetable {
    queue: BTreeMap<(Instant, u64), Job>,
    by_id: HashMap<String, (Instant, u64)>,
    seq: u64,
}

impl Timetable {
    fn add(&mut self, deadline: Instant, job: Job) {
        self.seq += 1;
        let key = (deadline, self.seq);
        self.by_id.insert(job.id.clone(), key);
        self.queue.insert(key, job);
    }

    fn remove(&mut self, id: &str) -> bool {
        match self.by_id.remove(id) {
            Some(key) => self.queue.remove(&key).is_some(),
            None => false,
        }
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.queue.keys().next().map(|(deadline, _)| *deadline)
    }

    /// Take the earliest job if it is due at `now`.
    fn pop_due(&mut self, now: Instant) -> Option<(Instant, Job)> {
        let (&(deadline, _), _) = self.queue.first_key_value()?;
        if deadline > now {
            return None;
        }
        let ((deadline, _), job) = self.queue.pop_first()?;
        self.by_id.remove(&job.id);
        Some((deadline, job))
    }

    fn snapshot(&self) -> Vec<CronEntryInfo> {
        let now = Instant::now();
        self.queue
            .iter()
            .map(|((deadline, _), job)| CronEntryInfo {
                schedule_id: job.id.clone(),
                target_method: job.target_method.clone(),
                spec: job.spec.clone(),
                next_fire_unix_ms: unix_ms_after(deadline.saturating_duration_since(now)),
            })
            .collect()
    }

    fn len(&self) -> usize {
        self.queue.len()
    }
}

pub struct CronService {
    bus: BusHandle,
    cmd_rx: mpsc::Receiver<CronCommand>,
    shutdown: CancellationToken,
    timetable: Timetable,
}

impl CronService {
    pub fn new(bus: BusHandle, cmd_rx: mpsc::Receiver<CronCommand>, shutdown: CancellationToken) -> Self {
        Self { bus, cmd_rx, shutdown, timetable: Timetable::default() }
    }

    pub async fn run(mut self) {
        info!("cron service running");
        loop {
            let wake = self.timetable.next_deadline();
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    info!(dropped = self.timetable.len(), "cron service shutting down");
                    return;
                }
                Some(cmd) = self.cmd_rx.recv() => self.handle(cmd),
                _ = sleep_until(wake) => {
                    let now = Instant::now();
                    while let Some((deadline, job)) = self.timetable.pop_due(now) {
                        self.fire(deadline, job);
                    }
                }
            }
        }
    }

    fn handle(&mut self, cmd: CronCommand) {
        match cmd {
            CronCommand::Schedule { target_method, payload, spec, reply } => {
                let id = Uuid::new_v4().to_string();
                let deadline = Instant::now() + first_delay(&spec);
                debug!(schedule_id = %id, %target_method, ?spec, "scheduled");
                self.timetable.add(deadline, Job { id: id.clone(), target_method, payload, spec });
                let _ = reply.send(id);
            }
            CronCommand::Cancel { schedule_id, reply } => {
                let removed = self.timetable.remove(&schedule_id);
                debug!(%schedule_id, removed, "cancel");
                let _ = reply.send(removed);
            }
            CronCommand::List { reply } => {
                let _ = reply.send(self.timetable.snapshot());
            }
        }
    }

    fn fire(&mut self, deadline: Instant, job: Job) {
        debug!(schedule_id = %job.id, target = %job.target_method, "cron firing");
        if let Err(e) = self.bus.notify(&job.target_method, job.payload.clone()) {
            warn!(schedule_id = %job.id, target = %job.target_method, error = %e, "cron notification not delivered");
        }
        if let Some(next) = following_deadline(&job.spec, deadline) {
            self.timetable.add(next, job);
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

/// Delay from now until a freshly scheduled job first fires.
fn first_delay(spec: &CronScheduleSpec) -> Duration {
    match *spec {
        CronScheduleSpec::Once { at_unix_ms } => {
            let ahead = (at_unix_ms as i64).saturating_sub(Utc::now().timestamp_millis());
            Duration::from_millis(ahead.max(0) as u64)
        }
        CronScheduleSpec::Interval { every_secs } => Duration::from_secs(every_secs),
        CronScheduleSpec::Daily { hour, minute, second } => {
            daily_delay(Local::now().naive_local(), hour, minute, second)
        }
    }
}

/// When a job that just fired at `fired` runs again, if ever.
fn following_deadline(spec: &CronScheduleSpec, fired: Instant) -> Option<Instant> {
    match *spec {
        CronScheduleSpec::Once { .. } => None,
        CronScheduleSpec::Interval { every_secs } => Some(fired + Duration::from_secs(every_secs)),
        CronScheduleSpec::Daily { hour, minute, second } => {
            // Skip past the second that just fired.
            let after = Local::now().naive_local() + chrono::Duration::seconds(1);
            Some(Instant::now() + daily_delay(after, hour, minute, second))
        }
    }
}

/// Time from `now` until the next `hour:minute:second`, strictly later.
/// Out-of-range times fall back to one day.
fn daily_delay(now: NaiveDateTime, hour: u32, minute: u32, second: u32) -> Duration {
    let Some(at) = NaiveTime::from_hms_opt(hour, minute, second) else {
        return ONE_DAY;
    };
    let today = now.date().and_time(at);
    let target = if today > now { today } else { today + chrono::Duration::days(1) };
    (target - now).to_std().unwrap_or(ONE_DAY)
}

fn unix_ms_after(delay: Duration) -> u64 {
    let now = Utc::now().timestamp_millis().max(0) as u64;
    now.saturating_add(delay.as_millis() as u64)
}
