//! The job scheduler adapter.
//!
//! Wraps the task runner behind [`TaskRunner`] so the rest of the subsystem
//! schedules work without knowing how deferred execution happens. Deployments
//! without an external runner can use the tick-driven
//! [`memory::InMemoryRunner`].
//!
//! All notification jobs funnel through [`Hook::Deliver`] (retries through the
//! distinct [`Hook::Retry`] grouping) so the retry controller has a single
//! interception point. The periodic scan checks each get their own hook on a
//! fixed [`Cadence`].

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cron::Schedule;
use serde_json::Value;
use thiserror::Error;

use crate::job::NotificationJob;
use crate::scans::ScanCheck;

pub mod memory;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Error encoding job payload")]
    EncodeDecode(#[from] serde_json::Error),
    #[error("Task runner unavailable: {0}")]
    RunnerUnavailable(String),
    #[error("Task runner in bad state")]
    BadState,
}

/// A named entry point on the task runner.
///
/// Hooks are a closed set: the runner never dispatches on free-form strings,
/// it hands a `Hook` back to the registry built at startup.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum Hook {
    /// First delivery attempt of a notification job.
    Deliver,
    /// Re-submission of a failed notification job.
    Retry,
    /// A periodic domain scan.
    Scan(ScanCheck),
}

impl Hook {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Deliver => "notify.deliver",
            Self::Retry => "notify.retry",
            Self::Scan(check) => check.hook_name(),
        }
    }
}

impl std::fmt::Display for Hook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// The external delayed/recurring task runner.
#[async_trait]
pub trait TaskRunner: Send + Sync {
    /// Schedules one execution of `hook` with `payload` at `run_at`.
    async fn schedule_single(
        &self,
        hook: Hook,
        payload: Value,
        run_at: DateTime<Utc>,
    ) -> Result<(), SchedulerError>;

    /// Schedules a recurring execution of `hook`, first at `first_run_at` and
    /// thereafter per `schedule`.
    ///
    /// Idempotent: if an equivalent recurring entry already exists no
    /// duplicate is created.
    async fn schedule_recurring(
        &self,
        hook: Hook,
        first_run_at: DateTime<Utc>,
        schedule: Schedule,
    ) -> Result<(), SchedulerError>;

    /// The next time `hook` is due, if anything is scheduled for it.
    async fn next_scheduled(&self, hook: &Hook) -> Result<Option<DateTime<Utc>>, SchedulerError>;
}

/// The fixed cadences the periodic scans run on.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Cadence {
    /// Every day at 10:00.
    Daily,
    /// Every Monday at 09:00.
    Weekly,
    /// The 1st of every month at 09:00.
    Monthly,
}

impl Cadence {
    pub const ALL: [Cadence; 3] = [Cadence::Daily, Cadence::Weekly, Cadence::Monthly];

    pub fn schedule(&self) -> Schedule {
        let expression = match self {
            Self::Daily => "0 0 10 * * *",
            Self::Weekly => "0 0 9 * * Mon",
            Self::Monthly => "0 0 9 1 * *",
        };
        Schedule::from_str(expression).expect("cadence cron expression must parse")
    }

    /// The first run strictly after `now`.
    pub fn first_run_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.schedule()
            .after(&now)
            .next()
            .expect("cadence schedule has no upcoming occurrence")
    }

    /// The scan checks this cadence owns.
    pub fn checks(&self) -> &'static [ScanCheck] {
        match self {
            Self::Daily => &[ScanCheck::BookingReminder, ScanCheck::RoomingListDue],
            Self::Weekly => &[ScanCheck::QuoteFollowUp],
            Self::Monthly => &[ScanCheck::InactiveAccounts],
        }
    }
}

/// Schedules notification work on a [`TaskRunner`].
///
/// A runner fault at schedule-time is a hard dependency fault, not a
/// retryable condition: it is logged and swallowed, never propagated to the
/// triggering domain code.
#[derive(Clone)]
pub struct Scheduler {
    runner: Arc<dyn TaskRunner>,
}

impl Scheduler {
    pub fn new(runner: Arc<dyn TaskRunner>) -> Self {
        Self { runner }
    }

    /// Schedules the first delivery attempt of `job` at `run_at`.
    pub async fn schedule_job(&self, job: &NotificationJob, run_at: DateTime<Utc>) {
        self.schedule(Hook::Deliver, job, run_at).await;
    }

    /// Re-submits a failed `job` under the retry grouping at `run_at`.
    pub async fn schedule_retry(&self, job: &NotificationJob, run_at: DateTime<Utc>) {
        self.schedule(Hook::Retry, job, run_at).await;
    }

    async fn schedule(&self, hook: Hook, job: &NotificationJob, run_at: DateTime<Utc>) {
        let payload = match serde_json::to_value(job) {
            Ok(payload) => payload,
            Err(err) => {
                tracing::error!(
                    ?err,
                    notification_type = %job.notification_type,
                    "Failed to encode notification job"
                );
                return;
            }
        };
        if let Err(err) = self.runner.schedule_single(hook.clone(), payload, run_at).await {
            tracing::error!(
                ?err,
                %hook,
                notification_type = %job.notification_type,
                "Failed to schedule notification job"
            );
        }
    }

    /// Registers the recurring scan checks for every [`Cadence`].
    ///
    /// Safe to call on every startup: cadences already present on the runner
    /// are left untouched.
    pub async fn install_cadences(&self, now: DateTime<Utc>) {
        for cadence in Cadence::ALL {
            let first_run_at = cadence.first_run_after(now);
            for check in cadence.checks() {
                let hook = Hook::Scan(*check);
                if let Err(err) = self
                    .runner
                    .schedule_recurring(hook.clone(), first_run_at, cadence.schedule())
                    .await
                {
                    tracing::error!(?err, %hook, "Failed to register recurring scan");
                }
            }
        }
    }
}
