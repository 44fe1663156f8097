//! A tick-driven, in-memory [`TaskRunner`].
//!
//! Owns the delayed-work state this subsystem needs without an external
//! runner: single-shot and recurring tasks live in process memory and are
//! released by explicit [`InMemoryRunner::take_due`] calls, mirroring the
//! periodic external tick that drives production deployments. Not durable
//! across restarts; deployments needing durability put a persistent runner
//! behind [`TaskRunner`] instead.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cron::Schedule;
use serde_json::Value;

use super::{Hook, SchedulerError, TaskRunner};

#[derive(Clone)]
struct ScheduledTask {
    hook: Hook,
    payload: Value,
    run_at: DateTime<Utc>,
    recurrence: Option<Schedule>,
}

/// A task released by [`InMemoryRunner::take_due`].
#[derive(Debug, Clone)]
pub struct DueTask {
    pub hook: Hook,
    pub payload: Value,
    pub run_at: DateTime<Utc>,
}

/// A read-only view of a scheduled task, for assertions and operator tooling.
#[derive(Debug, Clone)]
pub struct TaskView {
    pub hook: Hook,
    pub payload: Value,
    pub run_at: DateTime<Utc>,
    pub recurring: bool,
}

/// In-memory [`TaskRunner`] implementation.
#[derive(Clone, Default)]
pub struct InMemoryRunner {
    tasks: Arc<RwLock<Vec<ScheduledTask>>>,
}

impl InMemoryRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes and returns every task due at `now`, oldest first.
    ///
    /// Recurring tasks are not removed; their next occurrence is computed
    /// from their schedule. A recurring task yields at most one execution per
    /// tick, however far behind `now` it has fallen.
    pub fn take_due(&self, now: DateTime<Utc>) -> Result<Vec<DueTask>, SchedulerError> {
        let mut tasks = self.tasks.write().map_err(|_| SchedulerError::BadState)?;
        let mut due = Vec::new();
        let mut remaining = Vec::with_capacity(tasks.len());
        for mut task in tasks.drain(..) {
            if task.run_at > now {
                remaining.push(task);
                continue;
            }
            due.push(DueTask {
                hook: task.hook.clone(),
                payload: task.payload.clone(),
                run_at: task.run_at,
            });
            if let Some(schedule) = &task.recurrence {
                if let Some(next) = schedule.after(&now).next() {
                    task.run_at = next;
                    remaining.push(task);
                }
            }
        }
        *tasks = remaining;
        due.sort_by_key(|task| task.run_at);
        Ok(due)
    }

    /// Every currently scheduled task, due-soonest first.
    pub fn scheduled(&self) -> Vec<TaskView> {
        let mut views = self
            .tasks
            .read()
            .map(|tasks| {
                tasks
                    .iter()
                    .map(|task| TaskView {
                        hook: task.hook.clone(),
                        payload: task.payload.clone(),
                        run_at: task.run_at,
                        recurring: task.recurrence.is_some(),
                    })
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        views.sort_by_key(|view| view.run_at);
        views
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.read().map(|tasks| tasks.is_empty()).unwrap_or(true)
    }
}

#[async_trait]
impl TaskRunner for InMemoryRunner {
    async fn schedule_single(
        &self,
        hook: Hook,
        payload: Value,
        run_at: DateTime<Utc>,
    ) -> Result<(), SchedulerError> {
        self.tasks
            .write()
            .map_err(|_| SchedulerError::BadState)?
            .push(ScheduledTask {
                hook,
                payload,
                run_at,
                recurrence: None,
            });
        Ok(())
    }

    async fn schedule_recurring(
        &self,
        hook: Hook,
        first_run_at: DateTime<Utc>,
        schedule: Schedule,
    ) -> Result<(), SchedulerError> {
        let mut tasks = self.tasks.write().map_err(|_| SchedulerError::BadState)?;
        if tasks
            .iter()
            .any(|task| task.recurrence.is_some() && task.hook == hook)
        {
            tracing::debug!(%hook, "Recurring task already scheduled");
            return Ok(());
        }
        tasks.push(ScheduledTask {
            hook,
            payload: Value::Null,
            run_at: first_run_at,
            recurrence: Some(schedule),
        });
        Ok(())
    }

    async fn next_scheduled(&self, hook: &Hook) -> Result<Option<DateTime<Utc>>, SchedulerError> {
        Ok(self
            .tasks
            .read()
            .map_err(|_| SchedulerError::BadState)?
            .iter()
            .filter(|task| &task.hook == hook)
            .map(|task| task.run_at)
            .min())
    }
}
