//! Asynchronous notification delivery for the Encore booking platform.
//!
//! Turns domain events (account created, booking confirmed, hotel assigned,
//! rooming list due, ...) into outbound messages, decides whether to send
//! them synchronously or queue them for deferred and retried delivery, and
//! protects the platform from retry storms when the outbound transport is
//! systemically broken.
//!
//! The public entry point is [`Notifier`]: construct one per process via
//! [`Notifier::builder`], wire in the transport, task runner, key-value
//! store, and domain source, then either call the pre-wired domain event
//! hooks (see [`events`](crate::domain)) or [`Notifier::trigger`] directly.
//!
//! ```
//! # use encore_notify::prelude::*;
//! # use encore_notify::testing::MockTransport;
//! # use std::sync::Arc;
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! let notifier = Notifier::builder()
//!     .with_config(Config::new("Encore Tours", "admin@encore.example"))
//!     .with_transport(Arc::new(MockTransport::default()))
//!     .build()
//!     .unwrap();
//!
//! notifier
//!     .trigger(
//!         NotificationType::BookingConfirmationUser,
//!         Payload::new().with("booking_id", 42).with("user_email", "a@b.com"),
//!         0,
//!     )
//!     .await;
//! # });
//! ```
//!
//! Failure handling is entirely local: `trigger` never fails observably to
//! its caller. Transient transport failures are retried with exponential
//! backoff; authentication-class failures quarantine delivery for an hour
//! and park affected messages on a durable unsent queue for manual review.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use serde_json::Value;
use thiserror::Error;

pub mod backoff;
pub mod config;
pub mod delivery_log;
pub mod domain;
mod events;
pub mod job;
pub mod notification;
pub mod prelude;
mod processor;
pub mod quarantine;
pub mod scans;
pub mod scheduler;
pub mod store;
pub mod template;
pub mod testing;
pub mod transport;

use config::Config;
use delivery_log::DeliveryLog;
use job::NotificationJob;
use notification::{NotificationType, Payload, RecipientType};
use processor::JobProcessor;
use quarantine::QuarantineStore;
use scans::{DomainSource, ScanHandlers};
use scheduler::{memory::InMemoryRunner, Hook, Scheduler, TaskRunner};
use store::{InMemoryStore, KvStore};
use transport::{Delivery, Transport};

#[derive(Debug, Error)]
pub enum NotifierError {
    #[error("No delivery transport configured")]
    TransportMissing,
}

/// The notification dispatcher.
///
/// One explicit instance per process; pass it by reference to the code that
/// raises domain events. Cheap to clone.
#[derive(Clone)]
pub struct Notifier {
    config: Config,
    scheduler: Scheduler,
    processor: Arc<JobProcessor>,
    scans: Option<ScanHandlers>,
    quarantine: QuarantineStore,
    log: DeliveryLog,
    memory_runner: Option<Arc<InMemoryRunner>>,
}

impl Notifier {
    pub fn builder() -> NotifierBuilder {
        NotifierBuilder::default()
    }

    /// Fires a notification.
    ///
    /// With `delay_seconds > 0`, or whenever [`Config::async_enabled`] is set
    /// (the default), the job is handed to the scheduler for deferred
    /// execution at `now + delay_seconds`; otherwise it is delivered
    /// synchronously in the calling context.
    ///
    /// Fire-and-forget: every failure mode is handled inside this subsystem
    /// and surfaced through logs, the delivery log, and the unsent queue.
    pub async fn trigger(
        &self,
        notification_type: NotificationType,
        data: Payload,
        delay_seconds: i64,
    ) {
        let job = NotificationJob::new(notification_type, self.with_defaults(data));
        if delay_seconds > 0 || self.config.async_enabled {
            let run_at = Utc::now() + TimeDelta::seconds(delay_seconds.max(0));
            self.scheduler.schedule_job(&job, run_at).await;
        } else {
            let _ = self.processor.process(job).await;
        }
    }

    fn with_defaults(&self, mut data: Payload) -> Payload {
        let mut defaults = vec![
            ("site_name", Value::from(self.config.site_name.clone())),
            ("login_url", Value::from(self.config.login_url.clone())),
        ];
        if data.recipient_type() == RecipientType::Admin {
            defaults.push(("recipient_name", Value::from(self.config.admin_name.clone())));
        }
        data.merge_defaults(defaults);
        data
    }

    /// Registers the recurring scan cadences on the task runner.
    ///
    /// Call once at startup; already-present cadences are left untouched.
    pub async fn install_cadences(&self) {
        self.scheduler.install_cadences(Utc::now()).await;
    }

    /// Executes one named hook, as invoked by the task runner when a
    /// scheduled task comes due.
    ///
    /// Delivery and retry hooks run the job processor; scan hooks query the
    /// domain source and re-enter [`Notifier::trigger`] for each match.
    pub async fn run_hook(&self, hook: Hook, payload: Value) {
        match hook {
            Hook::Deliver | Hook::Retry => match serde_json::from_value(payload) {
                Ok(job) => {
                    let _ = self.processor.process(job).await;
                }
                Err(err) => tracing::error!(?err, "Failed to decode notification job"),
            },
            Hook::Scan(check) => {
                let Some(scans) = &self.scans else {
                    tracing::debug!(check = check.hook_name(), "No domain source; skipping scan");
                    return;
                };
                for (notification_type, data) in scans.run(check, Utc::now()).await {
                    self.trigger(notification_type, data, 0).await;
                }
            }
        }
    }

    /// Runs everything due on the in-memory runner at `now`, returning the
    /// number of executed tasks.
    ///
    /// Only meaningful when the notifier was built without an external
    /// runner; deployments with one drive [`Notifier::run_hook`] themselves.
    pub async fn tick(&self, now: DateTime<Utc>) -> usize {
        let Some(runner) = &self.memory_runner else {
            tracing::warn!("tick called with an external task runner");
            return 0;
        };
        let due = match runner.take_due(now) {
            Ok(due) => due,
            Err(err) => {
                tracing::error!(?err, "Failed to read due tasks");
                return 0;
            }
        };
        let count = due.len();
        for task in due {
            self.run_hook(task.hook, task.payload).await;
        }
        count
    }

    /// The quarantine store, for operator tooling (unsent queue review).
    pub fn quarantine(&self) -> &QuarantineStore {
        &self.quarantine
    }

    /// The append-only delivery log.
    pub fn delivery_log(&self) -> &DeliveryLog {
        &self.log
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

/// Builder for [`Notifier`].
///
/// The transport is required; the runner and store default to in-memory
/// implementations and the domain source is optional (scans become no-ops
/// without one).
#[derive(Default)]
pub struct NotifierBuilder {
    config: Config,
    transport: Option<Arc<dyn Transport>>,
    runner: Option<Arc<dyn TaskRunner>>,
    memory_runner: Option<Arc<InMemoryRunner>>,
    store: Option<Arc<dyn KvStore>>,
    source: Option<Arc<dyn DomainSource>>,
}

impl NotifierBuilder {
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Uses an external task runner. [`Notifier::tick`] becomes a no-op; the
    /// runner is expected to call [`Notifier::run_hook`] itself.
    pub fn with_task_runner(mut self, runner: Arc<dyn TaskRunner>) -> Self {
        self.runner = Some(runner);
        self.memory_runner = None;
        self
    }

    /// Uses the given in-memory runner, keeping it addressable for
    /// [`Notifier::tick`] and test assertions.
    pub fn with_memory_runner(mut self, runner: Arc<InMemoryRunner>) -> Self {
        self.runner = Some(runner.clone());
        self.memory_runner = Some(runner);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn KvStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_domain_source(mut self, source: Arc<dyn DomainSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn build(self) -> Result<Notifier, NotifierError> {
        let transport = self.transport.ok_or(NotifierError::TransportMissing)?;
        let (runner, memory_runner) = match (self.runner, self.memory_runner) {
            (Some(runner), memory_runner) => (runner, memory_runner),
            (None, _) => {
                let runner = Arc::new(InMemoryRunner::new());
                (runner.clone() as Arc<dyn TaskRunner>, Some(runner))
            }
        };
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(InMemoryStore::new()));

        let scheduler = Scheduler::new(runner);
        let quarantine = QuarantineStore::new(store.clone(), &self.config);
        let log = DeliveryLog::new();
        let processor = Arc::new(JobProcessor::new(
            self.config.clone(),
            Delivery::new(transport),
            scheduler.clone(),
            quarantine.clone(),
            log.clone(),
        ));
        let scans = self
            .source
            .map(|source| ScanHandlers::new(source, store));

        Ok(Notifier {
            config: self.config,
            scheduler,
            processor,
            scans,
            quarantine,
            log,
            memory_runner,
        })
    }
}
