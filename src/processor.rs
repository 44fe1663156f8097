//! Drives one notification job through a delivery attempt.
//!
//! State machine per job: `pending` → `in-flight` → one of `delivered`,
//! `retry-scheduled`, `quarantined`, or `failed-permanently`. The processor
//! is invoked by the dispatcher for synchronous sends and by the scheduler
//! hooks for deferred and retried ones; in both cases the outcome is handled
//! entirely here and never propagated to the triggering domain code.

use chrono::Utc;
use tracing::instrument;

use crate::config::Config;
use crate::delivery_log::DeliveryLog;
use crate::job::{DeliveryOutcome, NotificationJob};
use crate::quarantine::{QuarantineStore, UnsentRecord};
use crate::scheduler::Scheduler;
use crate::template::{interpolate, TemplateResolver};
use crate::transport::{Delivery, FailureClass, OutboundEmail, ProbeReport, SendOutcome};

pub(crate) struct JobProcessor {
    config: Config,
    resolver: TemplateResolver,
    delivery: Delivery,
    scheduler: Scheduler,
    quarantine: QuarantineStore,
    log: DeliveryLog,
}

impl JobProcessor {
    pub(crate) fn new(
        config: Config,
        delivery: Delivery,
        scheduler: Scheduler,
        quarantine: QuarantineStore,
        log: DeliveryLog,
    ) -> Self {
        Self {
            resolver: TemplateResolver::new(&config),
            config,
            delivery,
            scheduler,
            quarantine,
            log,
        }
    }

    #[instrument(
        skip(self, job),
        fields(notification_type = %job.notification_type, attempt = job.attempt)
    )]
    pub(crate) async fn process(&self, job: NotificationJob) -> DeliveryOutcome {
        let resolved = self.resolver.resolve(&job.notification_type, &job.data);

        let Some(recipient) = resolved.recipient else {
            tracing::error!("No resolvable recipient; discarding notification");
            self.log
                .record_failure(&job.notification_type, &job.data, "no resolvable recipient");
            return DeliveryOutcome::RecipientMissing;
        };
        let Some(template) = resolved.template else {
            tracing::error!("No template for notification type; discarding notification");
            self.log
                .record_failure(&job.notification_type, &job.data, "template not found");
            return DeliveryOutcome::TemplateMissing;
        };

        let email = OutboundEmail {
            to: recipient,
            subject: resolved.subject,
            body: interpolate(template.body, &job.data),
            headers: vec![("From".to_owned(), self.config.sender.clone())],
        };

        match self.delivery.send(&email).await {
            SendOutcome::Sent => {
                tracing::debug!(to = %email.to, "Notification delivered");
                self.log.record_success(&job.notification_type, &job.data);
                DeliveryOutcome::Delivered
            }
            SendOutcome::Failed {
                class,
                detail,
                diagnostic,
            } => self.handle_failure(job, email, class, detail, diagnostic).await,
        }
    }

    async fn handle_failure(
        &self,
        job: NotificationJob,
        email: OutboundEmail,
        class: FailureClass,
        detail: String,
        diagnostic: Option<ProbeReport>,
    ) -> DeliveryOutcome {
        let now = Utc::now();

        // The active-flag check comes before the attempt increment: a job
        // caught by an existing quarantine window keeps its attempt count.
        let already_quarantined = self.quarantine.is_active(now).await.unwrap_or_else(|err| {
            tracing::warn!(?err, "Could not read quarantine flag; assuming inactive");
            false
        });
        if already_quarantined {
            let record = UnsentRecord::Job {
                time: now,
                notification_type: job.notification_type.clone(),
                data: job.data.clone(),
                attempt: job.attempt,
                reason: detail.clone(),
                diagnostic,
            };
            self.park_unsent(record).await;
            self.log
                .record_failure(&job.notification_type, &job.data, detail);
            return DeliveryOutcome::Quarantined;
        }

        if class == FailureClass::Authentication {
            let _ = self
                .quarantine
                .activate(now, detail.clone(), diagnostic.clone())
                .await
                .inspect_err(|err| tracing::error!(?err, "Failed to activate quarantine"));
            let record = UnsentRecord::Message {
                time: now,
                recipient: email.to,
                subject: email.subject,
                body: email.body,
                headers: email.headers,
                error_detail: detail.clone(),
            };
            self.park_unsent(record).await;
            self.log
                .record_failure(&job.notification_type, &job.data, detail);
            return DeliveryOutcome::Quarantined;
        }

        let next_attempt = job.attempt + 1;
        if self.config.retry.is_exhausted(next_attempt) {
            tracing::error!(
                %detail,
                attempt = job.attempt,
                "Notification failed permanently and will be discarded"
            );
            self.log
                .record_failure(&job.notification_type, &job.data, detail);
            return DeliveryOutcome::FailedPermanently;
        }

        let run_at = now + self.config.retry.delay(job.attempt);
        tracing::warn!(
            %detail,
            attempt = next_attempt,
            %run_at,
            "Notification failed and will be retried"
        );
        self.scheduler
            .schedule_retry(&job.next_attempt(), run_at)
            .await;
        DeliveryOutcome::RetryScheduled {
            attempt: next_attempt,
            run_at,
        }
    }

    async fn park_unsent(&self, record: UnsentRecord) {
        let _ = self
            .quarantine
            .enqueue_unsent(record)
            .await
            .inspect_err(|err| tracing::error!(?err, "Failed to append unsent record"));
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use assert_matches::assert_matches;
    use chrono::TimeDelta;

    use crate::notification::{NotificationType, Payload};
    use crate::scheduler::{memory::InMemoryRunner, Hook};
    use crate::store::InMemoryStore;
    use crate::testing::MockTransport;

    use super::*;

    struct Fixture {
        processor: JobProcessor,
        transport: Arc<MockTransport>,
        runner: Arc<InMemoryRunner>,
        quarantine: QuarantineStore,
        log: DeliveryLog,
    }

    fn fixture(transport: MockTransport) -> Fixture {
        let config = Config::new("Encore Tours", "admin@encore.example");
        let transport = Arc::new(transport);
        let runner = Arc::new(InMemoryRunner::new());
        let store = Arc::new(InMemoryStore::new());
        let quarantine = QuarantineStore::new(store, &config);
        let log = DeliveryLog::new();
        let processor = JobProcessor::new(
            config,
            Delivery::new(transport.clone()),
            Scheduler::new(runner.clone()),
            quarantine.clone(),
            log.clone(),
        );
        Fixture {
            processor,
            transport,
            runner,
            quarantine,
            log,
        }
    }

    fn job(attempt: u16) -> NotificationJob {
        NotificationJob {
            notification_type: NotificationType::BookingConfirmationUser,
            data: Payload::new()
                .with("booking_id", 42)
                .with("user_email", "a@b.com"),
            attempt,
        }
    }

    #[tokio::test]
    async fn delivered_job_logs_success_and_schedules_nothing() {
        let fixture = fixture(MockTransport::default());
        let outcome = fixture.processor.process(job(0)).await;

        assert_eq!(outcome, DeliveryOutcome::Delivered);
        assert_eq!(fixture.transport.sent_to(), vec!["a@b.com"]);
        assert!(fixture.runner.is_empty());
        let entries = fixture.log.entries();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].success);
    }

    #[tokio::test]
    async fn transient_failure_schedules_backoff_retry() {
        let fixture = fixture(MockTransport::failing_with("connection reset"));
        let outcome = fixture.processor.process(job(0)).await;

        let run_at = assert_matches!(
            outcome,
            DeliveryOutcome::RetryScheduled { attempt: 1, run_at } => run_at
        );
        let scheduled = fixture.runner.scheduled();
        assert_eq!(scheduled.len(), 1);
        assert_eq!(scheduled[0].hook, Hook::Retry);
        assert_eq!(scheduled[0].run_at, run_at);
        assert_eq!(scheduled[0].payload["attempt"], 1);
        // Delay ~60s for a first failure.
        assert!(run_at - Utc::now() <= TimeDelta::seconds(61));
        assert!(run_at - Utc::now() >= TimeDelta::seconds(58));
        // Intermediate retries do not produce log entries.
        assert!(fixture.log.entries().is_empty());
    }

    #[tokio::test]
    async fn retry_delay_doubles_with_attempts() {
        let fixture = fixture(MockTransport::failing_with("connection reset"));
        let outcome = fixture.processor.process(job(2)).await;

        let run_at = assert_matches!(
            outcome,
            DeliveryOutcome::RetryScheduled { attempt: 3, run_at } => run_at
        );
        assert!(run_at - Utc::now() <= TimeDelta::seconds(241));
        assert!(run_at - Utc::now() >= TimeDelta::seconds(238));
    }

    #[tokio::test]
    async fn exhausted_attempts_fail_permanently() {
        let fixture = fixture(MockTransport::failing_with("connection reset"));
        let outcome = fixture.processor.process(job(3)).await;

        assert_eq!(outcome, DeliveryOutcome::FailedPermanently);
        assert!(fixture.runner.is_empty());
        let entries = fixture.log.entries();
        assert_eq!(entries.len(), 1);
        assert!(!entries[0].success);
    }

    #[tokio::test]
    async fn auth_failure_activates_quarantine_and_parks_message() {
        let fixture = fixture(MockTransport::failing_with("Could not authenticate"));
        let outcome = fixture.processor.process(job(0)).await;

        assert_eq!(outcome, DeliveryOutcome::Quarantined);
        assert!(fixture.quarantine.is_active(Utc::now()).await.unwrap());
        assert!(fixture.runner.is_empty());
        let unsent = fixture.quarantine.unsent().await.unwrap();
        assert_eq!(unsent.len(), 1);
        assert_matches!(
            &unsent[0],
            UnsentRecord::Message { recipient, subject, .. } => {
                assert_eq!(recipient, "a@b.com");
                assert!(subject.contains("42"));
            }
        );
    }

    #[tokio::test]
    async fn active_quarantine_short_circuits_before_attempt_increment() {
        let fixture = fixture(MockTransport::failing_with("connection reset"));
        fixture
            .quarantine
            .activate(Utc::now(), "auth failed", None)
            .await
            .unwrap();

        let outcome = fixture.processor.process(job(2)).await;

        assert_eq!(outcome, DeliveryOutcome::Quarantined);
        assert!(fixture.runner.is_empty());
        let unsent = fixture.quarantine.unsent().await.unwrap();
        assert_matches!(&unsent[0], UnsentRecord::Job { attempt: 2, .. });
    }

    #[tokio::test]
    async fn unknown_type_is_a_configuration_fault() {
        let fixture = fixture(MockTransport::default());
        let outcome = fixture
            .processor
            .process(NotificationJob::new(
                NotificationType::Other("mystery".to_owned()),
                Payload::new(),
            ))
            .await;

        assert_eq!(outcome, DeliveryOutcome::TemplateMissing);
        assert!(fixture.transport.sent_to().is_empty());
        assert!(fixture.runner.is_empty());
        assert_eq!(fixture.log.entries().len(), 1);
    }

    #[tokio::test]
    async fn missing_recipient_is_not_retried() {
        let config = Config::default(); // no admin address configured
        let transport = Arc::new(MockTransport::default());
        let runner = Arc::new(InMemoryRunner::new());
        let store = Arc::new(InMemoryStore::new());
        let processor = JobProcessor::new(
            config.clone(),
            Delivery::new(transport.clone()),
            Scheduler::new(runner.clone()),
            QuarantineStore::new(store, &config),
            DeliveryLog::new(),
        );

        let outcome = processor
            .process(NotificationJob::new(
                NotificationType::AccountCreated,
                Payload::new(),
            ))
            .await;

        assert_eq!(outcome, DeliveryOutcome::RecipientMissing);
        assert!(transport.sent_to().is_empty());
        assert!(runner.is_empty());
    }
}
