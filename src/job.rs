//! The unit of deferred notification work.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::backoff::{BackoffStrategy, Doubling, Strategy};
use crate::notification::{NotificationType, Payload};

/// The canonical payload shape for notification jobs.
///
/// This is what the scheduler persists between attempts: every notification
/// job funnels through the single delivery hook carrying one of these, so the
/// retry controller has a single interception point. The type and data are
/// immutable once scheduled; only `attempt` changes between submissions, and
/// only on failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationJob {
    pub notification_type: NotificationType,
    pub data: Payload,
    /// Number of prior failed attempts.
    #[serde(default)]
    pub attempt: u16,
}

impl NotificationJob {
    pub fn new(notification_type: NotificationType, data: Payload) -> Self {
        Self {
            notification_type,
            data,
            attempt: 0,
        }
    }

    /// The same job carrying an incremented attempt count, for re-submission
    /// after a transient failure.
    pub(crate) fn next_attempt(&self) -> Self {
        Self {
            notification_type: self.notification_type.clone(),
            data: self.data.clone(),
            attempt: self.attempt + 1,
        }
    }
}

/// How failed deliveries are retried.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// The attempt count at which a job is marked permanently failed instead
    /// of rescheduled.
    pub max_attempts: u16,
    base_delay: TimeDelta,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: TimeDelta::seconds(60),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u16, base_delay: TimeDelta) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    /// The delay before the next attempt for a job that has failed `attempt`
    /// times: `base * 2^attempt`.
    pub fn delay(&self, attempt: u16) -> TimeDelta {
        BackoffStrategy::doubling(self.base_delay).backoff(attempt)
    }

    /// True once the incremented attempt count exceeds the budget.
    pub fn is_exhausted(&self, next_attempt: u16) -> bool {
        next_attempt > self.max_attempts
    }
}

/// The terminal state of one pass through the job processor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The transport accepted the message.
    Delivered,
    /// Transient failure with attempt budget remaining; a retry was handed to
    /// the scheduler.
    RetryScheduled {
        attempt: u16,
        run_at: DateTime<Utc>,
    },
    /// Systemic failure: the job was appended to the unsent queue and will
    /// not be retried by this subsystem.
    Quarantined,
    /// The attempt budget is exhausted. Logged; no further action.
    FailedPermanently,
    /// No template for this notification type. Not retried.
    TemplateMissing,
    /// No resolvable recipient. Not retried.
    RecipientMissing,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn default_policy_allows_three_retries() {
        let policy = RetryPolicy::default();
        assert!(!policy.is_exhausted(1));
        assert!(!policy.is_exhausted(3));
        assert!(policy.is_exhausted(4));
    }

    #[test]
    fn delay_doubles_per_attempt() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay(0), TimeDelta::seconds(60));
        assert_eq!(policy.delay(1), TimeDelta::seconds(120));
        assert_eq!(policy.delay(2), TimeDelta::seconds(240));
        assert_eq!(policy.delay(3), TimeDelta::seconds(480));
    }

    #[test]
    fn job_payload_wire_shape() {
        let job = NotificationJob::new(
            NotificationType::BookingConfirmationUser,
            Payload::new().with("booking_id", 42),
        );
        let value = serde_json::to_value(&job).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "notification_type": "booking_confirmation_user",
                "data": {"booking_id": 42},
                "attempt": 0,
            })
        );
        let back: NotificationJob = serde_json::from_value(value).unwrap();
        assert_eq!(back, job);
    }

    #[test]
    fn next_attempt_changes_only_the_attempt() {
        let job = NotificationJob::new(NotificationType::AccountCreated, Payload::new());
        let next = job.next_attempt();
        assert_eq!(next.attempt, 1);
        assert_eq!(next.notification_type, job.notification_type);
        assert_eq!(next.data, job.data);
    }
}
