//! The failure quarantine store.
//!
//! A systemic authentication-class transport failure sets a time-boxed flag.
//! While the flag is live, every job that would otherwise retry is appended
//! to the durable unsent queue for manual review instead. Over-quarantining
//! loses timeliness; hammering a broken transport loses capacity and trips
//! provider rate limits, so the flag is deliberately coarse.
//!
//! The flag is read-check-then-act, not atomic: two jobs may both observe it
//! inactive and both try to activate it after simultaneous failures. That is
//! safe because activation is idempotent and first-writer-wins.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::Config;
use crate::notification::{NotificationType, Payload};
use crate::store::{KvStore, StoreError};
use crate::transport::ProbeReport;

/// The persisted quarantine marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuarantineFlag {
    pub time: DateTime<Utc>,
    pub message: String,
    pub details: Option<ProbeReport>,
}

/// A durable record of a message that was not delivered and will not be
/// retried. Never pruned automatically beyond the configured cap; reviewed
/// and resumed manually.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UnsentRecord {
    /// Produced from a rendered message that failed at the transport.
    Message {
        time: DateTime<Utc>,
        recipient: String,
        subject: String,
        body: String,
        headers: Vec<(String, String)>,
        error_detail: String,
    },
    /// Produced from the job path before rendering, or while quarantine was
    /// already active.
    Job {
        time: DateTime<Utc>,
        notification_type: NotificationType,
        data: Payload,
        attempt: u16,
        reason: String,
        diagnostic: Option<ProbeReport>,
    },
}

/// Time-boxed quarantine flag plus the durable unsent queue.
#[derive(Clone)]
pub struct QuarantineStore {
    store: Arc<dyn KvStore>,
    ttl: TimeDelta,
    cap: usize,
    flag_key: String,
    unsent_key: String,
}

impl QuarantineStore {
    pub fn new(store: Arc<dyn KvStore>, config: &Config) -> Self {
        let scope = config
            .tenant_scoped_quarantine
            .then(|| config.tenant.as_deref())
            .flatten();
        let (flag_key, unsent_key) = match scope {
            Some(tenant) => (
                format!("notify.{tenant}.quarantine"),
                format!("notify.{tenant}.unsent"),
            ),
            None => ("notify.quarantine".to_owned(), "notify.unsent".to_owned()),
        };
        Self {
            store,
            ttl: config.quarantine_ttl,
            cap: config.unsent_cap,
            flag_key,
            unsent_key,
        }
    }

    /// Whether a quarantine window is live at `now`.
    pub async fn is_active(&self, now: DateTime<Utc>) -> Result<bool, StoreError> {
        Ok(self
            .flag()
            .await?
            .is_some_and(|flag| now < flag.time + self.ttl))
    }

    pub async fn flag(&self) -> Result<Option<QuarantineFlag>, StoreError> {
        match self.store.get(&self.flag_key).await? {
            None => Ok(None),
            Some(value) => match serde_json::from_value(value) {
                Ok(flag) => Ok(Some(flag)),
                Err(err) => {
                    tracing::warn!(?err, "Discarding unreadable quarantine flag");
                    Ok(None)
                }
            },
        }
    }

    /// Starts a quarantine window at `now` unless one is already live.
    ///
    /// Idempotent: a second activation within the window does not extend it;
    /// the first detector wins. An expired flag is overwritten.
    pub async fn activate(
        &self,
        now: DateTime<Utc>,
        message: impl Into<String>,
        details: Option<ProbeReport>,
    ) -> Result<(), StoreError> {
        if self.is_active(now).await? {
            tracing::debug!("Quarantine already active");
            return Ok(());
        }
        let flag = QuarantineFlag {
            time: now,
            message: message.into(),
            details,
        };
        tracing::error!(message = %flag.message, "Activating delivery quarantine");
        self.store
            .put(&self.flag_key, serde_json::to_value(&flag)?)
            .await
    }

    /// Appends `record` to the durable unsent queue, dropping the oldest
    /// records beyond the configured cap.
    pub async fn enqueue_unsent(&self, record: UnsentRecord) -> Result<(), StoreError> {
        let mut records = self.unsent_values().await?;
        records.push(serde_json::to_value(&record)?);
        if records.len() > self.cap {
            let excess = records.len() - self.cap;
            records.drain(..excess);
            tracing::warn!(
                dropped = excess,
                cap = self.cap,
                "Unsent queue over cap; dropped oldest records"
            );
        }
        self.store
            .put(&self.unsent_key, Value::Array(records))
            .await
    }

    /// The unsent queue, oldest first. Unreadable records are skipped.
    pub async fn unsent(&self) -> Result<Vec<UnsentRecord>, StoreError> {
        Ok(self
            .unsent_values()
            .await?
            .into_iter()
            .filter_map(|value| serde_json::from_value(value).ok())
            .collect())
    }

    async fn unsent_values(&self) -> Result<Vec<Value>, StoreError> {
        Ok(match self.store.get(&self.unsent_key).await? {
            Some(Value::Array(records)) => records,
            _ => Vec::new(),
        })
    }
}

#[cfg(test)]
mod test {
    use crate::store::InMemoryStore;

    use super::*;

    fn quarantine_with(config: Config) -> (QuarantineStore, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        (QuarantineStore::new(store.clone(), &config), store)
    }

    fn quarantine() -> (QuarantineStore, Arc<InMemoryStore>) {
        quarantine_with(Config::default())
    }

    fn job_record(attempt: u16) -> UnsentRecord {
        UnsentRecord::Job {
            time: Utc::now(),
            notification_type: NotificationType::AccountCreated,
            data: Payload::new(),
            attempt,
            reason: "could not authenticate".to_owned(),
            diagnostic: None,
        }
    }

    #[tokio::test]
    async fn inactive_by_default() {
        let (quarantine, _) = quarantine();
        assert!(!quarantine.is_active(Utc::now()).await.unwrap());
    }

    #[tokio::test]
    async fn active_within_ttl_and_expires_after() {
        let (quarantine, _) = quarantine();
        let now = Utc::now();
        quarantine.activate(now, "auth failed", None).await.unwrap();

        assert!(quarantine.is_active(now).await.unwrap());
        assert!(quarantine
            .is_active(now + TimeDelta::minutes(59))
            .await
            .unwrap());
        assert!(!quarantine
            .is_active(now + TimeDelta::minutes(61))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn activation_is_first_writer_wins() {
        let (quarantine, _) = quarantine();
        let now = Utc::now();
        quarantine.activate(now, "first", None).await.unwrap();
        quarantine
            .activate(now + TimeDelta::minutes(5), "second", None)
            .await
            .unwrap();

        let flag = quarantine.flag().await.unwrap().unwrap();
        assert_eq!(flag.time, now);
        assert_eq!(flag.message, "first");
    }

    #[tokio::test]
    async fn expired_flag_can_be_replaced() {
        let (quarantine, _) = quarantine();
        let now = Utc::now();
        quarantine.activate(now, "first", None).await.unwrap();
        let later = now + TimeDelta::hours(2);
        quarantine.activate(later, "second", None).await.unwrap();

        let flag = quarantine.flag().await.unwrap().unwrap();
        assert_eq!(flag.time, later);
    }

    #[tokio::test]
    async fn unsent_queue_appends_in_order() {
        let (quarantine, _) = quarantine();
        quarantine.enqueue_unsent(job_record(0)).await.unwrap();
        quarantine.enqueue_unsent(job_record(1)).await.unwrap();

        let records = quarantine.unsent().await.unwrap();
        assert_eq!(records.len(), 2);
        assert!(matches!(records[0], UnsentRecord::Job { attempt: 0, .. }));
        assert!(matches!(records[1], UnsentRecord::Job { attempt: 1, .. }));
    }

    #[tokio::test]
    async fn unsent_queue_drops_oldest_beyond_cap() {
        let (quarantine, _) = quarantine_with(Config::default().with_unsent_cap(2));
        for attempt in 0..4 {
            quarantine.enqueue_unsent(job_record(attempt)).await.unwrap();
        }

        let records = quarantine.unsent().await.unwrap();
        assert_eq!(records.len(), 2);
        assert!(matches!(records[0], UnsentRecord::Job { attempt: 2, .. }));
        assert!(matches!(records[1], UnsentRecord::Job { attempt: 3, .. }));
    }

    #[tokio::test]
    async fn tenant_scoping_separates_flags() {
        let store = Arc::new(InMemoryStore::new());
        let config_a = Config::default()
            .with_tenant("alpha")
            .with_tenant_scoped_quarantine(true);
        let config_b = Config::default()
            .with_tenant("beta")
            .with_tenant_scoped_quarantine(true);
        let quarantine_a = QuarantineStore::new(store.clone(), &config_a);
        let quarantine_b = QuarantineStore::new(store.clone(), &config_b);

        let now = Utc::now();
        quarantine_a.activate(now, "auth failed", None).await.unwrap();

        assert!(quarantine_a.is_active(now).await.unwrap());
        assert!(!quarantine_b.is_active(now).await.unwrap());
    }
}
