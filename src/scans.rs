//! Periodic domain scans that emit notification triggers.
//!
//! Each check queries a domain data source for rows matching a date-window
//! condition and emits one trigger per match. Checks are independent and
//! order-insensitive. A row already notified for a given check is skipped on
//! later ticks via a marker in the durable store, so an overlap between the
//! cadence and the matching window cannot double-send.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Days, TimeDelta, Utc};
use serde_json::Value;
use thiserror::Error;

use crate::domain::{Account, Booking, BookingStatus, Quote, RoomingList};
use crate::notification::{NotificationType, Payload};
use crate::store::KvStore;

/// How many days before the festival date the booking reminder goes out.
const BOOKING_REMINDER_DAYS_AHEAD: u64 = 7;
/// How many days before its due date an unlocked rooming list is chased.
const ROOMING_LIST_DUE_DAYS_AHEAD: u64 = 3;
/// How long a quote may sit before it is followed up.
const QUOTE_PENDING_HOURS: i64 = 48;
/// How long an account may be idle before the re-engagement nudge.
const ACCOUNT_INACTIVE_DAYS: i64 = 90;

#[derive(Debug, Clone, Error)]
pub enum SourceError {
    /// The domain table does not exist in this deployment. Treated as
    /// "nothing to do" by every scan.
    #[error("domain table missing: {0}")]
    MissingTable(String),
    #[error("domain source unavailable: {0}")]
    Unavailable(String),
}

/// Read-only queries over the domain tables, filtered by the current tenant.
#[async_trait]
pub trait DomainSource: Send + Sync {
    async fn bookings_with_festival_on(
        &self,
        date: chrono::NaiveDate,
    ) -> Result<Vec<Booking>, SourceError>;

    async fn rooming_lists_due_on(
        &self,
        date: chrono::NaiveDate,
    ) -> Result<Vec<RoomingList>, SourceError>;

    /// Quotes still pending that were created at or before `cutoff`.
    async fn quotes_pending_since(&self, cutoff: DateTime<Utc>)
        -> Result<Vec<Quote>, SourceError>;

    /// Accounts whose last login was at or before `cutoff` (or never).
    async fn accounts_inactive_since(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Account>, SourceError>;
}

/// The named periodic checks. Each belongs to exactly one
/// [`crate::scheduler::Cadence`].
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum ScanCheck {
    BookingReminder,
    RoomingListDue,
    QuoteFollowUp,
    InactiveAccounts,
}

impl ScanCheck {
    pub fn hook_name(&self) -> &'static str {
        match self {
            Self::BookingReminder => "scan.booking_reminder",
            Self::RoomingListDue => "scan.rooming_list_due",
            Self::QuoteFollowUp => "scan.quote_follow_up",
            Self::InactiveAccounts => "scan.inactive_accounts",
        }
    }
}

/// Runs scan checks against a [`DomainSource`] and collects the triggers to
/// emit.
#[derive(Clone)]
pub(crate) struct ScanHandlers {
    source: Arc<dyn DomainSource>,
    markers: Arc<dyn KvStore>,
}

impl ScanHandlers {
    pub(crate) fn new(source: Arc<dyn DomainSource>, markers: Arc<dyn KvStore>) -> Self {
        Self { source, markers }
    }

    /// Runs one check, returning the `(type, payload)` pairs to trigger.
    ///
    /// A source fault is nothing to do: the scan logs and returns empty
    /// rather than erroring the tick.
    pub(crate) async fn run(
        &self,
        check: ScanCheck,
        now: DateTime<Utc>,
    ) -> Vec<(NotificationType, Payload)> {
        let candidates = match self.candidates(check, now).await {
            Ok(candidates) => candidates,
            Err(err) => {
                tracing::debug!(?err, check = check.hook_name(), "Scan found nothing to do");
                return Vec::new();
            }
        };

        let mut triggers = Vec::with_capacity(candidates.len());
        for (entity, notification_type, payload) in candidates {
            if self.already_notified(check, &entity).await {
                continue;
            }
            self.mark_notified(check, &entity, now).await;
            triggers.push((notification_type, payload));
        }
        triggers
    }

    async fn candidates(
        &self,
        check: ScanCheck,
        now: DateTime<Utc>,
    ) -> Result<Vec<(String, NotificationType, Payload)>, SourceError> {
        Ok(match check {
            ScanCheck::BookingReminder => {
                let target = now.date_naive() + Days::new(BOOKING_REMINDER_DAYS_AHEAD);
                self.source
                    .bookings_with_festival_on(target)
                    .await?
                    .into_iter()
                    .filter(|booking| booking.status == BookingStatus::Confirmed)
                    .map(|booking| {
                        (
                            booking.id.to_string(),
                            NotificationType::BookingReminder,
                            booking_payload(&booking),
                        )
                    })
                    .collect()
            }
            ScanCheck::RoomingListDue => {
                let target = now.date_naive() + Days::new(ROOMING_LIST_DUE_DAYS_AHEAD);
                self.source
                    .rooming_lists_due_on(target)
                    .await?
                    .into_iter()
                    .filter(|list| !list.locked)
                    .map(|list| {
                        (
                            list.booking_id.to_string(),
                            NotificationType::RoomingListDueSoon,
                            rooming_list_payload(&list),
                        )
                    })
                    .collect()
            }
            ScanCheck::QuoteFollowUp => {
                let cutoff = now - TimeDelta::hours(QUOTE_PENDING_HOURS);
                self.source
                    .quotes_pending_since(cutoff)
                    .await?
                    .into_iter()
                    .map(|quote| {
                        (
                            quote.id.to_string(),
                            NotificationType::QuoteFollowUp,
                            quote_payload(&quote),
                        )
                    })
                    .collect()
            }
            ScanCheck::InactiveAccounts => {
                let cutoff = now - TimeDelta::days(ACCOUNT_INACTIVE_DAYS);
                self.source
                    .accounts_inactive_since(cutoff)
                    .await?
                    .into_iter()
                    .map(|account| {
                        (
                            account.email.clone(),
                            NotificationType::AccountInactive,
                            account_payload(&account),
                        )
                    })
                    .collect()
            }
        })
    }

    fn marker_key(check: ScanCheck, entity: &str) -> String {
        format!("notify.scan.{}.{entity}", check.hook_name())
    }

    async fn already_notified(&self, check: ScanCheck, entity: &str) -> bool {
        match self.markers.get(&Self::marker_key(check, entity)).await {
            Ok(marker) => marker.is_some(),
            Err(err) => {
                tracing::warn!(?err, "Could not read scan marker; treating as unnotified");
                false
            }
        }
    }

    async fn mark_notified(&self, check: ScanCheck, entity: &str, now: DateTime<Utc>) {
        let _ = self
            .markers
            .put(&Self::marker_key(check, entity), Value::from(now.to_rfc3339()))
            .await
            .inspect_err(|err| tracing::warn!(?err, "Could not write scan marker"));
    }
}

fn booking_payload(booking: &Booking) -> Payload {
    Payload::new()
        .with("booking_id", booking.id)
        .with("user_email", booking.user_email.clone())
        .with("recipient_name", booking.user_display_name.clone())
        .with(
            "festival_date",
            booking
                .festival_date
                .map(|date| date.format("%-d %B %Y").to_string())
                .unwrap_or_default(),
        )
}

fn rooming_list_payload(list: &RoomingList) -> Payload {
    Payload::new()
        .with("booking_id", list.booking_id)
        .with("user_email", list.user_email.clone())
        .with("recipient_name", list.user_display_name.clone())
        .with(
            "due_date",
            list.due_date
                .map(|date| date.format("%-d %B %Y").to_string())
                .unwrap_or_default(),
        )
}

fn quote_payload(quote: &Quote) -> Payload {
    Payload::new()
        .with("quote_id", quote.id)
        .with("user_email", quote.user_email.clone())
        .with("recipient_name", quote.user_display_name.clone())
}

fn account_payload(account: &Account) -> Payload {
    Payload::new()
        .with("user_email", account.email.clone())
        .with("recipient_name", account.display_name.clone())
}
