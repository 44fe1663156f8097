//! Test doubles for the notifier's external seams.
//!
//! Exposed as a public module so downstream crates can exercise their own
//! notification wiring without a real transport or domain database.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Mutex,
};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::domain::{Account, Booking, Quote, RoomingList};
use crate::scans::{DomainSource, SourceError};
use crate::transport::{OutboundEmail, ProbeReport, SendFailure, Transport};

/// A scriptable [`Transport`] recording every send.
///
/// Succeeds by default; load [`MockTransport::failures`] (or construct via
/// [`MockTransport::failing_with`]) to replay a failure on every send.
#[derive(Default)]
pub struct MockTransport {
    pub sent: Mutex<Vec<OutboundEmail>>,
    pub failures: Mutex<Vec<SendFailure>>,
    pub probe_calls: AtomicUsize,
    pub probe_result: Mutex<Option<Result<ProbeReport, SendFailure>>>,
}

impl MockTransport {
    pub fn failing_with(detail: &str) -> Self {
        let transport = Self::default();
        *transport.failures.lock().unwrap() = vec![SendFailure::new(detail)];
        transport
    }

    /// The recipients of every attempted send, in order.
    pub fn sent_to(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|email| email.to.clone())
            .collect()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, email: &OutboundEmail) -> Result<(), SendFailure> {
        self.sent.lock().unwrap().push(email.clone());
        match self.failures.lock().unwrap().last() {
            Some(failure) => Err(failure.clone()),
            None => Ok(()),
        }
    }

    async fn probe(&self) -> Result<ProbeReport, SendFailure> {
        self.probe_calls.fetch_add(1, Ordering::SeqCst);
        self.probe_result
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| Ok(ProbeReport::default()))
    }
}

/// An in-memory [`DomainSource`] backed by plain row vectors.
///
/// Queries apply the same filters a real source would: festival and due
/// dates must match exactly, quotes must predate the cutoff, and accounts
/// count as inactive when their last login predates the cutoff or never
/// happened. [`MockDomainSource::fail_with`] makes every query return the
/// given error instead.
#[derive(Default)]
pub struct MockDomainSource {
    bookings: Mutex<Vec<Booking>>,
    rooming_lists: Mutex<Vec<RoomingList>>,
    quotes: Mutex<Vec<Quote>>,
    accounts: Mutex<Vec<Account>>,
    failure: Mutex<Option<SourceError>>,
}

impl MockDomainSource {
    pub fn add_booking(&self, booking: Booking) {
        self.bookings.lock().unwrap().push(booking);
    }

    pub fn add_rooming_list(&self, list: RoomingList) {
        self.rooming_lists.lock().unwrap().push(list);
    }

    pub fn add_quote(&self, quote: Quote) {
        self.quotes.lock().unwrap().push(quote);
    }

    pub fn add_account(&self, account: Account) {
        self.accounts.lock().unwrap().push(account);
    }

    pub fn fail_with(&self, error: SourceError) {
        *self.failure.lock().unwrap() = Some(error);
    }

    fn check_failure(&self) -> Result<(), SourceError> {
        match &*self.failure.lock().unwrap() {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl DomainSource for MockDomainSource {
    async fn bookings_with_festival_on(
        &self,
        date: NaiveDate,
    ) -> Result<Vec<Booking>, SourceError> {
        self.check_failure()?;
        Ok(self
            .bookings
            .lock()
            .unwrap()
            .iter()
            .filter(|booking| booking.festival_date == Some(date))
            .cloned()
            .collect())
    }

    async fn rooming_lists_due_on(
        &self,
        date: NaiveDate,
    ) -> Result<Vec<RoomingList>, SourceError> {
        self.check_failure()?;
        Ok(self
            .rooming_lists
            .lock()
            .unwrap()
            .iter()
            .filter(|list| list.due_date == Some(date))
            .cloned()
            .collect())
    }

    async fn quotes_pending_since(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Quote>, SourceError> {
        self.check_failure()?;
        Ok(self
            .quotes
            .lock()
            .unwrap()
            .iter()
            .filter(|quote| quote.created_at <= cutoff)
            .cloned()
            .collect())
    }

    async fn accounts_inactive_since(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Account>, SourceError> {
        self.check_failure()?;
        Ok(self
            .accounts
            .lock()
            .unwrap()
            .iter()
            .filter(|account| account.last_login.map_or(true, |at| at <= cutoff))
            .cloned()
            .collect())
    }
}
