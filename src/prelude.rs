//! The purpose of this module is to alleviate the need to import many of the
//! `[encore_notify]` types.
//!
//! ```
//! # #![allow(unused_imports)]
//! use encore_notify::prelude::*;
//! ```
pub use crate::backoff::BackoffStrategy;
pub use crate::backoff::Jitter;
pub use crate::backoff::Strategy;
pub use crate::config::Config;
pub use crate::job::{DeliveryOutcome, NotificationJob, RetryPolicy};
pub use crate::notification::{NotificationType, Payload, RecipientType};
pub use crate::quarantine::UnsentRecord;
pub use crate::scans::{DomainSource, ScanCheck};
pub use crate::scheduler::{Cadence, Hook, TaskRunner};
pub use crate::store::KvStore;
pub use crate::transport::{OutboundEmail, SendFailure, Transport};
pub use crate::{Notifier, NotifierBuilder, NotifierError};
