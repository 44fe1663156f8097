//! Append-only log of terminal delivery outcomes.
//!
//! One entry per terminal outcome of each processed attempt. Nothing in this
//! subsystem reads the log back; it exists for operators and tests.

use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};

use crate::notification::{NotificationType, Payload};

#[derive(Debug, Clone)]
pub struct LogEntry {
    pub notification_type: NotificationType,
    pub data: Payload,
    pub success: bool,
    pub error_message: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Clone, Default)]
pub struct DeliveryLog {
    entries: Arc<RwLock<Vec<LogEntry>>>,
}

impl DeliveryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&self, notification_type: &NotificationType, data: &Payload) {
        self.record(notification_type, data, true, None);
    }

    pub fn record_failure(
        &self,
        notification_type: &NotificationType,
        data: &Payload,
        error_message: impl Into<String>,
    ) {
        self.record(notification_type, data, false, Some(error_message.into()));
    }

    fn record(
        &self,
        notification_type: &NotificationType,
        data: &Payload,
        success: bool,
        error_message: Option<String>,
    ) {
        let entry = LogEntry {
            notification_type: notification_type.clone(),
            data: data.clone(),
            success,
            error_message,
            recorded_at: Utc::now(),
        };
        match self.entries.write() {
            Ok(mut entries) => entries.push(entry),
            // A poisoned log must not take delivery down with it.
            Err(err) => tracing::error!(?err, "Delivery log unavailable"),
        }
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries
            .read()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }
}
