//! Read-only views of the platform's domain tables.
//!
//! These rows are inputs to the notification subsystem: the event hooks
//! enrich payloads from them and the scheduled scans query them. Nothing
//! here is written back.

use chrono::{DateTime, NaiveDate, Utc};

#[derive(Debug, Clone)]
pub struct Account {
    pub display_name: String,
    pub email: String,
    pub last_login: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct School {
    pub name: String,
    pub contact_name: String,
    pub contact_email: String,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum BookingStatus {
    Draft,
    Quoted,
    Confirmed,
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct Booking {
    pub id: u64,
    pub status: BookingStatus,
    pub package_title: String,
    pub festival_date: Option<NaiveDate>,
    pub park_names: Vec<String>,
    pub user_display_name: String,
    pub user_email: String,
}

#[derive(Debug, Clone)]
pub struct Hotel {
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct RoomingList {
    pub booking_id: u64,
    pub due_date: Option<NaiveDate>,
    pub locked: bool,
    pub user_display_name: String,
    pub user_email: String,
}

#[derive(Debug, Clone)]
pub struct Quote {
    pub id: u64,
    pub created_at: DateTime<Utc>,
    pub user_display_name: String,
    pub user_email: String,
}
