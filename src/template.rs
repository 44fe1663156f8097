//! Maps a notification type to its template, subject, and recipient.
//!
//! Resolution is a pure function of `(notification_type, data)` plus the
//! process configuration: the same inputs always yield the same output. An
//! unknown type resolves to the generic fallback subject with no template;
//! the missing template surfaces later as a delivery failure, not a crash.

use crate::config::Config;
use crate::notification::{NotificationType, Payload, RecipientType};

/// A message template known at compile time.
#[derive(Debug, PartialEq, Eq)]
pub struct Template {
    pub id: &'static str,
    pub body: &'static str,
}

macro_rules! template {
    ($name:ident, $id:literal, $body:literal) => {
        static $name: Template = Template {
            id: $id,
            body: $body,
        };
    };
}

template!(
    ACCOUNT_CREATED,
    "emails/account-created",
    "Hi {recipient_name},\n\nYour account on {site_name} is ready.\n\
     Log in at {login_url} to get started.\n"
);
template!(
    BOOKING_CONFIRMATION_USER,
    "emails/booking-confirmation-user",
    "Hi {recipient_name},\n\nYour booking #{booking_id} for {package_title} \
     is confirmed.\nFestival date: {festival_date}\nParks: {park_names}\n"
);
template!(
    BOOKING_CONFIRMATION_ADMIN,
    "emails/booking-confirmation-admin",
    "A new booking #{booking_id} was received from {school_name} \
     ({school_contact}, {school_email}).\nPackage: {package_title}\n"
);
template!(
    BOOKING_REMINDER,
    "emails/booking-reminder",
    "Hi {recipient_name},\n\nBooking #{booking_id} is one week out.\n\
     Festival date: {festival_date}\n"
);
template!(
    HOTEL_ASSIGNED,
    "emails/hotel-assigned",
    "Hi {recipient_name},\n\nHotel {hotel_name} has been assigned to \
     booking #{booking_id}.\n"
);
template!(
    ROOMING_LIST_CREATED,
    "emails/rooming-list-created",
    "Hi {recipient_name},\n\nA rooming list was created for booking \
     #{booking_id}.\nPlease complete it by {due_date} at {login_url}.\n"
);
template!(
    ROOMING_LIST_DUE_SOON,
    "emails/rooming-list-due-soon",
    "Hi {recipient_name},\n\nThe rooming list for booking #{booking_id} is \
     due on {due_date} and has not been locked yet.\n"
);
template!(
    QUOTE_FOLLOW_UP,
    "emails/quote-follow-up",
    "Hi {recipient_name},\n\nYour quote #{quote_id} from {site_name} is \
     still waiting for you.\n"
);
template!(
    ACCOUNT_INACTIVE,
    "emails/account-inactive",
    "Hi {recipient_name},\n\nIt has been a while since you visited \
     {site_name}. Log in at {login_url} to pick up where you left off.\n"
);

/// The outcome of template resolution for one notification.
#[derive(Debug, PartialEq)]
pub struct ResolvedMessage {
    /// `None` when the notification type has no template; treated as a
    /// delivery failure by the processor.
    pub template: Option<&'static Template>,
    pub subject: String,
    /// `None` when no recipient could be resolved.
    pub recipient: Option<String>,
}

/// Resolves notification types to templates, subjects, and recipients.
#[derive(Debug, Clone)]
pub struct TemplateResolver {
    site_name: String,
    admin_email: String,
}

impl TemplateResolver {
    pub fn new(config: &Config) -> Self {
        Self {
            site_name: config.site_name.clone(),
            admin_email: config.admin_email.clone(),
        }
    }

    pub fn resolve(&self, notification_type: &NotificationType, data: &Payload) -> ResolvedMessage {
        let (template, subject) = self.lookup(notification_type, data);
        ResolvedMessage {
            template,
            subject,
            recipient: self.recipient(data),
        }
    }

    fn lookup(
        &self,
        notification_type: &NotificationType,
        data: &Payload,
    ) -> (Option<&'static Template>, String) {
        use NotificationType::*;
        let (template, subject) = match notification_type {
            AccountCreated => (&ACCOUNT_CREATED, "Welcome to {site_name}"),
            BookingConfirmationUser => (
                &BOOKING_CONFIRMATION_USER,
                "Booking #{booking_id} confirmed",
            ),
            BookingConfirmationAdmin => (
                &BOOKING_CONFIRMATION_ADMIN,
                "New booking #{booking_id} received",
            ),
            BookingReminder => (&BOOKING_REMINDER, "Booking #{booking_id}: one week to go"),
            HotelAssigned => (&HOTEL_ASSIGNED, "Hotel assigned to booking #{booking_id}"),
            RoomingListCreated => (
                &ROOMING_LIST_CREATED,
                "Rooming list for booking #{booking_id}",
            ),
            RoomingListDueSoon => (
                &ROOMING_LIST_DUE_SOON,
                "Rooming list for booking #{booking_id} due {due_date}",
            ),
            QuoteFollowUp => (&QUOTE_FOLLOW_UP, "Your quote #{quote_id} is waiting"),
            AccountInactive => (&ACCOUNT_INACTIVE, "We miss you at {site_name}"),
            Other(_) => {
                return (None, format!("Notification from {}", self.site_name));
            }
        };
        (Some(template), interpolate(subject, data))
    }

    /// Admin-typed payloads go to the configured admin address; everything
    /// else goes to `user_email`, falling back to the admin address.
    fn recipient(&self, data: &Payload) -> Option<String> {
        let admin = non_empty(self.admin_email.clone());
        match data.recipient_type() {
            RecipientType::Admin => admin,
            RecipientType::User => non_empty(data.text("user_email")).or(admin),
        }
    }
}

fn non_empty(value: String) -> Option<String> {
    (!value.is_empty()).then_some(value)
}

/// Replaces `{field}` placeholders with payload fields; absent fields render
/// as the empty string. Unterminated braces are emitted verbatim.
pub fn interpolate(template: &str, data: &Payload) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        match rest[start + 1..].find('}') {
            Some(end) => {
                let field = &rest[start + 1..start + 1 + end];
                out.push_str(&data.text(field));
                rest = &rest[start + end + 2..];
            }
            None => {
                out.push_str(&rest[start..]);
                return out;
            }
        }
    }
    out.push_str(rest);
    out
}
