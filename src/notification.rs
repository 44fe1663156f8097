//! Notification types and payloads.
//!
//! Every notification is identified by a [`NotificationType`]. The set of
//! types is a sealed enum rather than a free-form string so that the mapping
//! from type to template, subject, and recipient rules is checked in one
//! place, while [`NotificationType::Other`] keeps the wire format open:
//! payloads persisted by an older deployment still decode.

use std::fmt::Display;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// The identifier of a notification's template, subject, and recipient rules.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum NotificationType {
    AccountCreated,
    BookingConfirmationUser,
    BookingConfirmationAdmin,
    BookingReminder,
    HotelAssigned,
    RoomingListCreated,
    RoomingListDueSoon,
    QuoteFollowUp,
    AccountInactive,
    /// A type this build does not know. Resolves to the generic fallback
    /// subject and no template.
    Other(String),
}

impl NotificationType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::AccountCreated => "account_created",
            Self::BookingConfirmationUser => "booking_confirmation_user",
            Self::BookingConfirmationAdmin => "booking_confirmation_admin",
            Self::BookingReminder => "booking_reminder",
            Self::HotelAssigned => "hotel_assigned",
            Self::RoomingListCreated => "rooming_list_created",
            Self::RoomingListDueSoon => "rooming_list_due_soon",
            Self::QuoteFollowUp => "quote_follow_up",
            Self::AccountInactive => "account_inactive",
            Self::Other(name) => name,
        }
    }
}

impl From<&str> for NotificationType {
    fn from(value: &str) -> Self {
        match value {
            "account_created" => Self::AccountCreated,
            "booking_confirmation_user" => Self::BookingConfirmationUser,
            "booking_confirmation_admin" => Self::BookingConfirmationAdmin,
            "booking_reminder" => Self::BookingReminder,
            "hotel_assigned" => Self::HotelAssigned,
            "rooming_list_created" => Self::RoomingListCreated,
            "rooming_list_due_soon" => Self::RoomingListDueSoon,
            "quote_follow_up" => Self::QuoteFollowUp,
            "account_inactive" => Self::AccountInactive,
            other => Self::Other(other.to_owned()),
        }
    }
}

impl Display for NotificationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Serialize for NotificationType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for NotificationType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(name.as_str().into())
    }
}

/// Selects the recipient-resolution rule for a notification.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecipientType {
    #[default]
    User,
    Admin,
}

/// The free-form data carried by a notification.
///
/// A thin wrapper around a JSON object. Immutable once a job is scheduled;
/// the accessors may be called repeatedly. Absent fields read as the empty
/// string, matching how templates render them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload(Map<String, Value>);

impl Payload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Builder-style [`Payload::insert`].
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// The field rendered as text, or the empty string when absent or not a
    /// scalar.
    pub fn text(&self, key: &str) -> String {
        match self.0.get(key) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::Bool(b)) => b.to_string(),
            _ => String::new(),
        }
    }

    pub fn recipient_type(&self) -> RecipientType {
        self.0
            .get("recipient_type")
            .and_then(|value| serde_json::from_value(value.clone()).ok())
            .unwrap_or_default()
    }

    /// Fills in any of the given defaults that the payload does not already
    /// carry. Caller-supplied fields always win.
    pub fn merge_defaults<'a>(
        &mut self,
        defaults: impl IntoIterator<Item = (&'a str, Value)>,
    ) -> &mut Self {
        for (key, value) in defaults {
            self.0.entry(key.to_owned()).or_insert(value);
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Map<String, Value>> for Payload {
    fn from(value: Map<String, Value>) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn notification_type_round_trips_through_strings() {
        let types = [
            NotificationType::AccountCreated,
            NotificationType::BookingConfirmationUser,
            NotificationType::BookingConfirmationAdmin,
            NotificationType::BookingReminder,
            NotificationType::HotelAssigned,
            NotificationType::RoomingListCreated,
            NotificationType::RoomingListDueSoon,
            NotificationType::QuoteFollowUp,
            NotificationType::AccountInactive,
        ];
        for notification_type in types {
            let name = notification_type.as_str().to_owned();
            assert_eq!(NotificationType::from(name.as_str()), notification_type);
        }
    }

    #[test]
    fn unknown_type_is_preserved() {
        let notification_type = NotificationType::from("someone_elses_event");
        assert_eq!(
            notification_type,
            NotificationType::Other("someone_elses_event".to_owned())
        );
        assert_eq!(notification_type.as_str(), "someone_elses_event");
    }

    #[test]
    fn serde_uses_the_string_form() {
        let json = serde_json::to_string(&NotificationType::BookingReminder).unwrap();
        assert_eq!(json, "\"booking_reminder\"");
        let back: NotificationType = serde_json::from_str(&json).unwrap();
        assert_eq!(back, NotificationType::BookingReminder);
    }

    #[test]
    fn absent_fields_read_as_empty_text() {
        let payload = Payload::new().with("booking_id", 42);
        assert_eq!(payload.text("booking_id"), "42");
        assert_eq!(payload.text("missing"), "");
    }

    #[test]
    fn merge_defaults_does_not_override_caller_fields() {
        let mut payload = Payload::new().with("site_name", "custom");
        payload.merge_defaults([
            ("site_name", Value::from("default")),
            ("login_url", Value::from("https://example.com/login")),
        ]);
        assert_eq!(payload.text("site_name"), "custom");
        assert_eq!(payload.text("login_url"), "https://example.com/login");
    }

    #[test]
    fn recipient_type_defaults_to_user() {
        assert_eq!(Payload::new().recipient_type(), RecipientType::User);
        let payload = Payload::new().with("recipient_type", "admin");
        assert_eq!(payload.recipient_type(), RecipientType::Admin);
    }
}
