//! Pre-wired domain event hooks.
//!
//! Other subsystems call these instead of hand-building `trigger()` payloads,
//! so the exact notification type strings and payload fields stay private to
//! this crate. Enrichment is pure data transformation: an absent field just
//! renders as the empty string.

use chrono::NaiveDate;

use crate::domain::{Account, Booking, Hotel, RoomingList, School};
use crate::notification::{NotificationType, Payload};
use crate::Notifier;

impl Notifier {
    /// A new account was created: welcome the user.
    pub async fn account_created(&self, account: &Account) {
        let data = Payload::new()
            .with("user_email", account.email.clone())
            .with("recipient_name", account.display_name.clone());
        self.trigger(NotificationType::AccountCreated, data, 0).await;
    }

    /// A booking was created: confirm to the user and notify the admin.
    pub async fn booking_created(&self, booking: &Booking, school: &School) {
        let user = booking_payload(booking);
        self.trigger(NotificationType::BookingConfirmationUser, user, 0)
            .await;

        let admin = booking_payload(booking)
            .with("recipient_type", "admin")
            .with("school_name", school.name.clone())
            .with("school_contact", school.contact_name.clone())
            .with("school_email", school.contact_email.clone());
        self.trigger(NotificationType::BookingConfirmationAdmin, admin, 0)
            .await;
    }

    /// A hotel was assigned to a booking.
    pub async fn hotel_assigned(&self, booking: &Booking, hotel: &Hotel) {
        let data = booking_payload(booking).with("hotel_name", hotel.name.clone());
        self.trigger(NotificationType::HotelAssigned, data, 0).await;
    }

    /// A rooming list was created for a booking.
    pub async fn rooming_list_created(&self, list: &RoomingList, school: &School) {
        let data = Payload::new()
            .with("booking_id", list.booking_id)
            .with("user_email", list.user_email.clone())
            .with("recipient_name", list.user_display_name.clone())
            .with("due_date", format_date(list.due_date))
            .with("school_name", school.name.clone());
        self.trigger(NotificationType::RoomingListCreated, data, 0)
            .await;
    }
}

fn booking_payload(booking: &Booking) -> Payload {
    Payload::new()
        .with("booking_id", booking.id)
        .with("user_email", booking.user_email.clone())
        .with("recipient_name", booking.user_display_name.clone())
        .with("package_title", booking.package_title.clone())
        .with("park_names", booking.park_names.join(", "))
        .with("festival_date", format_date(booking.festival_date))
}

fn format_date(date: Option<NaiveDate>) -> String {
    date.map(|date| date.format("%-d %B %Y").to_string())
        .unwrap_or_default()
}
