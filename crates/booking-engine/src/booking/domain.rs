use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a listed property. Owned by the external catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PropertyId(pub Uuid);

/// Identifier of a marketplace user, as asserted by the upstream identity layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub Uuid);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReservationId(pub Uuid);

impl ReservationId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WindowId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockedDateId(pub u64);

macro_rules! display_inner {
    ($($id:ty),*) => {
        $(impl fmt::Display for $id {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        })*
    };
}

display_inner!(PropertyId, UserId, ReservationId, WindowId, BlockedDateId);

/// Catalog view of a property, the only listing data the booking engine reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyListing {
    pub id: PropertyId,
    pub owner: UserId,
    pub title: String,
    #[serde(default)]
    pub city: String,
    /// Base nightly price used when no availability window covers a stay.
    pub price: Decimal,
    #[serde(default = "default_currency")]
    pub currency: String,
}

fn default_currency() -> String {
    "EUR".to_string()
}

/// Owner-defined bookable range with its nightly price and stay limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityWindow {
    pub id: WindowId,
    pub property_id: PropertyId,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub price_per_night: Decimal,
    pub min_nights: u32,
    pub max_nights: u32,
    pub is_active: bool,
}

impl AvailabilityWindow {
    /// True when the whole stay falls inside the window (`start <= check_in`, `end >= check_out`).
    pub fn covers(&self, stay: &StayDates) -> bool {
        self.start_date <= stay.check_in() && self.end_date >= stay.check_out()
    }
}

/// Request body for a new availability window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAvailabilityWindow {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub price_per_night: Decimal,
    #[serde(default = "default_min_nights")]
    pub min_nights: u32,
    #[serde(default = "default_max_nights")]
    pub max_nights: u32,
}

fn default_min_nights() -> u32 {
    1
}

fn default_max_nights() -> u32 {
    30
}

/// A single day removed from bookability by the owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockedDate {
    pub id: BlockedDateId,
    pub property_id: PropertyId,
    pub date: NaiveDate,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBlockedDate {
    pub date: NaiveDate,
    #[serde(default)]
    pub reason: String,
}

/// Half-open `[check_in, check_out)` stay. Construction guarantees `check_in < check_out`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StayDates {
    check_in: NaiveDate,
    check_out: NaiveDate,
}

impl StayDates {
    pub fn new(check_in: NaiveDate, check_out: NaiveDate) -> Option<Self> {
        (check_in < check_out).then_some(Self {
            check_in,
            check_out,
        })
    }

    pub fn check_in(&self) -> NaiveDate {
        self.check_in
    }

    pub fn check_out(&self) -> NaiveDate {
        self.check_out
    }

    pub fn nights(&self) -> u32 {
        (self.check_out - self.check_in).num_days() as u32
    }

    pub fn includes(&self, date: NaiveDate) -> bool {
        self.check_in <= date && date < self.check_out
    }
}

/// Reservation lifecycle states. `Cancelled`, `Completed` and `Refunded` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    Pending,
    Confirmed,
    Paid,
    Cancelled,
    Completed,
    Refunded,
}

impl ReservationStatus {
    /// Statuses whose reservations hold their nights against other bookings.
    pub const CLAIMING: [ReservationStatus; 3] = [Self::Pending, Self::Confirmed, Self::Paid];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Paid => "paid",
            Self::Cancelled => "cancelled",
            Self::Completed => "completed",
            Self::Refunded => "refunded",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Confirmed => "Confirmed",
            Self::Paid => "Paid",
            Self::Cancelled => "Cancelled",
            Self::Completed => "Completed",
            Self::Refunded => "Refunded",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Completed | Self::Refunded)
    }

    pub fn claims_nights(&self) -> bool {
        Self::CLAIMING.contains(self)
    }

    /// Statuses shown as reserved on the public calendar.
    pub fn shown_on_calendar(&self) -> bool {
        matches!(self, Self::Confirmed | Self::Paid)
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Persisted reservation. Price fields are fixed at creation; only status fields change later.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,
    pub property_id: PropertyId,
    pub guest: UserId,
    /// Property owner at booking time, kept even if ownership later changes.
    pub host: UserId,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub guests_count: u32,
    pub price_per_night: Decimal,
    pub service_fee: Decimal,
    /// Amount charged to the guest: nightly subtotal plus service fee.
    pub total_price: Decimal,
    pub status: ReservationStatus,
    pub message: String,
    pub payment_intent: Option<String>,
    pub checkout_session_id: Option<String>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancellation_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Reservation {
    pub fn nights(&self) -> u32 {
        (self.check_out - self.check_in).num_days().max(0) as u32
    }

    pub fn involves(&self, user: &UserId) -> bool {
        self.guest == *user || self.host == *user
    }
}

/// Booking request submitted by a guest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingRequest {
    pub property_id: PropertyId,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    #[serde(default = "default_guests")]
    pub guests_count: u32,
    #[serde(default)]
    pub message: String,
}

fn default_guests() -> u32 {
    1
}

/// Reservation enriched with the derived and listing fields API consumers display.
#[derive(Debug, Clone, Serialize)]
pub struct ReservationView {
    #[serde(flatten)]
    pub reservation: Reservation,
    pub nights: u32,
    pub status_display: &'static str,
    pub property_title: String,
    pub property_city: String,
}

impl ReservationView {
    pub fn new(reservation: Reservation, listing: Option<&PropertyListing>) -> Self {
        let (property_title, property_city) = listing
            .map(|listing| (listing.title.clone(), listing.city.clone()))
            .unwrap_or_default();
        Self {
            nights: reservation.nights(),
            status_display: reservation.status.display_name(),
            reservation,
            property_title,
            property_city,
        }
    }
}
