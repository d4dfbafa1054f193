use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Method, Request};
use axum::response::Response;
use chrono::NaiveDate;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::booking::domain::{
    AvailabilityWindow, BlockedDate, BookingRequest, NewAvailabilityWindow, NewBlockedDate,
    PropertyId, PropertyListing, Reservation, ReservationId, ReservationStatus, UserId, WindowId,
};
use crate::booking::memory::{
    InMemoryCalendarStore, InMemoryPropertyCatalog, InMemoryReservationStore,
};
use crate::booking::payment::{PaymentGateway, StubGateway, WebhookVerifier, CHECKOUT_COMPLETED};
use crate::booking::repository::{CalendarRepository, RepositoryError, ReservationRepository};
use crate::booking::router::USER_HEADER;
use crate::booking::service::{BookingService, BookingSettings};

pub(super) type MemoryService =
    BookingService<InMemoryCalendarStore, InMemoryReservationStore, InMemoryPropertyCatalog>;

pub(super) const WEBHOOK_SECRET: &str = "whsec_booking_tests";

pub(super) fn host() -> UserId {
    UserId(Uuid::from_u128(0x1001))
}

pub(super) fn guest() -> UserId {
    UserId(Uuid::from_u128(0x2002))
}

pub(super) fn stranger() -> UserId {
    UserId(Uuid::from_u128(0x3003))
}

pub(super) fn property() -> PropertyId {
    PropertyId(Uuid::from_u128(0xBEEF))
}

pub(super) fn day(month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, month, day).expect("valid date")
}

pub(super) fn listing() -> PropertyListing {
    PropertyListing {
        id: property(),
        owner: host(),
        title: "Harbour Loft".to_string(),
        city: "Lisbon".to_string(),
        price: dec!(80.00),
        currency: "EUR".to_string(),
    }
}

pub(super) fn booking_request(check_in: NaiveDate, check_out: NaiveDate) -> BookingRequest {
    BookingRequest {
        property_id: property(),
        check_in,
        check_out,
        guests_count: 2,
        message: "Arriving late".to_string(),
    }
}

pub(super) fn summer_window() -> NewAvailabilityWindow {
    NewAvailabilityWindow {
        start_date: day(6, 1),
        end_date: day(8, 31),
        price_per_night: dec!(100.00),
        min_nights: 1,
        max_nights: 30,
    }
}

pub(super) struct Harness {
    pub(super) service: Arc<MemoryService>,
    pub(super) calendar: Arc<InMemoryCalendarStore>,
    pub(super) reservations: Arc<InMemoryReservationStore>,
    pub(super) catalog: Arc<InMemoryPropertyCatalog>,
    pub(super) gateway: Arc<StubGateway>,
}

pub(super) fn harness() -> Harness {
    harness_with(BookingSettings::default(), StubGateway::new())
}

pub(super) fn signed_harness() -> Harness {
    let settings = BookingSettings {
        webhooks: WebhookVerifier::new(
            Some(WEBHOOK_SECRET.to_string()),
            false,
            Duration::from_secs(300),
        ),
        ..BookingSettings::default()
    };
    harness_with(settings, StubGateway::new())
}

pub(super) fn harness_with(settings: BookingSettings, gateway: StubGateway) -> Harness {
    let calendar = Arc::new(InMemoryCalendarStore::default());
    let reservations = Arc::new(InMemoryReservationStore::default());
    let catalog = Arc::new(InMemoryPropertyCatalog::from_listings([listing()]));
    let gateway = Arc::new(gateway);
    let service = Arc::new(BookingService::new(
        calendar.clone(),
        reservations.clone(),
        catalog.clone(),
        gateway.clone() as Arc<dyn PaymentGateway>,
        settings,
    ));
    Harness {
        service,
        calendar,
        reservations,
        catalog,
        gateway,
    }
}

impl Harness {
    pub(super) async fn pending(&self, check_in: NaiveDate, check_out: NaiveDate) -> Reservation {
        self.service
            .request_booking(&guest(), booking_request(check_in, check_out))
            .await
            .expect("booking accepted")
            .reservation
    }

    pub(super) async fn confirmed(&self, check_in: NaiveDate, check_out: NaiveDate) -> Reservation {
        let pending = self.pending(check_in, check_out).await;
        self.service
            .confirm(&host(), &pending.id)
            .expect("host confirms")
            .reservation
    }

    pub(super) fn stored(&self, id: &ReservationId) -> Reservation {
        self.reservations
            .fetch(id)
            .expect("fetch succeeds")
            .expect("reservation stored")
    }

    pub(super) fn block(&self, date: NaiveDate) -> BlockedDate {
        self.calendar
            .add_blocked_date(
                &property(),
                NewBlockedDate {
                    date,
                    reason: "maintenance".to_string(),
                },
            )
            .expect("date blocked")
    }
}

pub(super) fn completed_checkout(reference: &str, session_id: &str, payment_intent: &str) -> Vec<u8> {
    json!({
        "id": format!("evt_{session_id}"),
        "type": CHECKOUT_COMPLETED,
        "data": {"object": {
            "id": session_id,
            "payment_intent": payment_intent,
            "metadata": {"reservation_id": reference},
        }},
    })
    .to_string()
    .into_bytes()
}

/// Reservation store whose backing database is offline.
pub(super) struct UnavailableReservations;

impl ReservationRepository for UnavailableReservations {
    fn insert(&self, _reservation: Reservation) -> Result<Reservation, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn fetch(&self, _id: &ReservationId) -> Result<Option<Reservation>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn for_property(&self, _property: &PropertyId) -> Result<Vec<Reservation>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn for_guest(&self, _guest: &UserId) -> Result<Vec<Reservation>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn for_host(&self, _host: &UserId) -> Result<Vec<Reservation>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn with_status(&self, _status: ReservationStatus) -> Result<Vec<Reservation>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn compare_and_set(
        &self,
        _expected: ReservationStatus,
        _next: Reservation,
    ) -> Result<Reservation, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }
}

/// Calendar whose availability table is read-only.
pub(super) struct ReadOnlyCalendar;

impl CalendarRepository for ReadOnlyCalendar {
    fn add_window(
        &self,
        _property: &PropertyId,
        _window: NewAvailabilityWindow,
    ) -> Result<AvailabilityWindow, RepositoryError> {
        Err(RepositoryError::Unavailable("read only".to_string()))
    }

    fn fetch_window(&self, _id: &WindowId) -> Result<Option<AvailabilityWindow>, RepositoryError> {
        Ok(None)
    }

    fn remove_window(&self, _id: &WindowId) -> Result<AvailabilityWindow, RepositoryError> {
        Err(RepositoryError::NotFound)
    }

    fn windows(&self, _property: &PropertyId) -> Result<Vec<AvailabilityWindow>, RepositoryError> {
        Ok(Vec::new())
    }

    fn add_blocked_date(
        &self,
        _property: &PropertyId,
        _blocked: NewBlockedDate,
    ) -> Result<BlockedDate, RepositoryError> {
        Err(RepositoryError::Unavailable("read only".to_string()))
    }

    fn blocked_dates(&self, _property: &PropertyId) -> Result<Vec<BlockedDate>, RepositoryError> {
        Ok(Vec::new())
    }
}

pub(super) fn offline_service() -> Arc<BookingService<ReadOnlyCalendar, UnavailableReservations, InMemoryPropertyCatalog>> {
    Arc::new(BookingService::new(
        Arc::new(ReadOnlyCalendar),
        Arc::new(UnavailableReservations),
        Arc::new(InMemoryPropertyCatalog::from_listings([listing()])),
        Arc::new(StubGateway::new()),
        BookingSettings::default(),
    ))
}

pub(super) fn request(method: Method, uri: &str, user: Option<UserId>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        builder = builder.header(USER_HEADER, user.to_string());
    }
    let body = match body {
        Some(value) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };
    builder.body(body).expect("request builds")
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
