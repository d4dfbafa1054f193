use std::sync::Arc;

use axum::{
    async_trait,
    body::Bytes,
    extract::{rejection::JsonRejection, FromRequestParts, Path, State},
    http::{request::Parts, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;
use uuid::Uuid;

use super::domain::{
    BookingRequest, NewAvailabilityWindow, NewBlockedDate, PropertyId, ReservationId, UserId,
    WindowId,
};
use super::error::BookingError;
use super::payment::{CheckoutUrls, SIGNATURE_HEADER};
use super::repository::{CalendarRepository, PropertyCatalog, ReservationRepository};
use super::service::BookingService;

pub const USER_HEADER: &str = "x-user-id";

/// Caller identity asserted by the upstream authentication layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthenticatedUser(pub UserId);

#[derive(Debug)]
pub struct Unauthenticated(&'static str);

impl IntoResponse for Unauthenticated {
    fn into_response(self) -> Response {
        let payload = json!({
            "error": self.0,
            "code": "authentication_error",
        });
        (StatusCode::UNAUTHORIZED, Json(payload)).into_response()
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = Unauthenticated;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(USER_HEADER)
            .ok_or(Unauthenticated("authentication required"))?;
        let uuid = raw
            .to_str()
            .ok()
            .and_then(|value| Uuid::parse_str(value.trim()).ok())
            .ok_or(Unauthenticated("malformed user identity"))?;
        Ok(Self(UserId(uuid)))
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct CancelRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

type Service<C, R, P> = Arc<BookingService<C, R, P>>;

/// Router builder exposing the calendar, reservation and payment endpoints.
pub fn booking_router<C, R, P>(service: Service<C, R, P>) -> Router
where
    C: CalendarRepository + 'static,
    R: ReservationRepository + 'static,
    P: PropertyCatalog + 'static,
{
    Router::new()
        .route(
            "/properties/:property_id/calendar",
            get(calendar_handler::<C, R, P>),
        )
        .route(
            "/properties/:property_id/availability",
            get(list_availability_handler::<C, R, P>).post(add_availability_handler::<C, R, P>),
        )
        .route(
            "/availability/:window_id",
            delete(remove_availability_handler::<C, R, P>),
        )
        .route(
            "/properties/:property_id/blocked",
            get(list_blocked_handler::<C, R, P>).post(block_date_handler::<C, R, P>),
        )
        .route("/reservations", post(create_reservation_handler::<C, R, P>))
        .route("/reservations/mine", get(guest_reservations_handler::<C, R, P>))
        .route("/reservations/hosting", get(host_reservations_handler::<C, R, P>))
        .route(
            "/reservations/:reservation_id",
            get(reservation_handler::<C, R, P>),
        )
        .route(
            "/reservations/:reservation_id/confirm",
            post(confirm_handler::<C, R, P>),
        )
        .route(
            "/reservations/:reservation_id/cancel",
            post(cancel_handler::<C, R, P>),
        )
        .route(
            "/reservations/:reservation_id/checkout",
            post(checkout_handler::<C, R, P>),
        )
        .route("/payments/webhook", post(webhook_handler::<C, R, P>))
        .with_state(service)
}

fn property_id(raw: &str) -> Result<PropertyId, BookingError> {
    Uuid::parse_str(raw)
        .map(PropertyId)
        .map_err(|_| BookingError::Validation(format!("invalid property id `{raw}`")))
}

fn reservation_id(raw: &str) -> Result<ReservationId, BookingError> {
    Uuid::parse_str(raw)
        .map(ReservationId)
        .map_err(|_| BookingError::Validation(format!("invalid reservation id `{raw}`")))
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, BookingError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| BookingError::Validation(rejection.body_text()))
}

fn respond<T: serde::Serialize>(status: StatusCode, result: Result<T, BookingError>) -> Response {
    match result {
        Ok(value) => (status, Json(value)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn calendar_handler<C, R, P>(
    State(service): State<Service<C, R, P>>,
    Path(raw_property): Path<String>,
) -> Response
where
    C: CalendarRepository + 'static,
    R: ReservationRepository + 'static,
    P: PropertyCatalog + 'static,
{
    let today = Utc::now().date_naive();
    let result = property_id(&raw_property).and_then(|property| service.calendar(&property, today));
    respond(StatusCode::OK, result)
}

pub(crate) async fn list_availability_handler<C, R, P>(
    State(service): State<Service<C, R, P>>,
    Path(raw_property): Path<String>,
) -> Response
where
    C: CalendarRepository + 'static,
    R: ReservationRepository + 'static,
    P: PropertyCatalog + 'static,
{
    let result = property_id(&raw_property).and_then(|property| service.availability(&property));
    respond(StatusCode::OK, result)
}

pub(crate) async fn add_availability_handler<C, R, P>(
    State(service): State<Service<C, R, P>>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(raw_property): Path<String>,
    payload: Result<Json<NewAvailabilityWindow>, JsonRejection>,
) -> Response
where
    C: CalendarRepository + 'static,
    R: ReservationRepository + 'static,
    P: PropertyCatalog + 'static,
{
    let result = property_id(&raw_property).and_then(|property| {
        let window = body(payload)?;
        service.add_availability(&user, &property, window)
    });
    respond(StatusCode::CREATED, result)
}

pub(crate) async fn remove_availability_handler<C, R, P>(
    State(service): State<Service<C, R, P>>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(raw_window): Path<String>,
) -> Response
where
    C: CalendarRepository + 'static,
    R: ReservationRepository + 'static,
    P: PropertyCatalog + 'static,
{
    let window = match raw_window.parse::<u64>() {
        Ok(id) => WindowId(id),
        Err(_) => {
            return BookingError::Validation(format!("invalid window id `{raw_window}`"))
                .into_response()
        }
    };
    match service.remove_availability(&user, &window) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn list_blocked_handler<C, R, P>(
    State(service): State<Service<C, R, P>>,
    AuthenticatedUser(_user): AuthenticatedUser,
    Path(raw_property): Path<String>,
) -> Response
where
    C: CalendarRepository + 'static,
    R: ReservationRepository + 'static,
    P: PropertyCatalog + 'static,
{
    let result = property_id(&raw_property).and_then(|property| service.blocked_dates(&property));
    respond(StatusCode::OK, result)
}

pub(crate) async fn block_date_handler<C, R, P>(
    State(service): State<Service<C, R, P>>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(raw_property): Path<String>,
    payload: Result<Json<NewBlockedDate>, JsonRejection>,
) -> Response
where
    C: CalendarRepository + 'static,
    R: ReservationRepository + 'static,
    P: PropertyCatalog + 'static,
{
    let result = property_id(&raw_property).and_then(|property| {
        let blocked = body(payload)?;
        service.block_date(&user, &property, blocked)
    });
    respond(StatusCode::CREATED, result)
}

pub(crate) async fn create_reservation_handler<C, R, P>(
    State(service): State<Service<C, R, P>>,
    AuthenticatedUser(guest): AuthenticatedUser,
    payload: Result<Json<BookingRequest>, JsonRejection>,
) -> Response
where
    C: CalendarRepository + 'static,
    R: ReservationRepository + 'static,
    P: PropertyCatalog + 'static,
{
    let request = match body(payload) {
        Ok(request) => request,
        Err(err) => return err.into_response(),
    };
    respond(
        StatusCode::CREATED,
        service.request_booking(&guest, request).await,
    )
}

pub(crate) async fn guest_reservations_handler<C, R, P>(
    State(service): State<Service<C, R, P>>,
    AuthenticatedUser(guest): AuthenticatedUser,
) -> Response
where
    C: CalendarRepository + 'static,
    R: ReservationRepository + 'static,
    P: PropertyCatalog + 'static,
{
    respond(StatusCode::OK, service.reservations_as_guest(&guest))
}

pub(crate) async fn host_reservations_handler<C, R, P>(
    State(service): State<Service<C, R, P>>,
    AuthenticatedUser(host): AuthenticatedUser,
) -> Response
where
    C: CalendarRepository + 'static,
    R: ReservationRepository + 'static,
    P: PropertyCatalog + 'static,
{
    respond(StatusCode::OK, service.reservations_as_host(&host))
}

pub(crate) async fn reservation_handler<C, R, P>(
    State(service): State<Service<C, R, P>>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(raw_reservation): Path<String>,
) -> Response
where
    C: CalendarRepository + 'static,
    R: ReservationRepository + 'static,
    P: PropertyCatalog + 'static,
{
    let result = reservation_id(&raw_reservation).and_then(|id| service.reservation(&user, &id));
    respond(StatusCode::OK, result)
}

pub(crate) async fn confirm_handler<C, R, P>(
    State(service): State<Service<C, R, P>>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(raw_reservation): Path<String>,
) -> Response
where
    C: CalendarRepository + 'static,
    R: ReservationRepository + 'static,
    P: PropertyCatalog + 'static,
{
    let result = reservation_id(&raw_reservation).and_then(|id| service.confirm(&user, &id));
    respond(StatusCode::OK, result)
}

pub(crate) async fn cancel_handler<C, R, P>(
    State(service): State<Service<C, R, P>>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(raw_reservation): Path<String>,
    payload: Option<Json<CancelRequest>>,
) -> Response
where
    C: CalendarRepository + 'static,
    R: ReservationRepository + 'static,
    P: PropertyCatalog + 'static,
{
    let reason = payload.and_then(|Json(request)| request.reason);
    let result =
        reservation_id(&raw_reservation).and_then(|id| service.cancel(&user, &id, reason));
    respond(StatusCode::OK, result)
}

pub(crate) async fn checkout_handler<C, R, P>(
    State(service): State<Service<C, R, P>>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(raw_reservation): Path<String>,
    payload: Option<Json<CheckoutUrls>>,
) -> Response
where
    C: CalendarRepository + 'static,
    R: ReservationRepository + 'static,
    P: PropertyCatalog + 'static,
{
    let id = match reservation_id(&raw_reservation) {
        Ok(id) => id,
        Err(err) => return err.into_response(),
    };
    let urls = payload.map(|Json(urls)| urls).unwrap_or_default();
    respond(
        StatusCode::OK,
        service.create_checkout(&user, &id, urls).await,
    )
}

/// Gateway callback. Acknowledged with 200 unless the delivery fails verification, cannot be
/// parsed, or storage fails.
pub(crate) async fn webhook_handler<C, R, P>(
    State(service): State<Service<C, R, P>>,
    headers: HeaderMap,
    payload: Bytes,
) -> Response
where
    C: CalendarRepository + 'static,
    R: ReservationRepository + 'static,
    P: PropertyCatalog + 'static,
{
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());
    match service.handle_payment_event(&payload, signature) {
        Ok(outcome) => {
            debug!(outcome = outcome.label(), "webhook acknowledged");
            (StatusCode::OK, Json(json!({ "received": true }))).into_response()
        }
        Err(err) => err.into_response(),
    }
}
