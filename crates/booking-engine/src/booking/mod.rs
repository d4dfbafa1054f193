//! Booking engine: calendar store, conflict validation, pricing, the reservation lifecycle and
//! payment reconciliation, exposed through [`BookingService`] and [`booking_router`].

pub mod calendar;
pub mod conflict;
pub mod domain;
pub mod error;
pub mod lifecycle;
pub(crate) mod locks;
pub mod memory;
pub mod payment;
pub mod pricing;
pub mod repository;
pub mod router;
pub mod service;

#[cfg(test)]
mod tests;

pub use calendar::{CalendarSnapshot, ReservedRange};
pub use conflict::{ConflictError, Rejection};
pub use domain::{
    AvailabilityWindow, BlockedDate, BlockedDateId, BookingRequest, NewAvailabilityWindow,
    NewBlockedDate, PropertyId, PropertyListing, Reservation, ReservationId, ReservationStatus,
    ReservationView, StayDates, UserId, WindowId,
};
pub use error::BookingError;
pub use lifecycle::{Role, Transition, TransitionError};
pub use locks::LockTimeout;
pub use memory::{InMemoryCalendarStore, InMemoryPropertyCatalog, InMemoryReservationStore};
pub use pricing::{PriceSource, PricingError, Quote, MAX_NIGHTLY_PRICE, SERVICE_FEE_RATE};
pub use repository::{
    CalendarRepository, PropertyCatalog, RepositoryError, ReservationRepository,
};
pub use router::{booking_router, AuthenticatedUser, USER_HEADER};
pub use service::{BookingService, BookingSettings};
