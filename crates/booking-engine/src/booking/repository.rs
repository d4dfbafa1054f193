use chrono::NaiveDate;

use super::domain::{
    AvailabilityWindow, BlockedDate, NewAvailabilityWindow, NewBlockedDate, PropertyId,
    PropertyListing, Reservation, ReservationId, ReservationStatus, UserId, WindowId,
};

/// Reservation storage. Implementations own the storage-level guarantees the service relies on.
pub trait ReservationRepository: Send + Sync {
    /// Inserts a new reservation. Must refuse with [`RepositoryError::Overlap`] when another
    /// night-claiming reservation of the same property intersects the stay.
    fn insert(&self, reservation: Reservation) -> Result<Reservation, RepositoryError>;
    fn fetch(&self, id: &ReservationId) -> Result<Option<Reservation>, RepositoryError>;
    fn for_property(&self, property: &PropertyId) -> Result<Vec<Reservation>, RepositoryError>;
    /// Newest first.
    fn for_guest(&self, guest: &UserId) -> Result<Vec<Reservation>, RepositoryError>;
    /// Newest first.
    fn for_host(&self, host: &UserId) -> Result<Vec<Reservation>, RepositoryError>;
    fn with_status(&self, status: ReservationStatus) -> Result<Vec<Reservation>, RepositoryError>;
    /// Replaces the stored record only while its status still equals `expected`.
    fn compare_and_set(
        &self,
        expected: ReservationStatus,
        next: Reservation,
    ) -> Result<Reservation, RepositoryError>;
}

/// Availability windows and blocked dates, written by property owners and read by the engine.
pub trait CalendarRepository: Send + Sync {
    fn add_window(
        &self,
        property: &PropertyId,
        window: NewAvailabilityWindow,
    ) -> Result<AvailabilityWindow, RepositoryError>;
    fn fetch_window(&self, id: &WindowId) -> Result<Option<AvailabilityWindow>, RepositoryError>;
    fn remove_window(&self, id: &WindowId) -> Result<AvailabilityWindow, RepositoryError>;
    /// All windows of a property ordered by start date, then creation order.
    fn windows(&self, property: &PropertyId) -> Result<Vec<AvailabilityWindow>, RepositoryError>;
    /// Refuses a second entry for the same (property, date) with [`RepositoryError::Conflict`].
    fn add_blocked_date(
        &self,
        property: &PropertyId,
        blocked: NewBlockedDate,
    ) -> Result<BlockedDate, RepositoryError>;
    /// Ordered by date.
    fn blocked_dates(&self, property: &PropertyId) -> Result<Vec<BlockedDate>, RepositoryError>;
}

/// Read-only view of the external property catalog.
pub trait PropertyCatalog: Send + Sync {
    fn fetch(&self, id: &PropertyId) -> Result<Option<PropertyListing>, RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("stay overlaps reservation {existing} from {check_in} to {check_out}")]
    Overlap {
        existing: ReservationId,
        check_in: NaiveDate,
        check_out: NaiveDate,
    },
    #[error("record not found")]
    NotFound,
    #[error("reservation status is {actual}, expected {expected}")]
    StaleStatus {
        expected: ReservationStatus,
        actual: ReservationStatus,
    },
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}
