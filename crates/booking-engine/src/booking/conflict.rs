//! Admissibility of a candidate stay against a property's reservations and blocked dates.
//!
//! Every booking path goes through [`check`]; the storage layer reuses [`stays_overlap`] for its
//! exclusion constraint so the overlap rule exists exactly once.

use chrono::NaiveDate;

use super::domain::{BlockedDate, PropertyId, Reservation, ReservationId, StayDates};
use super::repository::{CalendarRepository, RepositoryError, ReservationRepository};

/// Half-open interval intersection: a check-out on day X does not collide with a check-in on X.
pub fn stays_overlap(
    existing_check_in: NaiveDate,
    existing_check_out: NaiveDate,
    check_in: NaiveDate,
    check_out: NaiveDate,
) -> bool {
    existing_check_in < check_out && existing_check_out > check_in
}

/// Why a stay cannot be booked.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("check-out ({check_out}) must be after check-in ({check_in})")]
    InvalidRange {
        check_in: NaiveDate,
        check_out: NaiveDate,
    },
    #[error("these dates are not available")]
    DateConflict { existing: ReservationId },
    #[error("some dates are blocked by the owner")]
    BlockedDateConflict { date: NaiveDate },
}

#[derive(Debug, thiserror::Error)]
pub enum ConflictError {
    #[error(transparent)]
    Rejected(#[from] Rejection),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Pure admissibility rule over already-loaded calendar state.
pub fn check(
    check_in: NaiveDate,
    check_out: NaiveDate,
    reservations: &[Reservation],
    blocked: &[BlockedDate],
) -> Result<StayDates, Rejection> {
    let stay = StayDates::new(check_in, check_out).ok_or(Rejection::InvalidRange {
        check_in,
        check_out,
    })?;

    if let Some(existing) = reservations.iter().find(|existing| {
        existing.status.claims_nights()
            && stays_overlap(existing.check_in, existing.check_out, check_in, check_out)
    }) {
        return Err(Rejection::DateConflict {
            existing: existing.id,
        });
    }

    if let Some(day) = blocked.iter().find(|day| stay.includes(day.date)) {
        return Err(Rejection::BlockedDateConflict { date: day.date });
    }

    Ok(stay)
}

/// Loads the property's reservations and blocked dates and applies [`check`].
///
/// Callers must hold the property's booking lock until the reservation is inserted.
pub fn validate<C, R>(
    calendar: &C,
    reservations: &R,
    property: &PropertyId,
    check_in: NaiveDate,
    check_out: NaiveDate,
) -> Result<StayDates, ConflictError>
where
    C: CalendarRepository + ?Sized,
    R: ReservationRepository + ?Sized,
{
    if check_in >= check_out {
        return Err(Rejection::InvalidRange {
            check_in,
            check_out,
        }
        .into());
    }

    let existing = reservations.for_property(property)?;
    let blocked = calendar.blocked_dates(property)?;
    Ok(check(check_in, check_out, &existing, &blocked)?)
}
