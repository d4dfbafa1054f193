use chrono::NaiveDate;
use serde::Serialize;

use super::domain::{AvailabilityWindow, BlockedDate, NewAvailabilityWindow, PropertyId};
use super::pricing;
use super::repository::{CalendarRepository, RepositoryError, ReservationRepository};

/// Point-in-time calendar of a property. Built without the booking lock, so it may trail a
/// booking that is being committed concurrently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CalendarSnapshot {
    pub property_id: PropertyId,
    pub as_of: NaiveDate,
    pub availabilities: Vec<AvailabilityWindow>,
    pub blocked_dates: Vec<NaiveDate>,
    pub reserved_dates: Vec<ReservedRange>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReservedRange {
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
}

/// Active windows, optionally limited to those still running on `as_of`.
pub fn active_windows<C>(
    calendar: &C,
    property: &PropertyId,
    as_of: Option<NaiveDate>,
) -> Result<Vec<AvailabilityWindow>, RepositoryError>
where
    C: CalendarRepository + ?Sized,
{
    Ok(calendar
        .windows(property)?
        .into_iter()
        .filter(|window| window.is_active)
        .filter(|window| as_of.map_or(true, |day| window.end_date >= day))
        .collect())
}

/// Blocked dates, optionally limited to `as_of` and later.
pub fn blocked_dates<C>(
    calendar: &C,
    property: &PropertyId,
    as_of: Option<NaiveDate>,
) -> Result<Vec<BlockedDate>, RepositoryError>
where
    C: CalendarRepository + ?Sized,
{
    Ok(calendar
        .blocked_dates(property)?
        .into_iter()
        .filter(|blocked| as_of.map_or(true, |day| blocked.date >= day))
        .collect())
}

pub fn snapshot<C, R>(
    calendar: &C,
    reservations: &R,
    property: &PropertyId,
    as_of: NaiveDate,
) -> Result<CalendarSnapshot, RepositoryError>
where
    C: CalendarRepository + ?Sized,
    R: ReservationRepository + ?Sized,
{
    let availabilities = active_windows(calendar, property, Some(as_of))?;
    let blocked_dates = blocked_dates(calendar, property, Some(as_of))?
        .into_iter()
        .map(|blocked| blocked.date)
        .collect();
    let reserved_dates = reservations
        .for_property(property)?
        .into_iter()
        .filter(|r| r.status.shown_on_calendar() && r.check_out >= as_of)
        .map(|r| ReservedRange {
            check_in: r.check_in,
            check_out: r.check_out,
        })
        .collect();

    Ok(CalendarSnapshot {
        property_id: *property,
        as_of,
        availabilities,
        blocked_dates,
        reserved_dates,
    })
}

/// Field-level problems with an owner-submitted window, `None` when acceptable.
pub fn window_problem(window: &NewAvailabilityWindow) -> Option<String> {
    if window.start_date >= window.end_date {
        return Some("end_date must be after start_date".to_string());
    }
    if let Some(problem) = pricing::price_problem("price_per_night", window.price_per_night) {
        return Some(problem);
    }
    if window.min_nights == 0 {
        return Some("min_nights must be at least 1".to_string());
    }
    if window.max_nights < window.min_nights {
        return Some("max_nights must not be below min_nights".to_string());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::booking::domain::{
        NewBlockedDate, Reservation, ReservationId, ReservationStatus, UserId,
    };
    use crate::booking::memory::{InMemoryCalendarStore, InMemoryReservationStore};
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn day(month: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, month, d).expect("valid date")
    }

    fn new_window(start: NaiveDate, end: NaiveDate) -> NewAvailabilityWindow {
        NewAvailabilityWindow {
            start_date: start,
            end_date: end,
            price_per_night: dec!(120.00),
            min_nights: 2,
            max_nights: 14,
        }
    }

    fn stored(property: PropertyId, check_in: NaiveDate, check_out: NaiveDate, status: ReservationStatus) -> Reservation {
        let now = Utc::now();
        Reservation {
            id: ReservationId::generate(),
            property_id: property,
            guest: UserId(Uuid::from_u128(1)),
            host: UserId(Uuid::from_u128(2)),
            check_in,
            check_out,
            guests_count: 1,
            price_per_night: dec!(120.00),
            service_fee: dec!(6.00),
            total_price: dec!(126.00),
            status,
            message: String::new(),
            payment_intent: None,
            checkout_session_id: None,
            cancelled_at: None,
            cancellation_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn snapshot_filters_by_as_of_and_status() {
        let calendar = InMemoryCalendarStore::default();
        let reservations = InMemoryReservationStore::default();
        let property = PropertyId(Uuid::from_u128(42));

        calendar
            .add_window(&property, new_window(day(5, 1), day(5, 31)))
            .expect("past window");
        calendar
            .add_window(&property, new_window(day(6, 1), day(6, 30)))
            .expect("current window");
        for (date, reason) in [(day(6, 2), "past"), (day(6, 20), "repairs")] {
            calendar
                .add_blocked_date(
                    &property,
                    NewBlockedDate {
                        date,
                        reason: reason.to_string(),
                    },
                )
                .expect("block");
        }
        for (check_in, check_out, status) in [
            (day(6, 1), day(6, 4), ReservationStatus::Paid),
            (day(6, 8), day(6, 10), ReservationStatus::Confirmed),
            (day(6, 12), day(6, 14), ReservationStatus::Pending),
            (day(6, 15), day(6, 17), ReservationStatus::Cancelled),
        ] {
            reservations
                .insert(stored(property, check_in, check_out, status))
                .expect("insert");
        }

        let snapshot = snapshot(&calendar, &reservations, &property, day(6, 5)).expect("snapshot");

        assert_eq!(snapshot.availabilities.len(), 1);
        assert_eq!(snapshot.availabilities[0].start_date, day(6, 1));
        assert_eq!(snapshot.blocked_dates, vec![day(6, 20)]);
        assert_eq!(
            snapshot.reserved_dates,
            vec![ReservedRange {
                check_in: day(6, 8),
                check_out: day(6, 10)
            }]
        );
    }

    #[test]
    fn reservation_checking_out_on_as_of_is_still_shown() {
        let calendar = InMemoryCalendarStore::default();
        let reservations = InMemoryReservationStore::default();
        let property = PropertyId(Uuid::from_u128(43));
        reservations
            .insert(stored(property, day(6, 1), day(6, 5), ReservationStatus::Paid))
            .expect("insert");

        let snapshot = snapshot(&calendar, &reservations, &property, day(6, 5)).expect("snapshot");
        assert_eq!(snapshot.reserved_dates.len(), 1);
    }

    #[test]
    fn window_problems_are_reported() {
        assert!(window_problem(&new_window(day(6, 1), day(6, 30))).is_none());
        assert!(window_problem(&new_window(day(6, 30), day(6, 1))).is_some());

        let mut negative = new_window(day(6, 1), day(6, 30));
        negative.price_per_night = dec!(-1);
        assert!(window_problem(&negative).is_some());

        let mut oversized = new_window(day(6, 1), day(6, 30));
        oversized.price_per_night = rust_decimal::Decimal::MAX;
        assert_eq!(
            window_problem(&oversized).as_deref(),
            Some("price_per_night must not exceed 99999999.99")
        );

        let mut inverted_limits = new_window(day(6, 1), day(6, 30));
        inverted_limits.min_nights = 5;
        inverted_limits.max_nights = 3;
        assert_eq!(
            window_problem(&inverted_limits).as_deref(),
            Some("max_nights must not be below min_nights")
        );
    }
}
