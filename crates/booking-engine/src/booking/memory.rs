//! In-process storage used by the service binary, the CLI demo and the test suites.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use super::conflict::stays_overlap;
use super::domain::{
    AvailabilityWindow, BlockedDate, BlockedDateId, NewAvailabilityWindow, NewBlockedDate,
    PropertyId, PropertyListing, Reservation, ReservationId, ReservationStatus, UserId, WindowId,
};
use super::repository::{
    CalendarRepository, PropertyCatalog, RepositoryError, ReservationRepository,
};

fn poisoned(what: &str) -> RepositoryError {
    RepositoryError::Unavailable(format!("{what} mutex poisoned"))
}

#[derive(Default, Clone)]
pub struct InMemoryReservationStore {
    records: Arc<Mutex<HashMap<ReservationId, Reservation>>>,
}

impl InMemoryReservationStore {
    fn records(&self) -> Result<MutexGuard<'_, HashMap<ReservationId, Reservation>>, RepositoryError> {
        self.records.lock().map_err(|_| poisoned("reservation store"))
    }

    fn collect_newest_first(
        &self,
        filter: impl Fn(&Reservation) -> bool,
    ) -> Result<Vec<Reservation>, RepositoryError> {
        let guard = self.records()?;
        let mut matching: Vec<Reservation> = guard.values().filter(|r| filter(r)).cloned().collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matching)
    }
}

impl ReservationRepository for InMemoryReservationStore {
    fn insert(&self, reservation: Reservation) -> Result<Reservation, RepositoryError> {
        let mut guard = self.records()?;
        if guard.contains_key(&reservation.id) {
            return Err(RepositoryError::Conflict);
        }

        if reservation.status.claims_nights() {
            if let Some(existing) = guard.values().find(|existing| {
                existing.property_id == reservation.property_id
                    && existing.status.claims_nights()
                    && stays_overlap(
                        existing.check_in,
                        existing.check_out,
                        reservation.check_in,
                        reservation.check_out,
                    )
            }) {
                return Err(RepositoryError::Overlap {
                    existing: existing.id,
                    check_in: existing.check_in,
                    check_out: existing.check_out,
                });
            }
        }

        guard.insert(reservation.id, reservation.clone());
        Ok(reservation)
    }

    fn fetch(&self, id: &ReservationId) -> Result<Option<Reservation>, RepositoryError> {
        Ok(self.records()?.get(id).cloned())
    }

    fn for_property(&self, property: &PropertyId) -> Result<Vec<Reservation>, RepositoryError> {
        let guard = self.records()?;
        let mut matching: Vec<Reservation> = guard
            .values()
            .filter(|r| r.property_id == *property)
            .cloned()
            .collect();
        matching.sort_by_key(|r| (r.check_in, r.check_out));
        Ok(matching)
    }

    fn for_guest(&self, guest: &UserId) -> Result<Vec<Reservation>, RepositoryError> {
        self.collect_newest_first(|r| r.guest == *guest)
    }

    fn for_host(&self, host: &UserId) -> Result<Vec<Reservation>, RepositoryError> {
        self.collect_newest_first(|r| r.host == *host)
    }

    fn with_status(&self, status: ReservationStatus) -> Result<Vec<Reservation>, RepositoryError> {
        self.collect_newest_first(|r| r.status == status)
    }

    fn compare_and_set(
        &self,
        expected: ReservationStatus,
        next: Reservation,
    ) -> Result<Reservation, RepositoryError> {
        let mut guard = self.records()?;
        let current = guard.get_mut(&next.id).ok_or(RepositoryError::NotFound)?;
        if current.status != expected {
            return Err(RepositoryError::StaleStatus {
                expected,
                actual: current.status,
            });
        }
        *current = next.clone();
        Ok(next)
    }
}

#[derive(Default)]
struct CalendarTables {
    windows: Vec<AvailabilityWindow>,
    blocked: Vec<BlockedDate>,
}

/// Calendar storage. Reads take a shared lock only and never wait on booking locks.
#[derive(Default, Clone)]
pub struct InMemoryCalendarStore {
    tables: Arc<RwLock<CalendarTables>>,
    window_sequence: Arc<AtomicU64>,
    blocked_sequence: Arc<AtomicU64>,
}

impl CalendarRepository for InMemoryCalendarStore {
    fn add_window(
        &self,
        property: &PropertyId,
        window: NewAvailabilityWindow,
    ) -> Result<AvailabilityWindow, RepositoryError> {
        let mut tables = self.tables.write().map_err(|_| poisoned("calendar"))?;
        let stored = AvailabilityWindow {
            id: WindowId(self.window_sequence.fetch_add(1, Ordering::Relaxed) + 1),
            property_id: *property,
            start_date: window.start_date,
            end_date: window.end_date,
            price_per_night: window.price_per_night,
            min_nights: window.min_nights,
            max_nights: window.max_nights,
            is_active: true,
        };
        tables.windows.push(stored.clone());
        Ok(stored)
    }

    fn fetch_window(&self, id: &WindowId) -> Result<Option<AvailabilityWindow>, RepositoryError> {
        let tables = self.tables.read().map_err(|_| poisoned("calendar"))?;
        Ok(tables.windows.iter().find(|w| w.id == *id).cloned())
    }

    fn remove_window(&self, id: &WindowId) -> Result<AvailabilityWindow, RepositoryError> {
        let mut tables = self.tables.write().map_err(|_| poisoned("calendar"))?;
        let position = tables
            .windows
            .iter()
            .position(|w| w.id == *id)
            .ok_or(RepositoryError::NotFound)?;
        Ok(tables.windows.remove(position))
    }

    fn windows(&self, property: &PropertyId) -> Result<Vec<AvailabilityWindow>, RepositoryError> {
        let tables = self.tables.read().map_err(|_| poisoned("calendar"))?;
        let mut windows: Vec<AvailabilityWindow> = tables
            .windows
            .iter()
            .filter(|w| w.property_id == *property)
            .cloned()
            .collect();
        windows.sort_by_key(|w| (w.start_date, w.id));
        Ok(windows)
    }

    fn add_blocked_date(
        &self,
        property: &PropertyId,
        blocked: NewBlockedDate,
    ) -> Result<BlockedDate, RepositoryError> {
        let mut tables = self.tables.write().map_err(|_| poisoned("calendar"))?;
        if tables
            .blocked
            .iter()
            .any(|b| b.property_id == *property && b.date == blocked.date)
        {
            return Err(RepositoryError::Conflict);
        }
        let stored = BlockedDate {
            id: BlockedDateId(self.blocked_sequence.fetch_add(1, Ordering::Relaxed) + 1),
            property_id: *property,
            date: blocked.date,
            reason: blocked.reason,
        };
        tables.blocked.push(stored.clone());
        Ok(stored)
    }

    fn blocked_dates(&self, property: &PropertyId) -> Result<Vec<BlockedDate>, RepositoryError> {
        let tables = self.tables.read().map_err(|_| poisoned("calendar"))?;
        let mut blocked: Vec<BlockedDate> = tables
            .blocked
            .iter()
            .filter(|b| b.property_id == *property)
            .cloned()
            .collect();
        blocked.sort_by_key(|b| b.date);
        Ok(blocked)
    }
}

/// Stand-in for the external listing service.
#[derive(Default, Clone)]
pub struct InMemoryPropertyCatalog {
    listings: Arc<RwLock<HashMap<PropertyId, PropertyListing>>>,
}

impl InMemoryPropertyCatalog {
    pub fn from_listings(listings: impl IntoIterator<Item = PropertyListing>) -> Self {
        let catalog = Self::default();
        for listing in listings {
            catalog.upsert(listing);
        }
        catalog
    }

    pub fn upsert(&self, listing: PropertyListing) {
        let mut guard = self
            .listings
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        guard.insert(listing.id, listing);
    }

    pub fn len(&self) -> usize {
        self.listings
            .read()
            .map(|guard| guard.len())
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PropertyCatalog for InMemoryPropertyCatalog {
    fn fetch(&self, id: &PropertyId) -> Result<Option<PropertyListing>, RepositoryError> {
        let guard = self.listings.read().map_err(|_| poisoned("catalog"))?;
        Ok(guard.get(id).cloned())
    }
}
