use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use tracing::{debug, info, instrument, warn};

use super::calendar::{self, CalendarSnapshot};
use super::conflict;
use super::domain::{
    AvailabilityWindow, BlockedDate, BookingRequest, NewAvailabilityWindow, NewBlockedDate,
    PropertyId, PropertyListing, Reservation, ReservationId, ReservationStatus, ReservationView,
    StayDates, UserId, WindowId,
};
use super::error::BookingError;
use super::lifecycle::{Role, Transition, TransitionDetails};
use super::locks::PropertyLocks;
use super::payment::{
    CheckoutLink, CheckoutSettings, CheckoutUrls, PaymentGateway, PaymentReconciler,
    WebhookError, WebhookOutcome, WebhookVerifier,
};
use super::pricing::{self, Quote};
use super::repository::{
    CalendarRepository, PropertyCatalog, RepositoryError, ReservationRepository,
};
use crate::config::AppConfig;

pub const MAX_MESSAGE_CHARS: usize = 500;

/// Tunables of the booking service.
#[derive(Debug, Clone)]
pub struct BookingSettings {
    pub lock_timeout: Duration,
    pub checkout: CheckoutSettings,
    pub webhooks: WebhookVerifier,
}

impl BookingSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        let payments = &config.payments;
        Self {
            lock_timeout: config.booking.lock_timeout,
            checkout: CheckoutSettings::from_config(payments),
            webhooks: WebhookVerifier::new(
                payments.webhook_secret.clone(),
                payments.allow_unsigned_webhooks,
                payments.webhook_tolerance,
            ),
        }
    }
}

impl Default for BookingSettings {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_millis(2_000),
            checkout: CheckoutSettings::default(),
            webhooks: WebhookVerifier::new(None, true, Duration::from_secs(300)),
        }
    }
}

/// Service composing the calendar, conflict validator, pricing, lifecycle and payment reconciler.
pub struct BookingService<C, R, P> {
    calendar: Arc<C>,
    reservations: Arc<R>,
    catalog: Arc<P>,
    locks: PropertyLocks,
    payments: PaymentReconciler<R>,
}

impl<C, R, P> BookingService<C, R, P>
where
    C: CalendarRepository + 'static,
    R: ReservationRepository + 'static,
    P: PropertyCatalog + 'static,
{
    pub fn new(
        calendar: Arc<C>,
        reservations: Arc<R>,
        catalog: Arc<P>,
        gateway: Arc<dyn PaymentGateway>,
        settings: BookingSettings,
    ) -> Self {
        let payments = PaymentReconciler::new(
            reservations.clone(),
            gateway,
            settings.webhooks,
            settings.checkout,
        );
        Self {
            calendar,
            reservations,
            catalog,
            locks: PropertyLocks::new(settings.lock_timeout),
            payments,
        }
    }

    pub fn gateway_name(&self) -> &'static str {
        self.payments.gateway_name()
    }

    fn listing(&self, property: &PropertyId) -> Result<PropertyListing, BookingError> {
        self.catalog
            .fetch(property)?
            .ok_or(BookingError::NotFound("property"))
    }

    fn owned_listing(
        &self,
        user: &UserId,
        property: &PropertyId,
    ) -> Result<PropertyListing, BookingError> {
        let listing = self.listing(property)?;
        if listing.owner != *user {
            return Err(BookingError::Forbidden(
                "only the property owner can manage its calendar".to_string(),
            ));
        }
        Ok(listing)
    }

    /// Public calendar read. Never takes a booking lock.
    pub fn calendar(
        &self,
        property: &PropertyId,
        as_of: NaiveDate,
    ) -> Result<CalendarSnapshot, BookingError> {
        self.listing(property)?;
        Ok(calendar::snapshot(
            self.calendar.as_ref(),
            self.reservations.as_ref(),
            property,
            as_of,
        )?)
    }

    pub fn availability(
        &self,
        property: &PropertyId,
    ) -> Result<Vec<AvailabilityWindow>, BookingError> {
        self.listing(property)?;
        Ok(calendar::active_windows(self.calendar.as_ref(), property, None)?)
    }

    pub fn add_availability(
        &self,
        owner: &UserId,
        property: &PropertyId,
        window: NewAvailabilityWindow,
    ) -> Result<AvailabilityWindow, BookingError> {
        self.owned_listing(owner, property)?;
        if let Some(problem) = calendar::window_problem(&window) {
            return Err(BookingError::Validation(problem));
        }
        let created = self.calendar.add_window(property, window)?;
        info!(property_id = %property, window_id = %created.id, "availability window added");
        Ok(created)
    }

    pub fn remove_availability(&self, owner: &UserId, window: &WindowId) -> Result<(), BookingError> {
        let existing = self
            .calendar
            .fetch_window(window)?
            .ok_or(BookingError::NotFound("availability window"))?;
        self.owned_listing(owner, &existing.property_id)?;
        self.calendar.remove_window(window)?;
        info!(property_id = %existing.property_id, window_id = %window, "availability window removed");
        Ok(())
    }

    pub fn blocked_dates(&self, property: &PropertyId) -> Result<Vec<BlockedDate>, BookingError> {
        self.listing(property)?;
        Ok(calendar::blocked_dates(self.calendar.as_ref(), property, None)?)
    }

    pub fn block_date(
        &self,
        owner: &UserId,
        property: &PropertyId,
        blocked: NewBlockedDate,
    ) -> Result<BlockedDate, BookingError> {
        self.owned_listing(owner, property)?;
        let date = blocked.date;
        match self.calendar.add_blocked_date(property, blocked) {
            Ok(created) => {
                info!(property_id = %property, %date, "date blocked");
                Ok(created)
            }
            Err(RepositoryError::Conflict) => Err(BookingError::Validation(format!(
                "{date} is already blocked for this property"
            ))),
            Err(err) => Err(err.into()),
        }
    }

    /// Prices a stay without reserving it.
    pub fn quote(
        &self,
        property: &PropertyId,
        check_in: NaiveDate,
        check_out: NaiveDate,
    ) -> Result<Quote, BookingError> {
        let listing = self.listing(property)?;
        let stay = StayDates::new(check_in, check_out).ok_or_else(|| {
            BookingError::Validation("check_out must be after check_in".to_string())
        })?;
        let windows = self.calendar.windows(property)?;
        Ok(pricing::resolve(&windows, listing.price, &stay)?)
    }

    /// Creates a pending reservation.
    ///
    /// Validation and insertion run under the property's booking lock, so two requests for
    /// intersecting stays cannot both pass the conflict check.
    #[instrument(skip(self, request), fields(property_id = %request.property_id))]
    pub async fn request_booking(
        &self,
        guest: &UserId,
        request: BookingRequest,
    ) -> Result<ReservationView, BookingError> {
        if request.guests_count == 0 {
            return Err(BookingError::Validation(
                "guests_count must be at least 1".to_string(),
            ));
        }
        if request.message.chars().count() > MAX_MESSAGE_CHARS {
            return Err(BookingError::Validation(format!(
                "message must be at most {MAX_MESSAGE_CHARS} characters"
            )));
        }

        let property = request.property_id;
        let listing = self.listing(&property)?;

        let guard = self.locks.acquire(property).await?;
        let stay = conflict::validate(
            self.calendar.as_ref(),
            self.reservations.as_ref(),
            &property,
            request.check_in,
            request.check_out,
        )
        .map_err(|err| {
            debug!(error = %err, "booking rejected by conflict validator");
            err
        })?;

        let windows = self.calendar.windows(&property)?;
        let quote = pricing::resolve(&windows, listing.price, &stay)?;

        let now = Utc::now();
        let reservation = Reservation {
            id: ReservationId::generate(),
            property_id: property,
            guest: *guest,
            host: listing.owner,
            check_in: stay.check_in(),
            check_out: stay.check_out(),
            guests_count: request.guests_count,
            price_per_night: quote.price_per_night,
            service_fee: quote.service_fee,
            total_price: quote.total_price,
            status: ReservationStatus::Pending,
            message: request.message,
            payment_intent: None,
            checkout_session_id: None,
            cancelled_at: None,
            cancellation_reason: None,
            created_at: now,
            updated_at: now,
        };
        let stored = self.reservations.insert(reservation)?;
        drop(guard);

        info!(
            reservation_id = %stored.id,
            status = %stored.status,
            nights = quote.nights,
            total_price = %stored.total_price,
            "reservation requested"
        );
        Ok(ReservationView::new(stored, Some(&listing)))
    }

    pub fn reservations_as_guest(&self, guest: &UserId) -> Result<Vec<ReservationView>, BookingError> {
        let reservations = self.reservations.for_guest(guest)?;
        reservations
            .into_iter()
            .map(|reservation| self.view(reservation))
            .collect()
    }

    pub fn reservations_as_host(&self, host: &UserId) -> Result<Vec<ReservationView>, BookingError> {
        let reservations = self.reservations.for_host(host)?;
        reservations
            .into_iter()
            .map(|reservation| self.view(reservation))
            .collect()
    }

    /// A reservation visible to its guest or host; anyone else sees it as missing.
    pub fn reservation(
        &self,
        user: &UserId,
        id: &ReservationId,
    ) -> Result<ReservationView, BookingError> {
        let reservation = self
            .reservations
            .fetch(id)?
            .filter(|reservation| reservation.involves(user))
            .ok_or(BookingError::NotFound("reservation"))?;
        self.view(reservation)
    }

    fn load_as_party(
        &self,
        user: &UserId,
        id: &ReservationId,
    ) -> Result<(Reservation, Role), BookingError> {
        let reservation = self
            .reservations
            .fetch(id)?
            .ok_or(BookingError::NotFound("reservation"))?;
        let role = Role::of(user, &reservation).ok_or_else(|| {
            BookingError::Forbidden("you are not a party to this reservation".to_string())
        })?;
        Ok((reservation, role))
    }

    fn apply(
        &self,
        current: &Reservation,
        transition: Transition,
        role: Role,
        details: TransitionDetails,
    ) -> Result<Reservation, BookingError> {
        let next = current.transitioned(transition, role, Utc::now(), details)?;
        let stored = self.reservations.compare_and_set(current.status, next)?;
        info!(
            reservation_id = %stored.id,
            property_id = %stored.property_id,
            from = %current.status,
            status = %stored.status,
            %role,
            "reservation transitioned"
        );
        Ok(stored)
    }

    pub fn confirm(&self, host: &UserId, id: &ReservationId) -> Result<ReservationView, BookingError> {
        let (reservation, role) = self.load_as_party(host, id)?;
        let confirmed = self.apply(
            &reservation,
            Transition::Confirm,
            role,
            TransitionDetails::default(),
        )?;
        self.view(confirmed)
    }

    pub fn cancel(
        &self,
        user: &UserId,
        id: &ReservationId,
        reason: Option<String>,
    ) -> Result<ReservationView, BookingError> {
        let (reservation, role) = self.load_as_party(user, id)?;
        let cancelled = self.apply(
            &reservation,
            Transition::Cancel,
            role,
            TransitionDetails {
                cancellation_reason: reason,
                ..TransitionDetails::default()
            },
        )?;
        self.view(cancelled)
    }

    /// Opens a gateway checkout for the guest of a confirmed reservation.
    pub async fn create_checkout(
        &self,
        guest: &UserId,
        id: &ReservationId,
        urls: CheckoutUrls,
    ) -> Result<CheckoutLink, BookingError> {
        let (reservation, _) = self.load_as_party(guest, id)?;
        if reservation.guest != *guest {
            return Err(BookingError::Forbidden(
                "only the guest can pay for a reservation".to_string(),
            ));
        }
        let listing = self.listing(&reservation.property_id)?;
        self.payments
            .create_checkout(&reservation, &listing, urls)
            .await
    }

    pub fn handle_payment_event(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookOutcome, WebhookError> {
        self.payments.handle_payment_event(payload, signature)
    }

    /// Moves paid stays whose check-out is on or before `as_of` to completed.
    ///
    /// Reservations that change concurrently are skipped and picked up by the next sweep.
    pub fn complete_finished_stays(
        &self,
        as_of: NaiveDate,
    ) -> Result<Vec<ReservationId>, BookingError> {
        let finished = self
            .reservations
            .with_status(ReservationStatus::Paid)?
            .into_iter()
            .filter(|reservation| reservation.check_out <= as_of);

        let mut completed = Vec::new();
        for reservation in finished {
            match self.apply(
                &reservation,
                Transition::Complete,
                Role::Scheduler,
                TransitionDetails::default(),
            ) {
                Ok(done) => completed.push(done.id),
                Err(BookingError::InvalidState(message)) => {
                    debug!(reservation_id = %reservation.id, %message, "skipping reservation that changed during sweep");
                }
                Err(err) => {
                    warn!(reservation_id = %reservation.id, error = %err, "completion sweep failed");
                    return Err(err);
                }
            }
        }

        if !completed.is_empty() {
            info!(count = completed.len(), %as_of, "finished stays completed");
        }
        Ok(completed)
    }

    pub fn view(&self, reservation: Reservation) -> Result<ReservationView, BookingError> {
        let listing = self.catalog.fetch(&reservation.property_id)?;
        Ok(ReservationView::new(reservation, listing.as_ref()))
    }
}
