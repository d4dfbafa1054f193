use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::gateway::{CheckoutRequest, GatewayError, PaymentGateway};
use super::webhook::{
    parse_event, CompletedCheckout, PaymentEvent, Verification, WebhookError, WebhookVerifier,
};
use crate::booking::domain::{
    PropertyListing, Reservation, ReservationId, ReservationStatus,
};
use crate::booking::error::BookingError;
use crate::booking::lifecycle::{Role, Transition, TransitionDetails};
use crate::booking::pricing::minor_units;
use crate::booking::repository::{RepositoryError, ReservationRepository};
use crate::config::PaymentConfig;

/// Attempts at the `confirmed -> paid` compare-and-set before giving up on a racing writer.
const PAID_TRANSITION_ATTEMPTS: u8 = 3;

/// Checkout defaults applied when a request does not override them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSettings {
    pub currency: String,
    pub success_url: String,
    pub cancel_url: String,
}

impl CheckoutSettings {
    pub fn from_config(config: &PaymentConfig) -> Self {
        Self {
            currency: config.currency.to_ascii_lowercase(),
            success_url: config.success_url.clone(),
            cancel_url: config.cancel_url.clone(),
        }
    }
}

impl Default for CheckoutSettings {
    fn default() -> Self {
        Self {
            currency: "eur".to_string(),
            success_url: "http://localhost:5173/reservations?status=success".to_string(),
            cancel_url: "http://localhost:5173/reservations?status=cancelled".to_string(),
        }
    }
}

/// Per-request redirect overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CheckoutUrls {
    #[serde(default)]
    pub success_url: Option<String>,
    #[serde(default)]
    pub cancel_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckoutLink {
    pub checkout_url: String,
    pub session_id: String,
}

/// What a structurally valid webhook delivery did. Every variant is acknowledged to the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    Applied { reservation_id: ReservationId },
    /// Redelivery for a reservation that is already paid.
    Duplicate { reservation_id: ReservationId },
    /// Out-of-order event for a reservation that can no longer become paid.
    Rejected {
        reservation_id: ReservationId,
        status: ReservationStatus,
    },
    UnknownReservation { reference: String },
    MissingReference,
    Ignored { event_type: String },
}

impl WebhookOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            WebhookOutcome::Applied { .. } => "applied",
            WebhookOutcome::Duplicate { .. } => "duplicate",
            WebhookOutcome::Rejected { .. } => "rejected",
            WebhookOutcome::UnknownReservation { .. } => "unknown_reservation",
            WebhookOutcome::MissingReference => "missing_reference",
            WebhookOutcome::Ignored { .. } => "ignored",
        }
    }
}

/// Opens checkout sessions and applies gateway payment events to reservations.
pub struct PaymentReconciler<R> {
    reservations: Arc<R>,
    gateway: Arc<dyn PaymentGateway>,
    verifier: WebhookVerifier,
    settings: CheckoutSettings,
}

impl<R> PaymentReconciler<R>
where
    R: ReservationRepository + 'static,
{
    pub fn new(
        reservations: Arc<R>,
        gateway: Arc<dyn PaymentGateway>,
        verifier: WebhookVerifier,
        settings: CheckoutSettings,
    ) -> Self {
        Self {
            reservations,
            gateway,
            verifier,
            settings,
        }
    }

    pub fn gateway_name(&self) -> &'static str {
        self.gateway.name()
    }

    pub(crate) fn checkout_request(
        &self,
        reservation: &Reservation,
        listing: &PropertyListing,
        urls: CheckoutUrls,
    ) -> Result<CheckoutRequest, GatewayError> {
        let unit_amount = minor_units(reservation.total_price)
            .ok_or_else(|| GatewayError::InvalidAmount(reservation.total_price.to_string()))?;

        let currency = match listing.currency.trim() {
            "" => self.settings.currency.clone(),
            listed => listed.to_ascii_lowercase(),
        };

        Ok(CheckoutRequest {
            reservation_id: reservation.id,
            currency,
            product_name: format!("Reservation - {}", listing.title),
            description: format!(
                "{} night(s) from {} to {}",
                reservation.nights(),
                reservation.check_in,
                reservation.check_out
            ),
            unit_amount,
            quantity: 1,
            success_url: urls
                .success_url
                .unwrap_or_else(|| self.settings.success_url.clone()),
            cancel_url: urls
                .cancel_url
                .unwrap_or_else(|| self.settings.cancel_url.clone()),
            metadata: BTreeMap::from([(
                "reservation_id".to_string(),
                reservation.id.to_string(),
            )]),
        })
    }

    /// Opens a hosted checkout for a confirmed reservation and records the session id on it.
    ///
    /// A gateway failure leaves the reservation untouched, so the call is safe to retry.
    pub async fn create_checkout(
        &self,
        reservation: &Reservation,
        listing: &PropertyListing,
        urls: CheckoutUrls,
    ) -> Result<CheckoutLink, BookingError> {
        if reservation.status != ReservationStatus::Confirmed {
            return Err(BookingError::InvalidState(format!(
                "cannot create a checkout for a reservation that is {}",
                reservation.status
            )));
        }

        let request = self.checkout_request(reservation, listing, urls)?;
        let session = self
            .gateway
            .create_checkout_session(&request)
            .await
            .map_err(|err| {
                warn!(
                    reservation_id = %reservation.id,
                    gateway = self.gateway.name(),
                    error = %err,
                    "checkout session creation failed"
                );
                err
            })?;

        let mut next = reservation.clone();
        next.checkout_session_id = Some(session.id.clone());
        next.updated_at = Utc::now();
        self.reservations
            .compare_and_set(ReservationStatus::Confirmed, next)?;

        info!(
            reservation_id = %reservation.id,
            session_id = %session.id,
            gateway = self.gateway.name(),
            "checkout session created"
        );
        Ok(CheckoutLink {
            checkout_url: session.url,
            session_id: session.id,
        })
    }

    pub fn handle_payment_event(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookOutcome, WebhookError> {
        self.handle_payment_event_at(payload, signature, Utc::now())
    }

    /// Verifies, parses and applies one gateway delivery.
    ///
    /// Errors are reserved for deliveries that must not be acknowledged: a failed signature, an
    /// unparseable payload or a storage failure. Semantic anomalies are logged and acknowledged.
    pub fn handle_payment_event_at(
        &self,
        payload: &[u8],
        signature: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<WebhookOutcome, WebhookError> {
        match self.verifier.verify(payload, signature, now) {
            Ok(Verification::Signed) => {}
            Ok(Verification::Unsigned) => {
                debug!("accepting unsigned webhook, no signing secret configured");
            }
            Err(err) => {
                warn!(error = %err, "webhook rejected by signature verification");
                return Err(err.into());
            }
        }

        let event = parse_event(payload).map_err(|err| {
            warn!(error = %err, "unparseable webhook payload");
            err
        })?;

        let outcome = match event {
            PaymentEvent::Other {
                event_id,
                event_type,
            } => {
                debug!(%event_id, %event_type, "ignoring webhook event");
                WebhookOutcome::Ignored { event_type }
            }
            PaymentEvent::CheckoutCompleted(checkout) => self.apply_completed_checkout(checkout, now)?,
        };
        Ok(outcome)
    }

    fn apply_completed_checkout(
        &self,
        checkout: CompletedCheckout,
        now: DateTime<Utc>,
    ) -> Result<WebhookOutcome, WebhookError> {
        let Some(reference) = checkout.reservation_reference.clone() else {
            warn!(event_id = %checkout.event_id, session_id = %checkout.session_id, "completed checkout carries no reservation reference");
            return Ok(WebhookOutcome::MissingReference);
        };

        let Some(mut reservation) = self.lookup(&reference)? else {
            warn!(event_id = %checkout.event_id, %reference, "completed checkout for unknown reservation");
            return Ok(WebhookOutcome::UnknownReservation { reference });
        };

        if let Some(stored) = reservation.checkout_session_id.as_deref() {
            if stored != checkout.session_id {
                warn!(
                    reservation_id = %reservation.id,
                    stored_session = %stored,
                    event_session = %checkout.session_id,
                    "payment completed through a checkout session other than the latest, applying it"
                );
            }
        }

        for _ in 0..PAID_TRANSITION_ATTEMPTS {
            let reservation_id = reservation.id;
            match reservation.status {
                ReservationStatus::Paid => {
                    info!(%reservation_id, event_id = %checkout.event_id, "duplicate payment event ignored");
                    return Ok(WebhookOutcome::Duplicate { reservation_id });
                }
                ReservationStatus::Confirmed => {
                    let next = match reservation.transitioned(
                        Transition::MarkPaid,
                        Role::PaymentReconciler,
                        now,
                        TransitionDetails {
                            payment_intent: checkout.payment_intent.clone(),
                            ..TransitionDetails::default()
                        },
                    ) {
                        Ok(mut next) => {
                            next.checkout_session_id = Some(checkout.session_id.clone());
                            next
                        }
                        Err(err) => {
                            warn!(%reservation_id, error = %err, "payment event could not be applied");
                            return Ok(WebhookOutcome::Rejected {
                                reservation_id,
                                status: reservation.status,
                            });
                        }
                    };

                    match self
                        .reservations
                        .compare_and_set(ReservationStatus::Confirmed, next)
                    {
                        Ok(paid) => {
                            info!(
                                %reservation_id,
                                property_id = %paid.property_id,
                                status = %paid.status,
                                payment_intent = paid.payment_intent.as_deref().unwrap_or(""),
                                "reservation marked as paid"
                            );
                            return Ok(WebhookOutcome::Applied { reservation_id });
                        }
                        Err(RepositoryError::StaleStatus { actual, .. }) => {
                            debug!(%reservation_id, %actual, "reservation changed while applying payment, reloading");
                            reservation = self
                                .reservations
                                .fetch(&reservation_id)?
                                .ok_or(RepositoryError::NotFound)?;
                        }
                        Err(err) => return Err(err.into()),
                    }
                }
                status => {
                    warn!(%reservation_id, %status, event_id = %checkout.event_id, "payment event for a reservation that cannot be paid");
                    return Ok(WebhookOutcome::Rejected {
                        reservation_id,
                        status,
                    });
                }
            }
        }

        Err(RepositoryError::Unavailable(format!(
            "reservation {} kept changing while applying payment",
            reservation.id
        ))
        .into())
    }

    fn lookup(&self, reference: &str) -> Result<Option<Reservation>, RepositoryError> {
        match Uuid::parse_str(reference) {
            Ok(uuid) => self.reservations.fetch(&ReservationId(uuid)),
            Err(_) => Ok(None),
        }
    }
}
