use std::fmt;

use chrono::{DateTime, Utc};

use super::domain::{Reservation, ReservationStatus, UserId};

/// Party driving a status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Guest,
    Host,
    PaymentReconciler,
    Scheduler,
    Administrator,
}

impl Role {
    /// The reservation-scoped role of a user, preferring host when a user booked their own listing.
    pub fn of(user: &UserId, reservation: &Reservation) -> Option<Self> {
        if reservation.host == *user {
            Some(Self::Host)
        } else if reservation.guest == *user {
            Some(Self::Guest)
        } else {
            None
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Role::Guest => "guest",
            Role::Host => "host",
            Role::PaymentReconciler => "payment reconciler",
            Role::Scheduler => "scheduler",
            Role::Administrator => "administrator",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Confirm,
    MarkPaid,
    Cancel,
    Complete,
    Refund,
}

impl Transition {
    pub fn target(self) -> ReservationStatus {
        match self {
            Transition::Confirm => ReservationStatus::Confirmed,
            Transition::MarkPaid => ReservationStatus::Paid,
            Transition::Cancel => ReservationStatus::Cancelled,
            Transition::Complete => ReservationStatus::Completed,
            Transition::Refund => ReservationStatus::Refunded,
        }
    }

    pub fn allowed_from(self, status: ReservationStatus) -> bool {
        use ReservationStatus::*;
        match self {
            Transition::Confirm => status == Pending,
            Transition::MarkPaid => status == Confirmed,
            Transition::Cancel => !status.is_terminal(),
            Transition::Complete | Transition::Refund => status == Paid,
        }
    }

    pub fn permits(self, role: Role) -> bool {
        match self {
            Transition::Confirm => role == Role::Host,
            Transition::MarkPaid => role == Role::PaymentReconciler,
            Transition::Cancel => matches!(role, Role::Guest | Role::Host),
            Transition::Complete => matches!(role, Role::Scheduler | Role::Administrator),
            Transition::Refund => role == Role::Administrator,
        }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Transition::Confirm => "confirm",
            Transition::MarkPaid => "mark as paid",
            Transition::Cancel => "cancel",
            Transition::Complete => "complete",
            Transition::Refund => "refund",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("a {role} may not {transition} this reservation")]
    NotPermitted { role: Role, transition: Transition },
    #[error("cannot {transition} a reservation that is {from}")]
    InvalidState {
        from: ReservationStatus,
        transition: Transition,
    },
}

/// Optional details carried by a transition.
#[derive(Debug, Clone, Default)]
pub struct TransitionDetails {
    pub cancellation_reason: Option<String>,
    pub payment_intent: Option<String>,
}

impl Reservation {
    /// Computes the record after `transition`. Permissions are checked before state so a guest
    /// confirming anything is always a permission error. Price fields are never touched.
    pub fn transitioned(
        &self,
        transition: Transition,
        role: Role,
        now: DateTime<Utc>,
        details: TransitionDetails,
    ) -> Result<Reservation, TransitionError> {
        if !transition.permits(role) {
            return Err(TransitionError::NotPermitted { role, transition });
        }
        if !transition.allowed_from(self.status) {
            return Err(TransitionError::InvalidState {
                from: self.status,
                transition,
            });
        }

        let mut next = self.clone();
        next.status = transition.target();
        next.updated_at = now;
        match transition {
            Transition::Cancel => {
                next.cancelled_at = Some(now);
                next.cancellation_reason = Some(details.cancellation_reason.unwrap_or_default());
            }
            Transition::MarkPaid => {
                next.payment_intent = details.payment_intent.or(next.payment_intent);
            }
            Transition::Confirm | Transition::Complete | Transition::Refund => {}
        }
        Ok(next)
    }
}
