use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use super::conflict::{ConflictError, Rejection};
use super::lifecycle::TransitionError;
use super::locks::LockTimeout;
use super::payment::GatewayError;
use super::pricing::PricingError;
use super::repository::RepositoryError;

/// Error raised by the booking service, one variant per caller-visible failure class.
#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("{0}")]
    Validation(String),
    #[error("these dates are not available")]
    DateConflict,
    #[error("some dates are blocked by the owner")]
    BlockedDateConflict,
    #[error("{0}")]
    Forbidden(String),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    InvalidState(String),
    #[error(transparent)]
    Busy(#[from] LockTimeout),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Repository(RepositoryError),
}

impl BookingError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            BookingError::Validation(_)
            | BookingError::DateConflict
            | BookingError::BlockedDateConflict
            | BookingError::InvalidState(_) => StatusCode::BAD_REQUEST,
            BookingError::Forbidden(_) => StatusCode::FORBIDDEN,
            BookingError::NotFound(_) => StatusCode::NOT_FOUND,
            BookingError::Busy(_) => StatusCode::SERVICE_UNAVAILABLE,
            BookingError::Gateway(_) | BookingError::Repository(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Stable machine-readable code sent next to the message.
    pub fn code(&self) -> &'static str {
        match self {
            BookingError::Validation(_) => "validation_error",
            BookingError::DateConflict => "date_conflict",
            BookingError::BlockedDateConflict => "blocked_date_conflict",
            BookingError::Forbidden(_) => "authorization_error",
            BookingError::NotFound(_) => "not_found",
            BookingError::InvalidState(_) => "invalid_state",
            BookingError::Busy(_) => "property_busy",
            BookingError::Gateway(_) => "payment_gateway_error",
            BookingError::Repository(_) => "storage_error",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, BookingError::Busy(_))
    }
}

impl From<RepositoryError> for BookingError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::Overlap { .. } => BookingError::DateConflict,
            RepositoryError::NotFound => BookingError::NotFound("record"),
            RepositoryError::StaleStatus { actual, .. } => BookingError::InvalidState(format!(
                "reservation changed concurrently and is now {actual}"
            )),
            other => BookingError::Repository(other),
        }
    }
}

impl From<Rejection> for BookingError {
    fn from(value: Rejection) -> Self {
        match value {
            Rejection::InvalidRange { .. } => BookingError::Validation(value.to_string()),
            Rejection::DateConflict { .. } => BookingError::DateConflict,
            Rejection::BlockedDateConflict { .. } => BookingError::BlockedDateConflict,
        }
    }
}

impl From<ConflictError> for BookingError {
    fn from(value: ConflictError) -> Self {
        match value {
            ConflictError::Rejected(rejection) => rejection.into(),
            ConflictError::Repository(err) => err.into(),
        }
    }
}

impl From<TransitionError> for BookingError {
    fn from(value: TransitionError) -> Self {
        match value {
            TransitionError::NotPermitted { .. } => BookingError::Forbidden(value.to_string()),
            TransitionError::InvalidState { .. } => BookingError::InvalidState(value.to_string()),
        }
    }
}

impl From<PricingError> for BookingError {
    fn from(value: PricingError) -> Self {
        BookingError::Validation(value.to_string())
    }
}

impl IntoResponse for BookingError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let retryable = self.is_retryable();
        let retry_after = match &self {
            BookingError::Busy(timeout) => Some(timeout.waited.as_secs().max(1)),
            _ => None,
        };

        let body = Json(json!({
            "error": self.to_string(),
            "code": self.code(),
            "retryable": retryable,
        }));
        let mut response = (status, body).into_response();
        if let Some(seconds) = retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(seconds));
        }
        response
    }
}
