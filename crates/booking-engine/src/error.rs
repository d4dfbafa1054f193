use crate::booking::error::BookingError;
use crate::booking::payment::{GatewayError, WebhookError};
use crate::config::ConfigError;
use crate::telemetry::TelemetryError;
use std::fmt;
use std::path::PathBuf;

/// Startup and command-line failures of the service binary.
#[derive(Debug)]
pub enum AppError {
    Config(ConfigError),
    Telemetry(TelemetryError),
    Io(std::io::Error),
    Server(axum::Error),
    CatalogSeed {
        path: PathBuf,
        source: serde_json::Error,
    },
    InvalidListing {
        path: PathBuf,
        property: String,
        problem: String,
    },
    Gateway(GatewayError),
    Booking(BookingError),
    Webhook(WebhookError),
    Usage(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(err) => write!(f, "configuration error: {}", err),
            AppError::Telemetry(err) => write!(f, "telemetry error: {}", err),
            AppError::Io(err) => write!(f, "io error: {}", err),
            AppError::Server(err) => write!(f, "server error: {}", err),
            AppError::CatalogSeed { path, source } => {
                write!(f, "invalid property seed {}: {}", path.display(), source)
            }
            AppError::InvalidListing {
                path,
                property,
                problem,
            } => write!(
                f,
                "invalid property {} in seed {}: {}",
                property,
                path.display(),
                problem
            ),
            AppError::Gateway(err) => write!(f, "payment gateway error: {}", err),
            AppError::Booking(err) => write!(f, "booking error: {}", err),
            AppError::Webhook(err) => write!(f, "webhook error: {}", err),
            AppError::Usage(message) => write!(f, "usage error: {}", message),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Config(err) => Some(err),
            AppError::Telemetry(err) => Some(err),
            AppError::Io(err) => Some(err),
            AppError::Server(err) => Some(err),
            AppError::CatalogSeed { source, .. } => Some(source),
            AppError::Gateway(err) => Some(err),
            AppError::Booking(err) => Some(err),
            AppError::Webhook(err) => Some(err),
            AppError::InvalidListing { .. } | AppError::Usage(_) => None,
        }
    }
}

impl From<ConfigError> for AppError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<TelemetryError> for AppError {
    fn from(value: TelemetryError) -> Self {
        Self::Telemetry(value)
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<axum::Error> for AppError {
    fn from(value: axum::Error) -> Self {
        Self::Server(value)
    }
}

impl From<GatewayError> for AppError {
    fn from(value: GatewayError) -> Self {
        Self::Gateway(value)
    }
}

impl From<BookingError> for AppError {
    fn from(value: BookingError) -> Self {
        Self::Booking(value)
    }
}

impl From<WebhookError> for AppError {
    fn from(value: WebhookError) -> Self {
        Self::Webhook(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_the_failure_class() {
        let err = AppError::Usage("--window expects start,end,price".to_string());
        assert_eq!(err.to_string(), "usage error: --window expects start,end,price");

        let err: AppError = BookingError::DateConflict.into();
        assert_eq!(err.to_string(), "booking error: these dates are not available");
        assert!(std::error::Error::source(&err).is_some());
    }
}
