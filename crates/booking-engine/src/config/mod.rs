use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub booking: BookingConfig,
    pub payments: PaymentConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let lock_timeout_ms = read_number("BOOKING_LOCK_TIMEOUT_MS", 2_000)?;
        if lock_timeout_ms == 0 {
            return Err(ConfigError::InvalidNumber {
                name: "BOOKING_LOCK_TIMEOUT_MS",
            });
        }
        let sweep_secs = read_number("BOOKING_COMPLETION_SWEEP_SECS", 0)?;
        let property_seed = env::var("BOOKING_PROPERTY_SEED")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from);

        let gateway = GatewayKind::parse(
            &env::var("PAYMENT_GATEWAY").unwrap_or_else(|_| "stub".to_string()),
        )?;
        let allow_unsigned_default = environment != AppEnvironment::Production;
        let allow_unsigned_webhooks =
            read_flag("PAYMENT_ALLOW_UNSIGNED_WEBHOOKS", allow_unsigned_default)?;

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            booking: BookingConfig {
                lock_timeout: Duration::from_millis(lock_timeout_ms),
                completion_sweep: (sweep_secs > 0).then(|| Duration::from_secs(sweep_secs)),
                property_seed,
            },
            payments: PaymentConfig {
                gateway,
                stripe_secret_key: read_secret("STRIPE_SECRET_KEY"),
                stripe_api_base: env::var("STRIPE_API_BASE")
                    .unwrap_or_else(|_| "https://api.stripe.com".to_string()),
                webhook_secret: read_secret("STRIPE_WEBHOOK_SECRET"),
                allow_unsigned_webhooks,
                webhook_tolerance: Duration::from_secs(read_number(
                    "STRIPE_WEBHOOK_TOLERANCE_SECS",
                    300,
                )?),
                currency: env::var("CHECKOUT_CURRENCY")
                    .unwrap_or_else(|_| "eur".to_string())
                    .to_ascii_lowercase(),
                success_url: env::var("CHECKOUT_SUCCESS_URL").unwrap_or_else(|_| {
                    "http://localhost:5173/reservations?status=success".to_string()
                }),
                cancel_url: env::var("CHECKOUT_CANCEL_URL").unwrap_or_else(|_| {
                    "http://localhost:5173/reservations?status=cancelled".to_string()
                }),
            },
        })
    }
}

fn read_number(name: &'static str, default: u64) -> Result<u64, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map_err(|_| ConfigError::InvalidNumber { name }),
        Err(_) => Ok(default),
    }
}

fn read_flag(name: &'static str, default: bool) -> Result<bool, ConfigError> {
    match env::var(name) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidFlag { name }),
        },
        Err(_) => Ok(default),
    }
}

fn read_secret(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Booking engine tuning.
#[derive(Debug, Clone)]
pub struct BookingConfig {
    /// Upper bound on waiting for a property's booking lock.
    pub lock_timeout: Duration,
    /// Interval of the paid-to-completed sweep, `None` when disabled.
    pub completion_sweep: Option<Duration>,
    /// JSON file of property listings loaded into the in-memory catalog.
    pub property_seed: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayKind {
    Stripe,
    Stub,
}

impl GatewayKind {
    fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "stripe" => Ok(Self::Stripe),
            "stub" | "local" => Ok(Self::Stub),
            other => Err(ConfigError::UnknownGateway(other.to_string())),
        }
    }
}

/// Payment gateway and webhook settings.
#[derive(Clone)]
pub struct PaymentConfig {
    pub gateway: GatewayKind,
    pub stripe_secret_key: Option<String>,
    pub stripe_api_base: String,
    pub webhook_secret: Option<String>,
    /// Accept unsigned webhook payloads when no secret is configured. Local use only.
    pub allow_unsigned_webhooks: bool,
    pub webhook_tolerance: Duration,
    pub currency: String,
    pub success_url: String,
    pub cancel_url: String,
}

impl fmt::Debug for PaymentConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PaymentConfig")
            .field("gateway", &self.gateway)
            .field("stripe_secret_key", &self.stripe_secret_key.as_ref().map(|_| "<redacted>"))
            .field("stripe_api_base", &self.stripe_api_base)
            .field("webhook_secret", &self.webhook_secret.as_ref().map(|_| "<redacted>"))
            .field("allow_unsigned_webhooks", &self.allow_unsigned_webhooks)
            .field("webhook_tolerance", &self.webhook_tolerance)
            .field("currency", &self.currency)
            .field("success_url", &self.success_url)
            .field("cancel_url", &self.cancel_url)
            .finish()
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNumber { name: &'static str },
    InvalidFlag { name: &'static str },
    UnknownGateway(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber { name } => {
                write!(f, "{name} must be a positive whole number")
            }
            ConfigError::InvalidFlag { name } => write!(f, "{name} must be true or false"),
            ConfigError::UnknownGateway(value) => {
                write!(f, "PAYMENT_GATEWAY must be 'stripe' or 'stub', got '{value}'")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            _ => None,
        }
    }
}
