use booking_engine::booking::domain::{AvailabilityWindow, PropertyId, PropertyListing, WindowId};
use booking_engine::booking::payment::{PaymentGateway, StripeGateway, StubGateway};
use booking_engine::booking::pricing;
use booking_engine::booking::{
    BookingService, BookingSettings, InMemoryCalendarStore, InMemoryPropertyCatalog,
    InMemoryReservationStore,
};
use booking_engine::config::{AppConfig, GatewayKind, PaymentConfig};
use booking_engine::error::AppError;
use chrono::{NaiveDate, Utc};
use metrics_exporter_prometheus::PrometheusHandle;
use rust_decimal::Decimal;
use std::path::Path;
use std::str::FromStr;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

pub(crate) type MemoryBookingService =
    BookingService<InMemoryCalendarStore, InMemoryReservationStore, InMemoryPropertyCatalog>;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// One `--window start,end,price` argument of the quote command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct WindowSpec {
    pub(crate) start: NaiveDate,
    pub(crate) end: NaiveDate,
    pub(crate) price: Decimal,
}

impl WindowSpec {
    pub(crate) fn into_window(self, index: usize) -> AvailabilityWindow {
        AvailabilityWindow {
            id: WindowId(index as u64 + 1),
            property_id: PropertyId(Uuid::nil()),
            start_date: self.start,
            end_date: self.end,
            price_per_night: self.price,
            min_nights: 1,
            max_nights: 30,
            is_active: true,
        }
    }
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}

pub(crate) fn parse_price(raw: &str) -> Result<Decimal, String> {
    let price = Decimal::from_str(raw.trim())
        .map_err(|err| format!("failed to parse '{raw}' as a decimal price ({err})"))?;
    match pricing::price_problem("price", price) {
        Some(problem) => Err(format!("{problem}, got '{raw}'")),
        None => Ok(price),
    }
}

pub(crate) fn parse_window(raw: &str) -> Result<WindowSpec, String> {
    let parts: Vec<&str> = raw.split(',').collect();
    let [start, end, price] = parts.as_slice() else {
        return Err(format!("window '{raw}' must look like start,end,price"));
    };
    let spec = WindowSpec {
        start: parse_date(start)?,
        end: parse_date(end)?,
        price: parse_price(price)?,
    };
    if spec.end < spec.start {
        return Err(format!("window '{raw}' ends before it starts"));
    }
    Ok(spec)
}

/// Reads the optional property seed into the in-memory catalog.
pub(crate) fn load_catalog(seed: Option<&Path>) -> Result<InMemoryPropertyCatalog, AppError> {
    let Some(path) = seed else {
        return Ok(InMemoryPropertyCatalog::default());
    };
    let raw = std::fs::read_to_string(path)?;
    let listings: Vec<PropertyListing> =
        serde_json::from_str(&raw).map_err(|source| AppError::CatalogSeed {
            path: path.to_path_buf(),
            source,
        })?;
    if let Some((listing, problem)) = listings.iter().find_map(|listing| {
        pricing::price_problem("price", listing.price).map(|problem| (listing, problem))
    }) {
        return Err(AppError::InvalidListing {
            path: path.to_path_buf(),
            property: listing.id.to_string(),
            problem,
        });
    }
    info!(path = %path.display(), properties = listings.len(), "property catalog seeded");
    Ok(InMemoryPropertyCatalog::from_listings(listings))
}

pub(crate) fn build_gateway(config: &PaymentConfig) -> Result<Arc<dyn PaymentGateway>, AppError> {
    match config.gateway {
        GatewayKind::Stub => Ok(Arc::new(StubGateway::new())),
        GatewayKind::Stripe => {
            let gateway = StripeGateway::new(
                config.stripe_secret_key.clone(),
                Some(config.stripe_api_base.clone()),
            )?;
            if !gateway.is_configured() {
                warn!("STRIPE_SECRET_KEY is not set, checkout sessions will fail");
            }
            Ok(Arc::new(gateway))
        }
    }
}

pub(crate) fn build_service(config: &AppConfig) -> Result<Arc<MemoryBookingService>, AppError> {
    let catalog = load_catalog(config.booking.property_seed.as_deref())?;
    let gateway = build_gateway(&config.payments)?;
    let settings = BookingSettings::from_config(config);
    if !settings.webhooks.is_signing() {
        if config.payments.allow_unsigned_webhooks {
            warn!("webhook signatures are not verified, unsigned payloads are for local use only");
        } else {
            warn!("STRIPE_WEBHOOK_SECRET is not set, every webhook delivery will be rejected");
        }
    }
    Ok(Arc::new(BookingService::new(
        Arc::new(InMemoryCalendarStore::default()),
        Arc::new(InMemoryReservationStore::default()),
        Arc::new(catalog),
        gateway,
        settings,
    )))
}

/// Periodically completes paid stays whose check-out date has passed.
pub(crate) fn spawn_completion_sweep(
    service: Arc<MemoryBookingService>,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            let today = Utc::now().date_naive();
            if let Err(err) = service.complete_finished_stays(today) {
                warn!(error = %err, "completion sweep failed, retrying next tick");
            }
        }
    })
}
