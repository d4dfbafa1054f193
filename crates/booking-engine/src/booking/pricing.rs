use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::Serialize;
use thiserror::Error;

use super::domain::{AvailabilityWindow, StayDates, WindowId};

/// Fixed platform fee charged on top of the nightly subtotal.
pub const SERVICE_FEE_RATE: Decimal = dec!(0.05);

/// Largest nightly price accepted: ten digits, two of them decimal.
pub const MAX_NIGHTLY_PRICE: Decimal = dec!(99999999.99);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PricingError {
    #[error("price of {nights} night(s) at {price_per_night} is out of range")]
    Overflow {
        price_per_night: Decimal,
        nights: u32,
    },
}

/// Where the nightly price of a quote came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "window_id")]
pub enum PriceSource {
    AvailabilityWindow(WindowId),
    BasePrice,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Quote {
    pub price_per_night: Decimal,
    pub nights: u32,
    /// `price_per_night * nights`.
    pub subtotal: Decimal,
    pub service_fee: Decimal,
    /// Amount persisted on the reservation and charged to the guest.
    pub total_price: Decimal,
    pub source: PriceSource,
}

/// Prices a stay.
///
/// The nightly price comes from the earliest-starting active window that covers the whole stay,
/// falling back to the listing's base price. Overlapping windows are not reconciled; the first by
/// start date wins.
pub fn resolve(
    windows: &[AvailabilityWindow],
    base_price: Decimal,
    stay: &StayDates,
) -> Result<Quote, PricingError> {
    let window = windows
        .iter()
        .filter(|window| window.is_active && window.covers(stay))
        .min_by_key(|window| (window.start_date, window.id));

    let (price_per_night, source) = match window {
        Some(window) => (
            window.price_per_night,
            PriceSource::AvailabilityWindow(window.id),
        ),
        None => (base_price, PriceSource::BasePrice),
    };

    let nights = stay.nights();
    let overflow = || PricingError::Overflow {
        price_per_night,
        nights,
    };
    let subtotal = money(
        price_per_night
            .checked_mul(Decimal::from(nights))
            .ok_or_else(overflow)?,
    );
    let service_fee = money(subtotal.checked_mul(SERVICE_FEE_RATE).ok_or_else(overflow)?);
    let total_price = subtotal.checked_add(service_fee).ok_or_else(overflow)?;

    Ok(Quote {
        price_per_night: money(price_per_night),
        nights,
        subtotal,
        service_fee,
        total_price,
        source,
    })
}

/// Problem with an owner-entered nightly price, `None` when acceptable.
pub fn price_problem(field: &str, price: Decimal) -> Option<String> {
    if price.is_sign_negative() {
        return Some(format!("{field} must not be negative"));
    }
    if price.normalize().scale() > 2 {
        return Some(format!("{field} must have at most two decimal places"));
    }
    if price > MAX_NIGHTLY_PRICE {
        return Some(format!("{field} must not exceed {MAX_NIGHTLY_PRICE}"));
    }
    None
}

/// Two-decimal monetary amount, rounded half-to-even.
pub fn money(value: Decimal) -> Decimal {
    let mut rounded = value.round_dp_with_strategy(2, RoundingStrategy::MidpointNearestEven);
    rounded.rescale(2);
    rounded
}

/// Gateway minor units (cents). Amounts are already two-decimal, the truncation only drops zeros.
pub fn minor_units(amount: Decimal) -> Option<i64> {
    use rust_decimal::prelude::ToPrimitive;

    (amount * dec!(100)).trunc().to_i64()
}
