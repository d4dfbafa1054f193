use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::booking::domain::ReservationId;

/// Hosted-checkout request for a single confirmed reservation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckoutRequest {
    pub reservation_id: ReservationId,
    /// Lowercase ISO currency code.
    pub currency: String,
    pub product_name: String,
    pub description: String,
    /// Amount in minor units (cents).
    pub unit_amount: i64,
    pub quantity: u32,
    pub success_url: String,
    pub cancel_url: String,
    /// Echoed back on completion events; carries `reservation_id`.
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
}

/// External payment provider able to open hosted checkout sessions.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    fn name(&self) -> &'static str;

    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, GatewayError>;
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("payment gateway is not configured")]
    NotConfigured,
    #[error("payment gateway unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("payment gateway rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("payment gateway returned an unexpected response: {0}")]
    InvalidResponse(String),
    #[error("amount {0} cannot be expressed in minor units")]
    InvalidAmount(String),
}
