use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use super::gateway::{CheckoutRequest, CheckoutSession, GatewayError, PaymentGateway};

const DEFAULT_API_BASE: &str = "https://api.stripe.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Stripe Checkout client (`POST /v1/checkout/sessions`, form encoded).
pub struct StripeGateway {
    client: reqwest::Client,
    secret_key: Option<String>,
    api_base: String,
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    id: String,
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

impl StripeGateway {
    pub fn new(secret_key: Option<String>, api_base: Option<String>) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            secret_key: secret_key.filter(|key| !key.trim().is_empty()),
            api_base: api_base
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string())
                .trim_end_matches('/')
                .to_string(),
        })
    }

    pub fn is_configured(&self) -> bool {
        self.secret_key.is_some()
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/checkout/sessions", self.api_base)
    }
}

/// Flattens a checkout request into Stripe's bracketed form fields.
pub(crate) fn form_fields(request: &CheckoutRequest) -> Vec<(String, String)> {
    let mut fields = vec![
        ("mode".to_string(), "payment".to_string()),
        ("success_url".to_string(), request.success_url.clone()),
        ("cancel_url".to_string(), request.cancel_url.clone()),
        (
            "client_reference_id".to_string(),
            request.reservation_id.to_string(),
        ),
        (
            "line_items[0][price_data][currency]".to_string(),
            request.currency.clone(),
        ),
        (
            "line_items[0][price_data][product_data][name]".to_string(),
            request.product_name.clone(),
        ),
        (
            "line_items[0][price_data][product_data][description]".to_string(),
            request.description.clone(),
        ),
        (
            "line_items[0][price_data][unit_amount]".to_string(),
            request.unit_amount.to_string(),
        ),
        (
            "line_items[0][quantity]".to_string(),
            request.quantity.to_string(),
        ),
    ];
    fields.extend(
        request
            .metadata
            .iter()
            .map(|(key, value)| (format!("metadata[{key}]"), value.clone())),
    );
    fields
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    fn name(&self) -> &'static str {
        "stripe"
    }

    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, GatewayError> {
        let secret_key = self.secret_key.as_deref().ok_or(GatewayError::NotConfigured)?;

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(secret_key)
            .form(&form_fields(request))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<ErrorEnvelope>()
                .await
                .ok()
                .and_then(|envelope| envelope.error.message)
                .unwrap_or_else(|| status.to_string());
            warn!(
                reservation_id = %request.reservation_id,
                status = status.as_u16(),
                %message,
                "stripe rejected checkout session"
            );
            return Err(GatewayError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let session: SessionResponse = response
            .json()
            .await
            .map_err(|err| GatewayError::InvalidResponse(err.to_string()))?;
        let url = session
            .url
            .ok_or_else(|| GatewayError::InvalidResponse("session has no url".to_string()))?;
        debug!(reservation_id = %request.reservation_id, session_id = %session.id, "stripe session created");

        Ok(CheckoutSession {
            id: session.id,
            url,
        })
    }
}
