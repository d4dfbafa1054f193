//! Gateway callback verification and event parsing.
//!
//! Signed deliveries carry `t=<unix>,v1=<hex hmac-sha256("{t}.{payload}")>`. Unsigned payloads
//! are only accepted when no secret is configured and `allow_unsigned` is set.

use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::json;
use sha2::Sha256;

use crate::booking::repository::RepositoryError;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "stripe-signature";
pub const CHECKOUT_COMPLETED: &str = "checkout.session.completed";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    Signed,
    /// Accepted without a signature because no secret is configured.
    Unsigned,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("missing signature header")]
    MissingHeader,
    #[error("malformed signature header")]
    MalformedHeader,
    #[error("signature timestamp outside the tolerance window")]
    Expired,
    #[error("signature does not match payload")]
    Mismatch,
    #[error("unsigned webhooks are disabled and no signing secret is configured")]
    SecretRequired,
}

#[derive(Clone)]
pub struct WebhookVerifier {
    secret: Option<String>,
    allow_unsigned: bool,
    tolerance: Duration,
}

impl std::fmt::Debug for WebhookVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookVerifier")
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .field("allow_unsigned", &self.allow_unsigned)
            .field("tolerance", &self.tolerance)
            .finish()
    }
}

impl WebhookVerifier {
    pub fn new(secret: Option<String>, allow_unsigned: bool, tolerance: Duration) -> Self {
        Self {
            secret: secret.filter(|value| !value.is_empty()),
            allow_unsigned,
            tolerance,
        }
    }

    pub fn is_signing(&self) -> bool {
        self.secret.is_some()
    }

    pub fn verify(
        &self,
        payload: &[u8],
        header: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Verification, SignatureError> {
        let Some(secret) = self.secret.as_deref() else {
            return if self.allow_unsigned {
                Ok(Verification::Unsigned)
            } else {
                Err(SignatureError::SecretRequired)
            };
        };

        let header = header.ok_or(SignatureError::MissingHeader)?;
        let parsed = ParsedHeader::parse(header)?;

        let age = (now.timestamp() - parsed.timestamp).unsigned_abs();
        if age > self.tolerance.as_secs() {
            return Err(SignatureError::Expired);
        }

        let verified = parsed.signatures.iter().any(|candidate| {
            keyed_mac(secret, parsed.timestamp, payload)
                .map(|mac| mac.verify_slice(candidate).is_ok())
                .unwrap_or(false)
        });

        if verified {
            Ok(Verification::Signed)
        } else {
            Err(SignatureError::Mismatch)
        }
    }
}

struct ParsedHeader {
    timestamp: i64,
    signatures: Vec<Vec<u8>>,
}

impl ParsedHeader {
    fn parse(header: &str) -> Result<Self, SignatureError> {
        let mut timestamp = None;
        let mut signatures = Vec::new();

        for part in header.split(',') {
            let Some((key, value)) = part.trim().split_once('=') else {
                continue;
            };
            match key {
                "t" => {
                    timestamp = Some(
                        value
                            .parse::<i64>()
                            .map_err(|_| SignatureError::MalformedHeader)?,
                    )
                }
                "v1" => {
                    if let Ok(bytes) = hex::decode(value) {
                        signatures.push(bytes);
                    }
                }
                _ => {}
            }
        }

        match timestamp {
            Some(timestamp) if !signatures.is_empty() => Ok(Self {
                timestamp,
                signatures,
            }),
            _ => Err(SignatureError::MalformedHeader),
        }
    }
}

fn keyed_mac(secret: &str, timestamp: i64, payload: &[u8]) -> Option<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Some(mac)
}

/// Builds a signature header for `payload`, as the gateway would.
pub fn sign_payload(secret: &str, timestamp: i64, payload: &[u8]) -> Option<String> {
    let mac = keyed_mac(secret, timestamp, payload)?;
    Some(format!(
        "t={timestamp},v1={}",
        hex::encode(mac.finalize().into_bytes())
    ))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentEvent {
    CheckoutCompleted(CompletedCheckout),
    Other { event_id: String, event_type: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedCheckout {
    pub event_id: String,
    pub session_id: String,
    pub payment_intent: Option<String>,
    /// Raw `metadata.reservation_id`, falling back to `client_reference_id`.
    pub reservation_reference: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    #[serde(default)]
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    data: RawData,
}

#[derive(Debug, Deserialize)]
struct RawData {
    object: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct RawSession {
    id: String,
    #[serde(default)]
    payment_intent: Option<String>,
    #[serde(default)]
    client_reference_id: Option<String>,
    #[serde(default)]
    metadata: std::collections::HashMap<String, String>,
}

pub fn parse_event(payload: &[u8]) -> Result<PaymentEvent, WebhookError> {
    let raw: RawEvent =
        serde_json::from_slice(payload).map_err(|err| WebhookError::Malformed(err.to_string()))?;

    if raw.event_type != CHECKOUT_COMPLETED {
        return Ok(PaymentEvent::Other {
            event_id: raw.id,
            event_type: raw.event_type,
        });
    }

    let session: RawSession = serde_json::from_value(raw.data.object)
        .map_err(|err| WebhookError::Malformed(format!("checkout session: {err}")))?;
    let reservation_reference = session
        .metadata
        .get("reservation_id")
        .cloned()
        .or(session.client_reference_id)
        .filter(|value| !value.is_empty());

    Ok(PaymentEvent::CheckoutCompleted(CompletedCheckout {
        event_id: raw.id,
        session_id: session.id,
        payment_intent: session.payment_intent,
        reservation_reference,
    }))
}

#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("webhook verification failed: {0}")]
    Verification(#[from] SignatureError),
    #[error("malformed webhook payload: {0}")]
    Malformed(String),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            WebhookError::Verification(_) => (StatusCode::BAD_REQUEST, "webhook_verification_error"),
            WebhookError::Malformed(_) => (StatusCode::BAD_REQUEST, "validation_error"),
            WebhookError::Repository(_) => (StatusCode::INTERNAL_SERVER_ERROR, "storage_error"),
        };
        let body = Json(json!({
            "error": self.to_string(),
            "code": code,
        }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test";

    fn at(seconds: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(seconds, 0).expect("valid timestamp")
    }

    fn sign(secret: &str, timestamp: i64, payload: &[u8]) -> String {
        sign_payload(secret, timestamp, payload).expect("signable")
    }

    fn verifier() -> WebhookVerifier {
        WebhookVerifier::new(Some(SECRET.to_string()), false, Duration::from_secs(300))
    }

    #[test]
    fn accepts_a_correctly_signed_payload() {
        let payload = br#"{"type":"ping"}"#;
        let header = sign(SECRET, 1_700_000_000, payload);
        assert_eq!(
            verifier().verify(payload, Some(&header), at(1_700_000_010)),
            Ok(Verification::Signed)
        );
    }

    #[test]
    fn rejects_tampered_payload_and_wrong_secret() {
        let header = sign(SECRET, 1_700_000_000, b"original");
        assert_eq!(
            verifier().verify(b"tampered", Some(&header), at(1_700_000_000)),
            Err(SignatureError::Mismatch)
        );

        let foreign = sign("whsec_other", 1_700_000_000, b"original");
        assert_eq!(
            verifier().verify(b"original", Some(&foreign), at(1_700_000_000)),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn rejects_stale_missing_and_malformed_headers() {
        let header = sign(SECRET, 1_700_000_000, b"{}");
        assert_eq!(
            verifier().verify(b"{}", Some(&header), at(1_700_000_301)),
            Err(SignatureError::Expired)
        );
        assert_eq!(
            verifier().verify(b"{}", None, at(1_700_000_000)),
            Err(SignatureError::MissingHeader)
        );
        assert_eq!(
            verifier().verify(b"{}", Some("v1=abcd"), at(1_700_000_000)),
            Err(SignatureError::MalformedHeader)
        );
    }

    #[test]
    fn unsigned_payloads_depend_on_the_explicit_flag() {
        let open = WebhookVerifier::new(None, true, Duration::from_secs(300));
        assert_eq!(open.verify(b"{}", None, Utc::now()), Ok(Verification::Unsigned));

        let closed = WebhookVerifier::new(Some(String::new()), false, Duration::from_secs(300));
        assert!(!closed.is_signing());
        assert_eq!(
            closed.verify(b"{}", None, Utc::now()),
            Err(SignatureError::SecretRequired)
        );
    }

    #[test]
    fn parses_completed_checkout_with_metadata_reference() {
        let payload = json!({
            "id": "evt_1",
            "type": CHECKOUT_COMPLETED,
            "data": {"object": {
                "id": "cs_1",
                "payment_intent": "pi_1",
                "client_reference_id": "ignored",
                "metadata": {"reservation_id": "abc"}
            }}
        })
        .to_string();

        let event = parse_event(payload.as_bytes()).expect("parses");
        assert_eq!(
            event,
            PaymentEvent::CheckoutCompleted(CompletedCheckout {
                event_id: "evt_1".to_string(),
                session_id: "cs_1".to_string(),
                payment_intent: Some("pi_1".to_string()),
                reservation_reference: Some("abc".to_string()),
            })
        );
    }

    #[test]
    fn other_events_and_garbage_are_distinguished() {
        let other = json!({"id": "evt_2", "type": "invoice.paid", "data": {"object": {}}});
        assert!(matches!(
            parse_event(other.to_string().as_bytes()),
            Ok(PaymentEvent::Other { ref event_type, .. }) if event_type == "invoice.paid"
        ));
        assert!(matches!(
            parse_event(b"not json"),
            Err(WebhookError::Malformed(_))
        ));
    }
}
