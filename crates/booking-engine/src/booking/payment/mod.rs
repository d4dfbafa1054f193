//! Payment gateway seam and the reconciler that turns gateway events into reservation state.

pub mod gateway;
pub mod reconciler;
pub mod stripe;
pub mod stub;
pub mod webhook;

pub use gateway::{CheckoutRequest, CheckoutSession, GatewayError, PaymentGateway};
pub use reconciler::{
    CheckoutLink, CheckoutSettings, CheckoutUrls, PaymentReconciler, WebhookOutcome,
};
pub use stripe::StripeGateway;
pub use stub::StubGateway;
pub use webhook::{
    parse_event, sign_payload, PaymentEvent, SignatureError, Verification, WebhookError,
    WebhookVerifier, CHECKOUT_COMPLETED, SIGNATURE_HEADER,
};
