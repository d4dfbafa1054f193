use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use super::gateway::{CheckoutRequest, CheckoutSession, GatewayError, PaymentGateway};

/// Offline gateway for local runs, the CLI demo and tests. Records every request it receives.
#[derive(Debug, Default)]
pub struct StubGateway {
    sequence: AtomicU64,
    requests: Mutex<Vec<CheckoutRequest>>,
    failing: bool,
}

impl StubGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// A gateway whose every call is rejected, for exercising failure paths.
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn requests(&self) -> Vec<CheckoutRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl PaymentGateway for StubGateway {
    fn name(&self) -> &'static str {
        "stub"
    }

    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, GatewayError> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());

        if self.failing {
            return Err(GatewayError::Rejected {
                status: 402,
                message: "stub gateway configured to fail".to_string(),
            });
        }

        let n = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let id = format!("cs_stub_{n:06}");
        Ok(CheckoutSession {
            url: format!("https://checkout.stub.local/pay/{id}"),
            id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::booking::domain::ReservationId;
    use std::collections::BTreeMap;

    fn request() -> CheckoutRequest {
        CheckoutRequest {
            reservation_id: ReservationId::generate(),
            currency: "eur".to_string(),
            product_name: "Reservation - Loft".to_string(),
            description: "3 night(s) from 2024-07-01 to 2024-07-04".to_string(),
            unit_amount: 25_200,
            quantity: 1,
            success_url: "https://example.test/ok".to_string(),
            cancel_url: "https://example.test/cancel".to_string(),
            metadata: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn issues_sequential_session_ids_and_records_requests() {
        let gateway = StubGateway::new();
        let first = gateway.create_checkout_session(&request()).await.expect("first");
        let second = gateway.create_checkout_session(&request()).await.expect("second");

        assert_eq!(first.id, "cs_stub_000001");
        assert_eq!(second.id, "cs_stub_000002");
        assert!(first.url.ends_with(&first.id));
        assert_eq!(gateway.requests().len(), 2);
    }

    #[tokio::test]
    async fn failing_stub_rejects() {
        let gateway = StubGateway::failing();
        let err = gateway
            .create_checkout_session(&request())
            .await
            .expect_err("rejected");
        assert!(matches!(err, GatewayError::Rejected { status: 402, .. }));
    }
}
