use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::json;

use super::common::*;
use crate::booking::domain::{PropertyListing, ReservationStatus};
use crate::booking::error::BookingError;
use crate::booking::payment::{
    sign_payload, CheckoutSettings, CheckoutUrls, PaymentReconciler, SignatureError, StubGateway,
    WebhookError, WebhookOutcome, WebhookVerifier,
};
use crate::booking::service::BookingSettings;

#[tokio::test]
async fn duplicate_completion_events_pay_exactly_once() {
    let harness = harness();
    let confirmed = harness.confirmed(day(7, 1), day(7, 4)).await;
    let link = harness
        .service
        .create_checkout(&guest(), &confirmed.id, CheckoutUrls::default())
        .await
        .expect("checkout");
    let payload = completed_checkout(&confirmed.id.to_string(), &link.session_id, "pi_first");

    let first = harness
        .service
        .handle_payment_event(&payload, None)
        .expect("first delivery");
    assert_eq!(
        first,
        WebhookOutcome::Applied {
            reservation_id: confirmed.id
        }
    );
    let paid = harness.stored(&confirmed.id);
    assert_eq!(paid.status, ReservationStatus::Paid);
    assert_eq!(paid.payment_intent.as_deref(), Some("pi_first"));

    let second = harness
        .service
        .handle_payment_event(&payload, None)
        .expect("redelivery");
    assert_eq!(
        second,
        WebhookOutcome::Duplicate {
            reservation_id: confirmed.id
        }
    );
    assert_eq!(harness.stored(&confirmed.id), paid);
}

#[tokio::test]
async fn checkout_request_describes_the_stay() {
    let harness = harness();
    let confirmed = harness.confirmed(day(7, 1), day(7, 4)).await;
    let link = harness
        .service
        .create_checkout(
            &guest(),
            &confirmed.id,
            CheckoutUrls {
                success_url: Some("https://app.test/paid".to_string()),
                cancel_url: None,
            },
        )
        .await
        .expect("checkout");
    assert!(link.session_id.starts_with("cs_stub_"));
    assert!(link.checkout_url.contains(&link.session_id));

    let requests = harness.gateway.requests();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.product_name, "Reservation - Harbour Loft");
    assert_eq!(request.description, "3 night(s) from 2024-07-01 to 2024-07-04");
    assert_eq!(request.unit_amount, 25_200);
    assert_eq!(request.quantity, 1);
    assert_eq!(request.currency, "eur");
    assert_eq!(request.success_url, "https://app.test/paid");
    assert_eq!(request.cancel_url, CheckoutSettings::default().cancel_url);
    assert_eq!(
        request.metadata.get("reservation_id"),
        Some(&confirmed.id.to_string())
    );
}

#[tokio::test]
async fn checkout_charges_in_the_listing_currency() {
    let harness = harness();
    harness.catalog.upsert(PropertyListing {
        currency: "USD".to_string(),
        ..listing()
    });
    let confirmed = harness.confirmed(day(7, 1), day(7, 4)).await;
    harness
        .service
        .create_checkout(&guest(), &confirmed.id, CheckoutUrls::default())
        .await
        .expect("checkout");

    harness.catalog.upsert(PropertyListing {
        currency: " ".to_string(),
        ..listing()
    });
    let second = harness.confirmed(day(7, 10), day(7, 12)).await;
    harness
        .service
        .create_checkout(&guest(), &second.id, CheckoutUrls::default())
        .await
        .expect("checkout");

    let requests = harness.gateway.requests();
    assert_eq!(requests[0].currency, "usd");
    assert_eq!(requests[1].currency, CheckoutSettings::default().currency);
}

#[tokio::test]
async fn gateway_failure_leaves_the_reservation_retryable() {
    let harness = harness_with(BookingSettings::default(), StubGateway::failing());
    let confirmed = harness.confirmed(day(7, 1), day(7, 4)).await;

    let err = harness
        .service
        .create_checkout(&guest(), &confirmed.id, CheckoutUrls::default())
        .await
        .expect_err("gateway fails");
    assert!(matches!(err, BookingError::Gateway(_)));
    assert_eq!(err.status_code(), axum::http::StatusCode::INTERNAL_SERVER_ERROR);

    let stored = harness.stored(&confirmed.id);
    assert_eq!(stored.status, ReservationStatus::Confirmed);
    assert!(stored.checkout_session_id.is_none());
}

#[tokio::test]
async fn signed_deliveries_must_verify() {
    let harness = signed_harness();
    let confirmed = harness.confirmed(day(7, 1), day(7, 4)).await;
    let link = harness
        .service
        .create_checkout(&guest(), &confirmed.id, CheckoutUrls::default())
        .await
        .expect("checkout");
    let payload = completed_checkout(&confirmed.id.to_string(), &link.session_id, "pi_signed");

    let forged = sign_payload("whsec_attacker", Utc::now().timestamp(), &payload).expect("sign");
    assert!(matches!(
        harness.service.handle_payment_event(&payload, Some(&forged)),
        Err(WebhookError::Verification(SignatureError::Mismatch))
    ));
    assert!(matches!(
        harness.service.handle_payment_event(&payload, None),
        Err(WebhookError::Verification(SignatureError::MissingHeader))
    ));
    assert_eq!(harness.stored(&confirmed.id).status, ReservationStatus::Confirmed);

    let genuine = sign_payload(WEBHOOK_SECRET, Utc::now().timestamp(), &payload).expect("sign");
    assert!(matches!(
        harness.service.handle_payment_event(&payload, Some(&genuine)),
        Ok(WebhookOutcome::Applied { .. })
    ));
}

#[tokio::test]
async fn replayed_signatures_outside_tolerance_are_rejected() {
    let harness = harness();
    let confirmed = harness.confirmed(day(7, 1), day(7, 4)).await;
    let reconciler = PaymentReconciler::new(
        harness.reservations.clone(),
        Arc::new(StubGateway::new()),
        WebhookVerifier::new(Some(WEBHOOK_SECRET.to_string()), false, Duration::from_secs(300)),
        CheckoutSettings::default(),
    );

    let signed_at: DateTime<Utc> = Utc::now() - chrono::Duration::minutes(10);
    let payload = completed_checkout(&confirmed.id.to_string(), "cs_any", "pi_late");
    let header = sign_payload(WEBHOOK_SECRET, signed_at.timestamp(), &payload).expect("sign");

    assert!(matches!(
        reconciler.handle_payment_event_at(&payload, Some(&header), Utc::now()),
        Err(WebhookError::Verification(SignatureError::Expired))
    ));
    assert!(matches!(
        reconciler.handle_payment_event_at(&payload, Some(&header), signed_at),
        Ok(WebhookOutcome::Applied { .. })
    ));
}

#[tokio::test]
async fn events_for_unpayable_reservations_are_acknowledged_without_change() {
    let harness = harness();
    let pending = harness.pending(day(7, 1), day(7, 4)).await;
    let cancelled = harness.confirmed(day(7, 10), day(7, 12)).await;
    harness
        .service
        .cancel(&guest(), &cancelled.id, None)
        .expect("cancel");

    for (reservation, status) in [
        (&pending, ReservationStatus::Pending),
        (&cancelled, ReservationStatus::Cancelled),
    ] {
        let payload = completed_checkout(&reservation.id.to_string(), "cs_unexpected", "pi_x");
        let outcome = harness
            .service
            .handle_payment_event(&payload, None)
            .expect("acknowledged");
        assert_eq!(
            outcome,
            WebhookOutcome::Rejected {
                reservation_id: reservation.id,
                status
            }
        );
        assert_eq!(harness.stored(&reservation.id).status, status);
        assert!(harness.stored(&reservation.id).payment_intent.is_none());
    }
}

#[tokio::test]
async fn paying_an_earlier_checkout_session_still_marks_the_reservation_paid() {
    let harness = harness();
    let confirmed = harness.confirmed(day(7, 1), day(7, 4)).await;
    let first = harness
        .service
        .create_checkout(&guest(), &confirmed.id, CheckoutUrls::default())
        .await
        .expect("first checkout");
    let second = harness
        .service
        .create_checkout(&guest(), &confirmed.id, CheckoutUrls::default())
        .await
        .expect("second checkout");
    assert_ne!(first.session_id, second.session_id);
    assert_eq!(
        harness.stored(&confirmed.id).checkout_session_id.as_deref(),
        Some(second.session_id.as_str())
    );

    let payload = completed_checkout(&confirmed.id.to_string(), &first.session_id, "pi_first");
    assert_eq!(
        harness.service.handle_payment_event(&payload, None).expect("ack"),
        WebhookOutcome::Applied {
            reservation_id: confirmed.id
        }
    );
    let paid = harness.stored(&confirmed.id);
    assert_eq!(paid.status, ReservationStatus::Paid);
    assert_eq!(paid.payment_intent.as_deref(), Some("pi_first"));
    assert_eq!(paid.checkout_session_id.as_deref(), Some(first.session_id.as_str()));

    let late = completed_checkout(&confirmed.id.to_string(), &second.session_id, "pi_second");
    assert_eq!(
        harness.service.handle_payment_event(&late, None).expect("ack"),
        WebhookOutcome::Duplicate {
            reservation_id: confirmed.id
        }
    );
    assert_eq!(harness.stored(&confirmed.id), paid);
}

#[test]
fn unknown_references_and_foreign_events_are_acknowledged() {
    let harness = harness();

    let unknown = completed_checkout(&uuid::Uuid::from_u128(77).to_string(), "cs_1", "pi_1");
    assert!(matches!(
        harness.service.handle_payment_event(&unknown, None),
        Ok(WebhookOutcome::UnknownReservation { .. })
    ));

    let garbage_reference = completed_checkout("not-a-uuid", "cs_1", "pi_1");
    assert!(matches!(
        harness.service.handle_payment_event(&garbage_reference, None),
        Ok(WebhookOutcome::UnknownReservation { ref reference }) if reference == "not-a-uuid"
    ));

    let no_reference = json!({
        "id": "evt_9",
        "type": "checkout.session.completed",
        "data": {"object": {"id": "cs_9", "metadata": {}}}
    })
    .to_string();
    assert_eq!(
        harness
            .service
            .handle_payment_event(no_reference.as_bytes(), None)
            .expect("ack"),
        WebhookOutcome::MissingReference
    );

    let refund = json!({"id": "evt_10", "type": "charge.refunded", "data": {"object": {}}});
    assert!(matches!(
        harness
            .service
            .handle_payment_event(refund.to_string().as_bytes(), None),
        Ok(WebhookOutcome::Ignored { .. })
    ));
}

#[test]
fn structurally_invalid_payloads_are_errors() {
    let harness = harness();
    assert!(matches!(
        harness.service.handle_payment_event(b"{\"type\":", None),
        Err(WebhookError::Malformed(_))
    ));
    assert!(matches!(
        harness.service.handle_payment_event(
            json!({"type": "checkout.session.completed", "data": {"object": {"metadata": {}}}})
                .to_string()
                .as_bytes(),
            None
        ),
        Err(WebhookError::Malformed(_))
    ));
}
