mod common;

use hmac::{Hmac, Mac};
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, EntityTrait, Set};
use sha2::Sha256;
use std::sync::Arc;
use uuid::Uuid;

use common::{event_sender, order_fixture, setup_db, RecordingMailer};
use storefront_api::entities::order::{self, GatewayPaymentStatus, PaymentState};
use storefront_api::errors::ServiceError;
use storefront_api::services::payments::{
    PaymentWebhookService, RazorpayConfig, RazorpayGateway, WebhookOutcome,
};

const WEBHOOK_SECRET: &str = "whsec_test";

fn sign(body: &[u8]) -> String {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(WEBHOOK_SECRET.as_bytes()).expect("hmac key");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

fn webhook_service(db: sea_orm::DatabaseConnection, mailer: Arc<RecordingMailer>) -> PaymentWebhookService {
    let gateway = Arc::new(RazorpayGateway::new(RazorpayConfig {
        key_id: Some("rzp_test_key".to_string()),
        key_secret: Some("test_secret".to_string()),
        webhook_secret: Some(WEBHOOK_SECRET.to_string()),
        base_url: "https://api.razorpay.com/v1".to_string(),
    }));
    PaymentWebhookService::new(Arc::new(db), gateway, mailer, event_sender())
}

fn captured_body(provider_order_id: &str, payment_id: &str, amount_minor: i64) -> Vec<u8> {
    serde_json::json!({
        "event": "payment.captured",
        "payload": {
            "payment": {
                "entity": {
                    "id": payment_id,
                    "order_id": provider_order_id,
                    "amount": amount_minor,
                    "currency": "INR",
                    "status": "captured"
                }
            }
        }
    })
    .to_string()
    .into_bytes()
}

#[tokio::test]
async fn captured_event_marks_order_paid() {
    let db = setup_db().await;
    let user_id = Uuid::new_v4();

    let mut fixture = order_fixture(user_id);
    fixture.provider_order_id = Set(Some("order_hook_1".to_string()));
    let order_model = fixture.insert(&db).await.expect("insert");

    let mailer = RecordingMailer::new();
    let svc = webhook_service(db.clone(), mailer.clone());

    let body = captured_body("order_hook_1", "pay_hook_1", 49900);
    let outcome = svc.process(&body, &sign(&body)).await.expect("process");
    assert_eq!(outcome, WebhookOutcome::PaymentRecorded);
    assert_eq!(outcome.message(), "Order updated to paid via webhook");

    let reloaded = order::Entity::find_by_id(order_model.id)
        .one(&db)
        .await
        .expect("query")
        .expect("exists");
    assert_eq!(reloaded.payment_status, PaymentState::Paid);
    assert_eq!(reloaded.gateway_payment_status, GatewayPaymentStatus::Completed);
    assert_eq!(reloaded.payment_transaction_id.as_deref(), Some("pay_hook_1"));
    assert_eq!(reloaded.payment_provider.as_deref(), Some("razorpay"));
    // Paise converted to currency units.
    assert_eq!(reloaded.payment_amount, dec!(499.00));
    assert!(reloaded.payment_date.is_some());
    assert_eq!(reloaded.version, order_model.version + 1);

    assert_eq!(mailer.sent_count(), 1);
}

#[tokio::test]
async fn invalid_signature_is_rejected_before_parsing() {
    let db = setup_db().await;
    let svc = webhook_service(db, RecordingMailer::new());

    let body = captured_body("order_hook_2", "pay_hook_2", 10000);
    let err = svc.process(&body, "deadbeef").await.expect_err("bad sig");
    assert!(matches!(err, ServiceError::WebhookSignature));
}

#[tokio::test]
async fn tampered_body_fails_verification() {
    let db = setup_db().await;
    let svc = webhook_service(db, RecordingMailer::new());

    let body = captured_body("order_hook_3", "pay_hook_3", 10000);
    let signature = sign(&body);
    let mut tampered = body.clone();
    tampered.extend_from_slice(b" ");

    let err = svc
        .process(&tampered, &signature)
        .await
        .expect_err("tampered body");
    assert!(matches!(err, ServiceError::WebhookSignature));
}

#[tokio::test]
async fn unknown_provider_order_is_acknowledged_and_ignored() {
    let db = setup_db().await;
    let svc = webhook_service(db, RecordingMailer::new());

    let body = captured_body("order_unknown", "pay_x", 5000);
    let outcome = svc.process(&body, &sign(&body)).await.expect("process");
    assert_eq!(
        outcome.message(),
        "Order not found for webhook order_id, ignored"
    );
}

#[tokio::test]
async fn payload_without_order_id_is_ignored() {
    let db = setup_db().await;
    let svc = webhook_service(db, RecordingMailer::new());

    let body = serde_json::json!({
        "event": "payment.captured",
        "payload": { "payment": { "entity": { "id": "pay_only" } } }
    })
    .to_string()
    .into_bytes();

    let outcome = svc.process(&body, &sign(&body)).await.expect("process");
    assert_eq!(outcome.message(), "No order_id in webhook payload, ignored");
}

#[tokio::test]
async fn failed_payment_marks_gateway_status_failed() {
    let db = setup_db().await;

    let mut fixture = order_fixture(Uuid::new_v4());
    fixture.provider_order_id = Set(Some("order_hook_4".to_string()));
    let order_model = fixture.insert(&db).await.expect("insert");

    let mailer = RecordingMailer::new();
    let svc = webhook_service(db.clone(), mailer.clone());

    let body = serde_json::json!({
        "event": "payment.failed",
        "payload": {
            "payment": {
                "entity": { "id": "pay_fail", "order_id": "order_hook_4", "amount": 49900 }
            }
        }
    })
    .to_string()
    .into_bytes();

    let outcome = svc.process(&body, &sign(&body)).await.expect("process");
    assert_eq!(outcome, WebhookOutcome::PaymentFailed);
    assert_eq!(outcome.message(), "Order marked payment failed via webhook");

    let reloaded = order::Entity::find_by_id(order_model.id)
        .one(&db)
        .await
        .expect("query")
        .expect("exists");
    assert_eq!(reloaded.gateway_payment_status, GatewayPaymentStatus::Failed);
    // Payment state itself is untouched; only the gateway status records
    // the failure.
    assert_eq!(reloaded.payment_status, PaymentState::Unpaid);
    assert_eq!(mailer.sent_count(), 0);
}

#[tokio::test]
async fn unrecognized_event_is_acknowledged_without_action() {
    let db = setup_db().await;

    let mut fixture = order_fixture(Uuid::new_v4());
    fixture.provider_order_id = Set(Some("order_hook_5".to_string()));
    fixture.insert(&db).await.expect("insert");

    let svc = webhook_service(db, RecordingMailer::new());

    let body = serde_json::json!({
        "event": "refund.processed",
        "payload": {
            "payment": {
                "entity": { "id": "pay_r", "order_id": "order_hook_5" }
            }
        }
    })
    .to_string()
    .into_bytes();

    let outcome = svc.process(&body, &sign(&body)).await.expect("process");
    assert_eq!(
        outcome.message(),
        "Webhook received (no action for this event)"
    );
}
