#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, Schema, Set};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use uuid::Uuid;

use storefront_api::entities::order::{
    DeliveryStatus, GatewayPaymentStatus, OrderStatus, PaymentState,
};
use storefront_api::entities::{cart_item, ledger_entry, order, order_audit, order_item};
use storefront_api::errors::ServiceError;
use storefront_api::events::EventSender;
use storefront_api::services::notifications::Mailer;
use storefront_api::services::payments::{
    PaymentGateway, ProviderOrder, RefundOutcome,
};

/// Fresh in-memory SQLite database with the full schema.
pub async fn setup_db() -> DatabaseConnection {
    let db = Database::connect("sqlite::memory:")
        .await
        .expect("connect in-memory sqlite");

    let backend = db.get_database_backend();
    let schema = Schema::new(backend);
    for stmt in [
        schema.create_table_from_entity(order::Entity),
        schema.create_table_from_entity(order_item::Entity),
        schema.create_table_from_entity(cart_item::Entity),
        schema.create_table_from_entity(order_audit::Entity),
        schema.create_table_from_entity(ledger_entry::Entity),
    ] {
        db.execute(backend.build(&stmt)).await.expect("create table");
    }

    // Mirrors the idempotency index from the production migrations.
    db.execute_unprepared(
        "CREATE UNIQUE INDEX idx_orders_user_batch ON orders (user_id, batch_id)",
    )
    .await
    .expect("create unique batch index");

    db
}

pub fn event_sender() -> EventSender {
    // Receiver is dropped; services treat event delivery as best-effort.
    let (tx, _rx) = mpsc::channel(64);
    EventSender::new(tx)
}

/// Pending order fixture with sane defaults; tests override fields before
/// inserting.
pub fn order_fixture(user_id: Uuid) -> order::ActiveModel {
    order::ActiveModel {
        id: Set(Uuid::new_v4()),
        order_number: Set(format!(
            "ORD-{}",
            &Uuid::new_v4().simple().to_string()[..8].to_uppercase()
        )),
        user_id: Set(user_id),
        status: Set(OrderStatus::Pending),
        delivery_status: Set(DeliveryStatus::Pending),
        payment_status: Set(PaymentState::Unpaid),
        total_amount: Set(dec!(499.00)),
        currency: Set("INR".to_string()),
        shipping_address: Set("42 Test Lane, Bengaluru".to_string()),
        batch_id: Set(None),
        payment_provider: Set(None),
        payment_transaction_id: Set(None),
        provider_order_id: Set(None),
        payment_amount: Set(Decimal::ZERO),
        payment_date: Set(None),
        gateway_payment_status: Set(GatewayPaymentStatus::Pending),
        tracking_number: Set(None),
        carrier: Set(None),
        carrier_url: Set(None),
        courier_phone: Set(None),
        courier_logo_url: Set(None),
        expected_delivery_date: Set(None),
        is_verified: Set(false),
        verified_at: Set(None),
        verified_by: Set(None),
        packed_at: Set(None),
        shipped_at: Set(None),
        delivered_at: Set(None),
        delivery_date: Set(None),
        cancelled_at: Set(None),
        cancelled_by: Set(None),
        cancel_reason: Set(None),
        returned_at: Set(None),
        admin_notes: Set(None),
        customer_notes: Set(None),
        is_deleted: Set(false),
        deleted_at: Set(None),
        created_at: Set(Utc::now()),
        updated_at: Set(None),
        version: Set(1),
    }
}

pub fn cart_line_fixture(user_id: Uuid, unit_price: Decimal, quantity: i32) -> cart_item::ActiveModel {
    let now = Utc::now();
    cart_item::ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(user_id),
        product_id: Set(Uuid::new_v4()),
        title: Set("Canvas Tote".to_string()),
        description: Set(None),
        image: Set(None),
        size: Set(None),
        color: Set(None),
        quantity: Set(quantity),
        unit_price: Set(unit_price),
        base_price: Set(None),
        tax: Set(Decimal::ZERO),
        shipping_cost: Set(Decimal::ZERO),
        discount: Set(Decimal::ZERO),
        total: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
    }
}

/// How the scripted gateway answers refund calls.
#[derive(Debug, Clone)]
pub enum RefundBehavior {
    Succeed(String),
    AlreadyRefunded,
    Fail(String),
}

/// Deterministic in-process gateway double. Records every refund call.
pub struct ScriptedGateway {
    pub refund_behavior: Mutex<RefundBehavior>,
    pub refund_calls: Mutex<Vec<(String, Option<i64>)>>,
    pub webhook_secret: String,
}

impl ScriptedGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            refund_behavior: Mutex::new(RefundBehavior::Succeed("rfnd_test_1".to_string())),
            refund_calls: Mutex::new(Vec::new()),
            webhook_secret: "whsec_test".to_string(),
        })
    }

    pub fn failing_refunds(reason: &str) -> Arc<Self> {
        let gateway = Self::new();
        *gateway.refund_behavior.lock().unwrap() = RefundBehavior::Fail(reason.to_string());
        gateway
    }

    pub fn recorded_refunds(&self) -> Vec<(String, Option<i64>)> {
        self.refund_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl PaymentGateway for ScriptedGateway {
    fn key_id(&self) -> Result<String, ServiceError> {
        Ok("rzp_test_key".to_string())
    }

    async fn create_provider_order(
        &self,
        amount_minor: i64,
        currency: &str,
        _receipt: &str,
        _notes: serde_json::Value,
    ) -> Result<ProviderOrder, ServiceError> {
        if amount_minor <= 0 {
            return Err(ServiceError::Validation("Invalid amount".to_string()));
        }
        Ok(ProviderOrder {
            id: "order_scripted".to_string(),
            amount: amount_minor,
            currency: currency.to_string(),
        })
    }

    fn verify_checkout_signature(
        &self,
        _provider_order_id: &str,
        _payment_id: &str,
        signature: &str,
    ) -> Result<bool, ServiceError> {
        Ok(signature == "valid")
    }

    async fn refund(
        &self,
        payment_id: &str,
        amount_minor: Option<i64>,
    ) -> Result<RefundOutcome, ServiceError> {
        self.refund_calls
            .lock()
            .unwrap()
            .push((payment_id.to_string(), amount_minor));

        match self.refund_behavior.lock().unwrap().clone() {
            RefundBehavior::Succeed(id) => Ok(RefundOutcome {
                refund_id: Some(id),
                already_refunded: false,
            }),
            RefundBehavior::AlreadyRefunded => Ok(RefundOutcome {
                refund_id: None,
                already_refunded: true,
            }),
            RefundBehavior::Fail(reason) => Err(ServiceError::GatewayRequest(reason)),
        }
    }

    fn verify_webhook_signature(
        &self,
        _raw_body: &[u8],
        signature: &str,
    ) -> Result<bool, ServiceError> {
        Ok(signature == "valid")
    }
}

/// Mailer double recording each receipt dispatch.
pub struct RecordingMailer {
    pub sent: Mutex<Vec<Uuid>>,
}

impl RecordingMailer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
        })
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send_order_receipt(
        &self,
        _user_id: Uuid,
        order: &order::Model,
    ) -> Result<(), ServiceError> {
        self.sent.lock().unwrap().push(order.id);
        Ok(())
    }
}
