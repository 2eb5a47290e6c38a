mod common;

use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter};
use std::sync::Arc;
use uuid::Uuid;

use common::{cart_line_fixture, event_sender, setup_db, RecordingMailer};
use storefront_api::entities::order::{GatewayPaymentStatus, OrderStatus, PaymentState};
use storefront_api::entities::{cart_item, ledger_entry, order, order_item};
use storefront_api::errors::ServiceError;
use storefront_api::services::checkout::{
    CheckoutRequest, CheckoutService, CheckoutSource, ShippingAddress,
};

fn request(source: CheckoutSource, payment_method: &str) -> CheckoutRequest {
    CheckoutRequest {
        source,
        payment_method: payment_method.to_string(),
        payment_transaction_id: None,
        provider_order_id: None,
        batch_id: None,
        shipping_address: ShippingAddress::Text("42 Test Lane, Bengaluru".to_string()),
        customer_notes: None,
        currency: "INR".to_string(),
    }
}

fn service(db: sea_orm::DatabaseConnection, mailer: Arc<RecordingMailer>) -> CheckoutService {
    CheckoutService::new(Arc::new(db), mailer, event_sender())
}

#[tokio::test]
async fn whole_cart_with_one_line_places_single_order() {
    let db = setup_db().await;
    let user_id = Uuid::new_v4();
    cart_line_fixture(user_id, dec!(199.00), 2)
        .insert(&db)
        .await
        .expect("cart line");

    let mailer = RecordingMailer::new();
    let svc = service(db.clone(), mailer.clone());

    let outcome = svc
        .checkout(user_id, request(CheckoutSource::WholeCart, "cod"))
        .await
        .expect("checkout");

    assert_eq!(outcome.message, "Order placed successfully");
    assert_eq!(outcome.orders.len(), 1);
    assert!(!outcome.already_existed);

    let placed = &outcome.orders[0];
    assert_eq!(placed.status, OrderStatus::Pending);
    assert_eq!(placed.payment_status, PaymentState::Pending);
    assert_eq!(placed.total_amount, dec!(398.00));
    assert!(placed.order_number.starts_with("ORD-"));

    // Snapshot line exists.
    let items = order_item::Entity::find()
        .filter(order_item::Column::OrderId.eq(placed.id))
        .all(&db)
        .await
        .expect("items");
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].quantity, 2);
    assert_eq!(items[0].total_price, dec!(398.00));

    // Ledger row exists; cart is now empty.
    let ledger = ledger_entry::Entity::find()
        .filter(ledger_entry::Column::OrderId.eq(placed.id))
        .one(&db)
        .await
        .expect("ledger query");
    assert!(ledger.is_some());

    let remaining = cart_item::Entity::find()
        .filter(cart_item::Column::UserId.eq(user_id))
        .all(&db)
        .await
        .expect("cart query");
    assert!(remaining.is_empty());

    // Cash on delivery sends no receipt yet.
    assert_eq!(mailer.sent_count(), 0);
}

#[tokio::test]
async fn multi_line_cart_fans_out_into_one_order_per_line() {
    let db = setup_db().await;
    let user_id = Uuid::new_v4();
    let line_a = cart_line_fixture(user_id, dec!(100.00), 1)
        .insert(&db)
        .await
        .expect("line a");
    let line_b = cart_line_fixture(user_id, dec!(250.00), 1)
        .insert(&db)
        .await
        .expect("line b");

    let svc = service(db.clone(), RecordingMailer::new());

    let mut req = request(CheckoutSource::WholeCart, "cod");
    req.batch_id = Some("batch-42".to_string());
    let outcome = svc.checkout(user_id, req).await.expect("checkout");

    assert_eq!(outcome.message, "Orders placed successfully");
    assert_eq!(outcome.orders.len(), 2);

    let mut batches: Vec<String> = outcome
        .orders
        .iter()
        .map(|o| o.batch_id.clone().expect("batch set"))
        .collect();
    batches.sort();
    let mut expected = vec![
        format!("batch-42-{}", line_a.id),
        format!("batch-42-{}", line_b.id),
    ];
    expected.sort();
    assert_eq!(batches, expected);
}

#[tokio::test]
async fn checkout_is_idempotent_on_batch_id() {
    let db = setup_db().await;
    let user_id = Uuid::new_v4();
    cart_line_fixture(user_id, dec!(500.00), 1)
        .insert(&db)
        .await
        .expect("cart line");

    let svc = service(db.clone(), RecordingMailer::new());

    let mut req = request(CheckoutSource::WholeCart, "cod");
    req.batch_id = Some("batch-idem".to_string());
    let first = svc.checkout(user_id, req).await.expect("first checkout");
    let first_id = first.orders[0].id;

    // The client retries with the same batch id and a re-added line.
    cart_line_fixture(user_id, dec!(500.00), 1)
        .insert(&db)
        .await
        .expect("re-added line");
    let mut retry = request(CheckoutSource::WholeCart, "cod");
    retry.batch_id = Some("batch-idem".to_string());
    let second = svc.checkout(user_id, retry).await.expect("retry");

    assert!(second.already_existed);
    assert_eq!(second.message, "Order already exists");
    assert_eq!(second.orders[0].id, first_id);

    let total_orders = order::Entity::find().all(&db).await.expect("orders");
    assert_eq!(total_orders.len(), 1);
}

#[tokio::test]
async fn multi_line_razorpay_places_one_order_per_line() {
    let db = setup_db().await;
    let user_id = Uuid::new_v4();
    cart_line_fixture(user_id, dec!(100.00), 1)
        .insert(&db)
        .await
        .expect("line a");
    cart_line_fixture(user_id, dec!(250.00), 1)
        .insert(&db)
        .await
        .expect("line b");

    let mailer = RecordingMailer::new();
    let svc = service(db.clone(), mailer.clone());

    // Both lines share the gateway payment id; that must not let line one's
    // order satisfy line two's idempotency check.
    let mut req = request(CheckoutSource::WholeCart, "razorpay");
    req.payment_transaction_id = Some("pay_multi".to_string());
    req.provider_order_id = Some("order_multi".to_string());
    let outcome = svc.checkout(user_id, req).await.expect("checkout");

    assert!(!outcome.already_existed);
    assert_eq!(outcome.orders.len(), 2);

    let stored = order::Entity::find().all(&db).await.expect("orders");
    assert_eq!(stored.len(), 2);
    for placed in &stored {
        assert_eq!(placed.payment_status, PaymentState::Paid);
        assert_eq!(placed.payment_transaction_id.as_deref(), Some("pay_multi"));
        assert!(placed
            .batch_id
            .as_deref()
            .expect("batch set")
            .starts_with("order_multi-"));
    }

    let remaining = cart_item::Entity::find()
        .filter(cart_item::Column::UserId.eq(user_id))
        .all(&db)
        .await
        .expect("cart query");
    assert!(remaining.is_empty());
    assert_eq!(mailer.sent_count(), 2);
}

#[tokio::test]
async fn razorpay_checkout_is_idempotent_on_payment_id() {
    let db = setup_db().await;
    let user_id = Uuid::new_v4();
    cart_line_fixture(user_id, dec!(999.00), 1)
        .insert(&db)
        .await
        .expect("cart line");

    let svc = service(db.clone(), RecordingMailer::new());

    let mut req = request(CheckoutSource::WholeCart, "razorpay");
    req.payment_transaction_id = Some("pay_xyz".to_string());
    req.provider_order_id = Some("order_prov_1".to_string());
    let first = svc.checkout(user_id, req).await.expect("first checkout");

    cart_line_fixture(user_id, dec!(999.00), 1)
        .insert(&db)
        .await
        .expect("re-added line");
    let mut retry = request(CheckoutSource::WholeCart, "razorpay");
    retry.payment_transaction_id = Some("pay_xyz".to_string());
    retry.provider_order_id = Some("order_prov_1".to_string());
    let second = svc.checkout(user_id, retry).await.expect("retry");

    assert!(second.already_existed);
    assert_eq!(second.orders[0].id, first.orders[0].id);
}

#[tokio::test]
async fn razorpay_checkout_marks_paid_and_sends_receipt() {
    let db = setup_db().await;
    let user_id = Uuid::new_v4();
    cart_line_fixture(user_id, dec!(350.00), 1)
        .insert(&db)
        .await
        .expect("cart line");

    let mailer = RecordingMailer::new();
    let svc = service(db.clone(), mailer.clone());

    let mut req = request(CheckoutSource::WholeCart, "razorpay");
    req.payment_transaction_id = Some("pay_rcpt".to_string());
    req.provider_order_id = Some("order_prov_2".to_string());
    let outcome = svc.checkout(user_id, req).await.expect("checkout");

    let placed = &outcome.orders[0];
    assert_eq!(placed.payment_status, PaymentState::Paid);
    assert_eq!(placed.gateway_payment_status, GatewayPaymentStatus::Completed);
    assert_eq!(placed.payment_amount, dec!(350.00));
    assert_eq!(placed.payment_provider.as_deref(), Some("razorpay"));
    assert!(placed.payment_date.is_some());
    assert_eq!(placed.batch_id.as_deref(), Some("order_prov_2"));

    assert_eq!(mailer.sent_count(), 1);
}

#[tokio::test]
async fn empty_cart_is_rejected() {
    let db = setup_db().await;
    let svc = service(db, RecordingMailer::new());

    let err = svc
        .checkout(Uuid::new_v4(), request(CheckoutSource::WholeCart, "cod"))
        .await
        .expect_err("empty cart");
    assert!(matches!(err, ServiceError::EmptyCart));
}

#[tokio::test]
async fn missing_single_cart_line_is_not_found() {
    let db = setup_db().await;
    let svc = service(db, RecordingMailer::new());

    let err = svc
        .checkout(
            Uuid::new_v4(),
            request(CheckoutSource::SingleLine(Uuid::new_v4()), "cod"),
        )
        .await
        .expect_err("missing line");
    match err {
        ServiceError::NotFound(msg) => assert_eq!(msg, "Cart item not found"),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn selected_lines_checkout_consumes_only_selection() {
    let db = setup_db().await;
    let user_id = Uuid::new_v4();
    let selected = cart_line_fixture(user_id, dec!(120.00), 1)
        .insert(&db)
        .await
        .expect("selected line");
    let kept = cart_line_fixture(user_id, dec!(60.00), 1)
        .insert(&db)
        .await
        .expect("kept line");

    let svc = service(db.clone(), RecordingMailer::new());

    let outcome = svc
        .checkout(
            user_id,
            request(CheckoutSource::SelectedLines(vec![selected.id]), "cod"),
        )
        .await
        .expect("checkout");
    assert_eq!(outcome.orders.len(), 1);

    let remaining = cart_item::Entity::find()
        .filter(cart_item::Column::UserId.eq(user_id))
        .all(&db)
        .await
        .expect("cart query");
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, kept.id);
}

#[tokio::test]
async fn selected_lines_with_unknown_ids_is_not_found() {
    let db = setup_db().await;
    let svc = service(db, RecordingMailer::new());

    let err = svc
        .checkout(
            Uuid::new_v4(),
            request(
                CheckoutSource::SelectedLines(vec![Uuid::new_v4(), Uuid::new_v4()]),
                "cod",
            ),
        )
        .await
        .expect_err("unknown ids");
    match err {
        ServiceError::NotFound(msg) => assert_eq!(msg, "No cart items found for given IDs"),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn unknown_payment_method_leaves_order_unpaid() {
    let db = setup_db().await;
    let user_id = Uuid::new_v4();
    cart_line_fixture(user_id, dec!(80.00), 1)
        .insert(&db)
        .await
        .expect("cart line");

    let svc = service(db, RecordingMailer::new());
    let outcome = svc
        .checkout(user_id, request(CheckoutSource::WholeCart, "bank_transfer"))
        .await
        .expect("checkout");

    let placed = &outcome.orders[0];
    assert_eq!(placed.payment_status, PaymentState::Unpaid);
    assert_eq!(placed.payment_amount, dec!(0));
    assert!(placed.payment_provider.is_none());
}
