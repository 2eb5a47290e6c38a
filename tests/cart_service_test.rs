mod common;

use rust_decimal_macros::dec;
use std::sync::Arc;
use uuid::Uuid;

use common::setup_db;
use storefront_api::errors::ServiceError;
use storefront_api::services::carts::{CartService, NewCartItem};

fn new_item(quantity: i32) -> NewCartItem {
    NewCartItem {
        product_id: Uuid::new_v4(),
        title: "Linen Shirt".to_string(),
        description: None,
        image: None,
        size: Some("M".to_string()),
        color: Some("white".to_string()),
        quantity,
        unit_price: dec!(1299.00),
        base_price: Some(dec!(1499.00)),
        tax: dec!(0),
        shipping_cost: dec!(0),
        discount: dec!(200.00),
    }
}

#[tokio::test]
async fn adding_same_variant_bumps_quantity() {
    let db = setup_db().await;
    let user_id = Uuid::new_v4();
    let service = CartService::new(Arc::new(db));

    let item = new_item(1);
    let product_id = item.product_id;
    service.add_item(user_id, item).await.expect("first add");

    let mut again = new_item(2);
    again.product_id = product_id;
    let merged = service.add_item(user_id, again).await.expect("second add");

    assert_eq!(merged.quantity, 3);
    assert_eq!(merged.total, Some(dec!(3897.00)));

    let cart = service.get_cart(user_id).await.expect("cart");
    assert_eq!(cart.len(), 1);
}

#[tokio::test]
async fn different_sizes_stay_as_separate_lines() {
    let db = setup_db().await;
    let user_id = Uuid::new_v4();
    let service = CartService::new(Arc::new(db));

    let item = new_item(1);
    let product_id = item.product_id;
    service.add_item(user_id, item).await.expect("add M");

    let mut large = new_item(1);
    large.product_id = product_id;
    large.size = Some("L".to_string());
    service.add_item(user_id, large).await.expect("add L");

    let cart = service.get_cart(user_id).await.expect("cart");
    assert_eq!(cart.len(), 2);
}

#[tokio::test]
async fn quantity_update_recomputes_total() {
    let db = setup_db().await;
    let user_id = Uuid::new_v4();
    let service = CartService::new(Arc::new(db));

    let line = service.add_item(user_id, new_item(1)).await.expect("add");
    let updated = service
        .update_quantity(user_id, line.id, 4)
        .await
        .expect("update");

    assert_eq!(updated.quantity, 4);
    assert_eq!(updated.total, Some(dec!(5196.00)));
}

#[tokio::test]
async fn zero_quantity_is_rejected() {
    let db = setup_db().await;
    let user_id = Uuid::new_v4();
    let service = CartService::new(Arc::new(db));

    let line = service.add_item(user_id, new_item(1)).await.expect("add");
    let err = service
        .update_quantity(user_id, line.id, 0)
        .await
        .expect_err("zero quantity");
    assert!(matches!(err, ServiceError::Validation(_)));
}

#[tokio::test]
async fn users_cannot_touch_each_others_lines() {
    let db = setup_db().await;
    let owner = Uuid::new_v4();
    let intruder = Uuid::new_v4();
    let service = CartService::new(Arc::new(db));

    let line = service.add_item(owner, new_item(1)).await.expect("add");

    let err = service
        .remove_item(intruder, line.id)
        .await
        .expect_err("foreign line");
    assert!(matches!(err, ServiceError::NotFound(_)));

    assert_eq!(service.get_cart(owner).await.expect("cart").len(), 1);
}

#[tokio::test]
async fn clear_cart_removes_all_lines() {
    let db = setup_db().await;
    let user_id = Uuid::new_v4();
    let service = CartService::new(Arc::new(db));

    service.add_item(user_id, new_item(1)).await.expect("add 1");
    service.add_item(user_id, new_item(2)).await.expect("add 2");

    let removed = service.clear_cart(user_id).await.expect("clear");
    assert_eq!(removed, 2);
    assert!(service.get_cart(user_id).await.expect("cart").is_empty());
}
