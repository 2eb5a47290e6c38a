use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ColumnTrait, Condition, EntityTrait, QueryFilter, Set, SqlErr, TransactionTrait};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::db::DbPool;
use crate::entities::order::{DeliveryStatus, GatewayPaymentStatus, OrderStatus, PaymentState};
use crate::entities::{cart_item, ledger_entry, order, order_item};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::carts;
use crate::services::notifications::Mailer;

/// Which cart lines a checkout consumes.
#[derive(Debug, Clone)]
pub enum CheckoutSource {
    /// Every line in the user's cart.
    WholeCart,
    /// Exactly one line, by cart line id.
    SingleLine(Uuid),
    /// An explicit subset of lines ("buy selected").
    SelectedLines(Vec<Uuid>),
}

/// Free-form or structured shipping address, as sent by clients.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ShippingAddress {
    Text(String),
    Structured(AddressFields),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressFields {
    pub name: Option<String>,
    pub street: Option<String>,
    pub address: Option<String>,
    pub apartment: Option<String>,
    pub landmark: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub pin_code: Option<String>,
    pub zip: Option<String>,
    pub postal_code: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub source: CheckoutSource,
    pub payment_method: String,
    /// Gateway payment id, present for prepaid checkouts.
    pub payment_transaction_id: Option<String>,
    /// Gateway order id (e.g. a Razorpay order id).
    pub provider_order_id: Option<String>,
    pub batch_id: Option<String>,
    pub shipping_address: ShippingAddress,
    pub customer_notes: Option<String>,
    pub currency: String,
}

#[derive(Debug)]
pub struct CheckoutOutcome {
    pub orders: Vec<order::Model>,
    pub message: &'static str,
    /// True when every order already existed for the supplied idempotency
    /// key and nothing new was written.
    pub already_existed: bool,
}

/// Flattens a structured address into the single stored line. Empty
/// components are dropped.
pub fn format_shipping_address(address: &ShippingAddress) -> Result<String, ServiceError> {
    let formatted = match address {
        ShippingAddress::Text(text) => text.trim().to_string(),
        ShippingAddress::Structured(fields) => {
            let street = fields.street.as_deref().or(fields.address.as_deref());
            let postal = fields
                .pin_code
                .as_deref()
                .or(fields.zip.as_deref())
                .or(fields.postal_code.as_deref());
            [
                fields.name.as_deref(),
                street,
                fields.apartment.as_deref(),
                fields.landmark.as_deref(),
                fields.city.as_deref(),
                fields.state.as_deref(),
                postal,
                fields.phone.as_deref(),
            ]
            .iter()
            .filter_map(|part| part.map(str::trim).filter(|p| !p.is_empty()))
            .collect::<Vec<_>>()
            .join(", ")
        }
    };

    if formatted.is_empty() {
        return Err(ServiceError::Validation(
            "Shipping address is required".to_string(),
        ));
    }
    Ok(formatted)
}

/// Line total with fallback: precomputed total when the cart carried one,
/// otherwise unit price times quantity.
pub fn line_total(line: &cart_item::Model) -> Decimal {
    line.total
        .unwrap_or_else(|| line.unit_price * Decimal::from(line.quantity))
}

/// Idempotency key for the whole checkout: explicit batch id wins, else the
/// gateway order id.
pub fn derive_batch_id(
    batch_id: Option<&str>,
    provider_order_id: Option<&str>,
) -> Option<String> {
    batch_id
        .map(str::trim)
        .filter(|b| !b.is_empty())
        .or_else(|| provider_order_id.map(str::trim).filter(|p| !p.is_empty()))
        .map(str::to_string)
}

/// Payment state derived from the payment method. Prepaid gateway checkouts
/// arrive already captured; cash-on-delivery settles later.
pub fn payment_mapping(method: &str) -> (PaymentState, GatewayPaymentStatus) {
    match method {
        "razorpay" => (PaymentState::Paid, GatewayPaymentStatus::Completed),
        "cod" => (PaymentState::Pending, GatewayPaymentStatus::Pending),
        _ => (PaymentState::Unpaid, GatewayPaymentStatus::Pending),
    }
}

pub fn generate_order_number() -> String {
    let raw = Uuid::new_v4().simple().to_string();
    format!("ORD-{}", raw[..8].to_uppercase())
}

struct PlacedOrder {
    order: order::Model,
    existed: bool,
}

/// Checkout orchestrator: converts cart lines into orders with payment
/// snapshots, idempotent on the per-line (user, batch id) key.
#[derive(Clone)]
pub struct CheckoutService {
    db: Arc<DbPool>,
    mailer: Arc<dyn Mailer>,
    event_sender: EventSender,
}

impl CheckoutService {
    pub fn new(db: Arc<DbPool>, mailer: Arc<dyn Mailer>, event_sender: EventSender) -> Self {
        Self {
            db,
            mailer,
            event_sender,
        }
    }

    #[instrument(skip(self, request))]
    pub async fn checkout(
        &self,
        user_id: Uuid,
        request: CheckoutRequest,
    ) -> Result<CheckoutOutcome, ServiceError> {
        let lines = self.load_lines(user_id, &request.source).await?;
        let shipping_address = format_shipping_address(&request.shipping_address)?;
        let base_batch = derive_batch_id(
            request.batch_id.as_deref(),
            request.provider_order_id.as_deref(),
        );

        let multi = lines.len() > 1;
        let mut placed: Vec<PlacedOrder> = Vec::with_capacity(lines.len());
        for line in &lines {
            // Per-line batch ids keep each line independently idempotent when
            // one checkout fans out into several orders.
            let batch = match (&base_batch, multi) {
                (Some(base), true) => Some(format!("{}-{}", base, line.id)),
                (Some(base), false) => Some(base.clone()),
                (None, _) => None,
            };
            let order = self
                .place_order_for_line(user_id, line, batch, &request, &shipping_address)
                .await?;
            placed.push(order);
        }

        let all_existed = placed.iter().all(|p| p.existed);
        if !all_existed {
            let consumed: Vec<Uuid> = lines.iter().map(|l| l.id).collect();
            // Cart cleanup comes last so a failure before this point leaves
            // the cart intact for a retry.
            if let Err(err) = carts::delete_lines(&*self.db, &consumed).await {
                warn!(%user_id, error = %err, "failed to clear consumed cart lines");
            }

            for p in placed.iter().filter(|p| !p.existed) {
                let _ = self
                    .event_sender
                    .send(Event::OrderCreated(p.order.id))
                    .await;
            }
            let _ = self
                .event_sender
                .send(Event::CheckoutCompleted {
                    user_id,
                    order_ids: placed.iter().map(|p| p.order.id).collect(),
                })
                .await;
        }

        let message = if all_existed {
            "Order already exists"
        } else if multi {
            "Orders placed successfully"
        } else {
            "Order placed successfully"
        };

        info!(
            %user_id,
            orders = placed.len(),
            already_existed = all_existed,
            "checkout completed"
        );

        Ok(CheckoutOutcome {
            orders: placed.into_iter().map(|p| p.order).collect(),
            message,
            already_existed: all_existed,
        })
    }

    async fn load_lines(
        &self,
        user_id: Uuid,
        source: &CheckoutSource,
    ) -> Result<Vec<cart_item::Model>, ServiceError> {
        match source {
            CheckoutSource::WholeCart => {
                let lines = carts::lines_for_user(&*self.db, user_id).await?;
                if lines.is_empty() {
                    return Err(ServiceError::EmptyCart);
                }
                Ok(lines)
            }
            CheckoutSource::SingleLine(cart_id) => {
                let line = carts::line_by_id(&*self.db, user_id, *cart_id)
                    .await?
                    .ok_or_else(|| ServiceError::NotFound("Cart item not found".to_string()))?;
                Ok(vec![line])
            }
            CheckoutSource::SelectedLines(cart_ids) => {
                if cart_ids.is_empty() {
                    return Err(ServiceError::Validation(
                        "cartIds array is required".to_string(),
                    ));
                }
                let lines = carts::lines_by_ids(&*self.db, user_id, cart_ids).await?;
                if lines.is_empty() {
                    return Err(ServiceError::NotFound(
                        "No cart items found for given IDs".to_string(),
                    ));
                }
                Ok(lines)
            }
        }
    }

    async fn place_order_for_line(
        &self,
        user_id: Uuid,
        line: &cart_item::Model,
        batch: Option<String>,
        request: &CheckoutRequest,
        shipping_address: &str,
    ) -> Result<PlacedOrder, ServiceError> {
        // Idempotency pre-check on the per-line key. Matching the raw gateway
        // payment id here would let line 1's order satisfy line 2's check in a
        // multi-line prepaid checkout, so only the per-line key is compared.
        if let Some(existing) = self.find_existing(user_id, batch.as_deref()).await? {
            return Ok(PlacedOrder {
                order: existing,
                existed: true,
            });
        }

        let total_price = line_total(line);
        let (payment_status, gateway_status) = payment_mapping(&request.payment_method);
        let payment_amount = match request.payment_method.as_str() {
            "razorpay" | "cod" => total_price,
            _ => Decimal::ZERO,
        };
        let payment_provider = match request.payment_method.as_str() {
            "razorpay" | "cod" => Some(request.payment_method.clone()),
            _ => None,
        };

        let order_id = Uuid::new_v4();
        let now = Utc::now();
        let order_model = order::ActiveModel {
            id: Set(order_id),
            order_number: Set(generate_order_number()),
            user_id: Set(user_id),
            status: Set(OrderStatus::Pending),
            delivery_status: Set(DeliveryStatus::Pending),
            payment_status: Set(payment_status),
            total_amount: Set(total_price),
            currency: Set(request.currency.clone()),
            shipping_address: Set(shipping_address.to_string()),
            batch_id: Set(batch.clone()),
            payment_provider: Set(payment_provider),
            payment_transaction_id: Set(request.payment_transaction_id.clone()),
            provider_order_id: Set(request.provider_order_id.clone()),
            payment_amount: Set(payment_amount),
            payment_date: Set((payment_status == PaymentState::Paid).then_some(now)),
            gateway_payment_status: Set(gateway_status),
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
            customer_notes: Set(request.customer_notes.clone()),
            is_deleted: Set(false),
            deleted_at: Set(None),
            created_at: Set(now),
            updated_at: Set(None),
            version: Set(1),
        };

        let item_model = order_item::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order_id),
            product_id: Set(line.product_id),
            name: Set(line.title.clone()),
            description: Set(line.description.clone()),
            image: Set(line.image.clone()),
            quantity: Set(line.quantity),
            unit_price: Set(line.unit_price),
            base_price: Set(line.base_price.unwrap_or(line.unit_price)),
            tax: Set(line.tax),
            shipping_cost: Set(line.shipping_cost),
            discount: Set(line.discount),
            total_price: Set(total_price),
            created_at: Set(now),
        };

        let insert_result: Result<order::Model, sea_orm::DbErr> = async {
            let txn = self.db.begin().await?;
            let created = order_model.insert(&txn).await?;
            item_model.insert(&txn).await?;
            txn.commit().await?;
            Ok(created)
        }
        .await;

        let created = match insert_result {
            Ok(created) => created,
            // A concurrent checkout with the same batch id beat us to the
            // unique index; the winner's order is the answer.
            Err(err) if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
                if let Some(existing) = self.find_existing(user_id, batch.as_deref()).await? {
                    return Ok(PlacedOrder {
                        order: existing,
                        existed: true,
                    });
                }
                return Err(ServiceError::Database(err));
            }
            Err(err) => return Err(ServiceError::Database(err)),
        };

        self.record_ledger_entry(&created).await;
        if created.payment_status == PaymentState::Paid {
            if let Err(err) = self.mailer.send_order_receipt(user_id, &created).await {
                error!(order_id = %created.id, error = %err, "receipt dispatch failed");
            }
        }

        Ok(PlacedOrder {
            order: created,
            existed: false,
        })
    }

    /// Looks up an order already placed under the per-line idempotency key.
    /// Legacy clients sent the key as the payment transaction id, so both
    /// columns are compared against the same key.
    async fn find_existing(
        &self,
        user_id: Uuid,
        key: Option<&str>,
    ) -> Result<Option<order::Model>, ServiceError> {
        let Some(key) = key else {
            return Ok(None);
        };

        let existing = order::Entity::find()
            .filter(order::Column::UserId.eq(user_id))
            .filter(
                Condition::any()
                    .add(order::Column::BatchId.eq(key))
                    .add(order::Column::PaymentTransactionId.eq(key)),
            )
            .one(&*self.db)
            .await?;
        Ok(existing)
    }

    /// Best-effort financial ledger row; duplicate or failed inserts are
    /// logged and ignored.
    async fn record_ledger_entry(&self, order: &order::Model) {
        let entry = ledger_entry::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order.id),
            user_id: Set(order.user_id),
            amount: Set(order.total_amount),
            currency: Set(order.currency.clone()),
            description: Set(format!("Order {} placed", order.order_number)),
            created_at: Set(Utc::now()),
        };
        if let Err(err) = entry.insert(&*self.db).await {
            warn!(order_id = %order.id, error = %err, "ledger entry insert failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn cart_line(quantity: i32, unit_price: Decimal, total: Option<Decimal>) -> cart_item::Model {
        cart_item::Model {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            title: "Canvas Tote".to_string(),
            description: None,
            image: None,
            size: None,
            color: None,
            quantity,
            unit_price,
            base_price: None,
            tax: Decimal::ZERO,
            shipping_cost: Decimal::ZERO,
            discount: Decimal::ZERO,
            total,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn structured_address_joins_nonempty_parts() {
        let address = ShippingAddress::Structured(AddressFields {
            name: Some("Asha Rao".to_string()),
            street: Some("12 MG Road".to_string()),
            apartment: Some("".to_string()),
            city: Some("Bengaluru".to_string()),
            state: Some("KA".to_string()),
            pin_code: Some("560001".to_string()),
            phone: Some("+91 98765 43210".to_string()),
            ..Default::default()
        });

        let formatted = format_shipping_address(&address).unwrap();
        assert_eq!(
            formatted,
            "Asha Rao, 12 MG Road, Bengaluru, KA, 560001, +91 98765 43210"
        );
    }

    #[test]
    fn structured_address_falls_back_to_zip_and_address_aliases() {
        let address = ShippingAddress::Structured(AddressFields {
            address: Some("5 Lake View".to_string()),
            zip: Some("400001".to_string()),
            city: Some("Mumbai".to_string()),
            ..Default::default()
        });

        let formatted = format_shipping_address(&address).unwrap();
        assert_eq!(formatted, "5 Lake View, Mumbai, 400001");
    }

    #[test]
    fn empty_address_is_rejected() {
        let err = format_shipping_address(&ShippingAddress::Text("  ".to_string())).unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[test]
    fn line_total_prefers_precomputed_total() {
        let line = cart_line(3, dec!(100), Some(dec!(280)));
        assert_eq!(line_total(&line), dec!(280));
    }

    #[test]
    fn line_total_falls_back_to_unit_price_times_quantity() {
        let line = cart_line(3, dec!(100), None);
        assert_eq!(line_total(&line), dec!(300));
    }

    #[test]
    fn batch_id_prefers_explicit_over_provider_order() {
        assert_eq!(
            derive_batch_id(Some("batch-1"), Some("order_xyz")),
            Some("batch-1".to_string())
        );
        assert_eq!(
            derive_batch_id(None, Some("order_xyz")),
            Some("order_xyz".to_string())
        );
        assert_eq!(derive_batch_id(Some("  "), None), None);
    }

    #[test]
    fn payment_mapping_by_method() {
        assert_eq!(
            payment_mapping("razorpay"),
            (PaymentState::Paid, GatewayPaymentStatus::Completed)
        );
        assert_eq!(
            payment_mapping("cod"),
            (PaymentState::Pending, GatewayPaymentStatus::Pending)
        );
        assert_eq!(
            payment_mapping("bank_transfer"),
            (PaymentState::Unpaid, GatewayPaymentStatus::Pending)
        );
    }

    #[test]
    fn order_numbers_carry_prefix_and_length() {
        let number = generate_order_number();
        assert!(number.starts_with("ORD-"));
        assert_eq!(number.len(), 12);
    }
}
