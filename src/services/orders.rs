use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::db::DbPool;
use crate::entities::order::{
    self, DeliveryStatus, OrderStatus, PaymentState, DELIVERY_FLOW, STATUS_FLOW,
};
use crate::entities::order_audit::{self, AuditMeta};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::payments::PaymentGateway;

/// Outcome of a lifecycle transition. `changed == false` marks the
/// idempotent short-circuit: the order was already in the requested state
/// and nothing was written.
#[derive(Debug)]
pub struct TransitionOutcome {
    pub order: order::Model,
    pub message: String,
    pub changed: bool,
    pub next_action: Option<&'static str>,
}

/// Outcome of a cancellation, including refund details when one was issued.
#[derive(Debug)]
pub struct CancelOutcome {
    pub order: order::Model,
    pub refund_id: Option<String>,
    pub refund_initiated: bool,
}

/// Who is asking for the cancellation. Customers face the stricter rule:
/// no cancellation once the order has shipped.
#[derive(Debug, Clone, Copy)]
pub enum CancelActor {
    Customer(Uuid),
    Admin(Uuid),
}

impl CancelActor {
    fn id(&self) -> Uuid {
        match self {
            Self::Customer(id) | Self::Admin(id) => *id,
        }
    }

    fn is_admin(&self) -> bool {
        matches!(self, Self::Admin(_))
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Customer(_) => "user",
            Self::Admin(_) => "admin",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ShipDetails {
    pub tracking_number: Option<String>,
    pub carrier: Option<String>,
    pub carrier_url: Option<String>,
    pub courier_phone: Option<String>,
    pub courier_logo_url: Option<String>,
    pub expected_delivery_date: Option<DateTime<Utc>>,
    pub admin_notes: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct DeliverParams {
    pub delivery_proof: Option<String>,
    pub admin_notes: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CancelParams {
    pub reason: String,
    pub admin_notes: Option<String>,
    /// Admin-only partial refund override, in currency units.
    pub refund_amount: Option<Decimal>,
}

/// Courier detail patch. A provided field replaces the stored value;
/// a provided empty string clears it.
#[derive(Debug, Clone, Default)]
pub struct CourierUpdate {
    pub carrier: Option<String>,
    pub carrier_url: Option<String>,
    pub courier_phone: Option<String>,
    pub courier_logo_url: Option<String>,
    pub admin_notes: Option<String>,
}

/// Precondition check result for the forward transitions.
#[derive(Debug, PartialEq, Eq)]
pub enum Precheck {
    Proceed,
    /// The order is already in the requested state; succeed without writing.
    AlreadyDone(&'static str),
}

fn guard(condition: bool, reason: &str) -> Result<(), ServiceError> {
    if condition {
        Err(ServiceError::InvalidTransition(reason.to_string()))
    } else {
        Ok(())
    }
}

pub fn check_verify(order: &order::Model) -> Result<Precheck, ServiceError> {
    guard(order.is_deleted, "Order is deleted")?;
    guard(
        order.status == OrderStatus::Cancelled,
        "Cannot verify cancelled order",
    )?;
    guard(
        order.status == OrderStatus::Completed,
        "Cannot verify completed order",
    )?;
    if order.is_verified {
        return Ok(Precheck::AlreadyDone("Order already verified"));
    }
    Ok(Precheck::Proceed)
}

pub fn check_pack(order: &order::Model) -> Result<Precheck, ServiceError> {
    guard(order.is_deleted, "Order is deleted")?;
    guard(!order.is_verified, "Order must be verified before packing")?;
    guard(
        order.status == OrderStatus::Cancelled,
        "Cannot pack cancelled order",
    )?;
    guard(
        order.status == OrderStatus::Completed,
        "Cannot pack completed order",
    )?;
    guard(
        matches!(
            order.delivery_status,
            DeliveryStatus::Shipped | DeliveryStatus::Delivered
        ),
        "Cannot pack shipped/delivered order",
    )?;
    if order.packed_at.is_some() {
        return Ok(Precheck::AlreadyDone("Order already packed"));
    }
    Ok(Precheck::Proceed)
}

pub fn check_ship(order: &order::Model) -> Result<Precheck, ServiceError> {
    guard(order.is_deleted, "Order is deleted")?;
    guard(!order.is_verified, "Order must be verified before shipping")?;
    guard(
        order.packed_at.is_none(),
        "Order must be packed before shipping",
    )?;
    guard(
        order.status == OrderStatus::Cancelled,
        "Cannot ship cancelled order",
    )?;
    guard(
        order.status == OrderStatus::Completed,
        "Cannot ship completed order",
    )?;
    guard(
        order.delivery_status == DeliveryStatus::Delivered,
        "Order is already delivered",
    )?;
    if order.delivery_status == DeliveryStatus::Shipped {
        return Ok(Precheck::AlreadyDone("Order is already shipped"));
    }
    Ok(Precheck::Proceed)
}

pub fn check_deliver(order: &order::Model) -> Result<Precheck, ServiceError> {
    guard(order.is_deleted, "Order is deleted")?;
    guard(
        !order.is_verified,
        "Order must be verified before marking as delivered",
    )?;
    guard(
        order.packed_at.is_none(),
        "Order must be packed before marking as delivered",
    )?;
    guard(
        order.status == OrderStatus::Cancelled,
        "Cannot deliver cancelled order",
    )?;
    if order.delivery_status == DeliveryStatus::Delivered || order.status == OrderStatus::Completed
    {
        return Ok(Precheck::AlreadyDone("Order is already delivered"));
    }
    guard(
        order.delivery_status != DeliveryStatus::Shipped,
        "Order must be shipped before marking as delivered",
    )?;
    Ok(Precheck::Proceed)
}

pub fn check_cancel(order: &order::Model, actor_is_admin: bool) -> Result<(), ServiceError> {
    guard(
        order.status == OrderStatus::Cancelled,
        "Order already cancelled.",
    )?;
    guard(
        order.status == OrderStatus::Completed || order.delivery_status == DeliveryStatus::Delivered,
        "Completed/Delivered order cannot be cancelled.",
    )?;
    if !actor_is_admin {
        guard(
            order.delivery_status == DeliveryStatus::Shipped,
            "Cannot cancel order after shipping. Please contact support.",
        )?;
    }
    Ok(())
}

/// Computes the one-step-back target for a revert. The delivery flow omits
/// `confirmed`, so reverting a just-verified order lands back on `pending`.
pub fn check_revert(
    order: &order::Model,
) -> Result<(OrderStatus, DeliveryStatus), ServiceError> {
    guard(order.is_deleted, "Cannot revert deleted order")?;

    let status_index = STATUS_FLOW.iter().position(|s| *s == order.status);
    let Some(status_index) = status_index.filter(|i| *i > 0) else {
        return Err(ServiceError::InvalidTransition(
            "Cannot revert order in pending status".to_string(),
        ));
    };

    let delivery_index = DELIVERY_FLOW
        .iter()
        .position(|s| *s == order.delivery_status);
    let previous_delivery = match delivery_index {
        Some(i) if i > 0 => DELIVERY_FLOW[i - 1],
        _ => DeliveryStatus::Pending,
    };

    Ok((STATUS_FLOW[status_index - 1], previous_delivery))
}

pub fn is_http_url(value: &str) -> bool {
    let lower = value.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

pub fn is_valid_phone(value: &str) -> bool {
    let digits = value.chars().filter(|c| c.is_ascii_digit()).count();
    (6..=15).contains(&digits)
}

/// Normalizes an optional patch value: trims, maps empty to clear.
fn norm_patch(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Order lifecycle service: guarded transitions, append-only audit trail,
/// and refund-gated cancellation.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DbPool>,
    gateway: Arc<dyn PaymentGateway>,
    event_sender: EventSender,
}

impl OrderService {
    pub fn new(db: Arc<DbPool>, gateway: Arc<dyn PaymentGateway>, event_sender: EventSender) -> Self {
        Self {
            db,
            gateway,
            event_sender,
        }
    }

    /// Customer view: own orders, newest first, soft-deleted excluded.
    #[instrument(skip(self))]
    pub async fn get_user_orders(&self, user_id: Uuid) -> Result<Vec<order::Model>, ServiceError> {
        let orders = order::Entity::find()
            .filter(order::Column::UserId.eq(user_id))
            .filter(order::Column::IsDeleted.eq(false))
            .order_by_desc(order::Column::CreatedAt)
            .all(&*self.db)
            .await?;
        Ok(orders)
    }

    #[instrument(skip(self))]
    pub async fn get_user_order(
        &self,
        user_id: Uuid,
        order_id: Uuid,
    ) -> Result<order::Model, ServiceError> {
        order::Entity::find_by_id(order_id)
            .filter(order::Column::UserId.eq(user_id))
            .filter(order::Column::IsDeleted.eq(false))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Order not found".to_string()))
    }

    /// Admin list: every non-deleted order, newest first, paginated.
    #[instrument(skip(self))]
    pub async fn list_orders(
        &self,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<order::Model>, u64), ServiceError> {
        let paginator = order::Entity::find()
            .filter(order::Column::IsDeleted.eq(false))
            .order_by_desc(order::Column::CreatedAt)
            .paginate(&*self.db, per_page.max(1));
        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page).await?;
        Ok((orders, total))
    }

    /// Admin fetch: deleted orders are still found so the guards can report
    /// "Order is deleted" rather than a misleading 404.
    async fn find_order(&self, order_id: Uuid) -> Result<order::Model, ServiceError> {
        order::Entity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Order not found".to_string()))
    }

    /// Persists the mutated order and its audit row in one transaction.
    async fn commit_with_audit(
        &self,
        mut active: order::ActiveModel,
        version: i32,
        order_id: Uuid,
        actor_id: Uuid,
        meta: AuditMeta,
    ) -> Result<order::Model, ServiceError> {
        active.updated_at = Set(Some(Utc::now()));
        active.version = Set(version + 1);

        let txn = self.db.begin().await?;
        let updated = active.update(&txn).await?;

        order_audit::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order_id),
            action: Set(meta.action()),
            actor_id: Set(Some(actor_id)),
            recorded_at: Set(Utc::now()),
            meta: Set(serde_json::to_value(&meta)
                .map_err(|e| ServiceError::Internal(format!("audit meta encoding: {}", e)))?),
        }
        .insert(&txn)
        .await?;

        txn.commit().await?;
        Ok(updated)
    }

    async fn emit_status_change(&self, order_id: Uuid, old: OrderStatus, new: OrderStatus) {
        let _ = self
            .event_sender
            .send(Event::OrderStatusChanged {
                order_id,
                old_status: old.to_string(),
                new_status: new.to_string(),
            })
            .await;
    }

    #[instrument(skip(self))]
    pub async fn verify_order(
        &self,
        order_id: Uuid,
        actor_id: Uuid,
        admin_notes: Option<String>,
    ) -> Result<TransitionOutcome, ServiceError> {
        let order = self.find_order(order_id).await?;
        if let Precheck::AlreadyDone(msg) = check_verify(&order)? {
            return Ok(TransitionOutcome {
                order,
                message: msg.to_string(),
                changed: false,
                next_action: None,
            });
        }

        let old_status = order.status;
        let version = order.version;
        let mut active: order::ActiveModel = order.into();
        active.is_verified = Set(true);
        active.verified_at = Set(Some(Utc::now()));
        active.verified_by = Set(Some(actor_id));
        active.status = Set(OrderStatus::Verified);
        active.delivery_status = Set(DeliveryStatus::Confirmed);
        if let Some(notes) = admin_notes.clone() {
            active.admin_notes = Set(Some(notes));
        }

        let meta = AuditMeta::Verified { admin_notes };
        let updated = self
            .commit_with_audit(active, version, order_id, actor_id, meta)
            .await?;
        self.emit_status_change(order_id, old_status, OrderStatus::Verified)
            .await;

        info!(%order_id, %actor_id, "order verified");
        Ok(TransitionOutcome {
            order: updated,
            message: "Order verified successfully".to_string(),
            changed: true,
            next_action: Some("pack"),
        })
    }

    #[instrument(skip(self))]
    pub async fn pack_order(
        &self,
        order_id: Uuid,
        actor_id: Uuid,
        admin_notes: Option<String>,
    ) -> Result<TransitionOutcome, ServiceError> {
        let order = self.find_order(order_id).await?;
        if let Precheck::AlreadyDone(msg) = check_pack(&order)? {
            return Ok(TransitionOutcome {
                order,
                message: msg.to_string(),
                changed: false,
                next_action: None,
            });
        }

        let old_status = order.status;
        let version = order.version;
        let mut active: order::ActiveModel = order.into();
        active.packed_at = Set(Some(Utc::now()));
        active.status = Set(OrderStatus::Packed);
        active.delivery_status = Set(DeliveryStatus::PackingComplete);
        if let Some(notes) = admin_notes.clone() {
            active.admin_notes = Set(Some(notes));
        }

        let meta = AuditMeta::Packed { admin_notes };
        let updated = self
            .commit_with_audit(active, version, order_id, actor_id, meta)
            .await?;
        self.emit_status_change(order_id, old_status, OrderStatus::Packed)
            .await;

        Ok(TransitionOutcome {
            order: updated,
            message: "Order packed successfully. Ready for shipping.".to_string(),
            changed: true,
            next_action: Some("ship"),
        })
    }

    #[instrument(skip(self, details))]
    pub async fn ship_order(
        &self,
        order_id: Uuid,
        actor_id: Uuid,
        details: ShipDetails,
    ) -> Result<TransitionOutcome, ServiceError> {
        let order = self.find_order(order_id).await?;
        if let Precheck::AlreadyDone(msg) = check_ship(&order)? {
            return Ok(TransitionOutcome {
                order,
                message: msg.to_string(),
                changed: false,
                next_action: None,
            });
        }

        let tracking_number = details
            .tracking_number
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                ServiceError::Validation("Tracking number is required for shipping".to_string())
            })?
            .to_string();
        let carrier = details
            .carrier
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| {
                ServiceError::Validation(
                    "Courier name (carrier) is required for shipping".to_string(),
                )
            })?
            .to_string();

        if let Some(url) = details.carrier_url.as_deref().filter(|u| !u.is_empty()) {
            if !is_http_url(url) {
                return Err(ServiceError::Validation(
                    "carrierUrl must start with http or https".to_string(),
                ));
            }
        }
        if let Some(url) = details
            .courier_logo_url
            .as_deref()
            .filter(|u| !u.is_empty())
        {
            if !is_http_url(url) {
                return Err(ServiceError::Validation(
                    "courierLogoUrl must start with http or https".to_string(),
                ));
            }
        }
        if let Some(phone) = details.courier_phone.as_deref().filter(|p| !p.is_empty()) {
            if !is_valid_phone(phone) {
                return Err(ServiceError::Validation(
                    "courierPhone must be 6-15 digits (you may include separators)".to_string(),
                ));
            }
        }

        let old_status = order.status;
        let version = order.version;
        let mut active: order::ActiveModel = order.into();
        active.status = Set(OrderStatus::InTransit);
        active.delivery_status = Set(DeliveryStatus::Shipped);
        active.shipped_at = Set(Some(Utc::now()));
        active.tracking_number = Set(Some(tracking_number.clone()));
        active.carrier = Set(Some(carrier.clone()));
        if let Some(url) = details.carrier_url.as_deref() {
            active.carrier_url = Set(norm_patch(url));
        }
        if let Some(url) = details.courier_logo_url.as_deref() {
            active.courier_logo_url = Set(norm_patch(url));
        }
        if let Some(phone) = details.courier_phone.as_deref() {
            active.courier_phone = Set(norm_patch(phone));
        }
        if let Some(date) = details.expected_delivery_date {
            active.expected_delivery_date = Set(Some(date));
        }
        if let Some(notes) = details.admin_notes.clone() {
            active.admin_notes = Set(Some(notes));
        }

        let meta = AuditMeta::Shipped {
            tracking_number,
            carrier,
            expected_delivery_date: details.expected_delivery_date,
            admin_notes: details.admin_notes,
        };
        let updated = self
            .commit_with_audit(active, version, order_id, actor_id, meta)
            .await?;
        self.emit_status_change(order_id, old_status, OrderStatus::InTransit)
            .await;

        Ok(TransitionOutcome {
            order: updated,
            message: "Order shipped successfully".to_string(),
            changed: true,
            next_action: Some("deliver"),
        })
    }

    #[instrument(skip(self, params))]
    pub async fn deliver_order(
        &self,
        order_id: Uuid,
        actor_id: Uuid,
        params: DeliverParams,
    ) -> Result<TransitionOutcome, ServiceError> {
        let order = self.find_order(order_id).await?;
        if let Precheck::AlreadyDone(msg) = check_deliver(&order)? {
            return Ok(TransitionOutcome {
                order,
                message: msg.to_string(),
                changed: false,
                next_action: None,
            });
        }

        let old_status = order.status;
        let version = order.version;
        let now = Utc::now();
        let mut active: order::ActiveModel = order.into();
        active.status = Set(OrderStatus::Completed);
        active.delivery_status = Set(DeliveryStatus::Delivered);
        active.delivered_at = Set(Some(now));
        active.delivery_date = Set(Some(now));
        if let Some(notes) = params.admin_notes.clone() {
            active.admin_notes = Set(Some(notes));
        }

        let meta = AuditMeta::Delivered {
            delivery_proof: params.delivery_proof,
            admin_notes: params.admin_notes,
        };
        let updated = self
            .commit_with_audit(active, version, order_id, actor_id, meta)
            .await?;
        self.emit_status_change(order_id, old_status, OrderStatus::Completed)
            .await;

        Ok(TransitionOutcome {
            order: updated,
            message: "Order marked as delivered successfully".to_string(),
            changed: true,
            next_action: Some("complete"),
        })
    }

    /// Cancels an order. Paid orders are refunded first; a failed refund
    /// aborts the cancellation with the order unmutated.
    #[instrument(skip(self, params))]
    pub async fn cancel_order(
        &self,
        order_id: Uuid,
        actor: CancelActor,
        params: CancelParams,
    ) -> Result<CancelOutcome, ServiceError> {
        // Customers may only cancel their own orders.
        let order = match actor {
            CancelActor::Admin(_) => self.find_order(order_id).await?,
            CancelActor::Customer(user_id) => order::Entity::find_by_id(order_id)
                .filter(order::Column::UserId.eq(user_id))
                .one(&*self.db)
                .await?
                .ok_or_else(|| ServiceError::NotFound("Order not found.".to_string()))?,
        };

        check_cancel(&order, actor.is_admin())?;
        if params.reason.trim().is_empty() {
            return Err(ServiceError::Validation(
                "Cancellation reason is required.".to_string(),
            ));
        }

        // Refund before any mutation; gateway failure leaves the order as-is.
        let mut refund_id = None;
        let mut refund_initiated = false;
        let refund_amount = match (actor.is_admin(), params.refund_amount) {
            (true, Some(amount)) => amount,
            _ => order.total_amount,
        };
        if order.payment_status == PaymentState::Paid {
            if let Some(payment_id) = order.payment_transaction_id.as_deref() {
                let amount_minor = to_minor_units(refund_amount)?;
                let outcome = self.gateway.refund(payment_id, Some(amount_minor)).await?;
                refund_id = outcome.refund_id.clone();
                refund_initiated = outcome.refund_id.is_some();
            }
        }

        let previous_status = order.status;
        let previous_delivery_status = order.delivery_status;
        let version = order.version;
        let mut active: order::ActiveModel = order.into();
        active.status = Set(OrderStatus::Cancelled);
        active.delivery_status = Set(DeliveryStatus::Cancelled);
        active.cancelled_at = Set(Some(Utc::now()));
        active.cancelled_by = Set(Some(actor.label().to_string()));
        active.cancel_reason = Set(Some(params.reason.clone()));
        if let Some(notes) = params.admin_notes.clone() {
            active.admin_notes = Set(Some(notes));
        }

        let meta = AuditMeta::Cancelled {
            previous_status,
            previous_delivery_status,
            reason: params.reason,
            refund_id: refund_id.clone(),
            refund_amount,
            cancelled_by: actor.label().to_string(),
            admin_notes: params.admin_notes,
        };
        let updated = self
            .commit_with_audit(active, version, order_id, actor.id(), meta)
            .await?;

        let _ = self.event_sender.send(Event::OrderCancelled(order_id)).await;
        if let Some(id) = &refund_id {
            let _ = self
                .event_sender
                .send(Event::RefundIssued {
                    order_id,
                    refund_id: id.clone(),
                })
                .await;
        }

        Ok(CancelOutcome {
            order: updated,
            refund_id,
            refund_initiated,
        })
    }

    /// Admin refund outside the cancel flow: refunds (fully or partially)
    /// and marks the order cancelled + refunded. Subject to the same
    /// cancellation guards as an admin cancel.
    #[instrument(skip(self))]
    pub async fn refund_order(
        &self,
        order_id: Uuid,
        actor_id: Uuid,
        amount: Option<Decimal>,
    ) -> Result<CancelOutcome, ServiceError> {
        let order = self.find_order(order_id).await?;
        check_cancel(&order, true)?;
        let payment_id = order
            .payment_transaction_id
            .clone()
            .ok_or_else(|| {
                ServiceError::Validation("No payment found on order to refund".to_string())
            })?;

        let amount_minor = amount.map(to_minor_units).transpose()?;
        let outcome = self.gateway.refund(&payment_id, amount_minor).await?;

        let previous_status = order.status;
        let previous_delivery_status = order.delivery_status;
        let refund_amount = amount.unwrap_or(order.total_amount);
        let version = order.version;
        let note = match (&outcome.refund_id, outcome.already_refunded) {
            (Some(id), _) => format!("Admin refund initiated (id={})", id),
            (None, true) => "Admin refund: already fully refunded at provider".to_string(),
            (None, false) => "Admin refund initiated".to_string(),
        };
        let note = match &order.admin_notes {
            Some(existing) => format!("{}\n{}", existing, note),
            None => note,
        };

        let mut active: order::ActiveModel = order.into();
        active.status = Set(OrderStatus::Cancelled);
        active.delivery_status = Set(DeliveryStatus::Cancelled);
        active.cancelled_at = Set(Some(Utc::now()));
        active.cancelled_by = Set(Some("admin".to_string()));
        active.cancel_reason = Set(Some("admin refund".to_string()));
        active.payment_status = Set(PaymentState::Refunded);
        active.gateway_payment_status = Set(order::GatewayPaymentStatus::Refunded);
        active.admin_notes = Set(Some(note));

        let meta = AuditMeta::Cancelled {
            previous_status,
            previous_delivery_status,
            reason: "admin refund".to_string(),
            refund_id: outcome.refund_id.clone(),
            refund_amount,
            cancelled_by: "admin".to_string(),
            admin_notes: None,
        };
        let updated = self
            .commit_with_audit(active, version, order_id, actor_id, meta)
            .await?;

        if let Some(id) = &outcome.refund_id {
            let _ = self
                .event_sender
                .send(Event::RefundIssued {
                    order_id,
                    refund_id: id.clone(),
                })
                .await;
        }

        Ok(CancelOutcome {
            order: updated,
            refund_initiated: outcome.refund_id.is_some(),
            refund_id: outcome.refund_id,
        })
    }

    /// Steps status and delivery status back exactly one position and clears
    /// the milestones of the reverted-from step.
    #[instrument(skip(self))]
    pub async fn revert_order(
        &self,
        order_id: Uuid,
        actor_id: Uuid,
        reason: Option<String>,
        admin_notes: Option<String>,
    ) -> Result<TransitionOutcome, ServiceError> {
        let order = self.find_order(order_id).await?;
        let (previous_status, previous_delivery) = check_revert(&order)?;

        let from_status = order.status;
        let from_delivery = order.delivery_status;
        let version = order.version;
        let mut active: order::ActiveModel = order.into();
        active.status = Set(previous_status);
        active.delivery_status = Set(previous_delivery);

        match previous_status {
            OrderStatus::Pending => {
                // Un-verify entirely so a later verify passes its guards.
                active.is_verified = Set(false);
                active.verified_at = Set(None);
                active.verified_by = Set(None);
            }
            OrderStatus::Verified => {
                active.packed_at = Set(None);
            }
            OrderStatus::Packed => {
                active.shipped_at = Set(None);
                active.tracking_number = Set(None);
                active.carrier = Set(None);
            }
            OrderStatus::InTransit => {
                active.delivered_at = Set(None);
                active.delivery_date = Set(None);
            }
            _ => {}
        }
        if let Some(notes) = admin_notes.clone() {
            active.admin_notes = Set(Some(notes));
        }

        let meta = AuditMeta::StatusReverted {
            from_status,
            to_status: previous_status,
            from_delivery_status: from_delivery,
            to_delivery_status: previous_delivery,
            reason,
            admin_notes,
        };
        let updated = self
            .commit_with_audit(active, version, order_id, actor_id, meta)
            .await?;

        let _ = self
            .event_sender
            .send(Event::OrderReverted {
                order_id,
                from_status: from_status.to_string(),
                to_status: previous_status.to_string(),
            })
            .await;

        Ok(TransitionOutcome {
            order: updated,
            message: format!("Order reverted to {} status", previous_status),
            changed: true,
            next_action: None,
        })
    }

    #[instrument(skip(self, update))]
    pub async fn update_courier(
        &self,
        order_id: Uuid,
        actor_id: Uuid,
        update: CourierUpdate,
    ) -> Result<TransitionOutcome, ServiceError> {
        let order = self.find_order(order_id).await?;
        guard(order.is_deleted, "Order is deleted")?;

        if let Some(url) = update.carrier_url.as_deref().filter(|u| !u.is_empty()) {
            if !is_http_url(url) {
                return Err(ServiceError::Validation(
                    "carrierUrl must start with http or https".to_string(),
                ));
            }
        }
        if let Some(url) = update.courier_logo_url.as_deref().filter(|u| !u.is_empty()) {
            if !is_http_url(url) {
                return Err(ServiceError::Validation(
                    "courierLogoUrl must start with http or https".to_string(),
                ));
            }
        }
        if let Some(phone) = update.courier_phone.as_deref().filter(|p| !p.is_empty()) {
            if !is_valid_phone(phone) {
                return Err(ServiceError::Validation(
                    "courierPhone must be 6-15 digits (you may include separators)".to_string(),
                ));
            }
        }

        let version = order.version;
        let mut active: order::ActiveModel = order.into();
        let mut meta_carrier = None;
        let mut meta_carrier_url = None;
        let mut meta_phone = None;
        let mut meta_logo = None;

        if let Some(carrier) = update.carrier.as_deref() {
            let value = norm_patch(carrier);
            meta_carrier = value.clone();
            active.carrier = Set(value);
        }
        if let Some(url) = update.carrier_url.as_deref() {
            let value = norm_patch(url);
            meta_carrier_url = value.clone();
            active.carrier_url = Set(value);
        }
        if let Some(phone) = update.courier_phone.as_deref() {
            let value = norm_patch(phone);
            meta_phone = value.clone();
            active.courier_phone = Set(value);
        }
        if let Some(url) = update.courier_logo_url.as_deref() {
            let value = norm_patch(url);
            meta_logo = value.clone();
            active.courier_logo_url = Set(value);
        }
        if let Some(notes) = update.admin_notes.clone() {
            active.admin_notes = Set(Some(notes));
        }

        let meta = AuditMeta::CourierUpdated {
            carrier: meta_carrier,
            carrier_url: meta_carrier_url,
            courier_phone: meta_phone,
            courier_logo_url: meta_logo,
            admin_notes: update.admin_notes,
        };
        let updated = self
            .commit_with_audit(active, version, order_id, actor_id, meta)
            .await?;

        Ok(TransitionOutcome {
            order: updated,
            message: "Courier info updated".to_string(),
            changed: true,
            next_action: None,
        })
    }

    /// Soft delete: the row survives for audit, default queries skip it.
    #[instrument(skip(self))]
    pub async fn soft_delete_order(
        &self,
        order_id: Uuid,
        actor_id: Uuid,
    ) -> Result<(), ServiceError> {
        let order = self.find_order(order_id).await?;
        guard(order.is_deleted, "Order already deleted")?;

        let version = order.version;
        let mut active: order::ActiveModel = order.into();
        active.is_deleted = Set(true);
        active.deleted_at = Set(Some(Utc::now()));

        self.commit_with_audit(active, version, order_id, actor_id, AuditMeta::Deleted {})
            .await?;

        let _ = self.event_sender.send(Event::OrderDeleted(order_id)).await;
        Ok(())
    }

    /// Audit trail for an order, oldest first.
    #[instrument(skip(self))]
    pub async fn get_audit_trail(
        &self,
        order_id: Uuid,
    ) -> Result<Vec<order_audit::Model>, ServiceError> {
        let entries = order_audit::Entity::find()
            .filter(order_audit::Column::OrderId.eq(order_id))
            .order_by_asc(order_audit::Column::RecordedAt)
            .all(&*self.db)
            .await?;
        Ok(entries)
    }
}

/// Currency units to minor units (e.g. INR to paise).
pub fn to_minor_units(amount: Decimal) -> Result<i64, ServiceError> {
    (amount * Decimal::from(100))
        .round()
        .to_i64()
        .ok_or_else(|| ServiceError::Validation("Refund amount out of range".to_string()))
}
