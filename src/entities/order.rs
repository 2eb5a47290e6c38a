use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Primary lifecycle state of an order.
///
/// Forward flow is `pending -> verified -> packed -> in_transit -> completed`;
/// `cancelled` is reachable from any non-terminal state.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "verified")]
    Verified,
    #[sea_orm(string_value = "packed")]
    Packed,
    #[sea_orm(string_value = "in_transit")]
    InTransit,
    #[sea_orm(string_value = "completed")]
    Completed,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

/// Shipping-facing state, kept in lockstep with [`OrderStatus`] by the
/// transition rules but with finer granularity (`confirmed` on verify).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "confirmed")]
    Confirmed,
    #[sea_orm(string_value = "packing_complete")]
    PackingComplete,
    #[sea_orm(string_value = "shipped")]
    Shipped,
    #[sea_orm(string_value = "delivered")]
    Delivered,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
    #[sea_orm(string_value = "returned")]
    Returned,
}

/// Top-level cached payment state. A convenience projection; the
/// gateway-reconciled truth lives in [`GatewayPaymentStatus`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
pub enum PaymentState {
    #[sea_orm(string_value = "paid")]
    Paid,
    #[sea_orm(string_value = "unpaid")]
    Unpaid,
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "refunded")]
    Refunded,
}

/// Nested payment status as reconciled with the payment provider.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
pub enum GatewayPaymentStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "completed")]
    Completed,
    #[sea_orm(string_value = "failed")]
    Failed,
    #[sea_orm(string_value = "refunded")]
    Refunded,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Verified => "verified",
            Self::Packed => "packed",
            Self::InTransit => "in_transit",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::PackingComplete => "packing_complete",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
            Self::Returned => "returned",
        }
    }
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fixed forward-ordering table for the primary status flow. Revert walks
/// this table backwards exactly one step.
pub const STATUS_FLOW: [OrderStatus; 5] = [
    OrderStatus::Pending,
    OrderStatus::Verified,
    OrderStatus::Packed,
    OrderStatus::InTransit,
    OrderStatus::Completed,
];

/// Forward-ordering table for the delivery flow. `confirmed` is deliberately
/// absent: reverting a just-verified order lands delivery back on `pending`.
pub const DELIVERY_FLOW: [DeliveryStatus; 4] = [
    DeliveryStatus::Pending,
    DeliveryStatus::PackingComplete,
    DeliveryStatus::Shipped,
    DeliveryStatus::Delivered,
];

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Short human-facing code, e.g. `ORD-1A2B3C4D`.
    pub order_number: String,

    /// Owning customer. Admin actions reference orders by id but never
    /// transfer ownership.
    pub user_id: Uuid,

    pub status: OrderStatus,
    pub delivery_status: DeliveryStatus,
    pub payment_status: PaymentState,

    pub total_amount: Decimal,
    pub currency: String,
    pub shipping_address: String,

    /// Client-supplied idempotency key; unique per (user_id, batch_id) when
    /// present (enforced by index, see migrator).
    pub batch_id: Option<String>,

    // Payment details snapshot (gateway reconciliation source of truth).
    pub payment_provider: Option<String>,
    pub payment_transaction_id: Option<String>,
    pub provider_order_id: Option<String>,
    pub payment_amount: Decimal,
    pub payment_date: Option<DateTime<Utc>>,
    pub gateway_payment_status: GatewayPaymentStatus,

    // Courier / shipping details.
    pub tracking_number: Option<String>,
    pub carrier: Option<String>,
    pub carrier_url: Option<String>,
    pub courier_phone: Option<String>,
    pub courier_logo_url: Option<String>,
    pub expected_delivery_date: Option<DateTime<Utc>>,

    // Lifecycle milestones, one timestamp/actor pair per step. Set exactly
    // once by the corresponding transition; cleared only by revert.
    pub is_verified: bool,
    pub verified_at: Option<DateTime<Utc>>,
    pub verified_by: Option<Uuid>,
    pub packed_at: Option<DateTime<Utc>>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub delivery_date: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancelled_by: Option<String>,
    pub cancel_reason: Option<String>,
    pub returned_at: Option<DateTime<Utc>>,

    pub admin_notes: Option<String>,
    pub customer_notes: Option<String>,

    // Soft delete: excluded from default queries, retained for audit.
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub version: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::order_item::Entity")]
    OrderItem,
    #[sea_orm(has_many = "super::order_audit::Entity")]
    AuditEntries,
}

impl Related<super::order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderItem.def()
    }
}

impl Related<super::order_audit::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::AuditEntries.def()
    }
}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C: ConnectionTrait>(self, _db: &C, _insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        Ok(self)
    }
}
