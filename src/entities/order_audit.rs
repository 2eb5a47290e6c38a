use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::order::{DeliveryStatus, OrderStatus};

/// Audit actions recorded against an order. One row is appended per mutating
/// admin action, in the same transaction as the order update.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    #[sea_orm(string_value = "verified")]
    Verified,
    #[sea_orm(string_value = "packed")]
    Packed,
    #[sea_orm(string_value = "shipped")]
    Shipped,
    #[sea_orm(string_value = "delivered")]
    Delivered,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
    #[sea_orm(string_value = "courier_updated")]
    CourierUpdated,
    #[sea_orm(string_value = "status_reverted")]
    StatusReverted,
    #[sea_orm(string_value = "deleted")]
    Deleted,
}

/// Structured metadata attached to an audit row, one variant per action type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuditMeta {
    Verified {
        admin_notes: Option<String>,
    },
    Packed {
        admin_notes: Option<String>,
    },
    Shipped {
        tracking_number: String,
        carrier: String,
        expected_delivery_date: Option<DateTime<Utc>>,
        admin_notes: Option<String>,
    },
    Delivered {
        delivery_proof: Option<String>,
        admin_notes: Option<String>,
    },
    Cancelled {
        previous_status: OrderStatus,
        previous_delivery_status: DeliveryStatus,
        reason: String,
        refund_id: Option<String>,
        refund_amount: Decimal,
        cancelled_by: String,
        admin_notes: Option<String>,
    },
    CourierUpdated {
        carrier: Option<String>,
        carrier_url: Option<String>,
        courier_phone: Option<String>,
        courier_logo_url: Option<String>,
        admin_notes: Option<String>,
    },
    StatusReverted {
        from_status: OrderStatus,
        to_status: OrderStatus,
        from_delivery_status: DeliveryStatus,
        to_delivery_status: DeliveryStatus,
        reason: Option<String>,
        admin_notes: Option<String>,
    },
    Deleted {},
}

impl AuditMeta {
    pub fn action(&self) -> AuditAction {
        match self {
            Self::Verified { .. } => AuditAction::Verified,
            Self::Packed { .. } => AuditAction::Packed,
            Self::Shipped { .. } => AuditAction::Shipped,
            Self::Delivered { .. } => AuditAction::Delivered,
            Self::Cancelled { .. } => AuditAction::Cancelled,
            Self::CourierUpdated { .. } => AuditAction::CourierUpdated,
            Self::StatusReverted { .. } => AuditAction::StatusReverted,
            Self::Deleted {} => AuditAction::Deleted,
        }
    }
}

/// Append-only audit log, modelled as its own table (rather than an embedded
/// array) so growth stays unbounded-safe in relational storage.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "order_audit_log")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub order_id: Uuid,
    pub action: AuditAction,
    pub actor_id: Option<Uuid>,
    pub recorded_at: DateTime<Utc>,
    /// Serialized [`AuditMeta`].
    pub meta: Json,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::order::Entity",
        from = "Column::OrderId",
        to = "super::order::Column::Id"
    )]
    Order,
}

impl Related<super::order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Order.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn cancelled_meta_round_trips_as_tagged_json() {
        let meta = AuditMeta::Cancelled {
            previous_status: OrderStatus::Verified,
            previous_delivery_status: DeliveryStatus::Confirmed,
            reason: "customer request".to_string(),
            refund_id: Some("rfnd_123".to_string()),
            refund_amount: dec!(499.00),
            cancelled_by: "admin".to_string(),
            admin_notes: None,
        };

        let json = serde_json::to_value(&meta).expect("serialize");
        assert_eq!(json["kind"], "cancelled");
        assert_eq!(json["previous_status"], "verified");
        assert_eq!(json["refund_id"], "rfnd_123");

        let back: AuditMeta = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back, meta);
    }

    #[test]
    fn meta_maps_to_matching_action() {
        let meta = AuditMeta::Packed { admin_notes: None };
        assert_eq!(meta.action(), AuditAction::Packed);

        let meta = AuditMeta::StatusReverted {
            from_status: OrderStatus::Verified,
            to_status: OrderStatus::Pending,
            from_delivery_status: DeliveryStatus::Confirmed,
            to_delivery_status: DeliveryStatus::Pending,
            reason: None,
            admin_notes: None,
        };
        assert_eq!(meta.action(), AuditAction::StatusReverted);
    }
}
