use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A mutable cart line: created on add-to-cart, updated on quantity change,
/// destroyed on checkout or explicit removal. Never shared across users.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "cart_items")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub user_id: Uuid,
    pub product_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub image: Option<String>,
    pub size: Option<String>,
    pub color: Option<String>,
    pub quantity: i32,
    /// Final calculated price per unit.
    pub unit_price: Decimal,
    /// Original product price before tax/shipping/discount adjustments.
    pub base_price: Option<Decimal>,
    pub tax: Decimal,
    pub shipping_cost: Decimal,
    pub discount: Decimal,
    /// Precomputed line total (`unit_price * quantity`); the snapshot builder
    /// recomputes it when absent.
    pub total: Option<Decimal>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
