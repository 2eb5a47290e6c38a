use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::prelude::*;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Immutable snapshot line materialized from a cart line at checkout time.
/// Changing the composition of a purchase means a new order, not a mutation.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "order_items")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub image: Option<String>,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub base_price: Decimal,
    pub tax: Decimal,
    pub shipping_cost: Decimal,
    pub discount: Decimal,
    pub total_price: Decimal,
    pub created_at: DateTime<Utc>,
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

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C: ConnectionTrait>(self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut active_model = self;

        if insert {
            if let ActiveValue::NotSet = active_model.created_at {
                active_model.created_at = Set(Utc::now());
            }
        }

        Ok(active_model)
    }
}
