use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set,
};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

use crate::db::DbPool;
use crate::entities::cart_item;
use crate::errors::ServiceError;

/// Input for a new cart line. Prices arrive from the catalog layer already
/// resolved; this service only stores and totals them.
#[derive(Debug, Clone)]
pub struct NewCartItem {
    pub product_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub image: Option<String>,
    pub size: Option<String>,
    pub color: Option<String>,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub base_price: Option<Decimal>,
    pub tax: Decimal,
    pub shipping_cost: Decimal,
    pub discount: Decimal,
}

#[derive(Clone)]
pub struct CartService {
    db: Arc<DbPool>,
}

impl CartService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    #[instrument(skip(self))]
    pub async fn get_cart(&self, user_id: Uuid) -> Result<Vec<cart_item::Model>, ServiceError> {
        let lines = cart_item::Entity::find()
            .filter(cart_item::Column::UserId.eq(user_id))
            .order_by_asc(cart_item::Column::CreatedAt)
            .all(&*self.db)
            .await?;
        Ok(lines)
    }

    /// Adds a line. An existing line for the same product variant has its
    /// quantity bumped instead of creating a duplicate row.
    #[instrument(skip(self, item))]
    pub async fn add_item(
        &self,
        user_id: Uuid,
        item: NewCartItem,
    ) -> Result<cart_item::Model, ServiceError> {
        if item.quantity < 1 {
            return Err(ServiceError::Validation(
                "Quantity must be at least 1".to_string(),
            ));
        }

        let existing = cart_item::Entity::find()
            .filter(cart_item::Column::UserId.eq(user_id))
            .filter(cart_item::Column::ProductId.eq(item.product_id))
            .filter(cart_item::Column::Size.eq(item.size.clone()))
            .filter(cart_item::Column::Color.eq(item.color.clone()))
            .one(&*self.db)
            .await?;

        if let Some(line) = existing {
            let quantity = line.quantity + item.quantity;
            let unit_price = line.unit_price;
            let mut active: cart_item::ActiveModel = line.into();
            active.quantity = Set(quantity);
            active.total = Set(Some(unit_price * Decimal::from(quantity)));
            active.updated_at = Set(Utc::now());
            return Ok(active.update(&*self.db).await?);
        }

        let now = Utc::now();
        let line = cart_item::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            product_id: Set(item.product_id),
            title: Set(item.title),
            description: Set(item.description),
            image: Set(item.image),
            size: Set(item.size),
            color: Set(item.color),
            quantity: Set(item.quantity),
            unit_price: Set(item.unit_price),
            base_price: Set(item.base_price),
            tax: Set(item.tax),
            shipping_cost: Set(item.shipping_cost),
            discount: Set(item.discount),
            total: Set(Some(item.unit_price * Decimal::from(item.quantity))),
            created_at: Set(now),
            updated_at: Set(now),
        };
        Ok(line.insert(&*self.db).await?)
    }

    #[instrument(skip(self))]
    pub async fn update_quantity(
        &self,
        user_id: Uuid,
        cart_id: Uuid,
        quantity: i32,
    ) -> Result<cart_item::Model, ServiceError> {
        if quantity < 1 {
            return Err(ServiceError::Validation(
                "Quantity must be at least 1".to_string(),
            ));
        }

        let line = self.find_user_line(user_id, cart_id).await?;
        let unit_price = line.unit_price;
        let mut active: cart_item::ActiveModel = line.into();
        active.quantity = Set(quantity);
        active.total = Set(Some(unit_price * Decimal::from(quantity)));
        active.updated_at = Set(Utc::now());
        Ok(active.update(&*self.db).await?)
    }

    #[instrument(skip(self))]
    pub async fn remove_item(&self, user_id: Uuid, cart_id: Uuid) -> Result<(), ServiceError> {
        let line = self.find_user_line(user_id, cart_id).await?;
        cart_item::Entity::delete_by_id(line.id)
            .exec(&*self.db)
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn clear_cart(&self, user_id: Uuid) -> Result<u64, ServiceError> {
        let result = cart_item::Entity::delete_many()
            .filter(cart_item::Column::UserId.eq(user_id))
            .exec(&*self.db)
            .await?;
        Ok(result.rows_affected)
    }

    async fn find_user_line(
        &self,
        user_id: Uuid,
        cart_id: Uuid,
    ) -> Result<cart_item::Model, ServiceError> {
        cart_item::Entity::find_by_id(cart_id)
            .filter(cart_item::Column::UserId.eq(user_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Cart item not found".to_string()))
    }
}

/// Checkout-facing queries. These are free functions over a connection so the
/// checkout orchestrator can run them against its own handle.
pub async fn lines_for_user<C: ConnectionTrait>(
    db: &C,
    user_id: Uuid,
) -> Result<Vec<cart_item::Model>, ServiceError> {
    let lines = cart_item::Entity::find()
        .filter(cart_item::Column::UserId.eq(user_id))
        .order_by_asc(cart_item::Column::CreatedAt)
        .all(db)
        .await?;
    Ok(lines)
}

pub async fn line_by_id<C: ConnectionTrait>(
    db: &C,
    user_id: Uuid,
    cart_id: Uuid,
) -> Result<Option<cart_item::Model>, ServiceError> {
    let line = cart_item::Entity::find_by_id(cart_id)
        .filter(cart_item::Column::UserId.eq(user_id))
        .one(db)
        .await?;
    Ok(line)
}

pub async fn lines_by_ids<C: ConnectionTrait>(
    db: &C,
    user_id: Uuid,
    cart_ids: &[Uuid],
) -> Result<Vec<cart_item::Model>, ServiceError> {
    let lines = cart_item::Entity::find()
        .filter(cart_item::Column::UserId.eq(user_id))
        .filter(cart_item::Column::Id.is_in(cart_ids.iter().copied()))
        .all(db)
        .await?;
    Ok(lines)
}

/// Deletes the consumed cart lines after their orders exist. Failure here is
/// logged by the caller, never fatal to the checkout.
pub async fn delete_lines<C: ConnectionTrait>(
    db: &C,
    line_ids: &[Uuid],
) -> Result<u64, ServiceError> {
    let result = cart_item::Entity::delete_many()
        .filter(cart_item::Column::Id.is_in(line_ids.iter().copied()))
        .exec(db)
        .await?;
    Ok(result.rows_affected)
}
