use async_trait::async_trait;
use tracing::info;
use uuid::Uuid;

use crate::entities::order;
use crate::errors::ServiceError;

/// Outbound customer notification seam. Delivery transport is out of scope
/// here; implementations resolve the recipient from the user id.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_order_receipt(
        &self,
        user_id: Uuid,
        order: &order::Model,
    ) -> Result<(), ServiceError>;
}

/// Default implementation that records the dispatch in the log stream.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_order_receipt(
        &self,
        user_id: Uuid,
        order: &order::Model,
    ) -> Result<(), ServiceError> {
        info!(
            %user_id,
            order_id = %order.id,
            order_number = %order.order_number,
            total = %order.total_amount,
            "order receipt dispatched"
        );
        Ok(())
    }
}
