use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::info;
use uuid::Uuid;

/// Domain events emitted after state changes commit. Consumers are
/// best-effort; a dropped event never rolls back the originating write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    OrderCreated(Uuid),
    OrderStatusChanged {
        order_id: Uuid,
        old_status: String,
        new_status: String,
    },
    OrderCancelled(Uuid),
    OrderReverted {
        order_id: Uuid,
        from_status: String,
        to_status: String,
    },
    OrderDeleted(Uuid),
    CheckoutCompleted {
        user_id: Uuid,
        order_ids: Vec<Uuid>,
    },
    PaymentCaptured {
        order_id: Uuid,
        payment_id: String,
    },
    PaymentFailed {
        order_id: Uuid,
        reason: String,
    },
    RefundIssued {
        order_id: Uuid,
        refund_id: String,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

/// Processes incoming events. Currently logs each event; downstream
/// integrations (webhooks, analytics) hang off this loop.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
            } => {
                info!(%order_id, %old_status, %new_status, "order status changed");
            }
            Event::PaymentFailed { order_id, reason } => {
                info!(%order_id, %reason, "payment failed");
            }
            other => {
                info!(event = ?other, "event received");
            }
        }
    }

    info!("Event processing loop terminated");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_delivers_to_receiver() {
        let (tx, mut rx) = mpsc::channel(8);
        let sender = EventSender::new(tx);

        let order_id = Uuid::new_v4();
        sender
            .send(Event::OrderCreated(order_id))
            .await
            .expect("send");

        match rx.recv().await {
            Some(Event::OrderCreated(id)) => assert_eq!(id, order_id),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn send_fails_after_receiver_dropped() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);

        let sender = EventSender::new(tx);
        assert!(sender.send(Event::OrderDeleted(Uuid::new_v4())).await.is_err());
    }
}
