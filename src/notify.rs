use sea_orm::DatabaseConnection;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::audit::log_audit;

const QUEUE_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct OrderConfirmation {
    pub order_id: Uuid,
    pub user_id: Uuid,
    pub email: String,
    pub total: i64,
    pub item_count: usize,
}

/// Handle to the background email dispatch worker. Order creation enqueues a
/// confirmation message; the worker owns the queue and "sends" each mail
/// (structured log standing in for a real transport).
#[derive(Clone)]
pub struct Notifier {
    tx: mpsc::Sender<OrderConfirmation>,
}

impl Notifier {
    pub fn spawn(orm: DatabaseConnection) -> Self {
        let (tx, mut rx) = mpsc::channel::<OrderConfirmation>(QUEUE_CAPACITY);

        tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                send_confirmation(&orm, &msg).await;
            }
            tracing::debug!("notifier queue closed, worker exiting");
        });

        Self { tx }
    }

    /// Fire-and-forget: a full or closed queue is logged, never surfaced to
    /// the request that created the order.
    pub fn order_created(&self, msg: OrderConfirmation) {
        if let Err(err) = self.tx.try_send(msg) {
            tracing::warn!(error = %err, "dropping order confirmation");
        }
    }
}

async fn send_confirmation(orm: &DatabaseConnection, msg: &OrderConfirmation) {
    let body = render_confirmation(msg);
    tracing::info!(
        order_id = %msg.order_id,
        email = %msg.email,
        total = msg.total,
        "order confirmation email sent: {body}"
    );

    if let Err(err) = log_audit(
        orm,
        Some(msg.user_id),
        "email_sent",
        Some("orders"),
        Some(serde_json::json!({ "order_id": msg.order_id, "email": msg.email })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }
}

pub fn render_confirmation(msg: &OrderConfirmation) -> String {
    format!(
        "Order {} confirmed: {} item(s), total {} cents",
        msg.order_id, msg.item_count, msg.total
    )
}
