use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::db::models::Transaction;

const BROADCAST_CAPACITY: usize = 256;

pub const EVENT_PAYMENT_SUCCESSFUL: &str = "payment_successful";
pub const EVENT_PAYMENT_FAILED: &str = "payment_failed";

/// Real-time event pushed to the paying user's private channel on a
/// terminal transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentEvent {
    pub user_id: Uuid,
    pub transaction_id: Uuid,
    pub reference: String,
    pub amount: String,
    pub event: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl PaymentEvent {
    pub fn successful(tx: &Transaction) -> Self {
        Self::build(tx, EVENT_PAYMENT_SUCCESSFUL, "Your payment was successful!")
    }

    pub fn failed(tx: &Transaction) -> Self {
        Self::build(tx, EVENT_PAYMENT_FAILED, "Your payment failed. Please try again.")
    }

    fn build(tx: &Transaction, event: &str, message: &str) -> Self {
        Self {
            user_id: tx.user_id,
            transaction_id: tx.id,
            reference: tx.reference.clone(),
            amount: tx.amount.to_string(),
            event: event.to_string(),
            message: message.to_string(),
            timestamp: Utc::now(),
        }
    }

    /// Private channel name for the affected user.
    pub fn channel(&self) -> String {
        format!("user_{}", self.user_id)
    }
}

/// Fan-out for payment events: Redis pub/sub toward external consumers plus
/// an in-process broadcast feeding connected WebSocket clients. Delivery is
/// best-effort; publish failures are logged and never propagate.
#[derive(Clone)]
pub struct Notifier {
    redis: Option<redis::Client>,
    local: broadcast::Sender<PaymentEvent>,
}

impl Notifier {
    pub fn new(redis_url: Option<&str>) -> Self {
        let redis = redis_url.and_then(|url| match redis::Client::open(url) {
            Ok(client) => Some(client),
            Err(e) => {
                tracing::error!("Invalid Redis URL, pub/sub fan-out disabled: {}", e);
                None
            }
        });

        let (local, _) = broadcast::channel(BROADCAST_CAPACITY);

        Self { redis, local }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PaymentEvent> {
        self.local.subscribe()
    }

    pub async fn publish(&self, event: PaymentEvent) {
        tracing::info!(
            reference = %event.reference,
            event = %event.event,
            "publishing payment event"
        );

        // No receivers is fine; events are ephemeral signaling.
        let _ = self.local.send(event.clone());

        if let Some(client) = &self.redis {
            if let Err(e) = publish_redis(client, &event).await {
                tracing::error!(
                    reference = %event.reference,
                    "Failed to publish payment event to Redis: {}",
                    e
                );
            }
        }
    }
}

async fn publish_redis(client: &redis::Client, event: &PaymentEvent) -> anyhow::Result<()> {
    let payload = serde_json::to_string(event)?;
    let mut conn = client.get_multiplexed_async_connection().await?;
    let _: () = conn.publish(event.channel(), payload).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::BigDecimal;
    use std::str::FromStr;

    fn sample_transaction() -> Transaction {
        Transaction::new(
            Uuid::new_v4(),
            "tenant@example.com".to_string(),
            BigDecimal::from_str("1000.00").unwrap(),
            "NGN".to_string(),
            None,
            None,
            serde_json::json!({}),
        )
    }

    #[test]
    fn event_channel_is_scoped_to_user() {
        let tx = sample_transaction();
        let event = PaymentEvent::successful(&tx);

        assert_eq!(event.channel(), format!("user_{}", tx.user_id));
    }

    #[test]
    fn success_and_failure_events_differ() {
        let tx = sample_transaction();

        let ok = PaymentEvent::successful(&tx);
        let failed = PaymentEvent::failed(&tx);

        assert_eq!(ok.event, EVENT_PAYMENT_SUCCESSFUL);
        assert_eq!(failed.event, EVENT_PAYMENT_FAILED);
        assert_ne!(ok.message, failed.message);
        assert_eq!(ok.reference, tx.reference);
    }

    #[tokio::test]
    async fn publish_without_receivers_or_redis_does_not_fail() {
        let notifier = Notifier::new(None);
        let tx = sample_transaction();

        notifier.publish(PaymentEvent::successful(&tx)).await;
    }

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let notifier = Notifier::new(None);
        let mut rx = notifier.subscribe();
        let tx = sample_transaction();

        notifier.publish(PaymentEvent::successful(&tx)).await;

        let received = rx.recv().await.unwrap();
        assert_eq!(received.reference, tx.reference);
    }
}
