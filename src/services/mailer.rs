use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::sleep;

use crate::db::models::Transaction;

const QUEUE_CAPACITY: usize = 1024;

/// Confirmation email for a settled payment, rendered by the worker.
#[derive(Debug, Clone, Serialize)]
pub struct ConfirmationEmail {
    pub to: String,
    pub reference: String,
    pub amount: String,
    pub currency: String,
    pub completed_at: DateTime<Utc>,
}

impl ConfirmationEmail {
    pub fn for_transaction(tx: &Transaction) -> Self {
        Self {
            to: tx.customer_email.clone(),
            reference: tx.reference.clone(),
            amount: tx.amount.to_string(),
            currency: tx.currency.clone(),
            completed_at: tx.completed_at.unwrap_or_else(Utc::now),
        }
    }

    pub fn subject(&self) -> String {
        format!("Payment Confirmation - {}", self.reference)
    }

    pub fn body(&self) -> String {
        format!(
            "Your payment of {} {} (reference {}) was received on {}.",
            self.amount,
            self.currency,
            self.reference,
            self.completed_at.format("%Y-%m-%d %H:%M UTC")
        )
    }
}

/// Transport for outbound email. The delivery provider is external
/// infrastructure; implementations only need to hand the message over.
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, email: &ConfirmationEmail) -> anyhow::Result<()>;
}

/// Sender backed by an HTTP mail API (transactional mail provider).
pub struct HttpEmailSender {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    from: String,
}

impl HttpEmailSender {
    pub fn new(api_url: String, api_key: String, from: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_default();

        Self {
            client,
            api_url,
            api_key,
            from,
        }
    }
}

#[async_trait]
impl EmailSender for HttpEmailSender {
    async fn send(&self, email: &ConfirmationEmail) -> anyhow::Result<()> {
        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({
                "from": self.from,
                "to": email.to,
                "subject": email.subject(),
                "text": email.body(),
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            anyhow::bail!("mail API returned HTTP {}", response.status());
        }

        Ok(())
    }
}

/// Bounded retry schedule for the email worker: `max_attempts` tries with
/// exponential backoff starting at `base_delay`.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt)
    }
}

/// Handle for enqueueing confirmation emails. Enqueueing never blocks the
/// caller; a full queue drops the email with an error log, not an error.
#[derive(Clone)]
pub struct MailerHandle {
    tx: mpsc::Sender<ConfirmationEmail>,
}

impl MailerHandle {
    pub fn enqueue(&self, email: ConfirmationEmail) {
        if let Err(e) = self.tx.try_send(email) {
            tracing::error!("Failed to enqueue confirmation email: {}", e);
        }
    }
}

/// Spawns the background email worker and returns the enqueue handle. The
/// worker drains the queue outside the request cycle so webhook handlers
/// return promptly.
pub fn spawn_mailer(sender: Arc<dyn EmailSender>, policy: RetryPolicy) -> MailerHandle {
    let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
    tokio::spawn(run_worker(rx, sender, policy));

    MailerHandle { tx }
}

async fn run_worker(
    mut rx: mpsc::Receiver<ConfirmationEmail>,
    sender: Arc<dyn EmailSender>,
    policy: RetryPolicy,
) {
    tracing::info!("Email worker started");

    while let Some(email) = rx.recv().await {
        deliver_with_retry(sender.as_ref(), &email, policy).await;
    }

    tracing::info!("Email worker stopped");
}

async fn deliver_with_retry(sender: &dyn EmailSender, email: &ConfirmationEmail, policy: RetryPolicy) {
    for attempt in 0..policy.max_attempts {
        match sender.send(email).await {
            Ok(()) => {
                tracing::info!(
                    reference = %email.reference,
                    "Payment confirmation email sent"
                );
                return;
            }
            Err(e) => {
                tracing::warn!(
                    reference = %email.reference,
                    attempt = attempt + 1,
                    "Failed to send confirmation email: {}",
                    e
                );

                if attempt + 1 < policy.max_attempts {
                    sleep(policy.delay_for(attempt)).await;
                }
            }
        }
    }

    // Exhausted retries. Email is non-critical: the transaction stays settled.
    tracing::error!(
        reference = %email.reference,
        "Giving up on confirmation email after {} attempts",
        policy.max_attempts
    );
}
