use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use sqlx::PgPool;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::db::models::{Transaction, TransactionStatus};
use crate::db::queries;
use crate::error::AppError;
use crate::gateway::PaystackClient;
use crate::services::mailer::{ConfirmationEmail, MailerHandle};
use crate::services::notifier::{Notifier, PaymentEvent};

/// The provider event that triggers reconciliation. Everything else is
/// acknowledged and ignored.
pub const CHARGE_SUCCESS_EVENT: &str = "charge.success";

const SWEEP_INTERVAL_SECS: u64 = 300;
const STALE_PENDING_SECS: i64 = 1800;
const SWEEP_BATCH_SIZE: i64 = 10;

/// Parsed webhook delivery: event type plus the provider's charge payload,
/// kept raw for cross-verification and snapshotting.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

/// What a reconciliation attempt did to the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Event type is not a payment completion; acknowledged and skipped.
    Ignored,
    /// No transaction with this reference exists.
    UnknownReference,
    /// The transaction had already left `pending`; nothing changed and no
    /// side effects were re-fired.
    AlreadyResolved,
    /// Exactly one transition was applied.
    Transitioned(TransactionStatus),
}

/// Drives transaction state transitions from provider events. Constructed
/// once and shared; all dependencies are passed in explicitly.
#[derive(Clone)]
pub struct Reconciler {
    db: PgPool,
    gateway: PaystackClient,
    notifier: Notifier,
    mailer: Option<MailerHandle>,
}

impl Reconciler {
    pub fn new(
        db: PgPool,
        gateway: PaystackClient,
        notifier: Notifier,
        mailer: Option<MailerHandle>,
    ) -> Self {
        Self {
            db,
            gateway,
            notifier,
            mailer,
        }
    }

    /// Reconciles a verified webhook delivery. The signature has already
    /// been checked; this cross-verifies the payload contents against the
    /// ledger before applying the single permitted transition.
    pub async fn process(&self, event: WebhookEvent) -> Result<ReconcileOutcome, AppError> {
        if event.event != CHARGE_SUCCESS_EVENT {
            debug!(event = %event.event, "ignoring webhook event type");
            return Ok(ReconcileOutcome::Ignored);
        }

        let reference = event
            .data
            .get("reference")
            .and_then(Value::as_str)
            .ok_or_else(|| AppError::BadRequest("webhook payload missing reference".to_string()))?
            .to_string();

        let Some(tx) = queries::get_by_reference(&self.db, &reference).await? else {
            warn!(reference = %reference, "webhook for unknown reference");
            return Ok(ReconcileOutcome::UnknownReference);
        };

        if tx.status != TransactionStatus::Pending {
            debug!(
                reference = %reference,
                status = %tx.status,
                "duplicate webhook for resolved transaction, no-op"
            );
            return Ok(ReconcileOutcome::AlreadyResolved);
        }

        // The signature proves the sender, not the content. The payload must
        // still agree with the ledger before we trust the claimed success.
        let target = if payload_confirms_success(&tx, &event.data) {
            TransactionStatus::Successful
        } else {
            TransactionStatus::Failed
        };

        self.settle(&reference, target, &event.data).await
    }

    /// Verify-based reconciliation: asks the provider directly for the
    /// payment's state. Fallback for when no webhook arrived, and the path
    /// behind the manual `tx reconcile` command. A transport failure leaves
    /// the transaction pending for a later attempt.
    pub async fn reconcile_by_verify(&self, reference: &str) -> Result<ReconcileOutcome, AppError> {
        let Some(tx) = queries::get_by_reference(&self.db, reference).await? else {
            return Ok(ReconcileOutcome::UnknownReference);
        };

        if tx.status != TransactionStatus::Pending {
            return Ok(ReconcileOutcome::AlreadyResolved);
        }

        let verification = self.gateway.verify(reference).await?;

        if verification.provider_status.as_deref() == Some("abandoned") {
            let updated = queries::mark_abandoned(&self.db, reference, &verification.raw).await?;
            return Ok(match updated {
                Some(_) => {
                    info!(reference = %reference, "transaction abandoned by payer");
                    ReconcileOutcome::Transitioned(TransactionStatus::Abandoned)
                }
                None => ReconcileOutcome::AlreadyResolved,
            });
        }

        let target = if verification.success {
            TransactionStatus::Successful
        } else {
            TransactionStatus::Failed
        };

        self.settle(reference, target, &verification.raw).await
    }

    /// Applies the terminal transition and fires the fan-out. The
    /// conditional update means a concurrent delivery that lost the race
    /// resolves to a no-op with no duplicate side effects.
    async fn settle(
        &self,
        reference: &str,
        target: TransactionStatus,
        provider_data: &Value,
    ) -> Result<ReconcileOutcome, AppError> {
        match queries::settle_transaction(&self.db, reference, target, provider_data).await? {
            Some(settled) => {
                info!(
                    reference = %reference,
                    status = %settled.status,
                    "transaction settled"
                );
                self.fan_out(&settled).await;
                Ok(ReconcileOutcome::Transitioned(target))
            }
            None => {
                debug!(
                    reference = %reference,
                    "lost settlement race, transaction already resolved"
                );
                Ok(ReconcileOutcome::AlreadyResolved)
            }
        }
    }

    /// Best-effort side effects of a terminal transition. Nothing here may
    /// fail the settlement or the webhook response.
    async fn fan_out(&self, tx: &Transaction) {
        match tx.status {
            TransactionStatus::Successful => {
                self.notifier.publish(PaymentEvent::successful(tx)).await;

                match &self.mailer {
                    Some(mailer) => mailer.enqueue(ConfirmationEmail::for_transaction(tx)),
                    None => debug!(
                        reference = %tx.reference,
                        "mail delivery not configured, skipping confirmation email"
                    ),
                }
            }
            TransactionStatus::Failed => {
                self.notifier.publish(PaymentEvent::failed(tx)).await;
            }
            _ => {}
        }
    }

    /// One sweep pass: verify-reconcile pending transactions older than
    /// `stale_after`. Returns how many left `pending`.
    pub async fn sweep_stale(&self, stale_after: chrono::Duration) -> anyhow::Result<usize> {
        let cutoff = Utc::now() - stale_after;
        let stale = queries::list_stale_pending(&self.db, cutoff, SWEEP_BATCH_SIZE).await?;

        if stale.is_empty() {
            return Ok(0);
        }

        debug!("Sweeping {} stale pending transaction(s)", stale.len());

        let mut resolved = 0;
        for tx in stale {
            match self.reconcile_by_verify(&tx.reference).await {
                Ok(ReconcileOutcome::Transitioned(status)) => {
                    info!(reference = %tx.reference, status = %status, "stale transaction resolved by sweep");
                    resolved += 1;
                }
                Ok(_) => {}
                // Stays pending; the next pass retries.
                Err(e) => warn!(reference = %tx.reference, "sweep reconciliation failed: {}", e),
            }
        }

        Ok(resolved)
    }
}

/// Cross-verifies a claimed success against the ledger: provider status,
/// reference, and amount in minor units must all agree.
pub fn payload_confirms_success(tx: &Transaction, data: &Value) -> bool {
    let status_ok = data.get("status").and_then(Value::as_str) == Some("success");
    let reference_ok =
        data.get("reference").and_then(Value::as_str) == Some(tx.reference.as_str());
    let amount_ok = match tx.amount_minor_units() {
        Some(expected) => data.get("amount").and_then(Value::as_i64) == Some(expected),
        None => false,
    };

    status_ok && reference_ok && amount_ok
}

/// Background loop reconciling transactions the webhook never reached.
/// Runs alongside the HTTP server without blocking it.
pub async fn run_sweeper(reconciler: Reconciler) {
    info!("Stale-payment sweeper started");

    loop {
        if let Err(e) = reconciler
            .sweep_stale(chrono::Duration::seconds(STALE_PENDING_SECS))
            .await
        {
            error!("Sweeper batch error: {}", e);
        }

        sleep(Duration::from_secs(SWEEP_INTERVAL_SECS)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::BigDecimal;
    use serde_json::json;
    use std::str::FromStr;
    use uuid::Uuid;

    fn pending_transaction() -> Transaction {
        Transaction::new(
            Uuid::new_v4(),
            "tenant@example.com".to_string(),
            BigDecimal::from_str("1000.00").unwrap(),
            "NGN".to_string(),
            None,
            None,
            json!({}),
        )
    }

    fn success_payload(tx: &Transaction) -> Value {
        json!({
            "reference": tx.reference,
            "amount": 100_000,
            "status": "success",
            "currency": "NGN"
        })
    }

    #[test]
    fn payload_with_matching_fields_confirms() {
        let tx = pending_transaction();
        assert!(payload_confirms_success(&tx, &success_payload(&tx)));
    }

    #[test]
    fn payload_with_wrong_status_does_not_confirm() {
        let tx = pending_transaction();
        let mut payload = success_payload(&tx);
        payload["status"] = json!("failed");

        assert!(!payload_confirms_success(&tx, &payload));
    }

    #[test]
    fn payload_with_wrong_amount_does_not_confirm() {
        let tx = pending_transaction();
        let mut payload = success_payload(&tx);
        payload["amount"] = json!(99_999);

        assert!(!payload_confirms_success(&tx, &payload));
    }

    #[test]
    fn payload_with_wrong_reference_does_not_confirm() {
        let tx = pending_transaction();
        let mut payload = success_payload(&tx);
        payload["reference"] = json!("TX-SOMEONEELSE");

        assert!(!payload_confirms_success(&tx, &payload));
    }

    #[test]
    fn payload_with_missing_fields_does_not_confirm() {
        let tx = pending_transaction();

        assert!(!payload_confirms_success(&tx, &json!({})));
        assert!(!payload_confirms_success(&tx, &json!({"status": "success"})));
    }

    #[test]
    fn webhook_event_parses_provider_shape() {
        let raw = r#"{
            "event": "charge.success",
            "data": {
                "reference": "TX-0123456789AB",
                "amount": 100000,
                "status": "success"
            }
        }"#;

        let event: WebhookEvent = serde_json::from_str(raw).unwrap();
        assert_eq!(event.event, CHARGE_SUCCESS_EVENT);
        assert_eq!(
            event.data.get("reference").and_then(Value::as_str),
            Some("TX-0123456789AB")
        );
    }

    #[test]
    fn webhook_event_without_data_still_parses() {
        let event: WebhookEvent =
            serde_json::from_str(r#"{"event": "transfer.success"}"#).unwrap();
        assert_eq!(event.event, "transfer.success");
        assert!(event.data.is_null());
    }
}
