use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use sqlx::types::BigDecimal;
use std::fmt;
use uuid::Uuid;

use crate::validation::to_minor_units;

/// Lifecycle state of a payment. `Successful` and `Failed` are terminal:
/// once reached, no further transition is permitted. `Abandoned` has no
/// outgoing transitions either, but does not set `completed_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "transaction_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Successful,
    Failed,
    Abandoned,
}

impl TransactionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransactionStatus::Successful | TransactionStatus::Failed)
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Successful => "successful",
            TransactionStatus::Failed => "failed",
            TransactionStatus::Abandoned => "abandoned",
        };
        f.write_str(s)
    }
}

/// Ledger row for a rental payment. Never deleted; the payment audit trail
/// lives here.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub customer_email: String,
    pub reference: String,
    pub amount: BigDecimal,
    pub currency: String,
    pub status: TransactionStatus,
    pub payment_method: String,
    pub metadata: serde_json::Value,
    #[serde(skip_serializing, default)]
    pub provider_data: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub property_id: Option<Uuid>,
    pub room_id: Option<Uuid>,
}

impl Transaction {
    pub fn new(
        user_id: Uuid,
        customer_email: String,
        amount: BigDecimal,
        currency: String,
        property_id: Option<Uuid>,
        room_id: Option<Uuid>,
        metadata: serde_json::Value,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            customer_email,
            reference: generate_reference(),
            amount,
            currency,
            status: TransactionStatus::Pending,
            payment_method: "paystack".to_string(),
            metadata,
            provider_data: serde_json::json!({}),
            created_at: now,
            updated_at: now,
            completed_at: None,
            property_id,
            room_id,
        }
    }

    /// The amount in the provider's smallest currency unit, if representable.
    pub fn amount_minor_units(&self) -> Option<i64> {
        to_minor_units(&self.amount)
    }
}

/// Unique human-readable reference shared with the payment provider.
/// Assigned once at creation; the DB unique constraint backstops collisions.
pub fn generate_reference() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("TX-{}", hex[..12].to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;
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
    fn new_transaction_starts_pending() {
        let tx = sample_transaction();

        assert_eq!(tx.status, TransactionStatus::Pending);
        assert!(tx.completed_at.is_none());
        assert_eq!(tx.payment_method, "paystack");
    }

    #[test]
    fn reference_format_is_stable() {
        let reference = generate_reference();

        assert!(reference.starts_with("TX-"));
        assert_eq!(reference.len(), 15);
        assert!(reference[3..].chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }

    #[test]
    fn references_are_unique_across_creations() {
        let a = generate_reference();
        let b = generate_reference();

        assert_ne!(a, b);
    }

    #[test]
    fn amount_minor_units_converts_to_kobo() {
        let tx = sample_transaction();

        assert_eq!(tx.amount_minor_units(), Some(100_000));
    }

    #[test]
    fn terminal_states() {
        assert!(TransactionStatus::Successful.is_terminal());
        assert!(TransactionStatus::Failed.is_terminal());
        assert!(!TransactionStatus::Pending.is_terminal());
        assert!(!TransactionStatus::Abandoned.is_terminal());
    }

    #[test]
    fn status_serializes_lowercase() {
        let json = serde_json::to_string(&TransactionStatus::Successful).unwrap();
        assert_eq!(json, r#""successful""#);
    }
}
