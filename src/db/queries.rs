use chrono::{DateTime, Utc};
use sqlx::{PgPool, Result};
use uuid::Uuid;

use crate::db::models::{Transaction, TransactionStatus};

// --- Transaction queries ---

pub async fn insert_transaction(pool: &PgPool, tx: &Transaction) -> Result<Transaction> {
    sqlx::query_as::<_, Transaction>(
        r#"
        INSERT INTO transactions (
            id, user_id, customer_email, reference, amount, currency, status,
            payment_method, metadata, provider_data, created_at, updated_at,
            completed_at, property_id, room_id
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
        RETURNING *
        "#,
    )
    .bind(tx.id)
    .bind(tx.user_id)
    .bind(&tx.customer_email)
    .bind(&tx.reference)
    .bind(&tx.amount)
    .bind(&tx.currency)
    .bind(tx.status)
    .bind(&tx.payment_method)
    .bind(&tx.metadata)
    .bind(&tx.provider_data)
    .bind(tx.created_at)
    .bind(tx.updated_at)
    .bind(tx.completed_at)
    .bind(tx.property_id)
    .bind(tx.room_id)
    .fetch_one(pool)
    .await
}

pub async fn get_by_reference(pool: &PgPool, reference: &str) -> Result<Option<Transaction>> {
    sqlx::query_as::<_, Transaction>("SELECT * FROM transactions WHERE reference = $1")
        .bind(reference)
        .fetch_optional(pool)
        .await
}

pub async fn get_user_transaction(
    pool: &PgPool,
    user_id: Uuid,
    reference: &str,
) -> Result<Option<Transaction>> {
    sqlx::query_as::<_, Transaction>(
        "SELECT * FROM transactions WHERE reference = $1 AND user_id = $2",
    )
    .bind(reference)
    .bind(user_id)
    .fetch_optional(pool)
    .await
}

pub async fn list_user_transactions(
    pool: &PgPool,
    user_id: Uuid,
    limit: i64,
    offset: i64,
) -> Result<Vec<Transaction>> {
    sqlx::query_as::<_, Transaction>(
        "SELECT * FROM transactions WHERE user_id = $1 ORDER BY created_at DESC LIMIT $2 OFFSET $3",
    )
    .bind(user_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
}

pub async fn list_by_status(
    pool: &PgPool,
    status: TransactionStatus,
    limit: i64,
) -> Result<Vec<Transaction>> {
    sqlx::query_as::<_, Transaction>(
        "SELECT * FROM transactions WHERE status = $1 ORDER BY created_at DESC LIMIT $2",
    )
    .bind(status)
    .bind(limit)
    .fetch_all(pool)
    .await
}

/// Pending transactions older than `cutoff`, oldest first. Candidates for
/// verify-based reconciliation when the webhook never arrived.
pub async fn list_stale_pending(
    pool: &PgPool,
    cutoff: DateTime<Utc>,
    limit: i64,
) -> Result<Vec<Transaction>> {
    sqlx::query_as::<_, Transaction>(
        r#"
        SELECT * FROM transactions
        WHERE status = 'pending' AND created_at <= $1
        ORDER BY created_at ASC
        LIMIT $2
        "#,
    )
    .bind(cutoff)
    .bind(limit)
    .fetch_all(pool)
    .await
}

/// Applies the single permitted terminal transition: pending -> successful
/// or pending -> failed, setting `completed_at` and snapshotting the
/// provider payload. The `status = 'pending'` guard makes the update atomic
/// under concurrent webhook deliveries; `None` means the row was not pending
/// (or does not exist) and nothing changed.
pub async fn settle_transaction(
    pool: &PgPool,
    reference: &str,
    status: TransactionStatus,
    provider_data: &serde_json::Value,
) -> Result<Option<Transaction>> {
    debug_assert!(status.is_terminal());

    sqlx::query_as::<_, Transaction>(
        r#"
        UPDATE transactions
        SET status = $2, provider_data = $3, completed_at = NOW(), updated_at = NOW()
        WHERE reference = $1 AND status = 'pending'
        RETURNING *
        "#,
    )
    .bind(reference)
    .bind(status)
    .bind(provider_data)
    .fetch_optional(pool)
    .await
}

/// Moves a pending transaction to `abandoned` (payer never completed
/// checkout). Not a terminal settlement: `completed_at` stays unset.
pub async fn mark_abandoned(
    pool: &PgPool,
    reference: &str,
    provider_data: &serde_json::Value,
) -> Result<Option<Transaction>> {
    sqlx::query_as::<_, Transaction>(
        r#"
        UPDATE transactions
        SET status = 'abandoned', provider_data = $2, updated_at = NOW()
        WHERE reference = $1 AND status = 'pending'
        RETURNING *
        "#,
    )
    .bind(reference)
    .bind(provider_data)
    .fetch_optional(pool)
    .await
}

/// Stores the provider's initialize response on a still-pending transaction.
pub async fn set_provider_data(
    pool: &PgPool,
    reference: &str,
    provider_data: &serde_json::Value,
) -> Result<()> {
    sqlx::query(
        "UPDATE transactions SET provider_data = $2, updated_at = NOW() WHERE reference = $1",
    )
    .bind(reference)
    .bind(provider_data)
    .execute(pool)
    .await?;

    Ok(())
}

// --- Listing lookups for payment validation ---

pub async fn property_exists(pool: &PgPool, property_id: Uuid) -> Result<bool> {
    sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM properties WHERE id = $1)")
        .bind(property_id)
        .fetch_one(pool)
        .await
}

/// The property a room belongs to, or None when the room does not exist.
pub async fn room_property_id(pool: &PgPool, room_id: Uuid) -> Result<Option<Uuid>> {
    sqlx::query_scalar::<_, Uuid>("SELECT property_id FROM rooms WHERE id = $1")
        .bind(room_id)
        .fetch_optional(pool)
        .await
}

pub async fn status_counts(pool: &PgPool) -> Result<std::collections::HashMap<String, i64>> {
    let rows: Vec<(String, i64)> =
        sqlx::query_as("SELECT status::text, COUNT(*) FROM transactions GROUP BY status")
            .fetch_all(pool)
            .await?;

    Ok(rows.into_iter().collect())
}
