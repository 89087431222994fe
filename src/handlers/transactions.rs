use axum::{
    Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use serde::Deserialize;

use crate::AppState;
use crate::db::queries;
use crate::error::AppError;
use crate::handlers::auth::AuthUser;

const DEFAULT_PAGE_SIZE: i64 = 50;
const MAX_PAGE_SIZE: i64 = 200;

#[derive(Debug, Deserialize)]
pub struct Pagination {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// The authenticated user's transactions, newest first.
pub async fn list_transactions(
    State(state): State<AppState>,
    user: AuthUser,
    Query(page): Query<Pagination>,
) -> Result<impl IntoResponse, AppError> {
    let limit = page
        .limit
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);
    let offset = page.offset.unwrap_or(0).max(0);

    let transactions =
        queries::list_user_transactions(&state.db, user.user_id, limit, offset).await?;

    Ok(Json(transactions))
}

/// A single transaction by reference, scoped to the authenticated user.
pub async fn get_transaction(
    State(state): State<AppState>,
    user: AuthUser,
    Path(reference): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let tx = queries::get_user_transaction(&state.db, user.user_id, &reference)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Transaction {} not found", reference)))?;

    Ok(Json(tx))
}
