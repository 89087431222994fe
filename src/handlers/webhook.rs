use axum::{Json, extract::State, response::IntoResponse};
use serde_json::json;

use crate::AppState;
use crate::error::AppError;
use crate::handlers::auth::VerifiedWebhook;
use crate::services::reconciler::{ReconcileOutcome, WebhookEvent};

/// Paystack webhook endpoint. Signature verification happens in the
/// `VerifiedWebhook` extractor before this body runs; a bad signature never
/// reaches the reconciler. Duplicate deliveries are acknowledged with 200
/// and change nothing.
pub async fn paystack_webhook(
    State(state): State<AppState>,
    webhook: VerifiedWebhook,
) -> Result<impl IntoResponse, AppError> {
    let event: WebhookEvent = serde_json::from_slice(&webhook.body)
        .map_err(|_| AppError::BadRequest("malformed webhook payload".to_string()))?;

    match state.reconciler.process(event).await? {
        ReconcileOutcome::UnknownReference => Err(AppError::NotFound(
            "unknown transaction reference".to_string(),
        )),
        ReconcileOutcome::Ignored => Ok(Json(json!({ "result": "ignored" }))),
        ReconcileOutcome::AlreadyResolved => Ok(Json(json!({ "result": "duplicate" }))),
        ReconcileOutcome::Transitioned(status) => Ok(Json(json!({
            "result": "processed",
            "status": status,
        }))),
    }
}
