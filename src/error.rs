use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::gateway::GatewayError;
use crate::validation::ValidationError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Payment gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Webhook signature verification failed")]
    SignatureRejected,

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Gateway(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::SignatureRejected => StatusCode::FORBIDDEN,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Gateway and signature failures are logged in full but never
        // detailed to the caller.
        let body = match &self {
            AppError::Gateway(e) => {
                tracing::error!("Payment gateway failure: {}", e);
                Json(json!({
                    "error": "Payment gateway error",
                    "status": status.as_u16(),
                }))
            }
            AppError::SignatureRejected => {
                tracing::warn!("Rejected webhook with invalid signature");
                Json(json!({
                    "error": "Forbidden",
                    "status": status.as_u16(),
                }))
            }
            AppError::Validation(e) => Json(json!({
                "error": e.to_string(),
                "field": e.field,
                "status": status.as_u16(),
            })),
            _ => Json(json!({
                "error": self.to_string(),
                "status": status.as_u16(),
            })),
        };

        (status, body).into_response()
    }
}
