use axum::{
    async_trait,
    extract::{FromRequest, FromRequestParts, Request},
    http::request::Parts,
};
use uuid::Uuid;

use crate::AppState;
use crate::error::AppError;

pub const SIGNATURE_HEADER: &str = "x-paystack-signature";

/// Identity of the caller, injected by the auth proxy in front of this
/// service. Token issuance and verification happen upstream.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub email: Option<String>,
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get("x-user-id")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| Uuid::parse_str(v).ok())
            .ok_or_else(|| AppError::Unauthorized("missing or invalid user identity".to_string()))?;

        let email = parts
            .headers
            .get("x-user-email")
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);

        Ok(AuthUser { user_id, email })
    }
}

/// Extractor that verifies the provider's signature header against the raw
/// request body before the payload is parsed. A forged or missing signature
/// rejects the request with 403 and no state change.
pub struct VerifiedWebhook {
    pub body: Vec<u8>,
}

#[async_trait]
impl FromRequest<AppState> for VerifiedWebhook {
    type Rejection = AppError;

    async fn from_request(req: Request, state: &AppState) -> Result<Self, Self::Rejection> {
        let signature = req
            .headers()
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);

        let body = axum::body::to_bytes(req.into_body(), usize::MAX)
            .await
            .map_err(|_| AppError::BadRequest("failed to read request body".to_string()))?
            .to_vec();

        if !state
            .gateway
            .verify_webhook_signature(&body, signature.as_deref())
        {
            return Err(AppError::SignatureRejected);
        }

        Ok(VerifiedWebhook { body })
    }
}
