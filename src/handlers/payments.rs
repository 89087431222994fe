use axum::{Json, extract::State, http::HeaderMap, response::IntoResponse};
use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::AppState;
use crate::db::models::{Transaction, TransactionStatus};
use crate::db::queries;
use crate::error::AppError;
use crate::gateway::InitializeFields;
use crate::handlers::auth::AuthUser;
use crate::services::notifier::PaymentEvent;
use crate::validation::{
    ValidationError, sanitize_string, to_minor_units, validate_amount, validate_currency,
    validate_email,
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct InitializePaymentRequest {
    #[schema(value_type = String)]
    pub amount: BigDecimal,
    pub currency: Option<String>,
    pub email: Option<String>,
    pub property_id: Option<Uuid>,
    pub room_id: Option<Uuid>,
    pub callback_url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct InitializePaymentResponse {
    pub authorization_url: String,
    pub access_code: String,
    pub reference: String,
}

#[utoipa::path(
    post,
    path = "/payments/initialize",
    request_body = InitializePaymentRequest,
    responses(
        (status = 200, description = "Payment initialized", body = InitializePaymentResponse),
        (status = 400, description = "Invalid amount or listing references"),
        (status = 500, description = "Payment gateway error")
    ),
    tag = "Payments"
)]
pub async fn initialize_payment(
    State(state): State<AppState>,
    user: AuthUser,
    headers: HeaderMap,
    Json(req): Json<InitializePaymentRequest>,
) -> Result<impl IntoResponse, AppError> {
    validate_amount(&req.amount)?;

    let currency = req
        .currency
        .as_deref()
        .map(sanitize_string)
        .unwrap_or_else(|| "NGN".to_string());
    validate_currency(&currency)?;

    let email = req
        .email
        .clone()
        .or_else(|| user.email.clone())
        .ok_or_else(|| ValidationError::new("email", "is required"))?;
    validate_email(&email)?;

    // A payment may target a property, a room, or both. When both are given
    // the room must belong to the property.
    if let Some(property_id) = req.property_id {
        if !queries::property_exists(&state.db, property_id).await? {
            return Err(ValidationError::new("property_id", "does not exist").into());
        }
    }

    if let Some(room_id) = req.room_id {
        let Some(owning_property) = queries::room_property_id(&state.db, room_id).await? else {
            return Err(ValidationError::new("room_id", "does not exist").into());
        };

        if let Some(property_id) = req.property_id {
            if owning_property != property_id {
                return Err(ValidationError::new(
                    "room_id",
                    "room does not belong to the specified property",
                )
                .into());
            }
        }
    }

    let metadata = json!({
        "property_id": req.property_id,
        "room_id": req.room_id,
        "callback_url": req.callback_url,
        "user_agent": header_str(&headers, "user-agent"),
        "ip_address": client_ip(&headers),
    });

    let tx = Transaction::new(
        user.user_id,
        email.clone(),
        req.amount.clone(),
        currency.clone(),
        req.property_id,
        req.room_id,
        metadata,
    );
    let tx = queries::insert_transaction(&state.db, &tx).await?;

    let callback_url = req
        .callback_url
        .clone()
        .filter(|url| !url.is_empty())
        .unwrap_or_else(|| format!("{}/payment/callback", state.config.frontend_url));

    let fields = InitializeFields {
        email,
        amount: to_minor_units(&tx.amount)
            .ok_or_else(|| AppError::Internal("amount not representable in minor units".to_string()))?,
        currency,
        reference: tx.reference.clone(),
        callback_url,
        metadata: json!({
            "transaction_id": tx.id,
            "user_id": user.user_id,
            "property_id": req.property_id,
            "room_id": req.room_id,
        }),
    };

    match state.gateway.initialize(&fields).await {
        Ok(data) => {
            let snapshot = serde_json::to_value(&data).unwrap_or_else(|_| json!({}));
            queries::set_provider_data(&state.db, &tx.reference, &snapshot).await?;

            Ok(Json(InitializePaymentResponse {
                authorization_url: data.authorization_url,
                access_code: data.access_code,
                reference: tx.reference,
            }))
        }
        Err(e) => {
            // Never leave the row pending after a gateway failure.
            let snapshot = json!({ "error": e.to_string() });
            if let Some(failed) = queries::settle_transaction(
                &state.db,
                &tx.reference,
                TransactionStatus::Failed,
                &snapshot,
            )
            .await?
            {
                state.notifier.publish(PaymentEvent::failed(&failed)).await;
            }

            Err(e.into())
        }
    }
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
}

fn client_ip(headers: &HeaderMap) -> Option<String> {
    header_str(headers, "x-forwarded-for")
        .and_then(|forwarded| forwarded.split(',').next().map(|ip| ip.trim().to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn client_ip_takes_first_forwarded_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.9, 10.0.0.1"),
        );

        assert_eq!(client_ip(&headers).as_deref(), Some("203.0.113.9"));
    }

    #[test]
    fn client_ip_absent_without_header() {
        assert_eq!(client_ip(&HeaderMap::new()), None);
    }

    #[test]
    fn initialize_request_parses_decimal_amount() {
        let req: InitializePaymentRequest =
            serde_json::from_str(r#"{"amount": "1000.00"}"#).unwrap();

        assert_eq!(to_minor_units(&req.amount), Some(100_000));
        assert!(req.property_id.is_none());
    }
}
