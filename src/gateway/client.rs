use failsafe::futures::CircuitBreaker as FuturesCircuitBreaker;
use failsafe::{backoff, failure_policy, Config, Error as FailsafeError, StateMachine};
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::Sha512;
use std::time::Duration;
use thiserror::Error;

type HmacSha512 = Hmac<Sha512>;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),
    #[error("Gateway declined request: {0}")]
    Declined(String),
    #[error("Invalid response from gateway: {0}")]
    InvalidResponse(String),
    #[error("Circuit breaker open: {0}")]
    CircuitBreakerOpen(String),
}

/// Fields sent to the provider's initialize endpoint. Amount is in the
/// smallest currency unit (kobo for NGN).
#[derive(Debug, Clone, Serialize)]
pub struct InitializeFields {
    pub email: String,
    pub amount: i64,
    pub currency: String,
    pub reference: String,
    pub callback_url: String,
    pub metadata: Value,
}

/// Data returned by a successful initialize call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitializeResponse {
    pub authorization_url: String,
    pub access_code: String,
    pub reference: String,
}

/// Outcome of a verify call: whether the provider considers the payment
/// settled, the provider's own status string, and the raw response body.
#[derive(Debug, Clone)]
pub struct Verification {
    pub success: bool,
    pub provider_status: Option<String>,
    pub raw: Value,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    status: bool,
    #[serde(default)]
    message: String,
    data: Option<T>,
}

/// HTTP client for the Paystack payment gateway.
#[derive(Clone)]
pub struct PaystackClient {
    client: Client,
    base_url: String,
    secret_key: String,
    circuit_breaker: StateMachine<failure_policy::ConsecutiveFailures<backoff::EqualJittered>, ()>,
}

impl PaystackClient {
    /// Creates a new PaystackClient with the specified base URL and secret key.
    pub fn new(base_url: String, secret_key: String) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        let backoff = backoff::equal_jittered(Duration::from_secs(60), Duration::from_secs(120));
        let policy = failure_policy::consecutive_failures(3, backoff);
        let circuit_breaker = Config::new().failure_policy(policy).build();

        PaystackClient {
            client,
            base_url,
            secret_key,
            circuit_breaker,
        }
    }

    /// Creates a new PaystackClient with custom circuit breaker configuration.
    pub fn with_circuit_breaker(
        base_url: String,
        secret_key: String,
        failure_threshold: u32,
        reset_timeout_secs: u64,
    ) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        let backoff = backoff::equal_jittered(
            Duration::from_secs(reset_timeout_secs),
            Duration::from_secs(reset_timeout_secs * 2),
        );
        let policy = failure_policy::consecutive_failures(failure_threshold, backoff);
        let circuit_breaker = Config::new().failure_policy(policy).build();

        PaystackClient {
            client,
            base_url,
            secret_key,
            circuit_breaker,
        }
    }

    /// Returns the current state of the circuit breaker.
    pub fn circuit_state(&self) -> String {
        if self.circuit_breaker.is_call_permitted() {
            "closed".to_string()
        } else {
            "open".to_string()
        }
    }

    /// Initializes a payment with the provider. Returns the authorization URL
    /// the payer is redirected to.
    pub async fn initialize(
        &self,
        fields: &InitializeFields,
    ) -> Result<InitializeResponse, GatewayError> {
        let url = format!(
            "{}/transaction/initialize",
            self.base_url.trim_end_matches('/')
        );
        let client = self.client.clone();
        let secret = self.secret_key.clone();
        let body = fields.clone();

        let result = self
            .circuit_breaker
            .call(async move {
                let response = client
                    .post(&url)
                    .bearer_auth(&secret)
                    .json(&body)
                    .send()
                    .await?;

                let status = response.status();
                let envelope = response.json::<Envelope<InitializeResponse>>().await?;

                if !status.is_success() || !envelope.status {
                    return Err(GatewayError::Declined(envelope.message));
                }

                envelope.data.ok_or_else(|| {
                    GatewayError::InvalidResponse("initialize response missing data".to_string())
                })
            })
            .await;

        match result {
            Ok(data) => Ok(data),
            Err(FailsafeError::Rejected) => Err(GatewayError::CircuitBreakerOpen(
                "payment gateway circuit breaker is open".to_string(),
            )),
            Err(FailsafeError::Inner(e)) => Err(e),
        }
    }

    /// Verifies a payment by reference against the provider. Fallback path
    /// for when no webhook arrives within the expected window.
    pub async fn verify(&self, reference: &str) -> Result<Verification, GatewayError> {
        let url = format!(
            "{}/transaction/verify/{}",
            self.base_url.trim_end_matches('/'),
            reference
        );
        let client = self.client.clone();
        let secret = self.secret_key.clone();
        let wanted = reference.to_string();

        let result = self
            .circuit_breaker
            .call(async move {
                let response = client.get(&url).bearer_auth(&secret).send().await?;

                let status = response.status();
                let raw = response.json::<Value>().await?;

                if !status.is_success() {
                    return Err(GatewayError::Declined(format!(
                        "verify returned HTTP {}",
                        status
                    )));
                }

                if raw.get("status").and_then(Value::as_bool) != Some(true) {
                    return Err(GatewayError::InvalidResponse(
                        raw.get("message")
                            .and_then(Value::as_str)
                            .unwrap_or("verify response not ok")
                            .to_string(),
                    ));
                }

                let data = raw.get("data").cloned().unwrap_or(Value::Null);
                let provider_status = data
                    .get("status")
                    .and_then(Value::as_str)
                    .map(str::to_owned);
                let reference_matches =
                    data.get("reference").and_then(Value::as_str) == Some(wanted.as_str());

                Ok(Verification {
                    success: provider_status.as_deref() == Some("success") && reference_matches,
                    provider_status,
                    raw,
                })
            })
            .await;

        match result {
            Ok(verification) => Ok(verification),
            Err(FailsafeError::Rejected) => Err(GatewayError::CircuitBreakerOpen(
                "payment gateway circuit breaker is open".to_string(),
            )),
            Err(FailsafeError::Inner(e)) => Err(e),
        }
    }

    /// Verifies a webhook signature: HMAC-SHA512 over the raw body, keyed
    /// with the secret key, hex-encoded. Constant-time comparison; any
    /// missing or malformed input returns false, never an error.
    pub fn verify_webhook_signature(&self, body: &[u8], signature: Option<&str>) -> bool {
        let Some(signature) = signature else {
            return false;
        };

        if self.secret_key.is_empty() {
            return false;
        }

        let Ok(expected) = hex::decode(signature) else {
            return false;
        };

        let Ok(mut mac) = HmacSha512::new_from_slice(self.secret_key.as_bytes()) else {
            return false;
        };
        mac.update(body);

        mac.verify_slice(&expected).is_ok()
    }
}
