use bigdecimal::{BigDecimal, ToPrimitive};
use serde::Deserialize;
use std::fmt;

pub const CURRENCY_LEN: usize = 3;
pub const REFERENCE_MAX_LEN: usize = 100;
pub const EMAIL_MAX_LEN: usize = 254;
pub const ALLOWED_CURRENCIES: &[&str] = &["NGN", "USD", "GHS", "ZAR", "KES"];
pub const ALLOWED_PAYMENT_METHODS: &[&str] = &["paystack", "bank_transfer", "cash"];

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StrictPayload<T> {
    #[serde(flatten)]
    pub data: T,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

pub type ValidationResult = Result<(), ValidationError>;

pub fn sanitize_string(value: &str) -> String {
    value
        .chars()
        .filter(|ch| !ch.is_control())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn validate_required(field: &'static str, value: &str) -> ValidationResult {
    if value.trim().is_empty() {
        return Err(ValidationError::new(field, "must not be empty"));
    }

    Ok(())
}

pub fn validate_max_len(field: &'static str, value: &str, max_len: usize) -> ValidationResult {
    if value.len() > max_len {
        return Err(ValidationError::new(
            field,
            format!("must be at most {} characters", max_len),
        ));
    }

    Ok(())
}

pub fn validate_enum(field: &'static str, value: &str, allowed: &[&str]) -> ValidationResult {
    if allowed.iter().all(|candidate| value != *candidate) {
        return Err(ValidationError::new(
            field,
            format!("must be one of: {}", allowed.join(", ")),
        ));
    }

    Ok(())
}

pub fn validate_currency(currency: &str) -> ValidationResult {
    let currency = sanitize_string(currency);
    validate_required("currency", &currency)?;

    if currency.len() != CURRENCY_LEN || !currency.chars().all(|ch| ch.is_ascii_uppercase()) {
        return Err(ValidationError::new(
            "currency",
            "must be a three-letter uppercase ISO code",
        ));
    }

    validate_enum("currency", &currency, ALLOWED_CURRENCIES)?;

    Ok(())
}

pub fn validate_email(email: &str) -> ValidationResult {
    let email = sanitize_string(email);
    validate_required("email", &email)?;
    validate_max_len("email", &email, EMAIL_MAX_LEN)?;

    let Some((local, domain)) = email.split_once('@') else {
        return Err(ValidationError::new("email", "must contain '@'"));
    };

    if local.is_empty() || domain.is_empty() || !domain.contains('.') || email.contains(' ') {
        return Err(ValidationError::new("email", "is not a valid address"));
    }

    Ok(())
}

/// Amounts are positive, fixed-point values with at most two decimal places.
pub fn validate_amount(amount: &BigDecimal) -> ValidationResult {
    if amount <= &BigDecimal::from(0) {
        return Err(ValidationError::new("amount", "must be greater than zero"));
    }

    if to_minor_units(amount).is_none() {
        return Err(ValidationError::new(
            "amount",
            "must have at most two decimal places",
        ));
    }

    Ok(())
}

/// Converts a major-unit amount to the provider's smallest currency unit
/// (e.g. NGN 1000.00 -> 100000 kobo). Returns None when the amount has more
/// than two decimal places or overflows i64.
pub fn to_minor_units(amount: &BigDecimal) -> Option<i64> {
    let minor = amount * BigDecimal::from(100);
    if !minor.is_integer() {
        return None;
    }

    minor.to_i64()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::str::FromStr;

    #[test]
    fn validates_required_field() {
        assert!(validate_required("field", "value").is_ok());
        assert!(validate_required("field", "   ").is_err());
    }

    #[test]
    fn validates_max_len() {
        assert!(validate_max_len("field", "abc", 3).is_ok());
        assert!(validate_max_len("field", "abcd", 3).is_err());
    }

    #[test]
    fn validates_enum_values() {
        assert!(validate_enum("status", "pending", &["pending", "successful"]).is_ok());
        assert!(validate_enum("status", "unknown", &["pending", "successful"]).is_err());
    }

    #[test]
    fn sanitizes_string() {
        assert_eq!(sanitize_string("  hello\tworld  "), "hello world");
        assert_eq!(sanitize_string("single"), "single");
        assert_eq!(sanitize_string(" \n "), "");
        assert_eq!(sanitize_string("ab\u{0000}cd\u{0007}"), "abcd");
    }

    #[test]
    fn validates_currency() {
        assert!(validate_currency("NGN").is_ok());
        assert!(validate_currency("  NGN  ").is_ok());
        assert!(validate_currency("ngn").is_err());
        assert!(validate_currency("EUR").is_err());
        assert!(validate_currency("NAIRA").is_err());
        assert!(validate_currency("").is_err());
    }

    #[test]
    fn validates_email() {
        assert!(validate_email("tenant@example.com").is_ok());
        assert!(validate_email("tenant@").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("tenant-example.com").is_err());
        assert!(validate_email("tenant@localhost").is_err());
        assert!(validate_email("").is_err());
    }

    #[test]
    fn validates_amount() {
        let positive = BigDecimal::from_str("1.23").expect("valid decimal");
        let zero = BigDecimal::from(0);
        let negative = BigDecimal::from(-1);
        let sub_kobo = BigDecimal::from_str("10.005").expect("valid decimal");

        assert!(validate_amount(&positive).is_ok());
        assert!(validate_amount(&zero).is_err());
        assert!(validate_amount(&negative).is_err());
        assert!(validate_amount(&sub_kobo).is_err());
    }

    #[test]
    fn converts_to_minor_units() {
        let amount = BigDecimal::from_str("1000.00").unwrap();
        assert_eq!(to_minor_units(&amount), Some(100_000));

        let amount = BigDecimal::from_str("0.01").unwrap();
        assert_eq!(to_minor_units(&amount), Some(1));

        let amount = BigDecimal::from_str("12.345").unwrap();
        assert_eq!(to_minor_units(&amount), None);
    }

    #[test]
    fn strict_payload_accepts_known_fields() {
        #[derive(Debug, Deserialize, PartialEq, Eq)]
        struct Payload {
            id: String,
            status: String,
        }

        let parsed: StrictPayload<Payload> =
            serde_json::from_str(r#"{"id":"tx-1","status":"pending"}"#).expect("valid payload");

        assert_eq!(
            parsed.data,
            Payload {
                id: "tx-1".to_string(),
                status: "pending".to_string()
            }
        );
    }

    #[test]
    fn strict_payload_rejects_unknown_fields() {
        #[derive(Debug, Deserialize)]
        struct Payload {
            id: String,
        }

        let parsed = serde_json::from_str::<StrictPayload<Payload>>(r#"{"id":"tx-1","extra":"x"}"#);
        assert!(parsed.is_err());
    }
}
