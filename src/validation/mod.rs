use bigdecimal::BigDecimal;
use std::fmt;

pub mod card;

pub use card::{validate_card, validate_cvv, validate_expiry, validate_luhn};

pub const CURRENCY_CODE_LEN: usize = 3;
pub const ORDER_ID_MAX_LEN: usize = 64;
pub const MERCHANT_ID_MAX_LEN: usize = 64;
pub const CALLBACK_URL_MAX_LEN: usize = 2048;
/// Amounts are stored as `NUMERIC(18, 2)`.
pub const AMOUNT_MAX_SCALE: i64 = 2;
pub const AMOUNT_MAX_INTEGER_DIGITS: u32 = 16;

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
        .map(|ch| if ch.is_whitespace() { ' ' } else { ch })
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

/// Rejects a missing optional field.
pub fn require<T>(field: &'static str, value: Option<T>) -> Result<T, ValidationError> {
    value.ok_or_else(|| ValidationError::new(field, "is required"))
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

pub fn validate_positive_amount(amount: &BigDecimal) -> ValidationResult {
    if amount <= &BigDecimal::from(0) {
        return Err(ValidationError::new("amount", "must be greater than zero"));
    }

    let (_, scale) = amount.normalized().as_bigint_and_exponent();
    if scale > AMOUNT_MAX_SCALE {
        return Err(ValidationError::new(
            "amount",
            format!("must have at most {} decimal places", AMOUNT_MAX_SCALE),
        ));
    }

    if amount >= &BigDecimal::from(10_i64.pow(AMOUNT_MAX_INTEGER_DIGITS)) {
        return Err(ValidationError::new(
            "amount",
            format!("must have at most {} integer digits", AMOUNT_MAX_INTEGER_DIGITS),
        ));
    }

    Ok(())
}

/// Trims and upper-cases a currency code, then checks it is three ASCII letters.
pub fn normalize_currency(currency: &str) -> Result<String, ValidationError> {
    let currency = sanitize_string(currency).to_ascii_uppercase();
    validate_required("currency", &currency)?;

    if currency.len() != CURRENCY_CODE_LEN || !currency.chars().all(|ch| ch.is_ascii_uppercase()) {
        return Err(ValidationError::new(
            "currency",
            format!("must be a {}-letter code", CURRENCY_CODE_LEN),
        ));
    }

    Ok(currency)
}

pub fn validate_identifier(field: &'static str, value: &str, max_len: usize) -> ValidationResult {
    validate_required(field, value)?;
    validate_max_len(field, value, max_len)
}

pub fn validate_callback_url(field: &'static str, value: &str) -> ValidationResult {
    validate_required(field, value)?;
    validate_max_len(field, value, CALLBACK_URL_MAX_LEN)?;

    match url::Url::parse(value) {
        Ok(parsed) if parsed.scheme() == "http" || parsed.scheme() == "https" => Ok(()),
        Ok(_) => Err(ValidationError::new(field, "must be an http(s) URL")),
        Err(e) => Err(ValidationError::new(field, format!("is not a valid URL: {}", e))),
    }
}

/// STAN values are short digit strings.
pub fn validate_stan(stan: &str) -> ValidationResult {
    validate_required("stan", stan)?;

    if stan.len() > 12 || !stan.chars().all(|ch| ch.is_ascii_digit()) {
        return Err(ValidationError::new("stan", "must be at most 12 digits"));
    }

    Ok(())
}
