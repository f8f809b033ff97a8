//! Money Module
//!
//! Currency codes and the single conversion path between client-facing
//! amount strings and `rust_decimal::Decimal`. Every amount that reaches the
//! ledger MUST pass through [`parse_amount`] or [`validate_amount`].
//!
//! ## Design Principles
//! 1. Explicit Error Handling: no silent rounding or truncation
//! 2. Precision is owned by the currency (minor units), not by the caller
//! 3. Ledger amounts are signed `Decimal`; request amounts are strictly positive
//!
//! ## Usage
//! ```rust
//! use fxledger::money::{Currency, parse_amount};
//!
//! let usd: Currency = "USD".parse().unwrap();
//! let amount = parse_amount("500.25", usd).unwrap();
//! assert_eq!(amount.to_string(), "500.25");
//! ```

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Money conversion errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MoneyError {
    #[error("Precision overflow: provided {provided} decimals, max allowed {max}")]
    PrecisionOverflow { provided: u32, max: u32 },

    #[error("Amount must be positive")]
    InvalidAmount,

    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Invalid currency code: {0}")]
    InvalidCurrency(String),

    #[error("Arithmetic overflow: {0}")]
    Overflow(String),
}

// ============================================================================
// Currency
// ============================================================================

/// ISO-4217 currency code (three upper-case ASCII letters)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency([u8; 3]);

impl Currency {
    pub const USD: Currency = Currency(*b"USD");
    pub const EUR: Currency = Currency(*b"EUR");

    /// Number of minor units (decimal places) the currency settles in
    pub fn minor_units(&self) -> u32 {
        match &self.0 {
            b"JPY" | b"KRW" | b"VND" | b"CLP" => 0,
            b"KWD" | b"BHD" | b"OMR" | b"JOD" | b"TND" => 3,
            _ => 2,
        }
    }

    pub fn as_str(&self) -> &str {
        // Constructed only from validated ASCII upper-case letters.
        std::str::from_utf8(&self.0).unwrap_or("???")
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Currency {
    type Err = MoneyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim().to_ascii_uppercase();
        let bytes = code.as_bytes();
        if bytes.len() != 3 || !bytes.iter().all(|b| b.is_ascii_uppercase()) {
            return Err(MoneyError::InvalidCurrency(s.to_string()));
        }
        Ok(Currency([bytes[0], bytes[1], bytes[2]]))
    }
}

impl TryFrom<String> for Currency {
    type Error = MoneyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Currency> for String {
    fn from(value: Currency) -> Self {
        value.to_string()
    }
}

// ============================================================================
// Parse: Client → Ledger (String → Decimal)
// ============================================================================

/// Convert a client amount string to a validated `Decimal`
///
/// Strict format: digits with an optional single fractional part. Signs,
/// exponents, separators and ambiguous forms like `.5` or `5.` are rejected.
///
/// # Errors
/// * `InvalidFormat` - malformed input
/// * `PrecisionOverflow` - more decimals than the currency allows
/// * `InvalidAmount` - zero
pub fn parse_amount(amount_str: &str, currency: Currency) -> Result<Decimal, MoneyError> {
    let amount_str = amount_str.trim();
    if amount_str.is_empty() {
        return Err(MoneyError::InvalidFormat("empty string".into()));
    }

    if amount_str.starts_with('-') || amount_str.starts_with('+') {
        return Err(MoneyError::InvalidAmount);
    }

    let parts: Vec<&str> = amount_str.split('.').collect();
    match parts.as_slice() {
        [whole] => check_digits(whole)?,
        [whole, frac] => {
            if whole.is_empty() {
                return Err(MoneyError::InvalidFormat(
                    "missing leading zero (e.g., use 0.5 instead of .5)".into(),
                ));
            }
            if frac.is_empty() {
                return Err(MoneyError::InvalidFormat(
                    "missing fractional part (e.g., use 5.0 instead of 5.)".into(),
                ));
            }
            check_digits(whole)?;
            check_digits(frac)?;
        }
        _ => return Err(MoneyError::InvalidFormat("multiple decimal points".into())),
    }

    let value = Decimal::from_str(amount_str)
        .map_err(|e| MoneyError::InvalidFormat(format!("{}: {}", amount_str, e)))?;

    validate_amount(value, currency)
}

fn check_digits(part: &str) -> Result<(), MoneyError> {
    if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
        return Err(MoneyError::InvalidFormat(format!(
            "invalid character in: {}",
            part
        )));
    }
    Ok(())
}

/// Validate an already-typed `Decimal` request amount for a currency
///
/// Trailing zeros are ignored (`1.500` is fine for USD); significant digits
/// beyond the minor units are rejected, never rounded.
pub fn validate_amount(amount: Decimal, currency: Currency) -> Result<Decimal, MoneyError> {
    if amount.is_sign_negative() || amount.is_zero() {
        return Err(MoneyError::InvalidAmount);
    }

    let normalized = amount.normalize();
    let max = currency.minor_units();
    if normalized.scale() > max {
        return Err(MoneyError::PrecisionOverflow {
            provided: normalized.scale(),
            max,
        });
    }

    Ok(normalized)
}

/// `a + b`, or [`MoneyError::Overflow`] past `Decimal::MAX`
pub fn checked_add(a: Decimal, b: Decimal) -> Result<Decimal, MoneyError> {
    a.checked_add(b)
        .ok_or_else(|| MoneyError::Overflow(format!("{} + {}", a, b)))
}

/// `a * b`, or [`MoneyError::Overflow`]
pub fn checked_mul(a: Decimal, b: Decimal) -> Result<Decimal, MoneyError> {
    a.checked_mul(b)
        .ok_or_else(|| MoneyError::Overflow(format!("{} * {}", a, b)))
}

/// Overflow-checked sum of ledger amounts
pub fn checked_sum(values: impl IntoIterator<Item = Decimal>) -> Result<Decimal, MoneyError> {
    values.into_iter().try_fold(Decimal::ZERO, checked_add)
}

// ============================================================================
// Format: Ledger → Client (Decimal → String)
// ============================================================================

/// Render an amount with exactly the currency's minor units
pub fn format_amount(value: Decimal, currency: Currency) -> String {
    let prec = currency.minor_units() as usize;
    format!("{:.prec$}", value.round_dp(prec as u32), prec = prec)
}
