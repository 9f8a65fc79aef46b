//! Error types shared across ratefeed crates.

use thiserror::Error;

use crate::Currency;

/// Errors raised by the common value types.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommonError {
    /// The string is not a three letter ISO 4217 style code.
    #[error("Invalid currency code: {0:?}")]
    InvalidCurrency(String),

    /// An amount operation mixed two currencies.
    #[error("Currency mismatch: expected {expected}, got {actual}")]
    CurrencyMismatch { expected: Currency, actual: Currency },

    /// An amount could not be parsed.
    #[error("Invalid amount {value:?}: {reason}")]
    InvalidAmount { value: String, reason: String },
}

/// Result type alias for common operations.
pub type Result<T> = std::result::Result<T, CommonError>;
