//! FX engine error types.

use std::fmt;
use std::time::Duration;

use chrono::NaiveDate;
use ratefeed_common::{Currency, CurrencyPair};
use ratefeed_loader::LoaderError;
use thiserror::Error;

/// Errors that can occur while resolving or converting rates.
#[derive(Debug, Error)]
pub enum FxError {
    /// A rate could not be constructed from the supplied parts.
    #[error("Invalid rate: {0}")]
    InvalidRate(String),

    /// No rate, direct or derived, exists for the pair on the date.
    #[error("No rate for {base}/{term}{}", fmt_date(.date))]
    RateNotFound {
        base: Currency,
        term: Currency,
        date: Option<NaiveDate>,
        /// Legs that were looked up and missing.
        attempted: Vec<CurrencyPair>,
    },

    /// The provider's data never arrived.
    #[error("Rate data of {provider} not available after {waited:?}")]
    DataUnavailable { provider: String, waited: Duration },

    /// A query named a provider that is not part of the chain.
    #[error("Unknown rate provider: {0}")]
    UnknownProvider(String),

    /// No rate providers available.
    #[error("No rate providers available")]
    NoProvidersAvailable,

    /// Every consulted provider failed.
    #[error("Cannot convert {base} to {term}: {}", fmt_causes(.causes))]
    CurrencyConversion {
        base: Currency,
        term: Currency,
        causes: Vec<ProviderFailure>,
    },

    /// Currency mismatch in conversion.
    #[error("Currency mismatch: expected {expected}, got {actual}")]
    CurrencyMismatch { expected: Currency, actual: Currency },

    /// Raw feed data could not be parsed.
    #[error("Feed error: {0}")]
    Feed(String),

    /// Decimal overflow or division by zero.
    #[error("Arithmetic error: {0}")]
    Arithmetic(String),

    /// Invalid provider or engine configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The underlying resource loader failed.
    #[error(transparent)]
    Loader(#[from] LoaderError),
}

impl FxError {
    /// Check if a later attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            FxError::DataUnavailable { .. } => true,
            FxError::Loader(e) => e.is_retryable(),
            FxError::CurrencyConversion { causes, .. } => {
                causes.iter().any(|c| c.error.is_retryable())
            }
            _ => false,
        }
    }

    /// Shorthand for a missing pair.
    pub(crate) fn not_found(
        base: &Currency,
        term: &Currency,
        date: Option<NaiveDate>,
        attempted: Vec<CurrencyPair>,
    ) -> Self {
        FxError::RateNotFound {
            base: base.clone(),
            term: term.clone(),
            date,
            attempted,
        }
    }
}

/// Failure of one provider inside a chain.
#[derive(Debug)]
pub struct ProviderFailure {
    /// Provider name.
    pub provider: String,
    /// What went wrong.
    pub error: FxError,
}

impl fmt::Display for ProviderFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.provider, self.error)
    }
}

fn fmt_date(date: &Option<NaiveDate>) -> String {
    match date {
        Some(d) => format!(" on {}", d),
        None => String::new(),
    }
}

fn fmt_causes(causes: &[ProviderFailure]) -> String {
    if causes.is_empty() {
        return "no provider consulted".to_string();
    }
    causes
        .iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type for FX operations.
pub type FxResult<T> = Result<T, FxError>;
