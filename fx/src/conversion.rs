//! Currency conversion records.

use chrono::{DateTime, Utc};
use ratefeed_common::{CurrencyPair, Money};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::FxResult;
use crate::rate::ExchangeRate;

/// Represents a completed currency conversion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversion {
    /// Input amount.
    pub input: Money,
    /// Output amount, rounded to the term currency's minor unit.
    pub output: Money,
    /// Rate used for conversion.
    pub rate: ExchangeRate,
    /// When the conversion was executed.
    pub executed_at: DateTime<Utc>,
}

impl Conversion {
    /// Convert `input` with `rate`.
    pub fn execute(input: Money, rate: ExchangeRate) -> FxResult<Self> {
        let output = rate.convert(&input)?.round();
        Ok(Self {
            input,
            output,
            rate,
            executed_at: Utc::now(),
        })
    }

    /// Get the effective rate used, after rounding.
    pub fn effective_rate(&self) -> Decimal {
        if self.input.value.is_zero() {
            return Decimal::ZERO;
        }
        self.output.value / self.input.value
    }

    /// Get the currency pair.
    pub fn pair(&self) -> CurrencyPair {
        CurrencyPair::new(self.input.currency.clone(), self.output.currency.clone())
    }
}
