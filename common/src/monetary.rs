//! Monetary types for ratefeed.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Mul, Sub};
use std::str::FromStr;

use crate::error::{CommonError, Result};

/// A monetary amount with currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    /// The amount value (high precision decimal).
    pub value: Decimal,
    /// ISO 4217 currency code.
    pub currency: Currency,
}

impl Money {
    /// Create a new Money instance.
    pub fn new(value: Decimal, currency: Currency) -> Self {
        Self { value, currency }
    }

    /// Create from a string value.
    pub fn parse(value: &str, currency: Currency) -> Result<Self> {
        let parsed = Decimal::from_str(value.trim()).map_err(|e| CommonError::InvalidAmount {
            value: value.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self::new(parsed, currency))
    }

    /// Create a zero amount in the given currency.
    pub fn zero(currency: Currency) -> Self {
        Self {
            value: Decimal::ZERO,
            currency,
        }
    }

    /// Check if the amount is zero.
    pub fn is_zero(&self) -> bool {
        self.value.is_zero()
    }

    /// Round to the currency's standard decimal places.
    pub fn round(&self) -> Self {
        Self {
            value: self.value.round_dp(self.currency.decimal_places()),
            currency: self.currency.clone(),
        }
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.value, self.currency)
    }
}

impl Add for Money {
    type Output = Result<Money>;

    fn add(self, other: Money) -> Self::Output {
        if self.currency != other.currency {
            return Err(CommonError::CurrencyMismatch {
                expected: self.currency,
                actual: other.currency,
            });
        }
        Ok(Money {
            value: self.value + other.value,
            currency: self.currency,
        })
    }
}

impl Sub for Money {
    type Output = Result<Money>;

    fn sub(self, other: Money) -> Self::Output {
        if self.currency != other.currency {
            return Err(CommonError::CurrencyMismatch {
                expected: self.currency,
                actual: other.currency,
            });
        }
        Ok(Money {
            value: self.value - other.value,
            currency: self.currency,
        })
    }
}

impl Mul<Decimal> for Money {
    type Output = Money;

    fn mul(self, factor: Decimal) -> Self::Output {
        Money {
            value: self.value * factor,
            currency: self.currency,
        }
    }
}

/// ISO 4217 currency code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Currency(String);

impl Currency {
    /// Create a new currency from code, without validation.
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into().to_uppercase())
    }

    /// Parse and validate a three letter currency code.
    pub fn parse(code: &str) -> Result<Self> {
        let trimmed = code.trim();
        if trimmed.len() != 3 || !trimmed.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(CommonError::InvalidCurrency(code.to_string()));
        }
        Ok(Self::new(trimmed))
    }

    /// Get the currency code.
    pub fn code(&self) -> &str {
        &self.0
    }

    /// Get the standard decimal places for this currency.
    pub fn decimal_places(&self) -> u32 {
        match self.0.as_str() {
            "JPY" | "KRW" | "VND" => 0,
            "BHD" | "KWD" | "OMR" => 3,
            _ => 2,
        }
    }

    pub fn usd() -> Self {
        Self::new("USD")
    }

    pub fn eur() -> Self {
        Self::new("EUR")
    }

    pub fn gbp() -> Self {
        Self::new("GBP")
    }

    pub fn chf() -> Self {
        Self::new("CHF")
    }

    pub fn jpy() -> Self {
        Self::new("JPY")
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Currency {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl FromStr for Currency {
    type Err = CommonError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// A base/term currency pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CurrencyPair {
    /// Base currency (the one being converted from).
    pub base: Currency,
    /// Term currency (the one being converted to).
    pub term: Currency,
}

impl CurrencyPair {
    /// Create a new currency pair.
    pub fn new(base: Currency, term: Currency) -> Self {
        Self { base, term }
    }

    /// Get the inverse pair.
    pub fn inverse(&self) -> Self {
        Self {
            base: self.term.clone(),
            term: self.base.clone(),
        }
    }
}

impl fmt::Display for CurrencyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.term)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_money_operations() {
        let m1 = Money::parse("100.00", Currency::usd()).unwrap();
        let m2 = Money::parse("50.00", Currency::usd()).unwrap();

        let sum = (m1.clone() + m2.clone()).unwrap();
        assert_eq!(sum.value, Decimal::from(150));

        let diff = (m1 - m2).unwrap();
        assert_eq!(diff.value, Decimal::from(50));
    }

    #[test]
    fn test_currency_mismatch() {
        let m1 = Money::parse("100.00", Currency::usd()).unwrap();
        let m2 = Money::parse("100.00", Currency::eur()).unwrap();

        assert!(matches!(
            m1 + m2,
            Err(CommonError::CurrencyMismatch { .. })
        ));
    }

    #[test]
    fn test_money_parse_rejects_garbage() {
        assert!(Money::parse("12x", Currency::usd()).is_err());
    }

    #[test]
    fn test_money_round() {
        let m = Money::new(dec!(10.005), Currency::usd()) * dec!(1);
        assert_eq!(m.round().value, dec!(10.00));
        assert_eq!(Money::new(dec!(99.6), Currency::jpy()).round().value, dec!(100));
    }

    #[test]
    fn test_currency_parse() {
        assert_eq!(Currency::parse("usd").unwrap(), Currency::usd());
        assert_eq!(" chf ".parse::<Currency>().unwrap(), Currency::chf());
        assert!(Currency::parse("US").is_err());
        assert!(Currency::parse("U$D").is_err());
    }

    #[test]
    fn test_currency_decimal_places() {
        assert_eq!(Currency::usd().decimal_places(), 2);
        assert_eq!(Currency::jpy().decimal_places(), 0);
        assert_eq!(Currency::new("KWD").decimal_places(), 3);
    }

    #[test]
    fn test_pair_inverse() {
        let pair = CurrencyPair::new(Currency::usd(), Currency::eur());
        assert_eq!(pair.inverse().to_string(), "EUR/USD");
    }
}
