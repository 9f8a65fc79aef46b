//! Exchange rate value type.
//!
//! An [`ExchangeRate`] quotes how many units of `term` one unit of `base`
//! buys. Derived rates carry the chain of rates they were composed from.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use ratefeed_common::{Currency, CurrencyPair, Money};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{FxError, FxResult};

/// Freshness class of a rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RateKind {
    Realtime,
    Deferred,
    Historic,
    Other,
}

impl RateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateKind::Realtime => "REALTIME",
            RateKind::Deferred => "DEFERRED",
            RateKind::Historic => "HISTORIC",
            RateKind::Other => "OTHER",
        }
    }
}

impl fmt::Display for RateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RateKind {
    type Err = FxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "REALTIME" => Ok(RateKind::Realtime),
            "DEFERRED" => Ok(RateKind::Deferred),
            "HISTORIC" => Ok(RateKind::Historic),
            "OTHER" => Ok(RateKind::Other),
            _ => Err(FxError::InvalidRate(format!("unknown rate kind {:?}", s))),
        }
    }
}

/// Where a rate came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversionContext {
    /// Name of the provider that produced the rate.
    pub provider: String,
    pub kind: RateKind,
    /// Value date of the underlying data.
    pub date: Option<NaiveDate>,
    /// When the underlying data was loaded.
    pub timestamp: Option<DateTime<Utc>>,
}

impl ConversionContext {
    pub fn new(provider: impl Into<String>, kind: RateKind) -> Self {
        Self {
            provider: provider.into(),
            kind,
            date: None,
            timestamp: None,
        }
    }

    pub fn with_date(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// Immutable exchange rate, possibly derived from a chain of rates.
///
/// Equality, hashing and ordering look only at kind, provider, base and
/// term, in that order. The factor and the chain do not participate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeRate {
    base: Currency,
    term: Currency,
    factor: Decimal,
    context: ConversionContext,
    /// Legs of a derived rate; empty for a direct rate.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    legs: Vec<ExchangeRate>,
}

impl ExchangeRate {
    /// Start building a rate.
    pub fn builder() -> ExchangeRateBuilder {
        ExchangeRateBuilder::default()
    }

    /// Builder pre-populated with this rate's parts.
    pub fn to_builder(&self) -> ExchangeRateBuilder {
        ExchangeRateBuilder {
            base: Some(self.base.clone()),
            term: Some(self.term.clone()),
            factor: Some(self.factor),
            context: Some(self.context.clone()),
            chain: self.legs.clone(),
        }
    }

    /// Identity rate `currency -> currency` with factor one.
    pub fn identity(currency: &Currency, context: ConversionContext) -> Self {
        Self {
            base: currency.clone(),
            term: currency.clone(),
            factor: Decimal::ONE,
            context,
            legs: Vec::new(),
        }
    }

    pub fn base(&self) -> &Currency {
        &self.base
    }

    pub fn term(&self) -> &Currency {
        &self.term
    }

    pub fn factor(&self) -> Decimal {
        self.factor
    }

    pub fn context(&self) -> &ConversionContext {
        &self.context
    }

    pub fn kind(&self) -> RateKind {
        self.context.kind
    }

    pub fn provider(&self) -> &str {
        &self.context.provider
    }

    pub fn pair(&self) -> CurrencyPair {
        CurrencyPair::new(self.base.clone(), self.term.clone())
    }

    /// True if the rate was composed from more than one rate.
    pub fn is_derived(&self) -> bool {
        self.legs.len() > 1
    }

    /// Rates this rate was composed from. A direct rate returns itself.
    pub fn chain(&self) -> Vec<ExchangeRate> {
        if self.legs.is_empty() {
            vec![self.clone()]
        } else {
            self.legs.clone()
        }
    }

    /// Legs of a derived rate, empty for a direct rate.
    pub fn legs(&self) -> &[ExchangeRate] {
        &self.legs
    }

    /// The `term -> base` rate.
    ///
    /// The reciprocal carries `Decimal` precision, 28 significant digits,
    /// rather than the 64 digits of a 256-bit decimal context. Reversing
    /// twice reproduces the factor to within 1e-20.
    pub fn reversed(&self) -> FxResult<ExchangeRate> {
        let factor = Decimal::ONE.checked_div(self.factor).ok_or_else(|| {
            FxError::Arithmetic(format!("cannot take reciprocal of {}", self.factor))
        })?;
        let legs = self
            .legs
            .iter()
            .rev()
            .map(|leg| leg.reversed())
            .collect::<FxResult<Vec<_>>>()?;

        Ok(ExchangeRate {
            base: self.term.clone(),
            term: self.base.clone(),
            factor,
            context: self.context.clone(),
            legs,
        })
    }

    /// Convert a `base` amount into `term`.
    pub fn convert(&self, amount: &Money) -> FxResult<Money> {
        if amount.currency != self.base {
            return Err(FxError::CurrencyMismatch {
                expected: self.base.clone(),
                actual: amount.currency.clone(),
            });
        }
        let value = amount.value.checked_mul(self.factor).ok_or_else(|| {
            FxError::Arithmetic(format!("{} * {} overflows", amount.value, self.factor))
        })?;
        Ok(Money::new(value, self.term.clone()))
    }

    fn sort_key(&self) -> (RateKind, &str, &Currency, &Currency) {
        (self.context.kind, &self.context.provider, &self.base, &self.term)
    }
}

impl PartialEq for ExchangeRate {
    fn eq(&self, other: &Self) -> bool {
        self.sort_key() == other.sort_key()
    }
}

impl Eq for ExchangeRate {}

impl Hash for ExchangeRate {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.sort_key().hash(state);
    }
}

impl PartialOrd for ExchangeRate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ExchangeRate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

impl fmt::Display for ExchangeRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} {} [{} {}]",
            self.base, self.term, self.factor, self.context.provider, self.context.kind
        )
    }
}

/// Builder for [`ExchangeRate`].
#[derive(Debug, Clone, Default)]
pub struct ExchangeRateBuilder {
    base: Option<Currency>,
    term: Option<Currency>,
    factor: Option<Decimal>,
    context: Option<ConversionContext>,
    chain: Vec<ExchangeRate>,
}

impl ExchangeRateBuilder {
    pub fn base(mut self, base: Currency) -> Self {
        self.base = Some(base);
        self
    }

    pub fn term(mut self, term: Currency) -> Self {
        self.term = Some(term);
        self
    }

    pub fn factor(mut self, factor: Decimal) -> Self {
        self.factor = Some(factor);
        self
    }

    pub fn context(mut self, context: ConversionContext) -> Self {
        self.context = Some(context);
        self
    }

    /// Legs the rate was derived from, in conversion order.
    pub fn chain(mut self, chain: Vec<ExchangeRate>) -> Self {
        self.chain = chain;
        self
    }

    /// Validate and build the rate.
    ///
    /// A non-empty chain must start at `base`, end at `term` and connect
    /// leg to leg. A single-leg chain describes the rate itself.
    pub fn build(self) -> FxResult<ExchangeRate> {
        let base = self.base.ok_or_else(|| missing("base"))?;
        let term = self.term.ok_or_else(|| missing("term"))?;
        let factor = self.factor.ok_or_else(|| missing("factor"))?;
        let context = self.context.ok_or_else(|| missing("context"))?;

        if factor <= Decimal::ZERO {
            return Err(FxError::InvalidRate(format!(
                "factor of {}/{} must be positive, got {}",
                base, term, factor
            )));
        }

        let mut legs = self.chain;
        if !legs.is_empty() {
            validate_chain(&base, &term, &legs)?;
        }
        if legs.len() == 1 {
            legs.clear();
        }

        Ok(ExchangeRate {
            base,
            term,
            factor,
            context,
            legs,
        })
    }
}

fn missing(part: &str) -> FxError {
    FxError::InvalidRate(format!("missing {}", part))
}

fn validate_chain(base: &Currency, term: &Currency, legs: &[ExchangeRate]) -> FxResult<()> {
    let (first, last) = match (legs.first(), legs.last()) {
        (Some(first), Some(last)) => (first, last),
        _ => return Ok(()),
    };

    if &first.base != base {
        return Err(FxError::InvalidRate(format!(
            "chain starts at {} but rate base is {}",
            first.base, base
        )));
    }
    if &last.term != term {
        return Err(FxError::InvalidRate(format!(
            "chain ends at {} but rate term is {}",
            last.term, term
        )));
    }
    for pair in legs.windows(2) {
        if pair[0].term != pair[1].base {
            return Err(FxError::InvalidRate(format!(
                "broken chain: {} does not connect to {}",
                pair[0].pair(),
                pair[1].pair()
            )));
        }
    }
    Ok(())
}
