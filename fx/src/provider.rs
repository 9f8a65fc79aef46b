//! Rate provider trait and simple implementations.

use async_trait::async_trait;
use ratefeed_common::Currency;

use crate::error::{FxError, FxResult};
use crate::query::RateQuery;
use crate::rate::{ConversionContext, ExchangeRate, RateKind};

/// Source of exchange rates.
#[async_trait]
pub trait RateProvider: Send + Sync {
    /// Get the provider name.
    fn name(&self) -> &str;

    /// Answer a rate query.
    async fn get_exchange_rate(&self, query: &RateQuery) -> FxResult<ExchangeRate>;

    /// Latest `base -> term` rate.
    async fn get_rate(&self, base: &Currency, term: &Currency) -> FxResult<ExchangeRate> {
        self.get_exchange_rate(&RateQuery::new(base.clone(), term.clone()))
            .await
    }
}

/// Answers `X -> X` queries with factor one and nothing else.
#[derive(Debug, Clone)]
pub struct IdentityRateProvider {
    name: String,
}

impl IdentityRateProvider {
    pub fn new() -> Self {
        Self {
            name: "IDENTITY".to_string(),
        }
    }
}

impl Default for IdentityRateProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RateProvider for IdentityRateProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get_exchange_rate(&self, query: &RateQuery) -> FxResult<ExchangeRate> {
        if query.base != query.term {
            return Err(FxError::not_found(&query.base, &query.term, query.as_of, Vec::new()));
        }
        let mut context = ConversionContext::new(self.name.clone(), RateKind::Other);
        if let Some(date) = query.as_of {
            context = context.with_date(date);
        }
        Ok(ExchangeRate::identity(&query.base, context))
    }
}

/// Mock rate provider for testing.
#[cfg(any(test, feature = "test-utils"))]
pub struct MockRateProvider {
    name: String,
    rates: dashmap::DashMap<String, ExchangeRate>,
    calls: std::sync::atomic::AtomicUsize,
}

#[cfg(any(test, feature = "test-utils"))]
impl MockRateProvider {
    /// Create a new mock provider.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rates: dashmap::DashMap::new(),
            calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// Serve `factor` for `base -> term`.
    pub fn set_rate(&self, base: &str, term: &str, factor: rust_decimal::Decimal) -> FxResult<()> {
        let rate = ExchangeRate::builder()
            .base(Currency::new(base))
            .term(Currency::new(term))
            .factor(factor)
            .context(ConversionContext::new(self.name.clone(), RateKind::Other))
            .build()?;
        self.rates.insert(format!("{}", rate.pair()), rate);
        Ok(())
    }

    /// Number of queries answered or refused.
    pub fn calls(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl RateProvider for MockRateProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get_exchange_rate(&self, query: &RateQuery) -> FxResult<ExchangeRate> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let key = format!("{}", query.pair());
        self.rates
            .get(&key)
            .map(|r| r.clone())
            .ok_or_else(|| FxError::not_found(&query.base, &query.term, query.as_of, vec![query.pair()]))
    }
}
