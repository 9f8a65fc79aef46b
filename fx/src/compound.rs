//! Failover chain of rate providers.

use std::sync::Arc;

use async_trait::async_trait;
use ratefeed_common::Money;
use tracing::{debug, instrument, warn};

use crate::conversion::Conversion;
use crate::error::{FxError, FxResult, ProviderFailure};
use crate::provider::RateProvider;
use crate::query::RateQuery;
use crate::rate::ExchangeRate;

/// Tries named providers in order until one answers.
///
/// A query may name the providers to consult; otherwise all are tried in
/// composition order. With `fail_fast` only the first candidate is asked.
pub struct CompoundRateProvider {
    name: String,
    providers: Vec<Arc<dyn RateProvider>>,
}

impl CompoundRateProvider {
    /// Create a chain trying `providers` in the given order.
    pub fn new(providers: Vec<Arc<dyn RateProvider>>) -> Self {
        Self {
            name: "COMPOUND".to_string(),
            providers,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Append a provider at the end of the chain.
    pub fn push(&mut self, provider: Arc<dyn RateProvider>) {
        self.providers.push(provider);
    }

    /// Look up a provider by name.
    pub fn provider(&self, name: &str) -> Option<Arc<dyn RateProvider>> {
        self.providers.iter().find(|p| p.name() == name).cloned()
    }

    /// Provider names in chain order.
    pub fn provider_names(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Convert `amount` with the rate the chain resolves for `query`.
    #[instrument(skip(self), fields(base = %query.base, term = %query.term, amount = %amount.value))]
    pub async fn convert(&self, amount: &Money, query: &RateQuery) -> FxResult<Conversion> {
        if amount.currency != query.base {
            return Err(FxError::CurrencyMismatch {
                expected: query.base.clone(),
                actual: amount.currency.clone(),
            });
        }
        let rate = self.get_exchange_rate(query).await?;
        Conversion::execute(amount.clone(), rate)
    }

    fn candidates(&self, query: &RateQuery) -> FxResult<Vec<Arc<dyn RateProvider>>> {
        let candidates = if query.providers.is_empty() {
            self.providers.clone()
        } else {
            query
                .providers
                .iter()
                .map(|name| {
                    self.provider(name)
                        .ok_or_else(|| FxError::UnknownProvider(name.clone()))
                })
                .collect::<FxResult<Vec<_>>>()?
        };

        if candidates.is_empty() {
            return Err(FxError::NoProvidersAvailable);
        }
        Ok(candidates)
    }
}

#[async_trait]
impl RateProvider for CompoundRateProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get_exchange_rate(&self, query: &RateQuery) -> FxResult<ExchangeRate> {
        let candidates = self.candidates(query)?;
        // Names were resolved here; nested chains consult all their members.
        let scoped = RateQuery {
            providers: Vec::new(),
            ..query.clone()
        };

        let mut causes = Vec::new();
        for provider in candidates {
            match provider.get_exchange_rate(&scoped).await {
                Ok(rate) => {
                    debug!(
                        provider = provider.name(),
                        pair = %query.pair(),
                        factor = %rate.factor(),
                        "Got rate from provider"
                    );
                    return Ok(rate);
                }
                Err(e) => {
                    warn!(
                        provider = provider.name(),
                        pair = %query.pair(),
                        error = %e,
                        "Provider failed to return rate"
                    );
                    causes.push(ProviderFailure {
                        provider: provider.name().to_string(),
                        error: e,
                    });
                    if query.fail_fast {
                        break;
                    }
                }
            }
        }

        Err(FxError::CurrencyConversion {
            base: query.base.clone(),
            term: query.term.clone(),
            causes,
        })
    }
}
