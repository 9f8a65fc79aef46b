//! Main FX engine implementation.

use std::sync::Arc;

use ratefeed_common::Money;
use ratefeed_loader::{LoaderRegistry, ResourceSpec};
use tracing::{info, instrument};

use crate::compound::CompoundRateProvider;
use crate::config::FeedProviderConfig;
use crate::conversion::Conversion;
use crate::error::{FxError, FxResult};
use crate::feed::FeedParser;
use crate::feed_provider::FeedRateProvider;
use crate::provider::RateProvider;
use crate::query::RateQuery;
use crate::rate::ExchangeRate;

/// Facade over the loader registry and the provider chain.
pub struct FxEngine {
    registry: Arc<LoaderRegistry>,
    chain: CompoundRateProvider,
    feeds: Vec<Arc<FeedRateProvider>>,
}

impl FxEngine {
    /// Create an engine with an empty provider chain.
    pub fn new(registry: Arc<LoaderRegistry>) -> Self {
        Self {
            registry,
            chain: CompoundRateProvider::new(Vec::new()),
            feeds: Vec::new(),
        }
    }

    /// Register the feed resource (unless already registered) and append a
    /// provider reading it to the chain.
    #[instrument(skip(self, spec, parser), fields(provider = %config.name, resource_id = %spec.id))]
    pub async fn add_feed(
        &mut self,
        spec: ResourceSpec,
        config: FeedProviderConfig,
        parser: Arc<dyn FeedParser>,
    ) -> FxResult<Arc<FeedRateProvider>> {
        if spec.id != config.resource_id {
            return Err(FxError::Configuration(format!(
                "provider {} reads {} but the resource is {}",
                config.name, config.resource_id, spec.id
            )));
        }
        if self.chain.provider(&config.name).is_some() {
            return Err(FxError::Configuration(format!(
                "provider {} already exists",
                config.name
            )));
        }
        if !self.registry.is_resource_registered(&spec.id) {
            self.registry.register_data(spec).await?;
        }

        let provider = Arc::new(FeedRateProvider::new(config, parser)?);
        provider.attach(self.registry.clone())?;
        self.chain.push(provider.clone());
        self.feeds.push(provider.clone());

        info!(providers = self.chain.len(), "Feed provider added");
        Ok(provider)
    }

    /// Append any provider to the chain.
    pub fn add_provider(&mut self, provider: Arc<dyn RateProvider>) {
        self.chain.push(provider);
    }

    /// Resolve a rate through the chain.
    pub async fn get_rate(&self, query: &RateQuery) -> FxResult<ExchangeRate> {
        self.chain.get_exchange_rate(query).await
    }

    /// Convert an amount through the chain.
    pub async fn convert(&self, amount: &Money, query: &RateQuery) -> FxResult<Conversion> {
        let conversion = self.chain.convert(amount, query).await?;
        info!(
            pair = %conversion.pair(),
            provider = conversion.rate.provider(),
            effective_rate = %conversion.effective_rate(),
            "Conversion completed"
        );
        Ok(conversion)
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.chain.provider_names()
    }

    pub fn feeds(&self) -> &[Arc<FeedRateProvider>] {
        &self.feeds
    }

    pub fn registry(&self) -> &Arc<LoaderRegistry> {
        &self.registry
    }

    /// Stop following feeds and shut the loader down.
    pub async fn shutdown(&self) {
        for feed in &self.feeds {
            feed.detach();
        }
        self.registry.shutdown().await;
    }
}
