//! Rate provider backed by a loader resource.
//!
//! The provider listens to load events of one resource, parses each new
//! payload into a [`RateTable`] and swaps it in. Queries made before the
//! first table arrives wait for it, up to the configured timeout.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use ratefeed_loader::{
    DataOrigin, LoadEvent, LoadableResource, LoaderError, LoaderRegistry, UpdatePolicy,
};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, instrument, warn};

use crate::config::FeedProviderConfig;
use crate::error::{FxError, FxResult};
use crate::feed::FeedParser;
use crate::provider::RateProvider;
use crate::query::RateQuery;
use crate::rate::ExchangeRate;
use crate::resolver::RateResolver;
use crate::table::RateTable;

/// An installed rate table and the load it came from.
#[derive(Debug)]
pub struct RateSnapshot {
    pub table: RateTable,
    pub generation: u64,
    pub origin: DataOrigin,
    pub loaded_at: DateTime<Utc>,
}

struct Attachment {
    registry: Arc<LoaderRegistry>,
    resource: Arc<LoadableResource>,
}

/// Feed-backed rate provider.
pub struct FeedRateProvider {
    config: FeedProviderConfig,
    parser: Arc<dyn FeedParser>,
    resolver: RateResolver,
    snapshot: RwLock<Option<Arc<RateSnapshot>>>,
    ready: watch::Sender<bool>,
    attachment: RwLock<Option<Attachment>>,
    consumer: Mutex<Option<JoinHandle<()>>>,
    lazy_loading: Arc<AtomicBool>,
}

impl FeedRateProvider {
    /// Create a provider with no data.
    pub fn new(config: FeedProviderConfig, parser: Arc<dyn FeedParser>) -> FxResult<Self> {
        config.validate().map_err(FxError::Configuration)?;
        let (ready, _) = watch::channel(false);

        Ok(Self {
            resolver: RateResolver::new(config.name.clone(), config.kind),
            snapshot: RwLock::new(None),
            attachment: RwLock::new(None),
            consumer: Mutex::new(None),
            lazy_loading: Arc::new(AtomicBool::new(false)),
            ready,
            parser,
            config,
        })
    }

    /// Follow the configured resource of `registry`.
    ///
    /// Data the resource already holds is installed at once. A scheduled
    /// resource without data gets one immediate background load; lazy
    /// resources are loaded on the first query.
    #[instrument(skip(self, registry), fields(provider = %self.config.name))]
    pub fn attach(self: &Arc<Self>, registry: Arc<LoaderRegistry>) -> FxResult<()> {
        let id = self.config.resource_id.clone();
        // Subscribe first so no load between the two steps is missed.
        let events = registry.subscribe(&id);
        let resource = registry
            .resource(&id)
            .ok_or_else(|| LoaderError::UnknownResource(id.clone()))?;

        if let Some(event) = resource.current() {
            self.apply(&event);
        }

        let handle = tokio::spawn(consume(Arc::downgrade(self), events));
        if let Some(previous) = self.consumer.lock().replace(handle) {
            previous.abort();
        }

        if resource.update_policy() == UpdatePolicy::Scheduled && !resource.is_loaded() {
            registry.load_data_async(&id)?;
        }

        info!(
            provider = %self.config.name,
            resource_id = %id,
            policy = %resource.update_policy(),
            "Provider attached to resource"
        );
        *self.attachment.write() = Some(Attachment { registry, resource });
        Ok(())
    }

    /// Stop following the resource. The current table stays installed.
    pub fn detach(&self) {
        if let Some(consumer) = self.consumer.lock().take() {
            consumer.abort();
        }
        self.attachment.write().take();
    }

    /// Parse `data` and install it unless a newer generation is installed.
    ///
    /// Returns whether the table was replaced. On error the previous table
    /// stays in place.
    pub fn install(
        &self,
        generation: u64,
        data: &[u8],
        origin: DataOrigin,
        loaded_at: DateTime<Utc>,
    ) -> FxResult<bool> {
        let rows = self.parser.parse(data)?;
        let table = RateTable::from_raw(
            self.config.reference.clone(),
            &self.config.name,
            self.config.kind,
            Some(loaded_at),
            &rows,
        )?;
        let days = table.len();
        let latest = table.latest_date();

        {
            let mut slot = self.snapshot.write();
            if let Some(current) = slot.as_ref() {
                if generation <= current.generation {
                    debug!(
                        provider = %self.config.name,
                        generation,
                        installed = current.generation,
                        "Ignoring stale feed data"
                    );
                    return Ok(false);
                }
            }
            *slot = Some(Arc::new(RateSnapshot {
                table,
                generation,
                origin: origin.clone(),
                loaded_at,
            }));
        }
        self.ready.send_replace(true);

        info!(
            provider = %self.config.name,
            generation,
            origin = %origin,
            days,
            latest = ?latest,
            "Rate table installed"
        );
        Ok(true)
    }

    /// Current table, if any.
    pub fn snapshot(&self) -> Option<Arc<RateSnapshot>> {
        self.snapshot.read().clone()
    }

    /// Generation of the installed table.
    pub fn generation(&self) -> Option<u64> {
        self.snapshot.read().as_ref().map(|s| s.generation)
    }

    pub fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }

    pub fn config(&self) -> &FeedProviderConfig {
        &self.config
    }

    // --- Private methods ---

    fn apply(&self, event: &LoadEvent) {
        if let Err(e) = self.install(
            event.generation,
            event.bytes(),
            event.origin.clone(),
            event.loaded_at,
        ) {
            error!(
                provider = %self.config.name,
                resource_id = %event.resource_id,
                generation = event.generation,
                error = %e,
                "Failed to install feed data"
            );
        }
    }

    async fn wait_ready(&self) -> FxResult<Arc<RateSnapshot>> {
        if let Some(snapshot) = self.snapshot() {
            return Ok(snapshot);
        }

        self.request_lazy_load();

        let waited = self.config.first_load_timeout;
        let mut ready = self.ready.subscribe();
        if timeout(waited, ready.wait_for(|installed| *installed)).await.is_err() {
            debug!(provider = %self.config.name, "Timed out waiting for first table");
        }
        match self.snapshot() {
            Some(snapshot) => Ok(snapshot),
            None => {
                warn!(provider = %self.config.name, waited_ms = waited.as_millis() as u64, "No rate data yet");
                Err(FxError::DataUnavailable {
                    provider: self.config.name.clone(),
                    waited,
                })
            }
        }
    }

    fn request_lazy_load(&self) {
        let guard = self.attachment.read();
        let Some(attachment) = guard.as_ref() else {
            return;
        };
        // One load in flight at a time; a failed load is retried by the next query.
        if attachment.resource.update_policy() != UpdatePolicy::Lazy
            || attachment.resource.is_loaded()
            || self.lazy_loading.swap(true, Ordering::SeqCst)
        {
            return;
        }

        let registry = attachment.registry.clone();
        let loading = self.lazy_loading.clone();
        let id = self.config.resource_id.clone();
        debug!(provider = %self.config.name, resource_id = %id, "Loading lazy resource");
        tokio::spawn(async move {
            if let Err(e) = registry.get_data(&id).await {
                warn!(resource_id = %id, error = %e, "Lazy load failed");
            }
            loading.store(false, Ordering::SeqCst);
        });
    }
}

impl Drop for FeedRateProvider {
    fn drop(&mut self) {
        if let Some(consumer) = self.consumer.get_mut().take() {
            consumer.abort();
        }
    }
}

#[async_trait]
impl RateProvider for FeedRateProvider {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn get_exchange_rate(&self, query: &RateQuery) -> FxResult<ExchangeRate> {
        let snapshot = self.wait_ready().await?;
        self.resolver.resolve(&snapshot.table, query)
    }
}

async fn consume(provider: Weak<FeedRateProvider>, mut events: tokio::sync::broadcast::Receiver<LoadEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => {
                let Some(provider) = provider.upgrade() else {
                    break;
                };
                provider.apply(&event);
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Feed consumer fell behind, continuing with newer data");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::DelimitedFeedParser;
    use ratefeed_common::Currency;
    use ratefeed_loader::{LoaderConfig, ResourceSpec, StaticFetcher};
    use rust_decimal_macros::dec;
    use std::time::Duration;
    use url::Url;

    const DAY2: &[u8] = b"2024-01-02\tUSD\t1.10\n2024-01-02\tGBP\t0.85\n";
    const DAY3: &[u8] = b"2024-01-03\tUSD\t1.20\n2024-01-03\tGBP\t0.80\n";
    const FALLBACK: &str = "file:///bundled/ecb.tsv";
    const REMOTE: &str = "http://remote.test/ecb.tsv";

    fn provider(timeout: Duration) -> Arc<FeedRateProvider> {
        let config = FeedProviderConfig::new("ECB", "ECB", Currency::eur()).with_first_load_timeout(timeout);
        Arc::new(FeedRateProvider::new(config, Arc::new(DelimitedFeedParser::tsv())).unwrap())
    }

    fn registry() -> Arc<LoaderRegistry> {
        let fetcher = Arc::new(StaticFetcher::new());
        fetcher.serve(FALLBACK, DAY2.to_vec());
        fetcher.serve(REMOTE, DAY3.to_vec());
        Arc::new(LoaderRegistry::with_fetcher(LoaderConfig::default(), fetcher))
    }

    fn spec(policy: UpdatePolicy) -> ResourceSpec {
        ResourceSpec::new("ECB", Url::parse(FALLBACK).unwrap())
            .with_remote(Url::parse(REMOTE).unwrap())
            .with_policy(policy)
    }

    async fn wait_for_generation(provider: &FeedRateProvider, generation: u64) {
        timeout(Duration::from_secs(5), async {
            while provider.generation() != Some(generation) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_install_and_resolve() {
        let provider = provider(Duration::from_secs(1));

        assert!(provider.install(1, DAY2, DataOrigin::Fallback, Utc::now()).unwrap());
        let rate = provider.get_rate(&Currency::usd(), &Currency::gbp()).await.unwrap();

        assert!(provider.is_ready());
        assert!(rate.is_derived());
        assert!((rate.factor() - dec!(0.772727272727)).abs() < dec!(0.000000000001));
        assert_eq!(rate.provider(), "ECB");
    }

    #[tokio::test]
    async fn test_stale_generation_ignored() {
        let provider = provider(Duration::from_secs(1));

        provider.install(2, DAY3, DataOrigin::Fallback, Utc::now()).unwrap();
        let replaced = provider.install(1, DAY2, DataOrigin::Fallback, Utc::now()).unwrap();

        assert!(!replaced);
        assert_eq!(provider.generation(), Some(2));
        let rate = provider.get_rate(&Currency::eur(), &Currency::usd()).await.unwrap();
        assert_eq!(rate.factor(), dec!(1.20));
    }

    #[tokio::test]
    async fn test_bad_payload_keeps_previous_table() {
        let provider = provider(Duration::from_secs(1));
        provider.install(1, DAY2, DataOrigin::Fallback, Utc::now()).unwrap();

        let result = provider.install(2, b"garbage\tXX\n", DataOrigin::Cache, Utc::now());

        assert!(matches!(result, Err(FxError::Feed(_))));
        assert_eq!(provider.generation(), Some(1));
    }

    #[tokio::test]
    async fn test_times_out_without_data() {
        let provider = provider(Duration::from_millis(50));

        let result = provider.get_rate(&Currency::eur(), &Currency::usd()).await;

        assert!(matches!(result, Err(FxError::DataUnavailable { ref provider, .. }) if provider == "ECB"));
        assert!(result.unwrap_err().is_retryable());
    }

    #[tokio::test]
    async fn test_waiting_query_sees_first_load() {
        let provider = provider(Duration::from_secs(5));
        let background = provider.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            background.install(1, DAY2, DataOrigin::Fallback, Utc::now()).unwrap();
        });

        let rate = provider.get_rate(&Currency::eur(), &Currency::gbp()).await.unwrap();

        assert_eq!(rate.factor(), dec!(0.85));
    }

    #[tokio::test]
    async fn test_attach_follows_loads() {
        let registry = registry();
        registry.register_data(spec(UpdatePolicy::Never)).await.unwrap();
        let provider = provider(Duration::from_secs(1));

        provider.attach(registry.clone()).unwrap();
        assert_eq!(provider.generation(), Some(1));

        registry.load_data("ECB").await.unwrap();
        wait_for_generation(&provider, 2).await;

        let rate = provider.get_rate(&Currency::eur(), &Currency::usd()).await.unwrap();
        assert_eq!(rate.factor(), dec!(1.20));
        assert!(matches!(provider.snapshot().unwrap().origin, DataOrigin::Remote(_)));
    }

    #[tokio::test]
    async fn test_lazy_resource_loaded_on_first_query() {
        let registry = registry();
        registry.register_data(spec(UpdatePolicy::Lazy)).await.unwrap();
        let provider = provider(Duration::from_secs(5));
        provider.attach(registry.clone()).unwrap();
        assert!(!provider.is_ready());

        let rate = provider.get_rate(&Currency::eur(), &Currency::usd()).await.unwrap();

        assert_eq!(rate.factor(), dec!(1.20));
        assert_eq!(registry.resource("ECB").unwrap().load_count(), 1);
    }

    #[tokio::test]
    async fn test_lazy_resource_retried_after_failed_load() {
        let fetcher = Arc::new(StaticFetcher::new());
        let registry = Arc::new(LoaderRegistry::with_fetcher(LoaderConfig::default(), fetcher.clone()));
        registry.register_data(spec(UpdatePolicy::Lazy)).await.unwrap();
        let provider = provider(Duration::from_millis(200));
        provider.attach(registry.clone()).unwrap();

        let first = provider.get_rate(&Currency::eur(), &Currency::usd()).await;
        assert!(matches!(first, Err(FxError::DataUnavailable { .. })));
        let attempts = fetcher.calls();
        assert!(attempts > 0);

        fetcher.serve(REMOTE, DAY3.to_vec());
        let rate = timeout(Duration::from_secs(5), async {
            loop {
                if let Ok(rate) = provider.get_rate(&Currency::eur(), &Currency::usd()).await {
                    return rate;
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(rate.factor(), dec!(1.20));
        assert!(fetcher.calls() > attempts);
        assert_eq!(registry.resource("ECB").unwrap().load_count(), 1);
    }

    #[tokio::test]
    async fn test_attach_unknown_resource() {
        let provider = provider(Duration::from_secs(1));

        let result = provider.attach(registry());

        assert!(matches!(result, Err(FxError::Loader(LoaderError::UnknownResource(_)))));
    }
}
