//! Resource registry and scheduler.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use tokio::sync::{broadcast, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::{timeout, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};

use ratefeed_common::to_std;

use crate::cache::{FileResourceCache, ResourceCache};
use crate::config::LoaderConfig;
use crate::error::{LoaderError, LoaderResult};
use crate::fetcher::{ResourceFetcher, UrlFetcher};
use crate::listener::{ListenerHandle, ListenerHub, LoadEvent, LoaderListener};
use crate::resource::{LoadableResource, ResourceSpec};
use crate::schedule::Schedule;
use crate::state::{DataOrigin, RegistryState, UpdatePolicy};

/// Registry of loadable resources.
///
/// Owns the worker permits shared by all loads, the schedule timers and the
/// listener hub. Lifecycle: `new`, `register_data` for each resource, then
/// `shutdown` to cancel timers and drain in-flight loads.
pub struct LoaderRegistry {
    config: LoaderConfig,
    state: RwLock<RegistryState>,
    resources: DashMap<String, Arc<LoadableResource>>,
    hub: Arc<ListenerHub>,
    fetcher: Arc<dyn ResourceFetcher>,
    cache: Option<Arc<dyn ResourceCache>>,
    workers: Arc<Semaphore>,
    timers: Mutex<Vec<JoinHandle<()>>>,
}

impl LoaderRegistry {
    /// Create a registry fetching over HTTP and from local files.
    pub fn new(config: LoaderConfig) -> LoaderResult<Self> {
        config.validate().map_err(LoaderError::Configuration)?;
        let fetcher = Arc::new(UrlFetcher::new(&config)?);
        Ok(Self::with_fetcher(config, fetcher))
    }

    /// Create a registry with a custom fetcher.
    pub fn with_fetcher(config: LoaderConfig, fetcher: Arc<dyn ResourceFetcher>) -> Self {
        let cache = config
            .cache_dir
            .clone()
            .map(|dir| Arc::new(FileResourceCache::new(dir)) as Arc<dyn ResourceCache>);

        Self {
            hub: Arc::new(ListenerHub::new(config.channel_capacity)),
            workers: Arc::new(Semaphore::new(config.max_concurrent_loads.max(1))),
            state: RwLock::new(RegistryState::Running),
            resources: DashMap::new(),
            timers: Mutex::new(Vec::new()),
            fetcher,
            cache,
            config,
        }
    }

    /// Register a resource and apply its update policy.
    ///
    /// `Never` loads the fallback before returning, `OnStartup` starts one
    /// background load, `Scheduled` arms timers and `Lazy` waits for the
    /// first access.
    #[instrument(skip(self, spec), fields(resource_id = %spec.id, policy = %spec.update_policy))]
    pub async fn register_data(&self, spec: ResourceSpec) -> LoaderResult<Arc<LoadableResource>> {
        self.ensure_running()?;

        let schedule = match spec.update_policy {
            UpdatePolicy::Scheduled => Some(Schedule::from_properties(&spec.properties)?),
            _ => None,
        };

        let id = spec.id.clone();
        let policy = spec.update_policy;
        let resource = Arc::new(LoadableResource::new(
            spec,
            self.fetcher.clone(),
            self.cache.clone(),
            self.hub.clone(),
        ));

        match self.resources.entry(id.clone()) {
            Entry::Occupied(_) => return Err(LoaderError::DuplicateResource(id)),
            Entry::Vacant(slot) => {
                slot.insert(resource.clone());
            }
        }

        if policy != UpdatePolicy::Never && resource.restore_from_cache().await {
            debug!(resource_id = %id, "Seeded from disk cache");
        }

        match policy {
            UpdatePolicy::Never => {
                if let Err(e) = resource.load_fallback().await {
                    error!(resource_id = %id, error = %e, "Fallback load failed");
                }
            }
            UpdatePolicy::OnStartup => {
                self.spawn_load(resource.clone());
            }
            UpdatePolicy::Scheduled => {
                if let Some(schedule) = schedule {
                    self.arm_timers(resource.clone(), schedule);
                }
            }
            UpdatePolicy::Lazy => {}
        }

        info!(resource_id = %id, policy = %policy, "Resource registered");
        Ok(resource)
    }

    /// Register a resource and wait for one load to finish.
    pub async fn register_and_load_data(&self, spec: ResourceSpec) -> LoaderResult<DataOrigin> {
        let resource = self.register_data(spec).await?;
        run_load(&resource, &self.workers).await
    }

    /// Load a resource now and wait for the result.
    pub async fn load_data(&self, id: &str) -> LoaderResult<DataOrigin> {
        self.ensure_running()?;
        let resource = self.require(id)?;
        run_load(&resource, &self.workers).await
    }

    /// Start a background load of a resource.
    pub fn load_data_async(&self, id: &str) -> LoaderResult<JoinHandle<LoaderResult<DataOrigin>>> {
        self.ensure_running()?;
        let resource = self.require(id)?;
        Ok(self.spawn_load(resource))
    }

    /// Load the bundled snapshot of a resource.
    pub async fn load_data_local(&self, id: &str) -> LoaderResult<DataOrigin> {
        self.require(id)?.load_fallback().await
    }

    /// Reset a resource to its bundled snapshot.
    pub async fn reset_data(&self, id: &str) -> LoaderResult<DataOrigin> {
        self.require(id)?.reset().await
    }

    /// Get a copy of a resource's data, loading it first if needed.
    pub async fn get_data(&self, id: &str) -> LoaderResult<Vec<u8>> {
        let resource = self.require(id)?;
        if !resource.is_loaded() {
            let _permit = self
                .workers
                .acquire()
                .await
                .map_err(|_| LoaderError::ShutDown)?;
            resource.ensure_loaded().await?;
        }
        resource.get_data().await
    }

    /// Drop a resource's data.
    pub fn unload_data(&self, id: &str) -> LoaderResult<()> {
        self.require(id)?.unload();
        Ok(())
    }

    /// Look up a resource.
    pub fn resource(&self, id: &str) -> Option<Arc<LoadableResource>> {
        self.resources.get(id).map(|r| r.clone())
    }

    /// Ids of all registered resources, sorted.
    pub fn resource_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.resources.iter().map(|r| r.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn is_resource_registered(&self, id: &str) -> bool {
        self.resources.contains_key(id)
    }

    pub fn update_policy(&self, id: &str) -> Option<UpdatePolicy> {
        self.resources.get(id).map(|r| r.update_policy())
    }

    pub fn properties(&self, id: &str) -> Option<HashMap<String, String>> {
        self.resources.get(id).map(|r| r.properties().clone())
    }

    /// Register a callback for `ids`, or for all resources if `ids` is empty.
    pub fn add_listener(&self, listener: Arc<dyn LoaderListener>, ids: &[&str]) -> ListenerHandle {
        self.hub.add_listener(listener, ids)
    }

    /// Remove a callback.
    pub fn remove_listener(&self, handle: ListenerHandle) -> bool {
        self.hub.remove_listener(handle)
    }

    /// Subscribe to load events of `id`. The resource need not exist yet.
    pub fn subscribe(&self, id: &str) -> broadcast::Receiver<LoadEvent> {
        self.hub.subscribe(id)
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    pub fn state(&self) -> RegistryState {
        *self.state.read()
    }

    /// Cancel timers and wait (bounded) for in-flight loads.
    #[instrument(skip(self))]
    pub async fn shutdown(&self) {
        {
            let mut state = self.state.write();
            if !state.accepts_requests() {
                return;
            }
            *state = RegistryState::ShuttingDown;
        }
        info!("Shutting down loader registry");

        let timers: Vec<JoinHandle<()>> = self.timers.lock().drain(..).collect();
        for timer in &timers {
            timer.abort();
        }

        // Holding every permit means no load is running.
        let permits = self.config.max_concurrent_loads.max(1) as u32;
        match timeout(self.config.drain_timeout, self.workers.acquire_many(permits)).await {
            Ok(Ok(_all)) => debug!("In-flight loads drained"),
            Ok(Err(_)) => {}
            Err(_) => warn!(
                timeout_ms = self.config.drain_timeout.as_millis() as u64,
                "Timed out waiting for in-flight loads"
            ),
        }
        self.workers.close();

        *self.state.write() = RegistryState::Stopped;
        info!("Loader registry stopped");
    }

    // --- Private methods ---

    fn ensure_running(&self) -> LoaderResult<()> {
        if self.state().accepts_requests() {
            Ok(())
        } else {
            Err(LoaderError::ShutDown)
        }
    }

    fn require(&self, id: &str) -> LoaderResult<Arc<LoadableResource>> {
        self.resource(id)
            .ok_or_else(|| LoaderError::UnknownResource(id.to_string()))
    }

    fn spawn_load(&self, resource: Arc<LoadableResource>) -> JoinHandle<LoaderResult<DataOrigin>> {
        let workers = self.workers.clone();
        tokio::spawn(async move {
            let result = run_load(&resource, &workers).await;
            if let Err(e) = &result {
                warn!(resource_id = %resource.id(), error = %e, "Background load failed");
            }
            result
        })
    }

    fn arm_timers(&self, resource: Arc<LoadableResource>, schedule: Schedule) {
        let mut timers = self.timers.lock();

        if let Some(period) = schedule.period {
            let resource = resource.clone();
            let workers = self.workers.clone();
            let delay = schedule.delay;
            info!(
                resource_id = %resource.id(),
                delay_ms = delay.as_millis() as u64,
                period_ms = period.as_millis() as u64,
                "Periodic reload armed"
            );
            timers.push(tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let mut ticker = tokio::time::interval(period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    ticker.tick().await;
                    scheduled_load(&resource, &workers).await;
                }
            }));
        }

        if !schedule.daily_at.is_empty() {
            let workers = self.workers.clone();
            info!(
                resource_id = %resource.id(),
                times = schedule.daily_at.len(),
                "Daily reload armed"
            );
            timers.push(tokio::spawn(async move {
                loop {
                    let now = Utc::now();
                    let Some(next) = schedule.next_daily_fire(now) else {
                        break;
                    };
                    tokio::time::sleep(to_std(next - now)).await;
                    scheduled_load(&resource, &workers).await;
                }
            }));
        }
    }
}

async fn run_load(resource: &LoadableResource, workers: &Semaphore) -> LoaderResult<DataOrigin> {
    let _permit = workers.acquire().await.map_err(|_| LoaderError::ShutDown)?;
    resource.load().await
}

async fn scheduled_load(resource: &LoadableResource, workers: &Semaphore) {
    match run_load(resource, workers).await {
        Ok(origin) => debug!(resource_id = %resource.id(), origin = %origin, "Scheduled load done"),
        Err(LoaderError::ShutDown) => {}
        Err(e) => warn!(resource_id = %resource.id(), error = %e, "Scheduled load failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::StaticFetcher;
    use crate::state::ResourceState;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use url::Url;

    const FALLBACK: &str = "file:///bundled/ecb.tsv";
    const REMOTE: &str = "http://remote.test/ecb.tsv";

    fn spec(id: &str, policy: UpdatePolicy) -> ResourceSpec {
        ResourceSpec::new(id, Url::parse(FALLBACK).unwrap())
            .with_remote(Url::parse(REMOTE).unwrap())
            .with_policy(policy)
    }

    fn registry() -> (LoaderRegistry, Arc<StaticFetcher>) {
        let fetcher = Arc::new(StaticFetcher::new());
        fetcher.serve(FALLBACK, b"bundled".to_vec());
        fetcher.serve(REMOTE, b"remote".to_vec());
        (
            LoaderRegistry::with_fetcher(LoaderConfig::default(), fetcher.clone()),
            fetcher,
        )
    }

    struct Counting(AtomicUsize);

    impl LoaderListener for Counting {
        fn on_new_data(&self, _event: &LoadEvent) -> anyhow::Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_duplicate_registration() {
        let (registry, _) = registry();

        registry.register_data(spec("ECB", UpdatePolicy::Lazy)).await.unwrap();
        let dup = registry.register_data(spec("ECB", UpdatePolicy::Lazy)).await;
        registry.register_data(spec("IMF", UpdatePolicy::Lazy)).await.unwrap();

        assert!(matches!(dup, Err(LoaderError::DuplicateResource(id)) if id == "ECB"));
        assert_eq!(registry.resource_ids(), vec!["ECB", "IMF"]);
    }

    #[tokio::test]
    async fn test_never_policy_loads_fallback_only() {
        let (registry, fetcher) = registry();

        let resource = registry.register_data(spec("ECB", UpdatePolicy::Never)).await.unwrap();

        assert_eq!(resource.state(), ResourceState::FallbackLoaded);
        assert_eq!(resource.load_count(), 0);
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_on_startup_policy_loads_in_background() {
        let (registry, _) = registry();
        let mut rx = registry.subscribe("ECB");

        registry.register_data(spec("ECB", UpdatePolicy::OnStartup)).await.unwrap();

        let event = timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
        assert_eq!(event.origin, DataOrigin::Remote(REMOTE.to_string()));
        assert_eq!(event.bytes(), b"remote");
    }

    #[tokio::test]
    async fn test_lazy_policy_loads_on_first_access() {
        let (registry, fetcher) = registry();

        let resource = registry.register_data(spec("ECB", UpdatePolicy::Lazy)).await.unwrap();
        assert!(!resource.is_loaded());
        assert_eq!(fetcher.calls(), 0);

        let data = registry.get_data("ECB").await.unwrap();

        assert_eq!(data, b"remote");
        assert_eq!(resource.load_count(), 1);
        assert_eq!(resource.access_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduled_policy_reloads_periodically() {
        let (registry, _) = registry();
        let scheduled = spec("ECB", UpdatePolicy::Scheduled).with_property("period", "00:00:01");

        let resource = registry.register_data(scheduled).await.unwrap();
        tokio::time::sleep(Duration::from_millis(3_500)).await;

        assert!(resource.load_count() >= 3);
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn test_scheduled_policy_requires_schedule() {
        let (registry, _) = registry();

        let result = registry.register_data(spec("ECB", UpdatePolicy::Scheduled)).await;

        assert!(matches!(result, Err(LoaderError::InvalidSchedule(_))));
        assert!(!registry.is_resource_registered("ECB"));
    }

    #[tokio::test]
    async fn test_listeners_notified_on_load() {
        let (registry, _) = registry();
        let ecb = Arc::new(Counting(AtomicUsize::new(0)));
        let other = Arc::new(Counting(AtomicUsize::new(0)));
        registry.add_listener(ecb.clone(), &["ECB"]);
        registry.add_listener(other.clone(), &["IMF"]);
        registry.register_data(spec("ECB", UpdatePolicy::Lazy)).await.unwrap();

        registry.load_data("ECB").await.unwrap();

        assert_eq!(ecb.0.load(Ordering::SeqCst), 1);
        assert_eq!(other.0.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_register_and_load_data() {
        let (registry, _) = registry();

        let origin = registry
            .register_and_load_data(spec("ECB", UpdatePolicy::Lazy))
            .await
            .unwrap();

        assert_eq!(origin, DataOrigin::Remote(REMOTE.to_string()));
        assert_eq!(registry.update_policy("ECB"), Some(UpdatePolicy::Lazy));
    }

    #[tokio::test]
    async fn test_local_load_and_reset() {
        let (registry, _) = registry();
        registry.register_data(spec("ECB", UpdatePolicy::Lazy)).await.unwrap();
        registry.load_data("ECB").await.unwrap();

        assert_eq!(registry.load_data_local("ECB").await.unwrap(), DataOrigin::Fallback);
        assert_eq!(registry.reset_data("ECB").await.unwrap(), DataOrigin::Fallback);
        assert_eq!(registry.resource("ECB").unwrap().load_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_resource() {
        let (registry, _) = registry();

        assert!(matches!(
            registry.load_data("NOPE").await,
            Err(LoaderError::UnknownResource(_))
        ));
        assert!(registry.get_data("NOPE").await.is_err());
        assert!(registry.properties("NOPE").is_none());
    }

    #[tokio::test]
    async fn test_load_data_async() {
        let (registry, _) = registry();
        registry.register_data(spec("ECB", UpdatePolicy::Lazy)).await.unwrap();

        let handle = registry.load_data_async("ECB").unwrap();

        tokio_test::assert_ok!(handle.await.unwrap());
        assert!(registry.resource("ECB").unwrap().is_loaded());
    }

    #[tokio::test]
    async fn test_shutdown_rejects_new_work() {
        let (registry, _) = registry();
        registry
            .register_data(spec("ECB", UpdatePolicy::Scheduled).with_property("at", "06:00"))
            .await
            .unwrap();

        registry.shutdown().await;

        assert_eq!(registry.state(), RegistryState::Stopped);
        assert!(matches!(
            registry.register_data(spec("IMF", UpdatePolicy::Lazy)).await,
            Err(LoaderError::ShutDown)
        ));
        assert!(matches!(registry.load_data("ECB").await, Err(LoaderError::ShutDown)));
        assert!(registry.timers.lock().is_empty());
    }
}
