//! Loadable resources.
//!
//! A [`LoadableResource`] owns the bytes of one feed. Loads try each remote
//! location in order, then the local disk cache, then the bundled fallback
//! snapshot. Loads of the same resource never overlap.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::cache::ResourceCache;
use crate::error::{LoaderError, LoaderResult};
use crate::fetcher::ResourceFetcher;
use crate::listener::{ListenerHub, LoadEvent};
use crate::state::{DataOrigin, ResourceState, UpdatePolicy};

/// Registration parameters of a resource.
#[derive(Debug, Clone)]
pub struct ResourceSpec {
    /// Unique resource id.
    pub id: String,
    /// Reload trigger.
    pub update_policy: UpdatePolicy,
    /// Free-form properties; the scheduler reads `period`, `delay` and `at`.
    pub properties: HashMap<String, String>,
    /// Bundled snapshot used when no remote location answers.
    pub fallback_location: Url,
    /// Remote locations, in the order they are tried.
    pub remote_locations: Vec<Url>,
}

impl ResourceSpec {
    /// Create a spec with the `OnStartup` policy and no remote locations.
    pub fn new(id: impl Into<String>, fallback_location: Url) -> Self {
        Self {
            id: id.into(),
            update_policy: UpdatePolicy::OnStartup,
            properties: HashMap::new(),
            fallback_location,
            remote_locations: Vec::new(),
        }
    }

    /// Set the update policy.
    pub fn with_policy(mut self, policy: UpdatePolicy) -> Self {
        self.update_policy = policy;
        self
    }

    /// Append a remote location.
    pub fn with_remote(mut self, location: Url) -> Self {
        self.remote_locations.push(location);
        self
    }

    /// Set a property.
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

/// A registered resource and its current data.
pub struct LoadableResource {
    id: String,
    update_policy: UpdatePolicy,
    properties: HashMap<String, String>,
    remote_locations: Vec<Url>,
    fallback_location: Url,
    data: RwLock<Option<LoadEvent>>,
    state: RwLock<ResourceState>,
    last_loaded: RwLock<Option<DateTime<Utc>>>,
    load_count: AtomicU64,
    access_count: AtomicU64,
    generation: AtomicU64,
    load_lock: Mutex<()>,
    fetcher: Arc<dyn ResourceFetcher>,
    cache: Option<Arc<dyn ResourceCache>>,
    hub: Arc<ListenerHub>,
}

impl LoadableResource {
    /// Create an unloaded resource.
    pub fn new(
        spec: ResourceSpec,
        fetcher: Arc<dyn ResourceFetcher>,
        cache: Option<Arc<dyn ResourceCache>>,
        hub: Arc<ListenerHub>,
    ) -> Self {
        Self {
            id: spec.id,
            update_policy: spec.update_policy,
            properties: spec.properties,
            remote_locations: spec.remote_locations,
            fallback_location: spec.fallback_location,
            data: RwLock::new(None),
            state: RwLock::new(ResourceState::Unloaded),
            last_loaded: RwLock::new(None),
            load_count: AtomicU64::new(0),
            access_count: AtomicU64::new(0),
            generation: AtomicU64::new(0),
            load_lock: Mutex::new(()),
            fetcher,
            cache,
            hub,
        }
    }

    /// Load from the remote locations, falling back to the disk cache and
    /// then the bundled snapshot.
    ///
    /// Listeners are notified before this returns, so a listener must not
    /// start another load of the same resource from its callback.
    #[instrument(skip(self), fields(resource_id = %self.id))]
    pub async fn load(&self) -> LoaderResult<DataOrigin> {
        let _guard = self.load_lock.lock().await;
        self.load_locked().await
    }

    /// Load the bundled snapshot. Does not count as a load.
    #[instrument(skip(self), fields(resource_id = %self.id))]
    pub async fn load_fallback(&self) -> LoaderResult<DataOrigin> {
        let _guard = self.load_lock.lock().await;
        let previous = self.state();
        let generation = self.next_generation();
        self.set_state(ResourceState::Loading);
        self.fallback_locked(generation, previous).await
    }

    /// Get a private copy of the data, loading first if there is none.
    pub async fn get_data(&self) -> LoaderResult<Vec<u8>> {
        self.ensure_loaded().await?;
        let data = self.cached().ok_or_else(|| LoaderError::AllSourcesFailed {
            id: self.id.clone(),
            attempts: vec!["data unloaded during access".to_string()],
        })?;
        self.access_count.fetch_add(1, Ordering::Relaxed);
        Ok(data.to_vec())
    }

    /// Load unless data is already present.
    pub async fn ensure_loaded(&self) -> LoaderResult<()> {
        if self.cached().is_some() {
            return Ok(());
        }

        let _guard = self.load_lock.lock().await;
        if self.cached().is_none() {
            self.load_locked().await?;
        }
        Ok(())
    }

    /// Discard all state, including the disk cache entry, and reload the
    /// bundled snapshot.
    #[instrument(skip(self), fields(resource_id = %self.id))]
    pub async fn reset(&self) -> LoaderResult<DataOrigin> {
        let _guard = self.load_lock.lock().await;
        if let Some(cache) = &self.cache {
            if let Err(e) = cache.remove(&self.id).await {
                warn!(resource_id = %self.id, error = %e, "Failed to remove disk cache entry");
            }
        }
        *self.data.write() = None;
        *self.last_loaded.write() = None;
        self.set_state(ResourceState::Unloaded);
        self.load_count.store(0, Ordering::Relaxed);

        let generation = self.next_generation();
        self.fallback_locked(generation, ResourceState::Unloaded).await
    }

    /// Seed the data from the disk cache if nothing is loaded yet.
    pub async fn restore_from_cache(&self) -> bool {
        let _guard = self.load_lock.lock().await;
        if self.cached().is_some() {
            return false;
        }
        let generation = self.next_generation();
        self.cache_locked(generation).await.is_some()
    }

    /// Drop the data. The next access loads again.
    pub fn unload(&self) {
        *self.data.write() = None;
        self.set_state(ResourceState::Unloaded);
        debug!(resource_id = %self.id, "Resource unloaded");
    }

    /// Current data without copying and without counting an access.
    pub fn cached(&self) -> Option<Arc<[u8]>> {
        self.data.read().as_ref().map(|event| event.data.clone())
    }

    /// The load that produced the current data.
    pub fn current(&self) -> Option<LoadEvent> {
        self.data.read().clone()
    }

    /// Check if data is present.
    pub fn is_loaded(&self) -> bool {
        self.data.read().is_some()
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn update_policy(&self) -> UpdatePolicy {
        self.update_policy
    }

    pub fn properties(&self) -> &HashMap<String, String> {
        &self.properties
    }

    pub fn remote_locations(&self) -> &[Url] {
        &self.remote_locations
    }

    pub fn fallback_location(&self) -> &Url {
        &self.fallback_location
    }

    pub fn state(&self) -> ResourceState {
        *self.state.read()
    }

    /// Number of successful remote loads since creation or the last reset.
    pub fn load_count(&self) -> u64 {
        self.load_count.load(Ordering::Relaxed)
    }

    /// Number of `get_data` calls served.
    pub fn access_count(&self) -> u64 {
        self.access_count.load(Ordering::Relaxed)
    }

    /// Generation of the most recently started load.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// When the last successful remote load completed.
    pub fn last_loaded(&self) -> Option<DateTime<Utc>> {
        *self.last_loaded.read()
    }

    // --- Private methods ---

    fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn set_state(&self, state: ResourceState) {
        *self.state.write() = state;
    }

    async fn load_locked(&self) -> LoaderResult<DataOrigin> {
        let previous = self.state();
        let generation = self.next_generation();
        self.set_state(ResourceState::Loading);

        let mut attempts = Vec::new();
        for location in &self.remote_locations {
            match self.fetcher.fetch(location).await {
                Ok(data) if data.is_empty() => {
                    warn!(resource_id = %self.id, location = %location, "Remote returned no data");
                    attempts.push(format!("{}: empty response", location));
                }
                Ok(data) => {
                    let data: Arc<[u8]> = Arc::from(data);
                    self.write_cache(&data).await;
                    self.load_count.fetch_add(1, Ordering::Relaxed);
                    let origin = DataOrigin::Remote(location.to_string());
                    self.install(generation, data, ResourceState::Loaded, origin.clone());
                    info!(
                        resource_id = %self.id,
                        location = %location,
                        generation,
                        "Resource loaded"
                    );
                    return Ok(origin);
                }
                Err(e) => {
                    warn!(
                        resource_id = %self.id,
                        location = %location,
                        error = %e,
                        "Remote load failed"
                    );
                    attempts.push(format!("{}: {}", location, e));
                }
            }
        }

        if !self.remote_locations.is_empty() {
            warn!(resource_id = %self.id, "All remote locations failed, using local data");
        }

        if let Some(origin) = self.cache_locked(generation).await {
            return Ok(origin);
        }

        self.fallback_locked(generation, previous)
            .await
            .map_err(|e| {
                attempts.push(e.to_string());
                LoaderError::AllSourcesFailed {
                    id: self.id.clone(),
                    attempts,
                }
            })
    }

    async fn cache_locked(&self, generation: u64) -> Option<DataOrigin> {
        let cache = self.cache.as_ref()?;
        let data = cache.read(&self.id).await?;
        self.install(
            generation,
            Arc::from(data),
            ResourceState::FallbackLoaded,
            DataOrigin::Cache,
        );
        info!(resource_id = %self.id, generation, "Resource restored from disk cache");
        Some(DataOrigin::Cache)
    }

    async fn fallback_locked(
        &self,
        generation: u64,
        previous: ResourceState,
    ) -> LoaderResult<DataOrigin> {
        let result = match self.fetcher.fetch(&self.fallback_location).await {
            Ok(data) if data.is_empty() => Err("fallback is empty".to_string()),
            Ok(data) => Ok(data),
            Err(e) => Err(e.to_string()),
        };

        match result {
            Ok(data) => {
                self.install(
                    generation,
                    Arc::from(data),
                    ResourceState::FallbackLoaded,
                    DataOrigin::Fallback,
                );
                info!(resource_id = %self.id, generation, "Resource loaded from fallback");
                Ok(DataOrigin::Fallback)
            }
            Err(reason) => {
                let restored = if self.cached().is_some() {
                    previous
                } else {
                    ResourceState::Unloaded
                };
                self.set_state(restored);
                Err(LoaderError::FallbackFailed {
                    id: self.id.clone(),
                    reason,
                })
            }
        }
    }

    async fn write_cache(&self, data: &[u8]) {
        if let Some(cache) = &self.cache {
            if let Err(e) = cache.write(&self.id, data).await {
                warn!(resource_id = %self.id, error = %e, "Failed to write disk cache");
            }
        }
    }

    fn install(&self, generation: u64, data: Arc<[u8]>, state: ResourceState, origin: DataOrigin) {
        let event = LoadEvent {
            resource_id: self.id.clone(),
            generation,
            origin,
            data,
            loaded_at: Utc::now(),
        };
        *self.data.write() = Some(event.clone());
        if state == ResourceState::Loaded {
            *self.last_loaded.write() = Some(event.loaded_at);
        }
        self.set_state(state);

        self.hub.publish(&event);
    }
}
