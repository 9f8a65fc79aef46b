//! Load notifications.
//!
//! Every successful load is delivered twice: synchronously to registered
//! [`LoaderListener`] callbacks, and to subscribers of the resource's
//! broadcast channel.

use std::io::Cursor;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::{debug, error, warn};

use crate::state::DataOrigin;

/// A completed load of a resource.
#[derive(Debug, Clone)]
pub struct LoadEvent {
    /// Resource id.
    pub resource_id: String,
    /// Generation of the load that produced the data. Higher is newer.
    pub generation: u64,
    /// Where the data came from.
    pub origin: DataOrigin,
    /// The loaded bytes.
    pub data: Arc<[u8]>,
    /// When the load completed.
    pub loaded_at: DateTime<Utc>,
}

impl LoadEvent {
    /// Stream view of the loaded bytes.
    pub fn reader(&self) -> Cursor<Arc<[u8]>> {
        Cursor::new(self.data.clone())
    }

    /// The loaded bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }
}

/// Callback invoked on every successful load of the resources it watches.
pub trait LoaderListener: Send + Sync {
    /// Handle newly loaded data.
    fn on_new_data(&self, event: &LoadEvent) -> anyhow::Result<()>;
}

/// Handle returned by [`ListenerHub::add_listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerHandle(u64);

struct Registration {
    handle: ListenerHandle,
    /// Watched resource ids; empty means all.
    ids: Vec<String>,
    listener: Arc<dyn LoaderListener>,
}

impl Registration {
    fn watches(&self, resource_id: &str) -> bool {
        self.ids.is_empty() || self.ids.iter().any(|id| id == resource_id)
    }
}

/// Fan-out point for load events.
pub struct ListenerHub {
    next_handle: AtomicU64,
    listeners: RwLock<Vec<Registration>>,
    channels: DashMap<String, broadcast::Sender<LoadEvent>>,
    capacity: usize,
}

impl ListenerHub {
    /// Create a hub whose channels buffer `capacity` events.
    pub fn new(capacity: usize) -> Self {
        Self {
            next_handle: AtomicU64::new(1),
            listeners: RwLock::new(Vec::new()),
            channels: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Register a callback for `ids`, or for every resource if `ids` is empty.
    pub fn add_listener(&self, listener: Arc<dyn LoaderListener>, ids: &[&str]) -> ListenerHandle {
        let handle = ListenerHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push(Registration {
            handle,
            ids: ids.iter().map(|id| id.to_string()).collect(),
            listener,
        });
        handle
    }

    /// Remove a callback. Returns false if it was not registered.
    pub fn remove_listener(&self, handle: ListenerHandle) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|r| r.handle != handle);
        listeners.len() != before
    }

    /// Number of registered callbacks.
    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Subscribe to the event channel of `resource_id`.
    pub fn subscribe(&self, resource_id: &str) -> broadcast::Receiver<LoadEvent> {
        self.channels
            .entry(resource_id.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Deliver `event` to callbacks and channel subscribers.
    ///
    /// Callback failures and panics are logged and do not stop delivery to
    /// the remaining callbacks. Returns the number of callbacks that succeeded.
    pub fn publish(&self, event: &LoadEvent) -> usize {
        let targets: Vec<Arc<dyn LoaderListener>> = self
            .listeners
            .read()
            .iter()
            .filter(|r| r.watches(&event.resource_id))
            .map(|r| r.listener.clone())
            .collect();

        let mut delivered = 0;
        for listener in targets {
            match catch_unwind(AssertUnwindSafe(|| listener.on_new_data(event))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => {
                    warn!(
                        resource_id = %event.resource_id,
                        error = %e,
                        "Loader listener failed"
                    );
                }
                Err(_) => {
                    error!(resource_id = %event.resource_id, "Loader listener panicked");
                }
            }
        }

        if let Some(sender) = self.channels.get(&event.resource_id) {
            // No receivers is not an error.
            let receivers = sender.send(event.clone()).unwrap_or(0);
            debug!(
                resource_id = %event.resource_id,
                generation = event.generation,
                receivers,
                "Load event published"
            );
        }

        delivered
    }
}
