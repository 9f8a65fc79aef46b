//! Ratefeed Loader
//!
//! Keeps named byte resources fresh. Each resource has a bundled fallback
//! snapshot, an ordered list of remote locations and an update policy that
//! decides when the remotes are tried. Successful remote loads are written to
//! an optional disk cache and announced to listeners.

pub mod cache;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod listener;
pub mod registry;
pub mod resource;
pub mod schedule;
pub mod state;

pub use cache::{FileResourceCache, ResourceCache};
pub use config::LoaderConfig;
pub use error::{LoaderError, LoaderResult};
pub use fetcher::{ResourceFetcher, UrlFetcher};
pub use listener::{ListenerHandle, ListenerHub, LoadEvent, LoaderListener};
pub use registry::LoaderRegistry;
pub use resource::{LoadableResource, ResourceSpec};
pub use schedule::Schedule;
pub use state::{DataOrigin, RegistryState, ResourceState, UpdatePolicy};

#[cfg(any(test, feature = "test-utils"))]
pub use fetcher::StaticFetcher;
