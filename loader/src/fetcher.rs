//! Byte fetchers for resource locations.

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;
use url::Url;

use crate::config::LoaderConfig;
use crate::error::{LoaderError, LoaderResult};

/// Reads the full content of a location.
#[async_trait]
pub trait ResourceFetcher: Send + Sync {
    /// Fetch every byte at `location`; partial transfers are errors.
    async fn fetch(&self, location: &Url) -> LoaderResult<Vec<u8>>;
}

/// Fetcher for `http`, `https` and `file` URLs.
pub struct UrlFetcher {
    client: Client,
}

impl UrlFetcher {
    /// Create a fetcher using the timeouts from `config`.
    pub fn new(config: &LoaderConfig) -> LoaderResult<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.read_timeout)
            .user_agent(concat!("ratefeed/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client })
    }

    async fn fetch_http(&self, location: &Url) -> LoaderResult<Vec<u8>> {
        let response = self
            .client
            .get(location.clone())
            .send()
            .await?
            .error_for_status()?;
        let body = response.bytes().await?;
        Ok(body.to_vec())
    }

    async fn fetch_file(&self, location: &Url) -> LoaderResult<Vec<u8>> {
        let path = location
            .to_file_path()
            .map_err(|_| LoaderError::Fetch {
                location: location.to_string(),
                reason: "not a local file path".to_string(),
            })?;
        Ok(tokio::fs::read(path).await?)
    }
}

#[async_trait]
impl ResourceFetcher for UrlFetcher {
    async fn fetch(&self, location: &Url) -> LoaderResult<Vec<u8>> {
        debug!(location = %location, "Fetching resource");
        match location.scheme() {
            "http" | "https" => self.fetch_http(location).await,
            "file" => self.fetch_file(location).await,
            other => Err(LoaderError::UnsupportedScheme(other.to_string())),
        }
    }
}

/// Fetcher serving canned bytes, for tests.
#[cfg(any(test, feature = "test-utils"))]
pub struct StaticFetcher {
    responses: dashmap::DashMap<String, Vec<u8>>,
    calls: std::sync::atomic::AtomicUsize,
}

#[cfg(any(test, feature = "test-utils"))]
impl StaticFetcher {
    /// Create a fetcher that knows no locations.
    pub fn new() -> Self {
        Self {
            responses: dashmap::DashMap::new(),
            calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// Serve `data` for `location`.
    pub fn serve(&self, location: &str, data: impl Into<Vec<u8>>) {
        self.responses.insert(location.to_string(), data.into());
    }

    /// Stop serving `location`.
    pub fn remove(&self, location: &str) {
        self.responses.remove(location);
    }

    /// Number of fetch calls made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl Default for StaticFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl ResourceFetcher for StaticFetcher {
    async fn fetch(&self, location: &Url) -> LoaderResult<Vec<u8>> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.responses
            .get(location.as_str())
            .map(|r| r.clone())
            .ok_or_else(|| LoaderError::Fetch {
                location: location.to_string(),
                reason: "unreachable".to_string(),
            })
    }
}
