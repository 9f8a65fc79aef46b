//! Local disk cache of last good resource bytes.
//!
//! One opaque blob per resource id. The cache is advisory: read failures are
//! reported as misses and write failures are left to the caller to log.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::LoaderResult;

/// Storage for the last successfully loaded bytes of each resource.
#[async_trait]
pub trait ResourceCache: Send + Sync {
    /// Read the cached blob for `id`, if any.
    async fn read(&self, id: &str) -> Option<Vec<u8>>;

    /// Replace the cached blob for `id`.
    async fn write(&self, id: &str, data: &[u8]) -> LoaderResult<()>;

    /// Drop the cached blob for `id`.
    async fn remove(&self, id: &str) -> LoaderResult<()>;
}

/// Cache storing one file per resource under a directory.
#[derive(Debug, Clone)]
pub struct FileResourceCache {
    dir: PathBuf,
}

impl FileResourceCache {
    /// Create a cache rooted at `dir`. The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Cache directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File holding the blob for `id`.
    pub fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.dat", file_key(id)))
    }
}

/// Hex SHA-256 of the resource id, safe as a file name.
fn file_key(id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(id.as_bytes());
    let hash: [u8; 32] = hasher.finalize().into();
    hash.iter().map(|b| format!("{:02x}", b)).collect()
}

#[async_trait]
impl ResourceCache for FileResourceCache {
    async fn read(&self, id: &str) -> Option<Vec<u8>> {
        let path = self.path_for(id);
        match tokio::fs::read(&path).await {
            Ok(data) if !data.is_empty() => {
                debug!(resource_id = %id, path = %path.display(), "Cache hit");
                Some(data)
            }
            Ok(_) => {
                warn!(resource_id = %id, path = %path.display(), "Ignoring empty cache file");
                None
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!(resource_id = %id, error = %e, "Cache read failed");
                None
            }
        }
    }

    async fn write(&self, id: &str, data: &[u8]) -> LoaderResult<()> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let path = self.path_for(id);
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, data).await?;
        tokio::fs::rename(&tmp, &path).await?;

        debug!(resource_id = %id, bytes = data.len(), "Cache written");
        Ok(())
    }

    async fn remove(&self, id: &str) -> LoaderResult<()> {
        match tokio::fs::remove_file(self.path_for(id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileResourceCache::new(dir.path().join("nested"));

        cache.write("ECB", b"rates").await.unwrap();

        assert_eq!(cache.read("ECB").await.unwrap(), b"rates");
        assert!(cache.read("IMF").await.is_none());
    }

    #[tokio::test]
    async fn test_overwrite_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileResourceCache::new(dir.path());

        cache.write("ECB", b"old").await.unwrap();
        cache.write("ECB", b"new").await.unwrap();
        assert_eq!(cache.read("ECB").await.unwrap(), b"new");

        cache.remove("ECB").await.unwrap();
        assert!(cache.read("ECB").await.is_none());

        // Removing twice is fine.
        cache.remove("ECB").await.unwrap();
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileResourceCache::new(dir.path());
        std::fs::write(cache.path_for("ECB"), b"").unwrap();

        assert!(cache.read("ECB").await.is_none());
    }

    #[test]
    fn test_ids_map_to_distinct_safe_names() {
        let cache = FileResourceCache::new("/var/cache/ratefeed");
        let a = cache.path_for("ECB/HIST");
        let b = cache.path_for("ECB-HIST");

        assert_ne!(a, b);
        assert_eq!(a.parent().unwrap(), Path::new("/var/cache/ratefeed"));
        assert_eq!(a.file_name().unwrap().len(), 64 + 4);
    }
}
