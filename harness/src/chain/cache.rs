use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tempfile::TempDir;
use tracing::{debug, warn};

/// An on-disk key-value store that lives for one harness run.
///
/// Entries are JSON files in a fresh temporary directory. The directory is
/// removed by [`ScopedCache::close`], or when the cache is dropped, so it
/// never outlives the run.
///
/// There is no locking: two lookups must not write the same key at once.
#[derive(Debug)]
pub struct ScopedCache {
    dir: TempDir,
}

impl ScopedCache {
    /// Create a cache under the system temporary directory.
    pub fn create() -> anyhow::Result<Self> {
        Self::create_in(std::env::temp_dir())
    }

    pub fn create_in(parent: impl AsRef<Path>) -> anyhow::Result<Self> {
        let parent = parent.as_ref();
        let dir = tempfile::Builder::new()
            .prefix("evmlab-cache-")
            .tempdir_in(parent)
            .with_context(|| format!("couldn't create a cache directory in {}", parent.display()))?;
        debug!("caching chain data in {}", dir.path().display());
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    fn entry(&self, key: &str) -> PathBuf {
        let file = key
            .chars()
            .map(|c| match c {
                'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' => c,
                _ => '_',
            })
            .collect::<String>();
        self.path().join(format!("{file}.json"))
    }

    /// [`None`] on a miss. A corrupt entry is treated as a miss.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let path = self.entry(key);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("couldn't read cache entry {}: {e}", path.display());
                return None;
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("ignoring corrupt cache entry {}: {e}", path.display());
                None
            }
        }
    }

    pub fn put<T: Serialize>(&self, key: &str, value: &T) -> anyhow::Result<()> {
        let path = self.entry(key);
        let bytes = serde_json::to_vec(value)?;
        fs::write(&path, bytes)
            .with_context(|| format!("couldn't write cache entry {}", path.display()))
    }

    /// Delete the cache and everything in it.
    pub fn close(self) -> anyhow::Result<()> {
        let path = self.path().to_owned();
        self.dir
            .close()
            .with_context(|| format!("couldn't remove cache directory {}", path.display()))
    }
}
