//! In-memory fetcher for tests and embedded packages.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{FetchError, ResourceFetcher};

#[derive(Clone)]
enum Scripted {
    Ready(Arc<[u8]>),
    Fail(String),
    Stall,
}

/// Serves packages from a map keyed by URI
///
/// Entries can also be scripted to fail with a transport error or to stall
/// forever, which models a hung request. Cloned fetchers share one map.
///
/// # Example
///
/// ```ignore
/// let fetcher = MemoryFetcher::new();
/// fetcher.insert("mem://00.bundle", package_bytes);
/// fetcher.fail("mem://01.bundle", "connection reset");
/// fetcher.stall("mem://02.bundle");
/// ```
#[derive(Clone, Default)]
pub struct MemoryFetcher {
    entries: Arc<RwLock<HashMap<String, Scripted>>>,
    requests: Arc<RwLock<HashMap<String, usize>>>,
}

impl MemoryFetcher {
    /// Create an empty fetcher
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `bytes` at `uri`
    pub fn insert(&self, uri: impl Into<String>, bytes: impl Into<Arc<[u8]>>) {
        self.entries
            .write()
            .insert(uri.into(), Scripted::Ready(bytes.into()));
    }

    /// Fail every fetch of `uri` with a transport error
    pub fn fail(&self, uri: impl Into<String>, message: impl Into<String>) {
        self.entries
            .write()
            .insert(uri.into(), Scripted::Fail(message.into()));
    }

    /// Never complete fetches of `uri`
    pub fn stall(&self, uri: impl Into<String>) {
        self.entries.write().insert(uri.into(), Scripted::Stall);
    }

    /// Forget `uri`; later fetches report not found
    pub fn remove(&self, uri: &str) {
        self.entries.write().remove(uri);
    }

    /// How many times `uri` has been requested
    #[must_use]
    pub fn request_count(&self, uri: &str) -> usize {
        self.requests.read().get(uri).copied().unwrap_or(0)
    }
}

#[async_trait]
impl ResourceFetcher for MemoryFetcher {
    fn name(&self) -> &str {
        "memory"
    }

    async fn fetch(&self, uri: &str) -> Result<Vec<u8>, FetchError> {
        *self.requests.write().entry(uri.to_string()).or_insert(0) += 1;

        // Clone out so no lock is held across the await below
        let entry = self.entries.read().get(uri).cloned();
        match entry {
            Some(Scripted::Ready(bytes)) => Ok(bytes.to_vec()),
            Some(Scripted::Fail(message)) => Err(FetchError::Transport {
                uri: uri.to_string(),
                message,
            }),
            Some(Scripted::Stall) => std::future::pending().await,
            None => Err(FetchError::NotFound(uri.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_scripted_entries() {
        let fetcher = MemoryFetcher::new();
        fetcher.insert("mem://a", vec![9, 9]);
        fetcher.fail("mem://b", "connection reset");

        assert_eq!(fetcher.fetch("mem://a").await.unwrap(), vec![9, 9]);
        assert_eq!(
            fetcher.fetch("mem://b").await.unwrap_err(),
            FetchError::Transport {
                uri: "mem://b".to_string(),
                message: "connection reset".to_string()
            }
        );
        assert_eq!(
            fetcher.fetch("mem://c").await.unwrap_err(),
            FetchError::NotFound("mem://c".to_string())
        );

        fetcher.remove("mem://a");
        assert!(fetcher.fetch("mem://a").await.is_err());
        assert_eq!(fetcher.request_count("mem://a"), 2);
        assert_eq!(fetcher.request_count("mem://zzz"), 0);
    }

    #[tokio::test]
    async fn test_stall_never_completes() {
        let fetcher = MemoryFetcher::new();
        fetcher.stall("mem://hang");

        let result =
            tokio::time::timeout(Duration::from_millis(50), fetcher.fetch("mem://hang")).await;
        assert!(result.is_err());
    }
}
