//! Resource Package Fetching
//!
//! Fetchers pull a whole resource package into memory. This abstraction lets
//! the pool stream from local directories, HTTP servers, or an in-memory map
//! without changing slot logic.
//!
//! # Available Fetchers
//!
//! - [`UriFetcher`]: `file://` URIs, bare paths, and `http(s)://` (default)
//! - [`MemoryFetcher`]: in-memory packages, scripted failures and stalls
//!
//! # Cancellation
//!
//! A slot never awaits a fetcher directly. It starts an [`InFlightFetch`],
//! which runs the request as its own task; disposing or dropping the handle
//! aborts that task, so a torn-down slot cannot leak a pending request.
//!
//! ```ignore
//! use streamer_core::fetch::{InFlightFetch, UriFetcher};
//!
//! let fetcher = Arc::new(UriFetcher::new(&FetchConfig::default())?);
//! let request = InFlightFetch::start(fetcher, "file:///srv/packages/00.bundle");
//! let bytes = request.wait().await?;
//! ```

mod locator;
mod memory;
mod uri;

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::task::{AbortHandle, JoinHandle};

pub use locator::{file_uri_to_path, normalize_base, ResourceLocator};
pub use memory::MemoryFetcher;
pub use uri::UriFetcher;

/// Errors from fetching a package
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FetchError {
    /// The URI has a scheme no fetcher understands
    #[error("invalid resource uri {uri}: {reason}")]
    InvalidUri {
        /// The rejected URI
        uri: String,
        /// Why it was rejected
        reason: String,
    },

    /// Nothing exists at the URI
    #[error("resource not found: {0}")]
    NotFound(String),

    /// Local file could not be read
    #[error("failed to read {}: {message}", path.display())]
    Io {
        /// The file that was attempted
        path: PathBuf,
        /// The underlying error message
        message: String,
    },

    /// Network-level failure
    #[error("transport error fetching {uri}: {message}")]
    Transport {
        /// The URI being fetched
        uri: String,
        /// The underlying error message
        message: String,
    },

    /// The server answered with a non-success status
    #[error("{uri} returned HTTP {status}")]
    Status {
        /// The URI being fetched
        uri: String,
        /// HTTP status code
        status: u16,
    },

    /// The package exceeds the configured size limit
    #[error("{uri} exceeds the {limit} byte package limit")]
    TooLarge {
        /// The URI being fetched
        uri: String,
        /// The configured limit
        limit: usize,
    },

    /// The HTTP client could not be built
    #[error("failed to create HTTP client: {0}")]
    Client(String),

    /// The request was disposed before it completed
    #[error("fetch of {0} was cancelled")]
    Cancelled(String),
}

/// Resource fetcher trait
///
/// Implement this trait to stream packages from another kind of store.
/// Fetchers perform no retries: a failure ends that slot cycle, and the pool
/// decides when to try again.
#[async_trait]
pub trait ResourceFetcher: Send + Sync {
    /// Fetcher name for logs (e.g., "uri", "memory")
    fn name(&self) -> &str;

    /// Fetch the complete package at `uri`
    async fn fetch(&self, uri: &str) -> Result<Vec<u8>, FetchError>;
}

/// An in-flight, cancellable fetch
///
/// Dropping an unfinished request aborts it.
pub struct InFlightFetch {
    uri: String,
    task: Option<JoinHandle<Result<Vec<u8>, FetchError>>>,
}

impl InFlightFetch {
    /// Spawn the fetch of `uri` on the current runtime
    pub fn start(fetcher: Arc<dyn ResourceFetcher>, uri: impl Into<String>) -> Self {
        let uri = uri.into();
        let task_uri = uri.clone();
        let task = tokio::spawn(async move { fetcher.fetch(&task_uri).await });
        Self {
            uri,
            task: Some(task),
        }
    }

    /// The URI being fetched
    #[must_use]
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Whether the request has completed (successfully or not)
    #[must_use]
    pub fn is_finished(&self) -> bool {
        match &self.task {
            Some(task) => task.is_finished(),
            None => true,
        }
    }

    /// Handle that can dispose the request from elsewhere while it is awaited
    #[must_use]
    pub fn abort_handle(&self) -> Option<AbortHandle> {
        self.task.as_ref().map(JoinHandle::abort_handle)
    }

    /// Dispose the request; a later [`wait`](Self::wait) reports cancellation
    pub fn dispose(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            tracing::debug!(uri = %self.uri, "Fetch disposed");
        }
    }

    /// Wait for the response body
    ///
    /// # Errors
    ///
    /// The fetcher's error, or [`FetchError::Cancelled`] if the request was
    /// disposed.
    pub async fn wait(mut self) -> Result<Vec<u8>, FetchError> {
        let Some(task) = self.task.as_mut() else {
            return Err(FetchError::Cancelled(self.uri.clone()));
        };

        let joined = task.await;
        self.task = None;

        match joined {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(FetchError::Cancelled(self.uri.clone())),
            Err(e) => Err(FetchError::Transport {
                uri: self.uri.clone(),
                message: format!("fetch task panicked: {e}"),
            }),
        }
    }
}

impl Drop for InFlightFetch {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl std::fmt::Debug for InFlightFetch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InFlightFetch")
            .field("uri", &self.uri)
            .field("finished", &self.is_finished())
            .finish()
    }
}
