//! File and HTTP fetcher.
//!
//! A base address may be a local directory exposed as a `file://` URI or a
//! real network endpoint; this fetcher accepts either transparently.

use std::path::Path;

use async_trait::async_trait;
use futures::StreamExt;

use super::{file_uri_to_path, FetchError, ResourceFetcher};
use crate::config::FetchConfig;

/// Fetches `file://` URIs, bare paths, and `http(s)://` URIs
#[derive(Clone)]
pub struct UriFetcher {
    /// HTTP client
    http_client: reqwest::Client,
    /// Largest body accepted, in bytes
    max_package_bytes: usize,
}

enum Target<'a> {
    File(std::path::PathBuf),
    Http,
    Unsupported(&'a str),
}

fn classify(uri: &str) -> Target<'_> {
    match uri.split_once("://") {
        Some(("file", _)) => {
            file_uri_to_path(uri).map_or(Target::Unsupported("file"), Target::File)
        }
        Some(("http" | "https", _)) => Target::Http,
        Some((scheme, _)) => Target::Unsupported(scheme),
        None => Target::File(Path::new(uri).to_path_buf()),
    }
}

impl UriFetcher {
    /// Create a fetcher from configuration
    ///
    /// # Errors
    ///
    /// [`FetchError::Client`] if the HTTP client cannot be built.
    pub fn new(config: &FetchConfig) -> Result<Self, FetchError> {
        let mut builder = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.timeout);
        if !config.use_system_proxy {
            builder = builder.no_proxy();
        }
        let http_client = builder
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;

        Ok(Self {
            http_client,
            max_package_bytes: config.max_package_bytes,
        })
    }

    async fn fetch_file(&self, uri: &str, path: &Path) -> Result<Vec<u8>, FetchError> {
        let io_error = |e: std::io::Error| {
            if e.kind() == std::io::ErrorKind::NotFound {
                FetchError::NotFound(uri.to_string())
            } else {
                FetchError::Io {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                }
            }
        };

        let metadata = tokio::fs::metadata(path).await.map_err(io_error)?;
        if !metadata.is_file() {
            return Err(FetchError::NotFound(uri.to_string()));
        }
        if metadata.len() > self.max_package_bytes as u64 {
            return Err(FetchError::TooLarge {
                uri: uri.to_string(),
                limit: self.max_package_bytes,
            });
        }

        tokio::fs::read(path).await.map_err(io_error)
    }

    async fn fetch_http(&self, uri: &str) -> Result<Vec<u8>, FetchError> {
        let transport = |e: reqwest::Error| FetchError::Transport {
            uri: uri.to_string(),
            message: e.to_string(),
        };
        let too_large = || FetchError::TooLarge {
            uri: uri.to_string(),
            limit: self.max_package_bytes,
        };

        let response = self.http_client.get(uri).send().await.map_err(transport)?;

        // Check for HTTP errors
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                uri: uri.to_string(),
                status: status.as_u16(),
            });
        }

        let expected = response.content_length().unwrap_or(0);
        if expected > self.max_package_bytes as u64 {
            return Err(too_large());
        }

        let mut body = Vec::with_capacity(usize::try_from(expected).unwrap_or(0));
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(transport)?;
            if body.len() + chunk.len() > self.max_package_bytes {
                return Err(too_large());
            }
            body.extend_from_slice(&chunk);
        }

        Ok(body)
    }
}

#[async_trait]
impl ResourceFetcher for UriFetcher {
    fn name(&self) -> &str {
        "uri"
    }

    async fn fetch(&self, uri: &str) -> Result<Vec<u8>, FetchError> {
        tracing::trace!(uri, "Fetching package");
        match classify(uri) {
            Target::File(path) => self.fetch_file(uri, &path).await,
            Target::Http => self.fetch_http(uri).await,
            Target::Unsupported(scheme) => Err(FetchError::InvalidUri {
                uri: uri.to_string(),
                reason: format!("unsupported scheme '{scheme}'"),
            }),
        }
    }
}
