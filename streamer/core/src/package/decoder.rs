//! Fetched bytes to a displayable resource.

use std::sync::Arc;

use super::{DecodeError, ResourcePackage};
use crate::config::StreamerConfig;
use crate::resource::DecodedResource;
use crate::stream::{LatencyRange, OffloadedReader, VirtualByteStream};

/// Turns raw package bytes into a [`DecodedResource`]
///
/// Every decode wraps the bytes in a fresh [`VirtualByteStream`], so each
/// package pays its own independently sampled read latency.
#[derive(Clone, Debug, Default)]
pub struct PackageDecoder {
    latency: LatencyRange,
}

impl PackageDecoder {
    /// Create a decoder whose streams sample delays from `latency`
    #[must_use]
    pub fn new(latency: LatencyRange) -> Self {
        Self { latency }
    }

    /// Create a decoder from configuration
    #[must_use]
    pub fn from_config(config: &StreamerConfig) -> Self {
        Self::new(config.latency)
    }

    /// The configured latency range
    #[must_use]
    pub fn latency(&self) -> &LatencyRange {
        &self.latency
    }

    /// Open the package and materialize its first asset as a texture
    ///
    /// "First" is the package's own entry order. Suspends during every read
    /// and during image decoding; never blocks the calling scheduler.
    ///
    /// # Errors
    ///
    /// Any [`DecodeError`]; the package is unloaded before returning one.
    pub async fn decode(&self, bytes: Vec<u8>) -> Result<DecodedResource, DecodeError> {
        let stream = VirtualByteStream::new(bytes, &self.latency);
        tracing::trace!(delay = ?stream.delay(), "Decoding package");

        let package = ResourcePackage::open(OffloadedReader::new(stream)).await?;
        let first = package
            .asset_names()
            .next()
            .map(str::to_string)
            .ok_or(DecodeError::Empty)?;

        match package.load_texture(&first).await {
            Ok(texture) => Ok(DecodedResource::new(package, Arc::new(texture))),
            Err(e) => {
                package.unload();
                Err(e)
            }
        }
    }
}
