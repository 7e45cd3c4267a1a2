//! Resource Packages
//!
//! A package is an opaque archive of named assets in the `SPAK` format (see
//! [`format`]). Packages are opened lazily from an [`OffloadedReader`]: only
//! the fixed header and the entry table are read up front, and each asset's
//! bytes are read when that asset is loaded.
//!
//! # Architecture
//!
//! ```text
//!   bytes ──► VirtualByteStream ──► OffloadedReader ──► ResourcePackage::open
//!                                                            │
//!                               asset_names() (table order) ─┤
//!                                                            ▼
//!                                        load_texture(first) ──► Texture
//! ```

mod builder;
mod decoder;
pub mod format;

use std::fmt;

use parking_lot::Mutex;
use thiserror::Error;

use crate::resource::Texture;
use crate::stream::{OffloadedReader, StreamError};

pub use builder::PackageBuilder;
pub use decoder::PackageDecoder;
pub use format::{AssetKind, Entry};

// ============================================================================
// Errors
// ============================================================================

/// Errors from opening or reading a package
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// The stream does not start with the package magic
    #[error("not a package: bad magic {0:02x?}")]
    BadMagic([u8; 4]),

    /// The format version is not understood
    #[error("unsupported package version {0}")]
    UnsupportedVersion(u16),

    /// The entry table is larger than allowed
    #[error("entry table of {0} bytes exceeds the limit")]
    TableTooLarge(u32),

    /// The package declares more entries than allowed
    #[error("package declares {0} entries, more than allowed")]
    TooManyEntries(u32),

    /// The package has no assets
    #[error("package contains no assets")]
    Empty,

    /// The entry table could not be parsed
    #[error("malformed entry table: {0}")]
    MalformedTable(String),

    /// An entry name is unusable
    #[error("entry {index} has an invalid name: {reason}")]
    InvalidName {
        /// Position in the table
        index: usize,
        /// What is wrong with it
        reason: &'static str,
    },

    /// Two entries share a name
    #[error("duplicate asset name '{0}'")]
    DuplicateName(String),

    /// The declared table length disagrees with its contents
    #[error("entry table declared {declared} bytes but entries used {parsed}")]
    TableLengthMismatch {
        /// Length from the header
        declared: usize,
        /// Bytes consumed by the entries
        parsed: usize,
    },

    /// An entry points past the end of the data section
    #[error("asset '{name}' ({offset}+{length}) lies outside the {data_len}-byte data section")]
    EntryOutOfBounds {
        /// Asset name
        name: String,
        /// Declared offset
        offset: u64,
        /// Declared length
        length: u64,
        /// Size of the data section
        data_len: u64,
    },

    /// Reading the underlying stream failed
    #[error("stream error: {0}")]
    Stream(#[from] StreamError),

    /// No asset with that name
    #[error("asset '{0}' not found in package")]
    AssetNotFound(String),

    /// Payload bytes do not match the recorded checksum
    #[error("checksum mismatch for '{name}': expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch {
        /// Asset name
        name: String,
        /// Checksum in the table
        expected: u32,
        /// Checksum of the bytes read
        actual: u32,
    },

    /// The asset is not an image
    #[error("asset '{name}' is {kind}, not a texture")]
    NotATexture {
        /// Asset name
        name: String,
        /// Its actual kind
        kind: AssetKind,
    },

    /// Image decoding failed
    #[error("failed to decode image '{name}': {message}")]
    Image {
        /// Asset name
        name: String,
        /// Decoder message
        message: String,
    },

    /// The image decode worker panicked or was cancelled
    #[error("image decode worker lost: {0}")]
    WorkerLost(String),

    /// The package was already unloaded
    #[error("package has been unloaded")]
    Unloaded,
}

/// Errors from building a package
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum BuildError {
    /// No assets were added
    #[error("a package needs at least one asset")]
    Empty,

    /// An asset name is empty
    #[error("asset names must not be empty")]
    EmptyName,

    /// An asset name does not fit the table encoding
    #[error("asset name of {0} bytes is too long")]
    NameTooLong(usize),

    /// Two assets share a name
    #[error("duplicate asset name '{0}'")]
    DuplicateName(String),

    /// More assets than a package may hold
    #[error("{0} assets exceed the per-package limit")]
    TooManyEntries(usize),

    /// The entry table would exceed the size limit
    #[error("entry table of {0} bytes exceeds the limit")]
    TableTooLarge(usize),
}

// ============================================================================
// Package
// ============================================================================

/// An opened package
///
/// Holds the parsed entry table and the reader over the package bytes.
/// [`unload`](Self::unload) drops the reader, which frees the buffer once no
/// read is in flight.
pub struct ResourcePackage {
    reader: Mutex<Option<OffloadedReader>>,
    len: u64,
    data_start: u64,
    entries: Vec<Entry>,
}

impl ResourcePackage {
    /// Read the header and entry table
    ///
    /// # Errors
    ///
    /// Any [`DecodeError`] describing why the header or table is unusable.
    pub async fn open(reader: OffloadedReader) -> Result<Self, DecodeError> {
        let len = reader.len();
        let header_bytes = reader.read_exact_at(0, format::HEADER_LEN).await?;
        let header = format::Header::parse(&header_bytes)?;

        let table = reader
            .read_exact_at(format::HEADER_LEN as u64, header.table_len as usize)
            .await?;
        let data_start = header.data_start();
        let data_len = len.saturating_sub(data_start);
        let entries = format::parse_table(&table, header.entry_count, data_len)?;

        tracing::trace!(entries = entries.len(), len, "Opened package");

        Ok(Self {
            reader: Mutex::new(Some(reader)),
            len,
            data_start,
            entries,
        })
    }

    /// Total package size in bytes
    #[must_use]
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Whether the package has zero bytes (never true for an opened package)
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether the package bytes are still held
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.reader.lock().is_some()
    }

    /// Entries in package order
    #[must_use]
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Asset names in package order (not sorted)
    pub fn asset_names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }

    /// Look up an entry by name
    #[must_use]
    pub fn entry(&self, name: &str) -> Option<&Entry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Read one asset's payload and verify its checksum
    ///
    /// # Errors
    ///
    /// [`DecodeError::AssetNotFound`], [`DecodeError::Unloaded`], a stream
    /// error, or [`DecodeError::ChecksumMismatch`].
    pub async fn load_asset(&self, name: &str) -> Result<Vec<u8>, DecodeError> {
        let entry = self
            .entry(name)
            .ok_or_else(|| DecodeError::AssetNotFound(name.to_string()))?;
        let reader = self.reader.lock().clone().ok_or(DecodeError::Unloaded)?;

        let length = usize::try_from(entry.length).map_err(|_| DecodeError::EntryOutOfBounds {
            name: entry.name.clone(),
            offset: entry.offset,
            length: entry.length,
            data_len: self.len.saturating_sub(self.data_start),
        })?;
        let bytes = reader
            .read_exact_at(self.data_start + entry.offset, length)
            .await?;

        let actual = crc32fast::hash(&bytes);
        if actual != entry.crc32 {
            return Err(DecodeError::ChecksumMismatch {
                name: entry.name.clone(),
                expected: entry.crc32,
                actual,
            });
        }
        Ok(bytes)
    }

    /// Load a texture asset and decode it to RGBA8
    ///
    /// Image decoding runs on a blocking worker.
    ///
    /// # Errors
    ///
    /// [`DecodeError::NotATexture`] for binary assets, anything from
    /// [`load_asset`](Self::load_asset), or [`DecodeError::Image`].
    pub async fn load_texture(&self, name: &str) -> Result<Texture, DecodeError> {
        let entry = self
            .entry(name)
            .ok_or_else(|| DecodeError::AssetNotFound(name.to_string()))?;
        if entry.kind != AssetKind::Texture {
            return Err(DecodeError::NotATexture {
                name: entry.name.clone(),
                kind: entry.kind,
            });
        }

        let encoded = self.load_asset(name).await?;
        let asset = entry.name.clone();
        tokio::task::spawn_blocking(move || {
            let image = image::load_from_memory(&encoded).map_err(|e| DecodeError::Image {
                name: asset.clone(),
                message: e.to_string(),
            })?;
            let rgba = image.to_rgba8();
            let (width, height) = rgba.dimensions();
            Ok(Texture::new(asset, width, height, rgba.into_raw()))
        })
        .await
        .map_err(|e| DecodeError::WorkerLost(e.to_string()))?
    }

    /// Drop the package bytes, returning the package size
    ///
    /// Later loads fail with [`DecodeError::Unloaded`]. Unloading twice is a
    /// no-op that returns zero.
    pub fn unload(&self) -> u64 {
        self.reader.lock().take().map_or(0, |_| self.len)
    }
}

impl fmt::Debug for ResourcePackage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourcePackage")
            .field("len", &self.len)
            .field("entries", &self.entries.len())
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::stream::{ByteSource, SeekOrigin, VirtualByteStream};
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    /// Encode a `width` x `height` PNG filled with `rgba`
    pub(crate) fn png(width: u32, height: u32, rgba: [u8; 4]) -> Vec<u8> {
        let image = image::RgbaImage::from_pixel(width, height, image::Rgba(rgba));
        let mut out = std::io::Cursor::new(Vec::new());
        image.write_to(&mut out, image::ImageFormat::Png).unwrap();
        out.into_inner()
    }

    fn reader(bytes: Vec<u8>) -> OffloadedReader {
        OffloadedReader::new(VirtualByteStream::with_delay(bytes, Duration::ZERO))
    }

    /// Byte source that records the furthest byte ever read
    struct Tracking {
        inner: VirtualByteStream,
        high_water: Arc<AtomicU64>,
    }

    impl ByteSource for Tracking {
        fn read(&mut self, buf: &mut [u8]) -> Result<usize, StreamError> {
            let n = self.inner.read(buf)?;
            self.high_water
                .fetch_max(self.inner.position(), Ordering::SeqCst);
            Ok(n)
        }

        fn seek(&mut self, offset: i64, origin: SeekOrigin) -> Result<u64, StreamError> {
            self.inner.seek(offset, origin)
        }

        fn len(&self) -> u64 {
            self.inner.len()
        }

        fn position(&self) -> u64 {
            self.inner.position()
        }
    }

    #[tokio::test]
    async fn test_open_lists_assets_in_package_order() {
        let bytes = PackageBuilder::new()
            .add_texture("zebra", png(1, 1, [1, 1, 1, 255]))
            .add_binary("apple", b"meta".to_vec())
            .build()
            .unwrap();

        let package = ResourcePackage::open(reader(bytes)).await.unwrap();
        let names: Vec<&str> = package.asset_names().collect();
        assert_eq!(names, vec!["zebra", "apple"]);
        assert_eq!(package.load_asset("apple").await.unwrap(), b"meta".to_vec());
    }

    #[tokio::test]
    async fn test_load_texture_decodes_rgba() {
        let bytes = PackageBuilder::new()
            .add_texture("red", png(3, 2, [200, 10, 20, 255]))
            .build()
            .unwrap();

        let package = ResourcePackage::open(reader(bytes)).await.unwrap();
        let texture = package.load_texture("red").await.unwrap();
        assert_eq!((texture.width(), texture.height()), (3, 2));
        assert_eq!(texture.pixel(2, 1), Some([200, 10, 20, 255]));
        assert_eq!(texture.name(), "red");
    }

    #[tokio::test]
    async fn test_open_is_lazy() {
        let bytes = PackageBuilder::new()
            .add_texture("first", png(1, 1, [0, 0, 0, 255]))
            .add_binary("padding", vec![7u8; 4096])
            .build()
            .unwrap();
        let total = bytes.len() as u64;
        let high_water = Arc::new(AtomicU64::new(0));
        let source = Tracking {
            inner: VirtualByteStream::with_delay(bytes, Duration::ZERO),
            high_water: Arc::clone(&high_water),
        };

        let package = ResourcePackage::open(OffloadedReader::new(source)).await.unwrap();
        package.load_texture("first").await.unwrap();

        let padding = package.entry("padding").unwrap();
        assert!(high_water.load(Ordering::SeqCst) <= total - padding.length);
    }

    #[tokio::test]
    async fn test_checksum_mismatch_is_detected() {
        let mut bytes = PackageBuilder::new()
            .add_binary("blob", vec![1, 2, 3, 4])
            .build()
            .unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;

        let package = ResourcePackage::open(reader(bytes)).await.unwrap();
        assert!(matches!(
            package.load_asset("blob").await.unwrap_err(),
            DecodeError::ChecksumMismatch { .. }
        ));
    }

    #[tokio::test]
    async fn test_binary_asset_is_not_a_texture() {
        let bytes = PackageBuilder::new()
            .add_binary("blob", vec![1, 2, 3])
            .build()
            .unwrap();
        let package = ResourcePackage::open(reader(bytes)).await.unwrap();
        assert_eq!(
            package.load_texture("blob").await.unwrap_err(),
            DecodeError::NotATexture {
                name: "blob".to_string(),
                kind: AssetKind::Binary
            }
        );
        assert_eq!(
            package.load_texture("nope").await.unwrap_err(),
            DecodeError::AssetNotFound("nope".to_string())
        );
    }

    #[tokio::test]
    async fn test_garbage_image_fails_decode() {
        let bytes = PackageBuilder::new()
            .add_texture("broken", b"definitely not a png".to_vec())
            .build()
            .unwrap();
        let package = ResourcePackage::open(reader(bytes)).await.unwrap();
        assert!(matches!(
            package.load_texture("broken").await.unwrap_err(),
            DecodeError::Image { .. }
        ));
    }

    #[tokio::test]
    async fn test_truncated_package() {
        let err = ResourcePackage::open(reader(b"SPAK".to_vec()))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DecodeError::Stream(StreamError::UnexpectedEof { .. })
        ));
    }

    #[tokio::test]
    async fn test_unload_frees_and_blocks_further_loads() {
        let bytes = PackageBuilder::new()
            .add_binary("blob", vec![1, 2, 3])
            .build()
            .unwrap();
        let size = bytes.len() as u64;
        let package = ResourcePackage::open(reader(bytes)).await.unwrap();

        assert_eq!(package.unload(), size);
        assert!(!package.is_loaded());
        assert_eq!(package.unload(), 0);
        assert_eq!(
            package.load_asset("blob").await.unwrap_err(),
            DecodeError::Unloaded
        );
    }
}
