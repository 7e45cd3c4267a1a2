//! Seekable Byte Sources
//!
//! Packages are decoded from a [`ByteSource`]: a synchronous, seekable,
//! read-only cursor over some bytes. The harness uses [`VirtualByteStream`],
//! an in-memory source that pays a fixed simulated latency on every read, but
//! any disk- or network-backed source can be substituted without touching the
//! decoder or the slot logic.
//!
//! # Blocking
//!
//! `ByteSource` calls may block the calling thread (the virtual stream sleeps
//! before every read). Async code never calls them directly; it goes through
//! [`OffloadedReader`], which hands each call to tokio's blocking worker pool.
//!
//! ```text
//!   SlotCycle ──► PackageDecoder ──► OffloadedReader ──spawn_blocking──► ByteSource
//!   (scheduler)                       (async, suspends)                 (worker thread)
//! ```

mod offload;
mod virtual_stream;

use std::fmt;

use thiserror::Error;

pub use offload::OffloadedReader;
pub use virtual_stream::{LatencyRange, VirtualByteStream};

/// Reference point for [`ByteSource::seek`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SeekOrigin {
    /// Offset is measured from the first byte
    Start,
    /// Offset is relative to the current position
    Current,
    /// Offset is relative to the stream length
    End,
}

impl fmt::Display for SeekOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start => write!(f, "start"),
            Self::Current => write!(f, "current"),
            Self::End => write!(f, "end"),
        }
    }
}

/// Errors raised by byte sources
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StreamError {
    /// The operation mutates the stream, which is read-only
    #[error("{operation} is not supported on a read-only stream")]
    Unsupported {
        /// Name of the rejected operation
        operation: &'static str,
    },

    /// A seek would have moved the cursor before the first byte
    #[error("seek by {offset} from {origin} would move before the start of the stream")]
    NegativePosition {
        /// Origin of the rejected seek
        origin: SeekOrigin,
        /// Offset of the rejected seek
        offset: i64,
    },

    /// The stream ended before the requested number of bytes was read
    #[error("unexpected end of stream: wanted {expected} bytes, got {actual}")]
    UnexpectedEof {
        /// Bytes requested
        expected: usize,
        /// Bytes actually available
        actual: usize,
    },

    /// The blocking worker running the call panicked or was cancelled
    #[error("blocking read worker lost: {0}")]
    WorkerLost(String),
}

/// A synchronous, seekable, read-only byte source
///
/// Mirrors the shape of a classic stream object: reads copy into a caller
/// buffer and advance the cursor, seeks may move past the end (subsequent
/// reads then return zero bytes), and mutation is rejected.
pub trait ByteSource: Send {
    /// Read up to `buf.len()` bytes at the cursor, returning how many were copied
    ///
    /// Returns `Ok(0)` at or past the end of the source.
    ///
    /// # Errors
    ///
    /// Implementation-specific I/O failures.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, StreamError>;

    /// Move the cursor and return the new absolute position
    ///
    /// There is no upper clamp: the position may exceed [`len`](Self::len).
    ///
    /// # Errors
    ///
    /// [`StreamError::NegativePosition`] if the target lies before byte zero.
    fn seek(&mut self, offset: i64, origin: SeekOrigin) -> Result<u64, StreamError>;

    /// Total length in bytes
    fn len(&self) -> u64;

    /// Current cursor position
    fn position(&self) -> u64;

    /// Whether the source holds no bytes
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether [`write`](Self::write) is supported
    fn can_write(&self) -> bool {
        false
    }

    /// Write bytes at the cursor
    ///
    /// # Errors
    ///
    /// [`StreamError::Unsupported`] unless the source overrides it.
    fn write(&mut self, _buf: &[u8]) -> Result<usize, StreamError> {
        Err(StreamError::Unsupported { operation: "write" })
    }

    /// Resize the source
    ///
    /// # Errors
    ///
    /// [`StreamError::Unsupported`] unless the source overrides it.
    fn set_len(&mut self, _len: u64) -> Result<(), StreamError> {
        Err(StreamError::Unsupported {
            operation: "set_len",
        })
    }
}
