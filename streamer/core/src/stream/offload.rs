//! Async hand-off for blocking byte sources.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use super::{ByteSource, SeekOrigin, StreamError};

/// Runs [`ByteSource`] calls on tokio's blocking pool
///
/// The calling task suspends while the worker thread performs the (possibly
/// slow) read, so many readers can make progress on one scheduler without
/// starving each other. Clones share the same underlying source and cursor.
#[derive(Clone)]
pub struct OffloadedReader {
    source: Arc<Mutex<Box<dyn ByteSource>>>,
    len: u64,
}

impl OffloadedReader {
    /// Wrap a source
    pub fn new<S: ByteSource + 'static>(source: S) -> Self {
        let len = source.len();
        Self {
            source: Arc::new(Mutex::new(Box::new(source))),
            len,
        }
    }

    /// Length of the underlying source
    #[must_use]
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Whether the underlying source is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Seek the shared cursor
    ///
    /// # Errors
    ///
    /// Propagates the source's seek error, or [`StreamError::WorkerLost`].
    pub async fn seek(&self, offset: i64, origin: SeekOrigin) -> Result<u64, StreamError> {
        self.run(move |source| source.seek(offset, origin)).await
    }

    /// One read call of up to `count` bytes; may return fewer
    ///
    /// # Errors
    ///
    /// Propagates the source's read error, or [`StreamError::WorkerLost`].
    pub async fn read(&self, count: usize) -> Result<Vec<u8>, StreamError> {
        self.run(move |source| {
            let mut buf = vec![0u8; count];
            let n = source.read(&mut buf)?;
            buf.truncate(n);
            Ok(buf)
        })
        .await
    }

    /// Read exactly `count` bytes at the cursor, issuing as many reads as needed
    ///
    /// # Errors
    ///
    /// [`StreamError::UnexpectedEof`] if the source runs out first.
    pub async fn read_exact(&self, count: usize) -> Result<Vec<u8>, StreamError> {
        let mut out = Vec::with_capacity(count);
        while out.len() < count {
            let chunk = self.read(count - out.len()).await?;
            if chunk.is_empty() {
                return Err(StreamError::UnexpectedEof {
                    expected: count,
                    actual: out.len(),
                });
            }
            out.extend_from_slice(&chunk);
        }
        Ok(out)
    }

    /// Seek to `position` and read exactly `count` bytes as one worker job
    ///
    /// Holding the source for the whole job keeps the seek and the reads from
    /// interleaving with other clones.
    ///
    /// # Errors
    ///
    /// [`StreamError::UnexpectedEof`] if the source runs out first.
    pub async fn read_exact_at(&self, position: u64, count: usize) -> Result<Vec<u8>, StreamError> {
        self.run(move |source| {
            let offset = i64::try_from(position).unwrap_or(i64::MAX);
            source.seek(offset, SeekOrigin::Start)?;

            let mut out = vec![0u8; count];
            let mut filled = 0;
            while filled < count {
                let n = source.read(&mut out[filled..])?;
                if n == 0 {
                    return Err(StreamError::UnexpectedEof {
                        expected: count,
                        actual: filled,
                    });
                }
                filled += n;
            }
            Ok(out)
        })
        .await
    }

    async fn run<T, F>(&self, op: F) -> Result<T, StreamError>
    where
        T: Send + 'static,
        F: FnOnce(&mut dyn ByteSource) -> Result<T, StreamError> + Send + 'static,
    {
        let source = Arc::clone(&self.source);
        tokio::task::spawn_blocking(move || {
            let mut guard = source.lock();
            op(&mut **guard)
        })
        .await
        .map_err(|e| StreamError::WorkerLost(e.to_string()))?
    }
}

impl fmt::Debug for OffloadedReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OffloadedReader")
            .field("len", &self.len)
            .finish_non_exhaustive()
    }
}
