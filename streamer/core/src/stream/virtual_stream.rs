//! In-memory byte stream with simulated read latency.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;

use super::{ByteSource, SeekOrigin, StreamError};

/// Range the per-stream read delay is sampled from
///
/// The sample is uniform over `[min, max)`; a degenerate range yields `min`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LatencyRange {
    min: Duration,
    max: Duration,
}

impl Default for LatencyRange {
    fn default() -> Self {
        Self::from_millis(100, 500)
    }
}

impl LatencyRange {
    /// Create a range; a `max` below `min` collapses to `min`
    #[must_use]
    pub fn new(min: Duration, max: Duration) -> Self {
        Self {
            min,
            max: max.max(min),
        }
    }

    /// Create a range from milliseconds
    #[must_use]
    pub fn from_millis(min_ms: u64, max_ms: u64) -> Self {
        Self::new(Duration::from_millis(min_ms), Duration::from_millis(max_ms))
    }

    /// No simulated latency at all
    #[must_use]
    pub const fn none() -> Self {
        Self {
            min: Duration::ZERO,
            max: Duration::ZERO,
        }
    }

    /// Always the same delay
    #[must_use]
    pub const fn fixed(delay: Duration) -> Self {
        Self {
            min: delay,
            max: delay,
        }
    }

    /// Lower bound (inclusive)
    #[must_use]
    pub fn min(&self) -> Duration {
        self.min
    }

    /// Upper bound (exclusive unless equal to `min`)
    #[must_use]
    pub fn max(&self) -> Duration {
        self.max
    }

    /// Sample a delay using the thread-local RNG
    #[must_use]
    pub fn sample(&self) -> Duration {
        self.sample_with(&mut rand::thread_rng())
    }

    /// Sample a delay using the given RNG
    pub fn sample_with<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        if self.max <= self.min {
            return self.min;
        }
        let min = u64::try_from(self.min.as_micros()).unwrap_or(u64::MAX);
        let max = u64::try_from(self.max.as_micros()).unwrap_or(u64::MAX);
        if max <= min {
            return self.min;
        }
        Duration::from_micros(rng.gen_range(min..max))
    }
}

/// A read-only, seekable stream over an immutable in-memory buffer
///
/// Every read sleeps for the same delay, chosen once when the stream is
/// created: this stream models "this file is this slow", not jitter.
/// Reads block the calling thread, so async callers must wrap the stream in
/// an [`OffloadedReader`](super::OffloadedReader).
pub struct VirtualByteStream {
    buffer: Arc<[u8]>,
    position: u64,
    delay: Duration,
}

impl VirtualByteStream {
    /// Wrap `buffer`, sampling the read delay from `latency`
    pub fn new(buffer: impl Into<Arc<[u8]>>, latency: &LatencyRange) -> Self {
        Self::with_delay(buffer, latency.sample())
    }

    /// Wrap `buffer` with an explicit read delay
    pub fn with_delay(buffer: impl Into<Arc<[u8]>>, delay: Duration) -> Self {
        Self {
            buffer: buffer.into(),
            position: 0,
            delay,
        }
    }

    /// The delay paid by every read on this instance
    #[must_use]
    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl fmt::Debug for VirtualByteStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VirtualByteStream")
            .field("len", &self.buffer.len())
            .field("position", &self.position)
            .field("delay", &self.delay)
            .finish()
    }
}

impl ByteSource for VirtualByteStream {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, StreamError> {
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }

        let len = self.buffer.len() as u64;
        if self.position >= len {
            return Ok(0);
        }

        // position < len, so it fits in usize
        let start = self.position as usize;
        let count = buf.len().min(self.buffer.len() - start);
        buf[..count].copy_from_slice(&self.buffer[start..start + count]);
        self.position += count as u64;
        Ok(count)
    }

    fn seek(&mut self, offset: i64, origin: SeekOrigin) -> Result<u64, StreamError> {
        let base = match origin {
            SeekOrigin::Start => 0i128,
            SeekOrigin::Current => i128::from(self.position),
            SeekOrigin::End => self.buffer.len() as i128,
        };
        let target = base + i128::from(offset);
        if target < 0 {
            return Err(StreamError::NegativePosition { origin, offset });
        }
        self.position = u64::try_from(target).unwrap_or(u64::MAX);
        Ok(self.position)
    }

    fn len(&self) -> u64 {
        self.buffer.len() as u64
    }

    fn position(&self) -> u64 {
        self.position
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashSet;
    use std::time::Instant;

    fn sample_bytes() -> Vec<u8> {
        (0..=255u8).cycle().take(1000).collect()
    }

    #[test]
    fn test_seek_start_then_full_read_round_trips() {
        let original = sample_bytes();
        let mut stream = VirtualByteStream::with_delay(original.clone(), Duration::ZERO);

        // Scramble the cursor first
        let mut scratch = [0u8; 37];
        stream.read(&mut scratch).unwrap();
        stream.seek(-5, SeekOrigin::End).unwrap();
        stream.read(&mut scratch).unwrap();
        stream.seek(4096, SeekOrigin::Current).unwrap();

        assert_eq!(stream.seek(0, SeekOrigin::Start).unwrap(), 0);
        let mut out = vec![0u8; original.len()];
        let n = stream.read(&mut out).unwrap();
        assert_eq!(n, original.len());
        assert_eq!(out, original);
    }

    #[test]
    fn test_read_near_end_returns_remaining_then_zero() {
        let mut stream = VirtualByteStream::with_delay(sample_bytes(), Duration::ZERO);
        stream.seek(990, SeekOrigin::Start).unwrap();

        let mut buf = [0u8; 64];
        assert_eq!(stream.read(&mut buf).unwrap(), 10);
        assert_eq!(stream.position(), 1000);
        assert_eq!(stream.read(&mut buf).unwrap(), 0);
        assert_eq!(stream.position(), 1000);
    }

    #[test]
    fn test_seek_past_end_is_allowed_and_reads_nothing() {
        let mut stream = VirtualByteStream::with_delay(vec![1, 2, 3], Duration::ZERO);
        assert_eq!(stream.seek(10, SeekOrigin::End).unwrap(), 13);

        let mut buf = [0u8; 4];
        assert_eq!(stream.read(&mut buf).unwrap(), 0);
        assert_eq!(stream.position(), 13);
    }

    #[test]
    fn test_seek_origins() {
        let mut stream = VirtualByteStream::with_delay(vec![0; 100], Duration::ZERO);
        assert_eq!(stream.seek(10, SeekOrigin::Start).unwrap(), 10);
        assert_eq!(stream.seek(5, SeekOrigin::Current).unwrap(), 15);
        assert_eq!(stream.seek(-3, SeekOrigin::Current).unwrap(), 12);
        assert_eq!(stream.seek(-20, SeekOrigin::End).unwrap(), 80);
    }

    #[test]
    fn test_negative_seek_is_rejected_and_keeps_position() {
        let mut stream = VirtualByteStream::with_delay(vec![0; 8], Duration::ZERO);
        stream.seek(4, SeekOrigin::Start).unwrap();

        let err = stream.seek(-5, SeekOrigin::Current).unwrap_err();
        assert_eq!(
            err,
            StreamError::NegativePosition {
                origin: SeekOrigin::Current,
                offset: -5
            }
        );
        assert_eq!(stream.position(), 4);
    }

    #[test]
    fn test_mutation_is_unsupported() {
        let mut stream = VirtualByteStream::with_delay(vec![0; 8], Duration::ZERO);
        assert!(!stream.can_write());
        assert_eq!(
            stream.write(&[1, 2, 3]).unwrap_err(),
            StreamError::Unsupported { operation: "write" }
        );
        assert_eq!(
            stream.set_len(2).unwrap_err(),
            StreamError::Unsupported {
                operation: "set_len"
            }
        );
        assert_eq!(stream.len(), 8);
    }

    #[test]
    fn test_every_read_pays_the_same_delay() {
        let delay = Duration::from_millis(15);
        let mut stream = VirtualByteStream::new(vec![0u8; 64], &LatencyRange::fixed(delay));
        assert_eq!(stream.delay(), delay);

        let mut buf = [0u8; 16];
        for _ in 0..3 {
            let started = Instant::now();
            stream.read(&mut buf).unwrap();
            assert!(started.elapsed() >= delay);
            assert_eq!(stream.delay(), delay);
        }
    }

    #[test]
    fn test_instances_sample_their_own_delay() {
        let range = LatencyRange::from_millis(100, 500);
        let delays: HashSet<Duration> = (0..64)
            .map(|_| VirtualByteStream::new(vec![0u8; 4], &range).delay())
            .collect();

        assert!(delays.len() > 1);
        for delay in delays {
            assert!(delay >= range.min() && delay < range.max());
        }
    }

    #[test]
    fn test_latency_range_degenerate_cases() {
        assert_eq!(LatencyRange::none().sample(), Duration::ZERO);
        let fixed = LatencyRange::fixed(Duration::from_millis(7));
        assert_eq!(fixed.sample(), Duration::from_millis(7));

        let inverted = LatencyRange::from_millis(300, 100);
        assert_eq!(inverted.max(), Duration::from_millis(300));
        assert_eq!(inverted.sample(), Duration::from_millis(300));
    }
}
