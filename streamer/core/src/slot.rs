//! Slot Cycle
//!
//! One slot is one lane of the pool. Each cycle walks the state machine
//!
//! ```text
//!   Idle ──► Fetching ──► Decoding ──► Published ──► AwaitingReplacement ──► Releasing ──► Idle
//!               │            │
//!               └────────────┴──► Idle (failure, slot freed for relaunch)
//! ```
//!
//! A cycle only ever holds the resource it decoded itself, so it can only
//! release what it published. Replacement is detected by pointer identity on
//! the [`DisplaySurface`]: the slot sleeps on surface change notifications and
//! re-checks after each one.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::broadcast;

use crate::fetch::{FetchError, InFlightFetch, ResourceFetcher, ResourceLocator};
use crate::package::{DecodeError, PackageDecoder};
use crate::pool::{PoolEvent, PoolMonitor, PoolStatsAtomic};
use crate::resource::ResourceId;
use crate::surface::DisplaySurface;

/// Capacity of the pool event channel; slow observers lag rather than block
const EVENT_CAPACITY: usize = 1024;

// ============================================================================
// Slot Identity and State
// ============================================================================

/// Index of a slot, `0..size`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId(usize);

impl SlotId {
    /// Wrap an index
    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// The raw index
    #[must_use]
    pub const fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a slot is in its cycle
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SlotState {
    /// No cycle running
    #[default]
    Idle,
    /// Waiting for the package
    Fetching,
    /// Opening the package and materializing the texture
    Decoding,
    /// Texture written to the surface
    Published,
    /// Waiting for another texture to take the surface
    AwaitingReplacement,
    /// Freeing the texture and package
    Releasing,
}

impl fmt::Display for SlotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Fetching => "fetching",
            Self::Decoding => "decoding",
            Self::Published => "published",
            Self::AwaitingReplacement => "awaiting-replacement",
            Self::Releasing => "releasing",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct SlotEntry {
    state: SlotState,
    cycle: Option<u64>,
}

/// Fixed table of per-slot state, one entry per slot
///
/// Each slot has at most one in-flight cycle; the table is sized once and
/// never grows, so the active set is always a subset of `0..size` without
/// duplicates.
#[derive(Debug)]
pub struct SlotTable {
    entries: Vec<RwLock<SlotEntry>>,
}

impl SlotTable {
    /// Create `size` idle slots
    #[must_use]
    pub fn new(size: usize) -> Self {
        Self {
            entries: (0..size).map(|_| RwLock::new(SlotEntry::default())).collect(),
        }
    }

    /// Number of slots
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table has no slots
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Current state of a slot
    #[must_use]
    pub fn state(&self, slot: SlotId) -> Option<SlotState> {
        self.entries.get(slot.index()).map(|e| e.read().state)
    }

    /// Cycle number in flight on a slot, if any
    #[must_use]
    pub fn cycle(&self, slot: SlotId) -> Option<u64> {
        self.entries.get(slot.index()).and_then(|e| e.read().cycle)
    }

    /// States of all slots, by index
    #[must_use]
    pub fn snapshot(&self) -> Vec<SlotState> {
        self.entries.iter().map(|e| e.read().state).collect()
    }

    /// Slots with a cycle in flight, ascending
    #[must_use]
    pub fn active(&self) -> Vec<SlotId> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.read().cycle.is_some())
            .map(|(i, _)| SlotId::new(i))
            .collect()
    }

    pub(crate) fn set_state(&self, slot: SlotId, state: SlotState) {
        if let Some(entry) = self.entries.get(slot.index()) {
            entry.write().state = state;
        }
    }

    pub(crate) fn begin(&self, slot: SlotId, cycle: u64) {
        if let Some(entry) = self.entries.get(slot.index()) {
            *entry.write() = SlotEntry {
                state: SlotState::Idle,
                cycle: Some(cycle),
            };
        }
    }

    /// Mark `cycle` finished; a newer cycle on the same slot is left alone
    pub(crate) fn finish(&self, slot: SlotId, cycle: u64) {
        if let Some(entry) = self.entries.get(slot.index()) {
            let mut entry = entry.write();
            if entry.cycle == Some(cycle) {
                *entry = SlotEntry::default();
            }
        }
    }
}

// ============================================================================
// Outcomes
// ============================================================================

/// How a cycle ended
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SlotOutcome {
    /// Published, replaced, and released
    Recycled {
        /// The resource that went through the slot
        resource: ResourceId,
    },
    /// The fetch failed
    FetchFailed(FetchError),
    /// The package could not be decoded
    DecodeFailed(DecodeError),
    /// The cycle was aborted or panicked
    Cancelled,
}

impl SlotOutcome {
    /// Whether the cycle ended without releasing a resource because of an error
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::FetchFailed(_) | Self::DecodeFailed(_))
    }
}

impl fmt::Display for SlotOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Recycled { resource } => write!(f, "recycled {resource}"),
            Self::FetchFailed(e) => write!(f, "fetch failed: {e}"),
            Self::DecodeFailed(e) => write!(f, "decode failed: {e}"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

// ============================================================================
// Shared Context
// ============================================================================

/// Everything a slot cycle needs, shared by all slots of one pool
pub struct SlotContext {
    fetcher: Arc<dyn ResourceFetcher>,
    decoder: PackageDecoder,
    locator: ResourceLocator,
    surface: Arc<DisplaySurface>,
    table: Arc<SlotTable>,
    stats: Arc<PoolStatsAtomic>,
    events: broadcast::Sender<PoolEvent>,
}

impl SlotContext {
    /// Create a context for `size` slots
    pub fn new(
        size: usize,
        fetcher: Arc<dyn ResourceFetcher>,
        decoder: PackageDecoder,
        locator: ResourceLocator,
        surface: Arc<DisplaySurface>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            fetcher,
            decoder,
            locator,
            surface,
            table: Arc::new(SlotTable::new(size)),
            stats: Arc::new(PoolStatsAtomic::default()),
            events,
        }
    }

    /// Replace the decoder
    pub fn set_decoder(&mut self, decoder: PackageDecoder) {
        self.decoder = decoder;
    }

    /// The URI builder
    #[must_use]
    pub fn locator(&self) -> &ResourceLocator {
        &self.locator
    }

    /// The shared slot table
    #[must_use]
    pub fn table(&self) -> &SlotTable {
        &self.table
    }

    /// Observer handle over this context
    #[must_use]
    pub fn monitor(&self) -> PoolMonitor {
        PoolMonitor::new(
            Arc::clone(&self.table),
            Arc::clone(&self.stats),
            Arc::clone(&self.surface),
            self.events.clone(),
        )
    }

    pub(crate) fn stats(&self) -> &PoolStatsAtomic {
        &self.stats
    }

    pub(crate) fn emit(&self, event: PoolEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

impl fmt::Debug for SlotContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotContext")
            .field("fetcher", &self.fetcher.name())
            .field("locator", &self.locator)
            .field("slots", &self.table.len())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Cycle
// ============================================================================

/// One pass of one slot through the state machine
#[derive(Debug)]
pub struct SlotCycle {
    slot: SlotId,
    cycle: u64,
    ctx: Arc<SlotContext>,
}

impl SlotCycle {
    /// Prepare cycle number `cycle` of `slot`
    #[must_use]
    pub fn new(slot: SlotId, cycle: u64, ctx: Arc<SlotContext>) -> Self {
        Self { slot, cycle, ctx }
    }

    /// The slot this cycle runs on
    #[must_use]
    pub fn slot(&self) -> SlotId {
        self.slot
    }

    /// Run until the published resource is released, or until a failure
    ///
    /// Failures are logged and returned as outcomes; they never propagate.
    /// Dropping the future mid-fetch aborts the request.
    pub async fn run(self) -> SlotOutcome {
        let ctx = Arc::clone(&self.ctx);
        let slot = self.slot;
        let cycle = self.cycle;
        let uri = ctx.locator.uri_for(slot);

        self.enter(SlotState::Fetching);
        let bytes = match InFlightFetch::start(Arc::clone(&ctx.fetcher), uri.clone())
            .wait()
            .await
        {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(slot = %slot, cycle, uri = %uri, error = %e, "Fetch failed");
                ctx.stats().record_fetch_failure();
                self.enter(SlotState::Idle);
                return SlotOutcome::FetchFailed(e);
            }
        };
        tracing::trace!(slot = %slot, cycle, bytes = bytes.len(), "Fetched package");

        self.enter(SlotState::Decoding);
        let resource = match ctx.decoder.decode(bytes).await {
            Ok(resource) => resource,
            Err(e) => {
                tracing::warn!(slot = %slot, cycle, uri = %uri, error = %e, "Decode failed");
                ctx.stats().record_decode_failure();
                self.enter(SlotState::Idle);
                return SlotOutcome::DecodeFailed(e);
            }
        };
        let id = resource.id();

        // Subscribe first so a replacement racing the publish is not missed
        let mut changes = ctx.surface.subscribe();
        let texture = resource.texture();
        ctx.surface.set(Arc::clone(&texture));
        self.enter(SlotState::Published);
        ctx.stats().record_published();
        ctx.emit(PoolEvent::Published { slot, resource: id });
        tracing::debug!(slot = %slot, cycle, resource = %id, "Published");

        self.enter(SlotState::AwaitingReplacement);
        while ctx.surface.shows(&texture) {
            if changes.changed().await.is_err() {
                break;
            }
        }
        drop(texture);

        self.enter(SlotState::Releasing);
        let report = resource.release();
        ctx.stats().record_released();
        ctx.emit(PoolEvent::Released { slot, resource: id });
        tracing::debug!(
            slot = %slot,
            cycle,
            resource = %id,
            pixel_bytes = report.pixel_bytes,
            package_bytes = report.package_bytes,
            "Released"
        );

        self.enter(SlotState::Idle);
        SlotOutcome::Recycled { resource: id }
    }

    fn enter(&self, state: SlotState) {
        self.ctx.table.set_state(self.slot, state);
        self.ctx.emit(PoolEvent::StateChanged {
            slot: self.slot,
            cycle: self.cycle,
            state,
        });
        tracing::trace!(slot = %self.slot, cycle = self.cycle, %state, "Slot state");
    }
}
