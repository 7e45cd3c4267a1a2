//! Pool observation: events, statistics, and the monitor handle.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;

use crate::resource::ResourceId;
use crate::slot::{SlotId, SlotOutcome, SlotState, SlotTable};
use crate::surface::DisplaySurface;

// ============================================================================
// Events
// ============================================================================

/// Lifecycle notifications broadcast to pool observers
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PoolEvent {
    /// A new cycle started on a slot
    SlotLaunched {
        /// The slot
        slot: SlotId,
        /// Cycle number on that slot
        cycle: u64,
    },
    /// A slot moved to another state
    StateChanged {
        /// The slot
        slot: SlotId,
        /// Cycle number on that slot
        cycle: u64,
        /// The state entered
        state: SlotState,
    },
    /// A slot put its resource on the surface
    Published {
        /// The slot
        slot: SlotId,
        /// The published resource
        resource: ResourceId,
    },
    /// A slot released its replaced resource
    Released {
        /// The slot
        slot: SlotId,
        /// The released resource
        resource: ResourceId,
    },
    /// A cycle ended and its slot is free for relaunch
    SlotFreed {
        /// The slot
        slot: SlotId,
        /// Cycle number that ended
        cycle: u64,
        /// How it ended
        outcome: SlotOutcome,
    },
}

// ============================================================================
// Statistics
// ============================================================================

/// Snapshot of pool counters
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Cycles launched
    pub cycles_started: u64,
    /// Cycles that ended in a fetch failure
    pub fetch_failures: u64,
    /// Cycles that ended in a decode failure
    pub decode_failures: u64,
    /// Resources published to the surface
    pub published: u64,
    /// Resources released after replacement
    pub released: u64,
    /// Cycles aborted before completing
    pub cancelled: u64,
}

/// Atomic statistics for lock-free updates
#[derive(Debug, Default)]
pub(crate) struct PoolStatsAtomic {
    cycles_started: AtomicU64,
    fetch_failures: AtomicU64,
    decode_failures: AtomicU64,
    published: AtomicU64,
    released: AtomicU64,
    cancelled: AtomicU64,
}

impl PoolStatsAtomic {
    pub(crate) fn record_cycle_started(&self) {
        self.cycles_started.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_fetch_failure(&self) {
        self.fetch_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_decode_failure(&self) {
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_published(&self) {
        self.published.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_released(&self) {
        self.released.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_cancelled(&self) {
        self.cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> PoolStats {
        PoolStats {
            cycles_started: self.cycles_started.load(Ordering::Relaxed),
            fetch_failures: self.fetch_failures.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            published: self.published.load(Ordering::Relaxed),
            released: self.released.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
        }
    }
}

// ============================================================================
// Monitor
// ============================================================================

/// Cloneable read-only view of a running pool
#[derive(Clone, Debug)]
pub struct PoolMonitor {
    table: Arc<SlotTable>,
    stats: Arc<PoolStatsAtomic>,
    surface: Arc<DisplaySurface>,
    events: broadcast::Sender<PoolEvent>,
}

impl PoolMonitor {
    pub(crate) fn new(
        table: Arc<SlotTable>,
        stats: Arc<PoolStatsAtomic>,
        surface: Arc<DisplaySurface>,
        events: broadcast::Sender<PoolEvent>,
    ) -> Self {
        Self {
            table,
            stats,
            surface,
            events,
        }
    }

    /// Number of slots
    #[must_use]
    pub fn size(&self) -> usize {
        self.table.len()
    }

    /// State of every slot, by index
    #[must_use]
    pub fn states(&self) -> Vec<SlotState> {
        self.table.snapshot()
    }

    /// Slots with a cycle in flight
    #[must_use]
    pub fn active_slots(&self) -> Vec<SlotId> {
        self.table.active()
    }

    /// Counter snapshot
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        self.stats.snapshot()
    }

    /// The shared display surface
    #[must_use]
    pub fn surface(&self) -> &Arc<DisplaySurface> {
        &self.surface
    }

    /// Receive events from now on
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<PoolEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_stats_snapshot() {
        let stats = PoolStatsAtomic::default();
        stats.record_cycle_started();
        stats.record_cycle_started();
        stats.record_fetch_failure();
        stats.record_published();
        stats.record_cancelled();

        assert_eq!(
            stats.snapshot(),
            PoolStats {
                cycles_started: 2,
                fetch_failures: 1,
                published: 1,
                cancelled: 1,
                ..PoolStats::default()
            }
        );
    }
}
