//! Streaming Pool
//!
//! Owns a fixed number of slots and keeps every one of them cycling.
//!
//! # Architecture
//!
//! ```text
//!                 ┌──────────────── StreamingPool::run_until ────────────────┐
//!                 │                                                          │
//!   launch(0..N) ─┼─► spawn SlotCycle ─► ... ─► FreedGuard::drop ──┐         │
//!                 │                                                 │ mpsc   │
//!                 │   ◄──────────── relaunch only that slot ◄───────┘         │
//!                 └──────────────────────────────────────────────────────────┘
//! ```
//!
//! The supervisor is event-driven: each cycle task carries a drop guard that
//! reports "slot freed" when the task completes, is aborted, or panics. The
//! pool relaunches exactly the freed slot. Messages from an older cycle of a
//! slot are ignored by cycle number.

mod monitor;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::{ConfigError, StreamerConfig};
use crate::fetch::{ResourceFetcher, ResourceLocator};
use crate::package::PackageDecoder;
use crate::slot::{SlotContext, SlotCycle, SlotId, SlotOutcome};
use crate::surface::DisplaySurface;

pub use monitor::{PoolEvent, PoolMonitor, PoolStats};
pub(crate) use monitor::PoolStatsAtomic;

/// Errors constructing a pool
#[derive(Debug, Error)]
pub enum PoolError {
    /// The configuration failed validation
    #[error("invalid pool configuration: {0}")]
    InvalidConfig(#[from] ConfigError),
}

/// "Slot freed" message from a finished cycle
#[derive(Debug)]
struct Freed {
    slot: SlotId,
    cycle: u64,
}

/// Reports the slot freed when the cycle task ends, however it ends
struct FreedGuard {
    slot: SlotId,
    cycle: u64,
    ctx: Arc<SlotContext>,
    freed: mpsc::UnboundedSender<Freed>,
    outcome: Option<SlotOutcome>,
}

impl FreedGuard {
    fn complete(mut self, outcome: SlotOutcome) {
        self.outcome = Some(outcome);
    }
}

impl Drop for FreedGuard {
    fn drop(&mut self) {
        let outcome = self.outcome.take().unwrap_or(SlotOutcome::Cancelled);
        if matches!(outcome, SlotOutcome::Cancelled) {
            self.ctx.stats().record_cancelled();
        }
        self.ctx.table().finish(self.slot, self.cycle);
        self.ctx.emit(PoolEvent::SlotFreed {
            slot: self.slot,
            cycle: self.cycle,
            outcome,
        });
        // The pool may already be gone during shutdown
        let _ = self.freed.send(Freed {
            slot: self.slot,
            cycle: self.cycle,
        });
    }
}

/// A cycle in flight on one slot
struct Running {
    cycle: u64,
    handle: JoinHandle<()>,
}

/// Bounded pool of independently cycling slots
pub struct StreamingPool {
    ctx: SlotContext,
    size: usize,
    restart_delay: Duration,
}

impl StreamingPool {
    /// Create a pool
    ///
    /// The decoder samples stream latency from `config.latency`.
    ///
    /// # Errors
    ///
    /// [`PoolError::InvalidConfig`] if the configuration does not validate,
    /// e.g. a pool size of zero.
    pub fn new(
        config: &StreamerConfig,
        fetcher: Arc<dyn ResourceFetcher>,
        surface: Arc<DisplaySurface>,
    ) -> Result<Self, PoolError> {
        config.validate()?;

        let ctx = SlotContext::new(
            config.pool.size,
            fetcher,
            PackageDecoder::from_config(config),
            ResourceLocator::from_config(&config.pool),
            surface,
        );

        Ok(Self {
            ctx,
            size: config.pool.size,
            restart_delay: config.pool.restart_delay,
        })
    }

    /// Substitute the decoder
    #[must_use]
    pub fn with_decoder(mut self, decoder: PackageDecoder) -> Self {
        self.ctx.set_decoder(decoder);
        self
    }

    /// Number of slots
    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Observer handle; stays valid after the pool stops
    #[must_use]
    pub fn monitor(&self) -> PoolMonitor {
        self.ctx.monitor()
    }

    /// Run forever
    pub async fn run(self) {
        self.run_until(std::future::pending()).await;
    }

    /// Run until `shutdown` resolves, then abort every cycle and wait for them
    ///
    /// Returns the final statistics.
    pub async fn run_until<F>(self, shutdown: F) -> PoolStats
    where
        F: Future<Output = ()>,
    {
        let ctx = Arc::new(self.ctx);
        let (freed_tx, mut freed_rx) = mpsc::unbounded_channel();
        let launcher = Launcher {
            ctx: Arc::clone(&ctx),
            freed: freed_tx,
            restart_delay: self.restart_delay,
        };

        tracing::info!(
            slots = self.size,
            base = %ctx.locator().base(),
            "Streaming pool started"
        );

        let mut cycles = vec![1u64; self.size];
        let mut running: Vec<Option<Running>> = (0..self.size)
            .map(|index| Some(launcher.launch(SlotId::new(index), 1)))
            .collect();

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                () = &mut shutdown => break,
                Some(freed) = freed_rx.recv() => {
                    let index = freed.slot.index();
                    let current = running.get(index).and_then(Option::as_ref).map(|r| r.cycle);
                    if current != Some(freed.cycle) {
                        tracing::trace!(
                            slot = %freed.slot,
                            cycle = freed.cycle,
                            "Ignoring stale slot-freed message"
                        );
                        continue;
                    }

                    cycles[index] += 1;
                    tracing::trace!(slot = %freed.slot, cycle = cycles[index], "Relaunching slot");
                    running[index] = Some(launcher.launch(freed.slot, cycles[index]));
                }
            }
        }

        tracing::info!("Streaming pool shutting down");
        let in_flight: Vec<Running> = running.iter_mut().filter_map(Option::take).collect();
        for cycle in &in_flight {
            cycle.handle.abort();
        }
        for cycle in in_flight {
            // Aborted or panicked; the guard has already freed the slot
            let _ = cycle.handle.await;
        }

        let stats = ctx.stats().snapshot();
        tracing::info!(
            cycles = stats.cycles_started,
            published = stats.published,
            released = stats.released,
            fetch_failures = stats.fetch_failures,
            decode_failures = stats.decode_failures,
            "Streaming pool stopped"
        );
        stats
    }
}

impl std::fmt::Debug for StreamingPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingPool")
            .field("size", &self.size)
            .field("restart_delay", &self.restart_delay)
            .field("ctx", &self.ctx)
            .finish()
    }
}

/// Spawns cycle tasks with their drop guards
struct Launcher {
    ctx: Arc<SlotContext>,
    freed: mpsc::UnboundedSender<Freed>,
    restart_delay: Duration,
}

impl Launcher {
    fn launch(&self, slot: SlotId, cycle: u64) -> Running {
        self.ctx.table().begin(slot, cycle);
        self.ctx.stats().record_cycle_started();
        self.ctx.emit(PoolEvent::SlotLaunched { slot, cycle });

        let guard = FreedGuard {
            slot,
            cycle,
            ctx: Arc::clone(&self.ctx),
            freed: self.freed.clone(),
            outcome: None,
        };
        let task = SlotCycle::new(slot, cycle, Arc::clone(&self.ctx));
        let restart_delay = self.restart_delay;

        let handle = tokio::spawn(async move {
            let outcome = task.run().await;
            if outcome.is_failure() && !restart_delay.is_zero() {
                tokio::time::sleep(restart_delay).await;
            }
            guard.complete(outcome);
        });

        Running { cycle, handle }
    }
}
