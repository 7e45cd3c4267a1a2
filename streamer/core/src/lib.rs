//! Streamer Core - Bounded Concurrent Resource Streaming
//!
//! A fixed number of independently cycling slots, each of which fetches a
//! resource package, decodes it through a seekable byte stream with simulated
//! read latency, publishes the decoded texture to one shared display surface,
//! waits for that texture to be replaced, then releases it and starts over.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────── StreamingPool ─────────────────────────────┐
//! │                                                                         │
//! │   slot 0      slot 1      slot 2            slot N-1                    │
//! │  ┌───────┐   ┌───────┐   ┌───────┐         ┌───────┐                    │
//! │  │ Cycle │   │ Cycle │   │ Cycle │   ...   │ Cycle │                    │
//! │  └───┬───┘   └───┬───┘   └───┬───┘         └───┬───┘                    │
//! │      │ fetch     │           │                 │                        │
//! │      ▼           ▼           ▼                 ▼                        │
//! │  ResourceFetcher (file / http / memory)                                 │
//! │      │ bytes                                                            │
//! │      ▼                                                                  │
//! │  PackageDecoder ─► VirtualByteStream ─► OffloadedReader (blocking pool) │
//! │      │ DecodedResource                                                  │
//! │      ▼                                                                  │
//! │  DisplaySurface  ◄─── set / watch ───  every slot                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Types
//!
//! - [`StreamingPool`]: owns the slots and relaunches each one as it frees up
//! - [`SlotCycle`]: one pass of one slot through its state machine
//! - [`ResourceFetcher`]: where packages come from
//! - [`PackageDecoder`]: package bytes to a [`DecodedResource`]
//! - [`DisplaySurface`]: the single "currently shown" cell
//! - [`VirtualByteStream`]: in-memory [`ByteSource`] with per-instance latency
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use streamer_core::{load_config, DisplaySurface, StreamingPool, UriFetcher};
//!
//! let config = load_config()?;
//! let fetcher = Arc::new(UriFetcher::new(&config.fetch)?);
//! let surface = Arc::new(DisplaySurface::new());
//! let pool = StreamingPool::new(&config, fetcher, surface)?;
//! pool.run_until(tokio::signal::ctrl_c().map(|_| ())).await;
//! ```

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod fetch;
pub mod package;
pub mod pool;
pub mod resource;
pub mod slot;
pub mod stream;
pub mod surface;

// Config exports
pub use config::{
    default_config_path, load_config, load_config_from_path, ConfigError, ConfigOverrides,
    ConfigSource, FetchConfig, PoolConfig, StreamerConfig,
};

// Fetch exports
pub use fetch::{
    FetchError, InFlightFetch, MemoryFetcher, ResourceFetcher, ResourceLocator, UriFetcher,
};

// Package exports
pub use package::{
    AssetKind, BuildError, DecodeError, PackageBuilder, PackageDecoder, ResourcePackage,
};

// Pool exports
pub use pool::{PoolError, PoolEvent, PoolMonitor, PoolStats, StreamingPool};
pub use slot::{SlotCycle, SlotId, SlotOutcome, SlotState};

pub use resource::{DecodedResource, ReleaseReport, ResourceId, Texture, TextureHandle};
pub use stream::{
    ByteSource, LatencyRange, OffloadedReader, SeekOrigin, StreamError, VirtualByteStream,
};
pub use surface::DisplaySurface;
