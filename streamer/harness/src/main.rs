//! Streamer Harness - Drives the bundle-streamer pool
//!
//! # Usage
//!
//! ```bash
//! # Build 32 random packages into ./packages
//! streamer-harness generate --output packages
//!
//! # Stream them with the default 32-slot pool until Ctrl-C
//! streamer-harness run --base packages
//!
//! # Eight slots, faster reads, stop after ten seconds
//! streamer-harness run --base packages --pool-size 8 \
//!     --latency-min-ms 10 --latency-max-ms 50 --duration-secs 10
//!
//! # Pack existing images, then look inside one package
//! streamer-harness pack --input textures --output packages
//! streamer-harness inspect packages/00.bundle
//!
//! # Verbose logging
//! RUST_LOG=streamer_core=trace streamer-harness run
//! ```

mod display;
mod generate;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};

use streamer_core::{
    load_config_from_path, ConfigOverrides, DisplaySurface, LatencyRange, OffloadedReader,
    ResourceLocator, ResourcePackage, SlotId, StreamingPool, UriFetcher, VirtualByteStream,
};

/// Streamer Harness - bounded concurrent resource streaming test bed
#[derive(Parser, Debug)]
#[command(name = "streamer-harness")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(
        short = 'l',
        long,
        env = "STREAMER_LOG_LEVEL",
        default_value = "info",
        global = true
    )]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Stream packages through the pool
    Run(RunArgs),
    /// Generate random solid-colour texture packages
    Generate(generate::GenerateArgs),
    /// Pack each image in a directory into its own package
    Pack(generate::PackArgs),
    /// List the entries of a package
    Inspect {
        /// Package file
        file: PathBuf,
    },
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Configuration file path
    #[arg(short = 'c', long, env = "STREAMER_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Base URI or directory holding the packages
    #[arg(short = 'b', long, value_name = "URI")]
    base: Option<String>,

    /// Number of concurrent slots
    #[arg(short = 'n', long)]
    pool_size: Option<usize>,

    /// Lower bound of the simulated per-read delay
    #[arg(long, value_name = "MS")]
    latency_min_ms: Option<u64>,

    /// Upper bound of the simulated per-read delay
    #[arg(long, value_name = "MS")]
    latency_max_ms: Option<u64>,

    /// Stop after this many seconds instead of waiting for Ctrl-C
    #[arg(short = 'd', long, value_name = "SECS")]
    duration_secs: Option<u64>,
}

/// Initialize logging with the specified level
fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!(
            "streamer_harness={level},streamer_core={level}"
        ))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();
}

/// Resolves on Ctrl-C, or after `duration` if one is given
async fn shutdown_signal(duration: Option<Duration>) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    match duration {
        Some(limit) => {
            tokio::select! {
                () = ctrl_c => info!("Received Ctrl-C, shutting down"),
                () = tokio::time::sleep(limit) => {
                    info!(secs = limit.as_secs(), "Run duration elapsed");
                }
            }
        }
        None => {
            ctrl_c.await;
            info!("Received Ctrl-C, shutting down");
        }
    }
}

/// Fail early when a local base has not been populated yet
async fn preflight(locator: &ResourceLocator) -> Result<()> {
    let Some(first) = locator.local_path(SlotId::new(0)) else {
        return Ok(());
    };

    let exists = tokio::fs::try_exists(&first)
        .await
        .with_context(|| format!("Failed to check {}", first.display()))?;
    if !exists {
        anyhow::bail!(
            "{} not found. Build the packages first, e.g. \
             `streamer-harness generate --output <dir>`",
            first.display()
        );
    }
    Ok(())
}

async fn run(args: RunArgs) -> Result<()> {
    let mut config =
        load_config_from_path(args.config.clone()).context("Failed to load configuration")?;

    let mut overrides =
        ConfigOverrides::new().with_latency_ms(args.latency_min_ms, args.latency_max_ms);
    if let Some(base) = args.base {
        overrides = overrides.with_base_uri(base);
    }
    if let Some(size) = args.pool_size {
        overrides = overrides.with_pool_size(size);
    }
    overrides
        .apply(&mut config)
        .context("Invalid command-line overrides")?;

    info!(
        source = %config.source(),
        slots = config.pool.size,
        base = %config.pool.base_uri,
        latency_min_ms = config.latency.min().as_millis(),
        latency_max_ms = config.latency.max().as_millis(),
        "Configuration loaded"
    );

    let locator = ResourceLocator::from_config(&config.pool);
    preflight(&locator).await?;

    let fetcher = Arc::new(UriFetcher::new(&config.fetch).context("Failed to build fetcher")?);
    let surface = Arc::new(DisplaySurface::new());
    let pool = StreamingPool::new(&config, fetcher, Arc::clone(&surface))?;

    let observer = tokio::spawn(display::observe(Arc::clone(&surface)));
    let stats = pool
        .run_until(shutdown_signal(args.duration_secs.map(Duration::from_secs)))
        .await;
    observer.abort();

    println!("cycles started:   {}", stats.cycles_started);
    println!("published:        {}", stats.published);
    println!("released:         {}", stats.released);
    println!("fetch failures:   {}", stats.fetch_failures);
    println!("decode failures:  {}", stats.decode_failures);
    println!("cancelled:        {}", stats.cancelled);
    Ok(())
}

async fn inspect(file: PathBuf) -> Result<()> {
    let bytes = tokio::fs::read(&file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let total = bytes.len();

    let stream = VirtualByteStream::new(bytes, &LatencyRange::none());
    let package = ResourcePackage::open(OffloadedReader::new(stream))
        .await
        .with_context(|| format!("{} is not a valid package", file.display()))?;

    println!("{} ({total} bytes, {} entries)", file.display(), package.entries().len());
    for entry in package.entries() {
        println!(
            "  {:<32} {:<8} offset {:>10}  length {:>10}  crc32 {:08x}",
            entry.name, entry.kind, entry.offset, entry.length, entry.crc32
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    match cli.command {
        Command::Run(args) => {
            info!(version = env!("CARGO_PKG_VERSION"), "Streamer harness starting");
            run(args).await
        }
        Command::Generate(args) => {
            let written = tokio::task::spawn_blocking(move || generate::generate(&args)).await??;
            info!(packages = written, "Generated packages");
            Ok(())
        }
        Command::Pack(args) => {
            let written = tokio::task::spawn_blocking(move || generate::pack(&args)).await??;
            info!(packages = written, "Packed images");
            Ok(())
        }
        Command::Inspect { file } => inspect(file).await,
    }
}
