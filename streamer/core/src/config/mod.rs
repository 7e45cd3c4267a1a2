//! TOML Configuration File Support
//!
//! Centralized configuration loading for the streaming pool, supporting a TOML
//! configuration file at `~/.config/bundle-streamer/streamer.toml`.
//!
//! # Configuration Priority
//!
//! Configuration values are loaded with the following priority (highest first):
//! 1. CLI arguments (via [`ConfigOverrides`])
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Default values
//!
//! # Example Configuration
//!
//! ```toml
//! [pool]
//! size = 32
//! base_uri = "file:///srv/streaming/packages"
//! id_width = 2
//! extension = "bundle"
//! restart_delay_ms = 0
//!
//! [fetch]
//! connect_timeout_ms = 5000
//! timeout_ms = 30000
//! max_package_bytes = 67108864
//!
//! [latency]
//! min_ms = 100
//! max_ms = 500
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::stream::LatencyRange;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

// =============================================================================
// Configuration Source Tracking
// =============================================================================

/// Tracks where a configuration value came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from command-line argument
    Cli,
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// Runtime Configuration
// =============================================================================

/// Pool shape and package naming
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PoolConfig {
    /// Number of concurrently cycling slots
    pub size: usize,
    /// Base location packages are fetched from (URI or local directory)
    pub base_uri: String,
    /// Zero-padding width of the numeric resource id
    pub id_width: usize,
    /// Package file extension
    pub extension: String,
    /// Pause after a failed cycle before the slot is relaunched
    ///
    /// Zero relaunches on the next scheduler turn.
    pub restart_delay: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            size: 32,
            base_uri: "packages".to_string(),
            id_width: 2,
            extension: "bundle".to_string(),
            restart_delay: Duration::ZERO,
        }
    }
}

/// Fetcher limits
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchConfig {
    /// TCP connect timeout for HTTP fetches
    pub connect_timeout: Duration,
    /// Total timeout for one HTTP fetch
    pub timeout: Duration,
    /// Largest package accepted, in bytes
    pub max_package_bytes: usize,
    /// Whether the HTTP client honours proxy environment variables
    pub use_system_proxy: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            timeout: Duration::from_secs(30),
            max_package_bytes: 64 * 1024 * 1024,
            use_system_proxy: true,
        }
    }
}

/// Complete streamer configuration
#[derive(Clone, Debug)]
pub struct StreamerConfig {
    /// Pool configuration
    pub pool: PoolConfig,
    /// Fetch configuration
    pub fetch: FetchConfig,
    /// Simulated read latency of the virtual byte stream
    pub latency: LatencyRange,
    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,
    /// Source of configuration values
    source: ConfigSource,
    /// Latency bounds set explicitly by some layer, before collapsing
    latency_bounds: LatencyBounds,
}

/// Latency bounds as given by the layers, in milliseconds
///
/// The range is rebuilt from these after every layer so a bound that one
/// layer collapsed is still available to a later one.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct LatencyBounds {
    min_ms: Option<u64>,
    max_ms: Option<u64>,
}

impl LatencyBounds {
    fn is_empty(self) -> bool {
        self.min_ms.is_none() && self.max_ms.is_none()
    }

    /// Layer `update` on top; its bounds win where present
    fn merge(self, update: Self) -> Self {
        Self {
            min_ms: update.min_ms.or(self.min_ms),
            max_ms: update.max_ms.or(self.max_ms),
        }
    }

    fn resolve(self, defaults: LatencyRange) -> LatencyRange {
        LatencyRange::new(
            self.min_ms.map_or(defaults.min(), Duration::from_millis),
            self.max_ms.map_or(defaults.max(), Duration::from_millis),
        )
    }
}

impl Default for StreamerConfig {
    fn default() -> Self {
        Self {
            pool: PoolConfig::default(),
            fetch: FetchConfig::default(),
            latency: LatencyRange::default(),
            config_file_path: None,
            source: ConfigSource::Default,
            latency_bounds: LatencyBounds::default(),
        }
    }
}

impl StreamerConfig {
    /// Create a new configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the primary source of this configuration
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Apply latency bounds from one layer
    fn layer_latency(&mut self, min_ms: Option<u64>, max_ms: Option<u64>) {
        let update = LatencyBounds { min_ms, max_ms };
        if update.is_empty() {
            return;
        }
        self.latency_bounds = self.latency_bounds.merge(update);
        self.latency = self.latency_bounds.resolve(LatencyRange::default());
    }

    /// Check that every value is usable
    ///
    /// # Errors
    ///
    /// [`ConfigError::ValidationError`] naming the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pool.size == 0 {
            return Err(ConfigError::ValidationError(
                "pool.size must be at least 1".to_string(),
            ));
        }
        if self.pool.id_width == 0 || self.pool.id_width > 9 {
            return Err(ConfigError::ValidationError(format!(
                "pool.id_width must be between 1 and 9, got {}",
                self.pool.id_width
            )));
        }
        if self.pool.extension.is_empty() || self.pool.extension.contains('/') {
            return Err(ConfigError::ValidationError(format!(
                "pool.extension '{}' is not a valid file extension",
                self.pool.extension
            )));
        }
        if self.fetch.max_package_bytes == 0 {
            return Err(ConfigError::ValidationError(
                "fetch.max_package_bytes must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// Pool section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolToml {
    /// Number of slots
    pub size: Option<usize>,
    /// Base location of packages
    pub base_uri: Option<String>,
    /// Resource id padding width
    pub id_width: Option<usize>,
    /// Package file extension
    pub extension: Option<String>,
    /// Relaunch delay after a failed cycle, in milliseconds
    pub restart_delay_ms: Option<u64>,
}

/// Fetch section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchToml {
    /// Connect timeout in milliseconds
    pub connect_timeout_ms: Option<u64>,
    /// Total request timeout in milliseconds
    pub timeout_ms: Option<u64>,
    /// Largest accepted package in bytes
    pub max_package_bytes: Option<usize>,
    /// Honour proxy environment variables
    pub use_system_proxy: Option<bool>,
}

/// Latency section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LatencyToml {
    /// Lower bound of the per-stream read delay, in milliseconds
    pub min_ms: Option<u64>,
    /// Upper bound of the per-stream read delay, in milliseconds
    pub max_ms: Option<u64>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamerToml {
    /// Pool configuration section
    pub pool: PoolToml,
    /// Fetch configuration section
    pub fetch: FetchToml,
    /// Latency configuration section
    pub latency: LatencyToml,
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/bundle-streamer/streamer.toml` or
/// `~/.config/bundle-streamer/streamer.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("bundle-streamer").join("streamer.toml"))
}

/// Load configuration from all sources with proper priority
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed, or if the
/// merged configuration is invalid. A missing config file is not an error.
pub fn load_config() -> Result<StreamerConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path
///
/// # Arguments
///
/// * `path` - Optional path to the configuration file. If `None`, only defaults
///   and environment variables are used.
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<StreamerConfig, ConfigError> {
    load_config_with_env(path, |key| std::env::var(key).ok())
}

/// Load configuration reading environment values through `env`
///
/// # Errors
///
/// See [`load_config_from_path`].
pub fn load_config_with_env<F>(path: Option<PathBuf>, env: F) -> Result<StreamerConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    // Start with defaults
    let mut config = StreamerConfig::default();

    // Try to load from file
    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: StreamerToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, &toml_config);
            config.config_file_path = Some(config_path.clone());
            config.source = ConfigSource::File;

            tracing::info!(
                path = %config_path.display(),
                "Loaded configuration from file"
            );
        } else {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
        }
    }

    // Apply environment variables (overrides file values)
    apply_env_config(&mut config, env);

    config.validate()?;
    Ok(config)
}

/// Apply TOML configuration values to the config struct
fn apply_toml_config(config: &mut StreamerConfig, toml: &StreamerToml) {
    // Pool settings
    if let Some(size) = toml.pool.size {
        config.pool.size = size;
    }
    if let Some(ref base) = toml.pool.base_uri {
        config.pool.base_uri.clone_from(base);
    }
    if let Some(width) = toml.pool.id_width {
        config.pool.id_width = width;
    }
    if let Some(ref extension) = toml.pool.extension {
        config.pool.extension.clone_from(extension);
    }
    if let Some(delay) = toml.pool.restart_delay_ms {
        config.pool.restart_delay = Duration::from_millis(delay);
    }

    // Fetch settings
    if let Some(timeout) = toml.fetch.connect_timeout_ms {
        config.fetch.connect_timeout = Duration::from_millis(timeout);
    }
    if let Some(timeout) = toml.fetch.timeout_ms {
        config.fetch.timeout = Duration::from_millis(timeout);
    }
    if let Some(max) = toml.fetch.max_package_bytes {
        config.fetch.max_package_bytes = max;
    }
    if let Some(proxy) = toml.fetch.use_system_proxy {
        config.fetch.use_system_proxy = proxy;
    }

    // Latency settings
    config.layer_latency(toml.latency.min_ms, toml.latency.max_ms);
}

/// Apply environment variable overrides to the config
fn apply_env_config<F>(config: &mut StreamerConfig, env: F)
where
    F: Fn(&str) -> Option<String>,
{
    let parsed = |key: &str| env(key).and_then(|v| v.trim().parse::<u64>().ok());

    // Pool settings from environment
    if let Some(size) = parsed("STREAMER_POOL_SIZE") {
        config.pool.size = usize::try_from(size).unwrap_or(usize::MAX);
        config.source = ConfigSource::Env;
    }
    if let Some(base) = env("STREAMER_BASE_URI") {
        config.pool.base_uri = base;
        config.source = ConfigSource::Env;
    }
    if let Some(width) = parsed("STREAMER_ID_WIDTH") {
        config.pool.id_width = usize::try_from(width).unwrap_or(usize::MAX);
        config.source = ConfigSource::Env;
    }
    if let Some(delay) = parsed("STREAMER_RESTART_DELAY_MS") {
        config.pool.restart_delay = Duration::from_millis(delay);
        config.source = ConfigSource::Env;
    }

    // Fetch settings from environment
    if let Some(timeout) = parsed("STREAMER_FETCH_TIMEOUT_MS") {
        config.fetch.timeout = Duration::from_millis(timeout);
        config.source = ConfigSource::Env;
    }
    if let Some(max) = parsed("STREAMER_MAX_PACKAGE_BYTES") {
        config.fetch.max_package_bytes = usize::try_from(max).unwrap_or(usize::MAX);
        config.source = ConfigSource::Env;
    }

    // Latency settings from environment
    let min = parsed("STREAMER_LATENCY_MIN_MS");
    let max = parsed("STREAMER_LATENCY_MAX_MS");
    if min.is_some() || max.is_some() {
        config.layer_latency(min, max);
        config.source = ConfigSource::Env;
    }
}

// =============================================================================
// CLI Override Support
// =============================================================================

/// Builder for applying CLI overrides to configuration
///
/// Use this after [`load_config`] to apply command-line argument overrides.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Base URI override
    pub base_uri: Option<String>,
    /// Pool size override
    pub pool_size: Option<usize>,
    /// Minimum latency override (milliseconds)
    pub latency_min_ms: Option<u64>,
    /// Maximum latency override (milliseconds)
    pub latency_max_ms: Option<u64>,
}

impl ConfigOverrides {
    /// Create a new empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set base URI override
    #[must_use]
    pub fn with_base_uri(mut self, base: impl Into<String>) -> Self {
        self.base_uri = Some(base.into());
        self
    }

    /// Set pool size override
    #[must_use]
    pub fn with_pool_size(mut self, size: usize) -> Self {
        self.pool_size = Some(size);
        self
    }

    /// Set latency bounds override
    #[must_use]
    pub fn with_latency_ms(mut self, min: Option<u64>, max: Option<u64>) -> Self {
        self.latency_min_ms = min;
        self.latency_max_ms = max;
        self
    }

    fn is_empty(&self) -> bool {
        self.base_uri.is_none()
            && self.pool_size.is_none()
            && self.latency_min_ms.is_none()
            && self.latency_max_ms.is_none()
    }

    /// Apply overrides to a configuration and re-validate it
    ///
    /// # Errors
    ///
    /// [`ConfigError::ValidationError`] if an override produces a bad value.
    pub fn apply(&self, config: &mut StreamerConfig) -> Result<(), ConfigError> {
        if self.is_empty() {
            return Ok(());
        }
        config.source = ConfigSource::Cli;

        if let Some(ref base) = self.base_uri {
            config.pool.base_uri.clone_from(base);
        }
        if let Some(size) = self.pool_size {
            config.pool.size = size;
        }
        config.layer_latency(self.latency_min_ms, self.latency_max_ms);

        config.validate()
    }
}

// =============================================================================
// Tests
// =============================================================================
