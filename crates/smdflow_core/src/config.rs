//! Pipeline configuration.

use crate::error::{CoreError, CoreResult};
use crate::record::HEADER_SIZE;
use std::time::Duration;

/// Environment variable overriding [`PipelineConfig::chunk_size`].
pub const ENV_CHUNK_SIZE: &str = "SMDFLOW_CHUNKSIZE";
/// Environment variable overriding [`PipelineConfig::smd_n_events`].
pub const ENV_N_EVENTS: &str = "SMDFLOW_N_EVENTS";
/// Environment variable overriding [`PipelineConfig::max_events`].
pub const ENV_MAX_EVENTS: &str = "SMDFLOW_MAX_EVENTS";
/// Environment variable overriding [`PipelineConfig::max_retries`].
pub const ENV_MAX_RETRIES: &str = "SMDFLOW_MAX_RETRIES";

/// Tunables for reading and event building.
///
/// Built once at startup and passed to the constructors that need it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Capacity of each channel buffer in bytes.
    pub chunk_size: usize,

    /// Maximum number of events released per window.
    pub smd_n_events: usize,

    /// Stop after this many events (0 = unlimited).
    pub max_events: u64,

    /// Maximum number of accepted events per batch.
    pub batch_size: usize,

    /// How many times a stalled read is retried before giving up.
    pub max_retries: u32,

    /// Delay between stalled read attempts.
    pub retry_delay: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunk_size: 16 * 1024 * 1024, // 16 MiB
            smd_n_events: 1000,
            max_events: 0,
            batch_size: 1000,
            max_retries: 0,
            retry_delay: Duration::from_secs(1),
        }
    }
}

impl PipelineConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a configuration from the process environment.
    ///
    /// Unset variables keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidConfig`] if a variable is set but does
    /// not parse as an unsigned integer.
    pub fn from_env() -> CoreResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Creates a configuration from an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidConfig`] if a value does not parse.
    pub fn from_lookup<F>(lookup: F) -> CoreResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(v) = parse_var(&lookup, ENV_CHUNK_SIZE)? {
            config.chunk_size = to_usize(ENV_CHUNK_SIZE, v)?;
        }
        if let Some(v) = parse_var(&lookup, ENV_N_EVENTS)? {
            config.smd_n_events = to_usize(ENV_N_EVENTS, v)?;
        }
        if let Some(v) = parse_var(&lookup, ENV_MAX_EVENTS)? {
            config.max_events = v;
        }
        if let Some(v) = parse_var(&lookup, ENV_MAX_RETRIES)? {
            config.max_retries = u32::try_from(v).map_err(|_| {
                CoreError::invalid_config(format!("{ENV_MAX_RETRIES} out of range: {v}"))
            })?;
        }
        Ok(config)
    }

    /// Sets the per-channel buffer capacity.
    #[must_use]
    pub const fn chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size;
        self
    }

    /// Sets the maximum events per window.
    #[must_use]
    pub const fn smd_n_events(mut self, n: usize) -> Self {
        self.smd_n_events = n;
        self
    }

    /// Sets the total event limit (0 = unlimited).
    #[must_use]
    pub const fn max_events(mut self, n: u64) -> Self {
        self.max_events = n;
        self
    }

    /// Sets the maximum events per batch.
    #[must_use]
    pub const fn batch_size(mut self, n: usize) -> Self {
        self.batch_size = n;
        self
    }

    /// Sets the stalled read retry count.
    #[must_use]
    pub const fn max_retries(mut self, n: u32) -> Self {
        self.max_retries = n;
        self
    }

    /// Sets the delay between stalled read attempts.
    #[must_use]
    pub const fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Checks that the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidConfig`] describing the first bad field.
    pub fn validate(&self) -> CoreResult<()> {
        if self.chunk_size <= HEADER_SIZE {
            return Err(CoreError::invalid_config(format!(
                "chunk_size must exceed the {HEADER_SIZE}-byte record header, got {}",
                self.chunk_size
            )));
        }
        if self.smd_n_events == 0 {
            return Err(CoreError::invalid_config("smd_n_events must be > 0"));
        }
        if self.batch_size == 0 {
            return Err(CoreError::invalid_config("batch_size must be > 0"));
        }
        Ok(())
    }
}

fn parse_var<F>(lookup: &F, key: &str) -> CoreResult<Option<u64>>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| CoreError::invalid_config(format!("{key} is not a number: {raw:?}"))),
    }
}

fn to_usize(key: &str, value: u64) -> CoreResult<usize> {
    usize::try_from(value)
        .map_err(|_| CoreError::invalid_config(format!("{key} out of range: {value}")))
}
