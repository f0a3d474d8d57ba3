//! Runtime configuration.
//!
//! Two sources are accepted: a TOML document, and flat `key = value`
//! metadata pairs (for hosts that only hand out string maps). Both populate
//! the same structs and go through the same [`RuntimeConfig::validate`].
//!
//! ```toml
//! [pool]
//! name = "promise-worker"
//! core_threads = 0
//! max_threads = 8        # omit for an unbounded (cached) pool
//! keep_alive_ms = 60000
//! max_queue_depth = 1024 # omit for an unbounded queue
//! ```

use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    pub pool: PoolConfig,
}

/// Worker pool sizing.
///
/// `max_threads = None` gives a cached pool: a thread is started whenever no
/// worker is idle, so there is no backpressure at all. `Some(n)` caps the
/// pool at `n` workers and queues the rest.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PoolConfig {
    /// Worker thread name prefix; workers are named `{name}-{n}`.
    pub name: String,
    /// Workers that never time out.
    pub core_threads: usize,
    pub max_threads: Option<usize>,
    /// How long a worker above `core_threads` idles before exiting.
    pub keep_alive_ms: u64,
    /// Bounded pools only. A task submitted to a full queue is refused with
    /// `ScheduleError::QueueFull`.
    pub max_queue_depth: Option<usize>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            name: "promise-worker".to_owned(),
            core_threads: 0,
            max_threads: None,
            keep_alive_ms: 60_000,
            max_queue_depth: None,
        }
    }
}

impl PoolConfig {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn bounded(threads: usize) -> Self {
        Self {
            core_threads: threads,
            max_threads: Some(threads),
            ..Self::default()
        }
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_millis(self.keep_alive_ms)
    }
}

/// Every key [`RuntimeConfig::from_metadata`] understands.
pub const METADATA_KEYS: &[&str] = &[
    "pool.name",
    "pool.core_threads",
    "pool.max_threads",
    "pool.keep_alive_ms",
    "pool.max_queue_depth",
];

impl RuntimeConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Populate from flat metadata pairs. Keys missing from the input keep
    /// their defaults. `"unbounded"` is accepted for the optional limits.
    pub fn from_metadata<'a, I>(pairs: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut config = Self::default();
        for (key, value) in pairs {
            let value = value.trim();
            let pool = &mut config.pool;
            match key.trim() {
                "pool.name" => pool.name = value.to_owned(),
                "pool.core_threads" => pool.core_threads = parse(key, value)?,
                "pool.max_threads" => pool.max_threads = parse_limit(key, value)?,
                "pool.keep_alive_ms" => pool.keep_alive_ms = parse(key, value)?,
                "pool.max_queue_depth" => pool.max_queue_depth = parse_limit(key, value)?,
                other => return Err(ConfigError::UnknownKey(other.to_owned())),
            }
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let pool = &self.pool;
        if pool.name.is_empty() {
            return Err(ConfigError::Invalid("pool.name must not be empty"));
        }
        if let Some(max) = pool.max_threads {
            if max == 0 {
                return Err(ConfigError::Invalid("pool.max_threads must be at least 1"));
            }
            if pool.core_threads > max {
                return Err(ConfigError::Invalid(
                    "pool.core_threads must not exceed pool.max_threads",
                ));
            }
        }
        if pool.max_queue_depth == Some(0) {
            return Err(ConfigError::Invalid("pool.max_queue_depth must be at least 1"));
        }
        Ok(())
    }
}

fn parse<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_owned(),
        value: value.to_owned(),
    })
}

fn parse_limit(key: &str, value: &str) -> Result<Option<usize>, ConfigError> {
    if value.eq_ignore_ascii_case("unbounded") {
        Ok(None)
    } else {
        parse(key, value).map(Some)
    }
}
