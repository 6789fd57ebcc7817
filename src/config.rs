//! Server configuration: defaults, then an optional TOML file, then
//! `PARLEY_*` environment variables (a `.env` file is honoured).

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const CONFIG_PATH_VAR: &str = "PARLEY_CONFIG";
const ENV_PREFIX: &str = "PARLEY_";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(default)]
pub struct ServerConfig {
    pub queue: QueueConfig,
    pub cache: CacheConfig,
    pub connections: ConnectionConfig,
    pub scheduler: SchedulerConfig,
    pub classifier: ClassifierConfig,
    pub stats: StatsConfig,
    pub logging: LoggingConfig,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct QueueConfig {
    /// Failed attempts after which a message is dropped.
    pub max_retries: u32,
    /// Artificial latency of the simulated network send.
    pub delivery_latency_ms: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    pub capacity: usize,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ConnectionConfig {
    pub max_connections: usize,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct SchedulerConfig {
    pub worker_count: usize,
    pub max_load_per_worker: u32,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ClassifierConfig {
    pub urgent_keywords: Vec<String>,
    pub high_keywords: Vec<String>,
    /// A payload starting with this character is HIGH priority.
    pub high_marker: char,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct StatsConfig {
    pub report_interval_secs: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            delivery_latency_ms: 10,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { capacity: 100 }
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            max_connections: 100,
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            worker_count: 4,
            max_load_per_worker: 10,
        }
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            urgent_keywords: vec!["urgent".to_string(), "emergency".to_string()],
            high_keywords: vec!["important".to_string()],
            high_marker: '!',
        }
    }
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            report_interval_secs: 30,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

impl ServerConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    /// Defaults, overlaid by the file named in `PARLEY_CONFIG` and then by
    /// `PARLEY_*` variables from the process environment or `.env`.
    pub fn load() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        let mut config = match std::env::var(CONFIG_PATH_VAR) {
            Ok(path) => Self::from_file(path)?,
            Err(_) => Self::default(),
        };
        config.apply_overrides(std::env::vars())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `PARLEY_<SECTION>_<FIELD>` overrides. Unrelated variables are
    /// ignored; unparsable values are an error.
    pub fn apply_overrides<I>(&mut self, vars: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            let Some(name) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            match name {
                "QUEUE_MAX_RETRIES" => self.queue.max_retries = parse(&key, &value)?,
                "QUEUE_DELIVERY_LATENCY_MS" => self.queue.delivery_latency_ms = parse(&key, &value)?,
                "CACHE_CAPACITY" => self.cache.capacity = parse(&key, &value)?,
                "CONNECTIONS_MAX_CONNECTIONS" => self.connections.max_connections = parse(&key, &value)?,
                "SCHEDULER_WORKER_COUNT" => self.scheduler.worker_count = parse(&key, &value)?,
                "SCHEDULER_MAX_LOAD_PER_WORKER" => {
                    self.scheduler.max_load_per_worker = parse(&key, &value)?
                }
                "STATS_REPORT_INTERVAL_SECS" => self.stats.report_interval_secs = parse(&key, &value)?,
                "LOGGING_FILTER" => self.logging.filter = value,
                _ => {}
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            (self.queue.max_retries == 0, "queue.max_retries must be at least 1"),
            (self.cache.capacity == 0, "cache.capacity must be greater than zero"),
            (
                self.connections.max_connections == 0,
                "connections.max_connections must be greater than zero",
            ),
            (self.scheduler.worker_count == 0, "scheduler.worker_count must be greater than zero"),
            (
                self.scheduler.max_load_per_worker == 0,
                "scheduler.max_load_per_worker must be greater than zero",
            ),
            (
                self.stats.report_interval_secs == 0,
                "stats.report_interval_secs must be greater than zero",
            ),
        ];
        match checks.iter().find(|(failed, _)| *failed) {
            Some((_, reason)) => Err(ConfigError::Validation {
                reason: reason.to_string(),
            }),
            None => Ok(()),
        }
    }
}

fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}
