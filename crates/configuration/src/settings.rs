use crate::error::ConfigError;
use core_types::Metric;
use serde::Deserialize;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

/// The root configuration structure for the entire application.
///
/// Every section has defaults, so an absent `config.toml` still yields a
/// runnable configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseSettings,
    pub server: ServerSettings,
    pub benchmarks: BenchmarkSettings,
    pub snapshots: SnapshotSettings,
    pub scheduler: SchedulerSettings,
    pub logging: LoggingSettings,
}

impl Config {
    /// Rejects settings that would make the services misbehave at runtime.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.benchmarks.validate()?;
        self.server.socket_addr()?;
        if self.scheduler.tick.is_zero() {
            return Err(ConfigError::ValidationError("scheduler.tick must be greater than zero".to_string()));
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::ValidationError("database.max_connections must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Connection pool settings. The URL itself comes from `DATABASE_URL`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub max_connections: u32,
    #[serde(with = "humantime_serde")]
    pub acquire_timeout: Duration,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self { max_connections: 10, acquire_timeout: Duration::from_secs(5) }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl ServerSettings {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|_| ConfigError::ValidationError(format!("server.host '{}' is not an IP address", self.host)))?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { host: "0.0.0.0".to_string(), port: 3000 }
    }
}

/// Benchmark cache behaviour.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BenchmarkSettings {
    /// How long a refreshed entry stays live. Stored as an absolute expiry.
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
    /// Budget for computing one entry before the refresh is abandoned.
    #[serde(with = "humantime_serde")]
    pub refresh_timeout: Duration,
    /// The metric names that may be benchmarked.
    pub metrics: Vec<String>,
    /// Length of the top and bottom performer lists.
    pub performer_count: usize,
    /// Below this many peers a percentile is flagged low-confidence.
    pub min_confidence_sample: i64,
}

impl BenchmarkSettings {
    /// The whitelist, parsed. Unknown names are a validation error.
    pub fn enabled_metrics(&self) -> Result<Vec<Metric>, ConfigError> {
        self.metrics
            .iter()
            .map(|name| {
                name.parse::<Metric>()
                    .map_err(|e| ConfigError::ValidationError(format!("benchmarks.metrics: {e}")))
            })
            .collect()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.ttl.is_zero() {
            return Err(ConfigError::ValidationError("benchmarks.ttl must be greater than zero".to_string()));
        }
        if self.refresh_timeout.is_zero() {
            return Err(ConfigError::ValidationError(
                "benchmarks.refresh_timeout must be greater than zero".to_string(),
            ));
        }
        if self.enabled_metrics()?.is_empty() {
            return Err(ConfigError::ValidationError("benchmarks.metrics must name at least one metric".to_string()));
        }
        if self.min_confidence_sample < 0 {
            return Err(ConfigError::ValidationError(format!(
                "benchmarks.min_confidence_sample must not be negative, got {}",
                self.min_confidence_sample
            )));
        }
        Ok(())
    }
}

impl Default for BenchmarkSettings {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(24 * 60 * 60),
            refresh_timeout: Duration::from_secs(30),
            metrics: Metric::ALL.iter().map(|m| m.as_str().to_string()).collect(),
            performer_count: 5,
            min_confidence_sample: 5,
        }
    }
}

/// How often the current period's snapshot is (re)generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum SnapshotSchedule {
    /// Once per period, the first time the scheduler runs in a new month.
    #[default]
    Monthly,
    /// Regenerate the current period when its snapshot is a week old.
    Weekly,
    /// Regenerate the current period when its snapshot is a day old.
    Daily,
}

impl SnapshotSchedule {
    /// Age after which an existing snapshot of the current period is recomputed.
    pub fn regenerate_after(&self) -> Option<chrono::TimeDelta> {
        match self {
            SnapshotSchedule::Monthly => None,
            SnapshotSchedule::Weekly => chrono::TimeDelta::try_days(7),
            SnapshotSchedule::Daily => chrono::TimeDelta::try_days(1),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SnapshotSettings {
    pub schedule: SnapshotSchedule,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    pub enabled: bool,
    /// Interval between scheduler passes.
    #[serde(with = "humantime_serde")]
    pub tick: Duration,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self { enabled: true, tick: Duration::from_secs(15 * 60) }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default filter directive; `RUST_LOG` takes precedence when set.
    pub level: String,
    /// When set, logs are also written to a daily rolling file here.
    pub directory: Option<PathBuf>,
    pub file_prefix: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self { level: "info".to_string(), directory: None, file_prefix: "pulse.log".to_string() }
    }
}
