use std::path::Path;

// Declare the modules that make up this crate.
pub mod error;
pub mod logging;
pub mod settings;

// Re-export the core types to provide a clean public API.
pub use error::ConfigError;
pub use logging::init_tracing;
pub use settings::{
    BenchmarkSettings, Config, DatabaseSettings, LoggingSettings, SchedulerSettings, ServerSettings, SnapshotSchedule,
    SnapshotSettings,
};

/// Loads the application configuration from `config.toml` in the working directory.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(Path::new("config.toml"))
}

/// Loads the configuration from `path`, layered under `PULSE__*` environment variables.
///
/// The file is optional; every setting has a default. Nested keys use a double
/// underscore, e.g. `PULSE__BENCHMARKS__TTL=12h`. The metric whitelist accepts a
/// comma-separated list: `PULSE__BENCHMARKS__METRICS=arr,health_score`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let builder = config::Config::builder()
        .add_source(config::File::from(path).required(false))
        .add_source(
            config::Environment::with_prefix("PULSE")
                .prefix_separator("__")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("benchmarks.metrics")
                .try_parsing(true),
        )
        .build()?;

    // Attempt to deserialize the entire configuration into our `Config` struct
    let config = builder.try_deserialize::<Config>()?;
    config.validate()?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::Metric;
    use std::io::Write;
    use std::time::Duration;

    fn write_config(contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("pulse-config-{}.toml", std::process::id()));
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.benchmarks.ttl, Duration::from_secs(86_400));
        assert_eq!(config.snapshots.schedule, SnapshotSchedule::Monthly);
        assert_eq!(config.benchmarks.enabled_metrics().unwrap(), Metric::ALL.to_vec());
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = load_config_from(Path::new("/nonexistent/pulse.toml")).unwrap();
        assert_eq!(config.server.port, 3000);
    }

    #[test]
    fn file_overrides_and_humantime_durations() {
        let path = write_config(
            r#"
            [benchmarks]
            ttl = "12h"
            refresh_timeout = "5s"
            metrics = ["arr", "health_score"]

            [snapshots]
            schedule = "daily"
            "#,
        );
        let config = load_config_from(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(config.benchmarks.ttl, Duration::from_secs(12 * 3600));
        assert_eq!(config.benchmarks.refresh_timeout, Duration::from_secs(5));
        assert_eq!(config.benchmarks.enabled_metrics().unwrap(), vec![Metric::Arr, Metric::HealthScore]);
        assert_eq!(config.snapshots.schedule, SnapshotSchedule::Daily);
        assert_eq!(config.benchmarks.performer_count, 5);
    }

    #[test]
    fn unknown_metric_fails_validation() {
        let mut config = Config::default();
        config.benchmarks.metrics.push("vibes".to_string());
        assert!(matches!(config.validate(), Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn zero_ttl_fails_validation() {
        let mut config = Config::default();
        config.benchmarks.ttl = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn negative_confidence_sample_fails_validation() {
        let mut config = Config::default();
        config.benchmarks.min_confidence_sample = -1;
        assert!(matches!(config.validate(), Err(ConfigError::ValidationError(_))));

        config.benchmarks.min_confidence_sample = 0;
        config.validate().unwrap();
    }
}
