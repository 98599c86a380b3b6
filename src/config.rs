//! Configuration management for Viewmeter.
//!
//! Every field has a default, so an empty file (or no file at all) yields the
//! stock limits: 3 token bursts refilled at 1 token per second, clients evicted
//! after 3 idle minutes, swept once a minute, and counters bucketed per minute.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::{Result, ViewmeterError};

/// Prefix for environment variable overrides, e.g.
/// `VIEWMETER__RATE_LIMITING__BURST_CAPACITY=5`.
pub const ENV_PREFIX: &str = "VIEWMETER";

/// Longest accepted sweep, export or bucket interval (30 days).
pub const MAX_INTERVAL_SECS: u64 = 30 * 24 * 60 * 60;

/// Main configuration for the Viewmeter service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,

    /// Counter aggregation configuration
    #[serde(default)]
    pub counters: CounterConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Maximum burst size per client
    #[serde(default = "default_burst_capacity")]
    pub burst_capacity: u32,

    /// Tokens regenerated per second
    #[serde(default = "default_refill_per_second")]
    pub refill_per_second: f64,

    /// Seconds without activity before a client is evicted
    #[serde(default = "default_idle_threshold")]
    pub idle_threshold_secs: u64,

    /// Seconds between eviction sweeps
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            burst_capacity: default_burst_capacity(),
            refill_per_second: default_refill_per_second(),
            idle_threshold_secs: default_idle_threshold(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

impl RateLimitingConfig {
    pub fn idle_threshold(&self) -> Duration {
        Duration::from_secs(self.idle_threshold_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

fn default_burst_capacity() -> u32 {
    3
}

fn default_refill_per_second() -> f64 {
    1.0
}

fn default_idle_threshold() -> u64 {
    180
}

fn default_sweep_interval() -> u64 {
    60
}

/// Counter aggregation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CounterConfig {
    /// Width of a counter time bucket in seconds
    #[serde(default = "default_bucket_granularity")]
    pub bucket_granularity_secs: u64,

    /// Probability that a view is followed by a click
    #[serde(default = "default_click_probability")]
    pub click_probability: f64,

    /// Seconds between counter exports; 0 disables exporting
    #[serde(default)]
    pub export_interval_secs: u64,
}

impl Default for CounterConfig {
    fn default() -> Self {
        Self {
            bucket_granularity_secs: default_bucket_granularity(),
            click_probability: default_click_probability(),
            export_interval_secs: 0,
        }
    }
}

impl CounterConfig {
    pub fn bucket_granularity(&self) -> Duration {
        Duration::from_secs(self.bucket_granularity_secs)
    }

    /// Export interval, or `None` when exporting is disabled.
    pub fn export_interval(&self) -> Option<Duration> {
        (self.export_interval_secs > 0).then(|| Duration::from_secs(self.export_interval_secs))
    }
}

fn default_bucket_granularity() -> u64 {
    60
}

fn default_click_probability() -> f64 {
    0.5
}

impl AppConfig {
    /// Load configuration from an optional YAML file layered under
    /// `VIEWMETER__*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = ::config::Config::builder();

        if let Some(path) = path {
            info!(path = %path.display(), "Loading configuration file");
            builder = builder
                .add_source(::config::File::from(path).format(::config::FileFormat::Yaml));
        }

        let config: AppConfig = builder
            .add_source(::config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: AppConfig = serde_yaml::from_str(yaml)
            .map_err(|e| ViewmeterError::Config(format!("Failed to parse configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the limiter and store cannot operate with.
    pub fn validate(&self) -> Result<()> {
        let limits = &self.rate_limiting;
        if limits.burst_capacity == 0 {
            return Err(ViewmeterError::Config(
                "rate_limiting.burst_capacity must be at least 1".to_string(),
            ));
        }
        if !(limits.refill_per_second.is_finite() && limits.refill_per_second > 0.0) {
            return Err(ViewmeterError::Config(
                "rate_limiting.refill_per_second must be a positive number".to_string(),
            ));
        }
        if limits.sweep_interval_secs == 0 {
            return Err(ViewmeterError::Config(
                "rate_limiting.sweep_interval_secs must be greater than 0".to_string(),
            ));
        }
        if limits.sweep_interval_secs > MAX_INTERVAL_SECS {
            return Err(ViewmeterError::Config(format!(
                "rate_limiting.sweep_interval_secs must not exceed {}",
                MAX_INTERVAL_SECS
            )));
        }

        let counters = &self.counters;
        // Keys render the bucket start at minute resolution
        if counters.bucket_granularity_secs == 0 || counters.bucket_granularity_secs % 60 != 0 {
            return Err(ViewmeterError::Config(
                "counters.bucket_granularity_secs must be a positive multiple of 60".to_string(),
            ));
        }
        if counters.bucket_granularity_secs > MAX_INTERVAL_SECS {
            return Err(ViewmeterError::Config(format!(
                "counters.bucket_granularity_secs must not exceed {}",
                MAX_INTERVAL_SECS
            )));
        }
        if counters.export_interval_secs > MAX_INTERVAL_SECS {
            return Err(ViewmeterError::Config(format!(
                "counters.export_interval_secs must not exceed {}",
                MAX_INTERVAL_SECS
            )));
        }
        if !(0.0..=1.0).contains(&counters.click_probability) {
            return Err(ViewmeterError::Config(
                "counters.click_probability must be within [0, 1]".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_service_constants() {
        let config = AppConfig::default();
        assert_eq!(config.server.listen_addr.port(), 8080);
        assert_eq!(config.rate_limiting.burst_capacity, 3);
        assert_eq!(config.rate_limiting.refill_per_second, 1.0);
        assert_eq!(config.rate_limiting.idle_threshold(), Duration::from_secs(180));
        assert_eq!(config.rate_limiting.sweep_interval(), Duration::from_secs(60));
        assert_eq!(config.counters.bucket_granularity(), Duration::from_secs(60));
        assert_eq!(config.counters.export_interval(), None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_yaml() {
        let yaml = r#"
server:
  listen_addr: "127.0.0.1:9000"
rate_limiting:
  burst_capacity: 10
counters:
  export_interval_secs: 30
"#;
        let config = AppConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.server.listen_addr.port(), 9000);
        assert_eq!(config.rate_limiting.burst_capacity, 10);
        // Unspecified fields keep their defaults
        assert_eq!(config.rate_limiting.idle_threshold_secs, 180);
        assert_eq!(config.counters.click_probability, 0.5);
        assert_eq!(config.counters.export_interval(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let yaml = r#"
rate_limiting:
  burst_capacity: 0
"#;
        let err = AppConfig::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, ViewmeterError::Config(_)));
    }

    #[test]
    fn test_click_probability_out_of_range_rejected() {
        let mut config = AppConfig::default();
        config.counters.click_probability = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_yaml_rejected() {
        assert!(AppConfig::from_yaml("rate_limiting: [unterminated").is_err());
    }

    #[test]
    fn test_sub_minute_granularity_rejected() {
        let mut config = AppConfig::default();
        config.counters.bucket_granularity_secs = 30;
        assert!(matches!(config.validate(), Err(ViewmeterError::Config(_))));

        config.counters.bucket_granularity_secs = 90;
        assert!(config.validate().is_err());

        config.counters.bucket_granularity_secs = 300;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_oversized_intervals_rejected() {
        let mut config = AppConfig::default();
        config.rate_limiting.sweep_interval_secs = u64::MAX;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.counters.export_interval_secs = MAX_INTERVAL_SECS + 1;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.counters.bucket_granularity_secs = u64::MAX - u64::MAX % 60;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.rate_limiting.sweep_interval_secs = MAX_INTERVAL_SECS;
        config.counters.export_interval_secs = MAX_INTERVAL_SECS;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_layers_env_over_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            "rate_limiting:\n  idle_threshold_secs: 90\n  sweep_interval_secs: 30\n"
        )
        .unwrap();

        std::env::set_var("VIEWMETER__RATE_LIMITING__SWEEP_INTERVAL_SECS", "15");
        let loaded = AppConfig::load(Some(file.path()));
        std::env::remove_var("VIEWMETER__RATE_LIMITING__SWEEP_INTERVAL_SECS");

        let config = loaded.unwrap();
        // From the file
        assert_eq!(config.rate_limiting.idle_threshold_secs, 90);
        // Env wins over the file
        assert_eq!(config.rate_limiting.sweep_interval_secs, 15);
        // Untouched by either source
        assert_eq!(config.rate_limiting.burst_capacity, 3);
    }

    #[test]
    fn test_load_rejects_invalid_file_values() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "counters:\n  bucket_granularity_secs: 30\n").unwrap();

        let err = AppConfig::load(Some(file.path())).unwrap_err();
        assert!(matches!(err, ViewmeterError::Config(_)));
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let config = AppConfig::load(None).unwrap();
        assert_eq!(config.rate_limiting.burst_capacity, 3);
    }
}
