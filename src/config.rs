//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.

use serde::Deserialize;
use serde::de::Error;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::{AwsMonitorError, Result};

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub mqtt: MqttConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub gatekeeper: GatekeeperConfig,
    #[serde(default)]
    pub dashboard: DashboardConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Broker connection and subscription
#[derive(Debug, Deserialize, Clone)]
pub struct MqttConfig {
    #[serde(default = "default_broker")]
    pub broker: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_topic")]
    pub topic: String,

    #[serde(default = "default_client_id")]
    pub client_id: String,

    #[serde(default = "default_keep_alive_s")]
    pub keep_alive_s: u64,

    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
}

/// What to do with a row whose append failed
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WriteFailurePolicy {
    /// Log and forget the row
    Drop,
    /// Keep the row and retry it ahead of the next append
    Queue,
}

/// Row store configuration
#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: String,

    #[serde(default = "default_write_failure")]
    pub write_failure: WriteFailurePolicy,

    #[serde(default = "default_max_pending")]
    pub max_pending: usize,
}

/// Persistence gate configuration
#[derive(Debug, Deserialize, Clone)]
pub struct GatekeeperConfig {
    #[serde(default = "default_cooldown_s")]
    pub cooldown_s: u64,

    #[serde(default = "default_reset_rain_on_new_day")]
    pub reset_rain_on_new_day: bool,

    #[serde(default = "default_seed_from_store")]
    pub seed_from_store: bool,
}

/// Presentation reader configuration
#[derive(Debug, Deserialize, Clone)]
pub struct DashboardConfig {
    #[serde(default = "default_dashboard_enabled")]
    pub enabled: bool,

    #[serde(default = "default_refresh_interval_s")]
    pub refresh_interval_s: u64,
}

/// Log output configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub log_dir: String,
}

// Default value functions
fn default_broker() -> String { "mqtt-dashboard.com".to_string() }
fn default_port() -> u16 { 1883 }
fn default_topic() -> String { "AWS@port".to_string() }
fn default_client_id() -> String { "aws-monitor".to_string() }
fn default_keep_alive_s() -> u64 { 60 }
fn default_channel_capacity() -> usize { 10 }
fn default_reconnect_delay_ms() -> u64 { 1000 }

fn default_store_path() -> String { "./data/aws_rows.jsonl".to_string() }
fn default_write_failure() -> WriteFailurePolicy { WriteFailurePolicy::Drop }
fn default_max_pending() -> usize { 100 }

fn default_cooldown_s() -> u64 { 60 }
fn default_reset_rain_on_new_day() -> bool { true }
fn default_seed_from_store() -> bool { true }

fn default_dashboard_enabled() -> bool { true }
fn default_refresh_interval_s() -> u64 { 300 }

fn default_log_level() -> String { "info".to_string() }

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            broker: default_broker(),
            port: default_port(),
            topic: default_topic(),
            client_id: default_client_id(),
            keep_alive_s: default_keep_alive_s(),
            channel_capacity: default_channel_capacity(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            write_failure: default_write_failure(),
            max_pending: default_max_pending(),
        }
    }
}

impl Default for GatekeeperConfig {
    fn default() -> Self {
        Self {
            cooldown_s: default_cooldown_s(),
            reset_rain_on_new_day: default_reset_rain_on_new_day(),
            seed_from_store: default_seed_from_store(),
        }
    }
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            enabled: default_dashboard_enabled(),
            refresh_interval_s: default_refresh_interval_s(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            log_dir: String::new(),
        }
    }
}

impl GatekeeperConfig {
    /// Minimum wall time between two persisted rows
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_s)
    }
}

impl DashboardConfig {
    /// Period of the automatic render tick
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_s)
    }
}

fn invalid(msg: impl std::fmt::Display) -> AwsMonitorError {
    AwsMonitorError::Config(toml::de::Error::custom(msg))
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// * `Result<Config>` - Loaded and validated configuration
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use aws_monitor::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        if self.mqtt.broker.is_empty() {
            return Err(invalid("mqtt broker cannot be empty"));
        }

        if self.mqtt.port == 0 {
            return Err(invalid("mqtt port must be greater than 0"));
        }

        if self.mqtt.topic.is_empty() {
            return Err(invalid("mqtt topic cannot be empty"));
        }

        // Subscription is a single exact topic
        if self.mqtt.topic.contains(&['#', '+'][..]) {
            return Err(invalid("mqtt topic must not contain wildcards"));
        }

        if self.mqtt.client_id.is_empty() {
            return Err(invalid("mqtt client_id cannot be empty"));
        }

        if self.mqtt.keep_alive_s < 5 || self.mqtt.keep_alive_s > 3600 {
            return Err(invalid("keep_alive_s must be between 5 and 3600"));
        }

        if self.mqtt.channel_capacity == 0 {
            return Err(invalid("channel_capacity must be greater than 0"));
        }

        if self.mqtt.reconnect_delay_ms == 0 || self.mqtt.reconnect_delay_ms > 60000 {
            return Err(invalid("reconnect_delay_ms must be between 1 and 60000"));
        }

        if self.store.path.is_empty() {
            return Err(invalid("store path cannot be empty"));
        }

        if self.store.write_failure == WriteFailurePolicy::Queue && self.store.max_pending == 0 {
            return Err(invalid("max_pending must be greater than 0 when write_failure is 'queue'"));
        }

        if self.gatekeeper.cooldown_s == 0 {
            return Err(invalid("cooldown_s must be greater than 0"));
        }

        if self.dashboard.refresh_interval_s == 0 || self.dashboard.refresh_interval_s > 86400 {
            return Err(invalid("refresh_interval_s must be between 1 and 86400"));
        }

        if !["trace", "debug", "info", "warn", "error"].contains(&self.logging.level.as_str()) {
            return Err(invalid("log level must be one of: trace, debug, info, warn, error"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_load_config_from_file() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let toml_content = r#"
[mqtt]
broker = "broker.example.org"
topic = "station/1"

[store]
path = "/tmp/rows.jsonl"
write_failure = "queue"

[gatekeeper]

[dashboard]
refresh_interval_s = 30
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        let config = Config::load(temp_file.path()).unwrap();
        assert_eq!(config.mqtt.broker, "broker.example.org");
        assert_eq!(config.mqtt.topic, "station/1");
        assert_eq!(config.mqtt.port, 1883);
        assert_eq!(config.store.write_failure, WriteFailurePolicy::Queue);
        assert_eq!(config.dashboard.refresh_interval(), Duration::from_secs(30));
        assert_eq!(config.gatekeeper.cooldown(), Duration::from_secs(60));
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.mqtt.topic, "AWS@port");
        assert_eq!(config.store.write_failure, WriteFailurePolicy::Drop);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result = Config::load("/nonexistent/aws-monitor.toml");
        assert!(matches!(result, Err(AwsMonitorError::Io(_))));
    }

    #[test]
    fn test_unknown_write_failure_policy() {
        let result = Config::from_toml_str("[store]\nwrite_failure = \"retry\"\n");
        assert!(matches!(result, Err(AwsMonitorError::Config(_))));
    }

    #[test]
    fn test_empty_broker() {
        let mut config = Config::default();
        config.mqtt.broker = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_port_zero() {
        let mut config = Config::default();
        config.mqtt.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_topic() {
        let mut config = Config::default();
        config.mqtt.topic = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_wildcard_topic() {
        let mut config = Config::default();
        config.mqtt.topic = "AWS/#".to_string();
        assert!(config.validate().is_err());

        config.mqtt.topic = "AWS/+/data".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_keep_alive_bounds() {
        let mut config = Config::default();
        config.mqtt.keep_alive_s = 4;
        assert!(config.validate().is_err());

        config.mqtt.keep_alive_s = 3601;
        assert!(config.validate().is_err());

        config.mqtt.keep_alive_s = 5;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_reconnect_delay_zero() {
        let mut config = Config::default();
        config.mqtt.reconnect_delay_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_store_path() {
        let mut config = Config::default();
        config.store.path = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_max_pending_only_matters_when_queueing() {
        let mut config = Config::default();
        config.store.max_pending = 0;
        assert!(config.validate().is_ok());

        config.store.write_failure = WriteFailurePolicy::Queue;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_cooldown_zero() {
        let mut config = Config::default();
        config.gatekeeper.cooldown_s = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_refresh_interval_bounds() {
        let mut config = Config::default();
        config.dashboard.refresh_interval_s = 0;
        assert!(config.validate().is_err());

        config.dashboard.refresh_interval_s = 86401;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = Config::default();
        config.logging.level = "verbose".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_functions() {
        assert_eq!(default_broker(), "mqtt-dashboard.com");
        assert_eq!(default_port(), 1883);
        assert_eq!(default_topic(), "AWS@port");
        assert_eq!(default_keep_alive_s(), 60);
        assert_eq!(default_cooldown_s(), 60);
        assert_eq!(default_refresh_interval_s(), 300);
        assert_eq!(default_write_failure(), WriteFailurePolicy::Drop);
        assert!(default_reset_rain_on_new_day());
        assert!(default_seed_from_store());
    }
}
