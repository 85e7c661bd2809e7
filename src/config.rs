//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.
//!
//! Every field has a default, so an empty file (or no file at all) yields the
//! device's stock settings. Sampling intervals are range checked because the
//! sensors cannot be driven outside those bounds.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::{Result, TelemetryError};
use crate::net::RetryPolicy;
use crate::status::SensorKind;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub sampling: SamplingConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub queues: QueueConfig,
    #[serde(default)]
    pub bus: BusConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub device: DeviceConfig,
}

/// Sampling and periodic-report intervals, in seconds
#[derive(Debug, Deserialize, Clone)]
pub struct SamplingConfig {
    #[serde(default = "default_environmental_interval_s")]
    pub environmental_interval_s: u64,

    #[serde(default = "default_inertial_interval_s")]
    pub inertial_interval_s: u64,

    #[serde(default = "default_positional_interval_s")]
    pub positional_interval_s: u64,

    #[serde(default = "default_link_status_interval_s")]
    pub link_status_interval_s: u64,

    #[serde(default = "default_keep_alive_interval_s")]
    pub keep_alive_interval_s: u64,
}

/// Retry counts and inter-retry delays
#[derive(Debug, Deserialize, Clone)]
pub struct RetryConfig {
    #[serde(default = "default_sensor_max_retries")]
    pub sensor_max_retries: u32,

    #[serde(default = "default_sensor_retry_delay_ms")]
    pub sensor_retry_delay_ms: u64,

    #[serde(default = "default_gnss_fix_retries")]
    pub gnss_fix_retries: u32,

    #[serde(default = "default_gnss_fix_retry_delay_ms")]
    pub gnss_fix_retry_delay_ms: u64,

    #[serde(default = "default_gnss_data_retries")]
    pub gnss_data_retries: u32,

    #[serde(default = "default_gnss_data_retry_delay_ms")]
    pub gnss_data_retry_delay_ms: u64,

    #[serde(default = "default_link_max_retries")]
    pub link_max_retries: u32,

    #[serde(default = "default_link_retry_delay_ms")]
    pub link_retry_delay_ms: u64,

    #[serde(default = "default_cloud_max_retries")]
    pub cloud_max_retries: u32,

    #[serde(default = "default_cloud_retry_delay_ms")]
    pub cloud_retry_delay_ms: u64,
}

/// Queue capacities
#[derive(Debug, Deserialize, Clone)]
pub struct QueueConfig {
    #[serde(default = "default_reading_capacity")]
    pub reading_capacity: usize,

    #[serde(default = "default_outbound_capacity")]
    pub outbound_capacity: usize,

    #[serde(default = "default_display_capacity")]
    pub display_capacity: usize,

    #[serde(default = "default_max_packet_len")]
    pub max_packet_len: usize,
}

/// Shared sensor bus configuration
#[derive(Debug, Deserialize, Clone)]
pub struct BusConfig {
    #[serde(default = "default_transaction_timeout_ms")]
    pub transaction_timeout_ms: u64,

    /// Tick-to-millisecond drift factor of the platform timer
    #[serde(default = "default_timer_scale")]
    pub timer_scale: f64,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for a daily rolling log file; stdout only when absent
    #[serde(default)]
    pub directory: Option<String>,
}

/// Device identity
#[derive(Debug, Deserialize, Clone)]
pub struct DeviceConfig {
    #[serde(default = "default_device_id")]
    pub id: String,
}

// Default value functions
fn default_environmental_interval_s() -> u64 { 5 }
fn default_inertial_interval_s() -> u64 { 1 }
fn default_positional_interval_s() -> u64 { 60 }
fn default_link_status_interval_s() -> u64 { 60 }
fn default_keep_alive_interval_s() -> u64 { 10 }

fn default_sensor_max_retries() -> u32 { 3 }
fn default_sensor_retry_delay_ms() -> u64 { 5000 }
fn default_gnss_fix_retries() -> u32 { 10 }
fn default_gnss_fix_retry_delay_ms() -> u64 { 500 }
fn default_gnss_data_retries() -> u32 { 5 }
fn default_gnss_data_retry_delay_ms() -> u64 { 200 }
fn default_link_max_retries() -> u32 { 5 }
fn default_link_retry_delay_ms() -> u64 { 15000 }
fn default_cloud_max_retries() -> u32 { 10 }
fn default_cloud_retry_delay_ms() -> u64 { 5000 }

fn default_reading_capacity() -> usize { 10 }
fn default_outbound_capacity() -> usize { 20 }
fn default_display_capacity() -> usize { 5 }
fn default_max_packet_len() -> usize { 512 }

fn default_transaction_timeout_ms() -> u64 { 2000 }
fn default_timer_scale() -> f64 { 1.0 }

fn default_log_level() -> String { "info".to_string() }

fn default_device_id() -> String { "asset-tracker".to_string() }

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            environmental_interval_s: default_environmental_interval_s(),
            inertial_interval_s: default_inertial_interval_s(),
            positional_interval_s: default_positional_interval_s(),
            link_status_interval_s: default_link_status_interval_s(),
            keep_alive_interval_s: default_keep_alive_interval_s(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            sensor_max_retries: default_sensor_max_retries(),
            sensor_retry_delay_ms: default_sensor_retry_delay_ms(),
            gnss_fix_retries: default_gnss_fix_retries(),
            gnss_fix_retry_delay_ms: default_gnss_fix_retry_delay_ms(),
            gnss_data_retries: default_gnss_data_retries(),
            gnss_data_retry_delay_ms: default_gnss_data_retry_delay_ms(),
            link_max_retries: default_link_max_retries(),
            link_retry_delay_ms: default_link_retry_delay_ms(),
            cloud_max_retries: default_cloud_max_retries(),
            cloud_retry_delay_ms: default_cloud_retry_delay_ms(),
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            reading_capacity: default_reading_capacity(),
            outbound_capacity: default_outbound_capacity(),
            display_capacity: default_display_capacity(),
            max_packet_len: default_max_packet_len(),
        }
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            transaction_timeout_ms: default_transaction_timeout_ms(),
            timer_scale: default_timer_scale(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: None,
        }
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            id: default_device_id(),
        }
    }
}

impl SamplingConfig {
    /// Sampling interval of one sensor kind.
    pub fn interval(&self, kind: SensorKind) -> Duration {
        let secs = match kind {
            SensorKind::Environmental => self.environmental_interval_s,
            SensorKind::Inertial => self.inertial_interval_s,
            SensorKind::Positional => self.positional_interval_s,
        };
        Duration::from_secs(secs)
    }

    pub fn keep_alive_interval(&self) -> Duration {
        Duration::from_secs(self.keep_alive_interval_s)
    }

    pub fn link_status_interval(&self) -> Duration {
        Duration::from_secs(self.link_status_interval_s)
    }
}

impl RetryConfig {
    pub fn sensor_retry_delay(&self) -> Duration {
        Duration::from_millis(self.sensor_retry_delay_ms)
    }

    pub fn link_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.link_max_retries, Duration::from_millis(self.link_retry_delay_ms))
    }

    pub fn cloud_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.cloud_max_retries, Duration::from_millis(self.cloud_retry_delay_ms))
    }

    pub fn gnss_fix_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.gnss_fix_retries, Duration::from_millis(self.gnss_fix_retry_delay_ms))
    }

    pub fn gnss_data_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.gnss_data_retries, Duration::from_millis(self.gnss_data_retry_delay_ms))
    }
}

impl BusConfig {
    /// Sentinel bound with the platform drift factor applied.
    pub fn transaction_timeout(&self) -> Duration {
        Duration::from_millis((self.transaction_timeout_ms as f64 * self.timer_scale).round() as u64)
    }
}

fn invalid(msg: impl std::fmt::Display) -> TelemetryError {
    TelemetryError::Config(toml::de::Error::custom(msg))
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
    /// use asset_telemetry::config::Config;
    ///
    /// let config = Config::load("config/device.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        // Sampling intervals are bounded by what each sensor supports
        for (name, value, min, max) in [
            ("environmental_interval_s", self.sampling.environmental_interval_s, 5, 120),
            ("inertial_interval_s", self.sampling.inertial_interval_s, 1, 60),
            ("positional_interval_s", self.sampling.positional_interval_s, 60, 600),
            ("link_status_interval_s", self.sampling.link_status_interval_s, 60, 600),
            ("keep_alive_interval_s", self.sampling.keep_alive_interval_s, 1, 600),
        ] {
            if value < min || value > max {
                return Err(invalid(format!("{} must be between {} and {}", name, min, max)));
            }
        }

        for (name, value) in [
            ("sensor_max_retries", self.retry.sensor_max_retries),
            ("gnss_fix_retries", self.retry.gnss_fix_retries),
            ("gnss_data_retries", self.retry.gnss_data_retries),
            ("link_max_retries", self.retry.link_max_retries),
            ("cloud_max_retries", self.retry.cloud_max_retries),
        ] {
            if value == 0 {
                return Err(invalid(format!("{} must be greater than 0", name)));
            }
        }

        for (name, value) in [
            ("reading_capacity", self.queues.reading_capacity),
            ("outbound_capacity", self.queues.outbound_capacity),
            ("display_capacity", self.queues.display_capacity),
        ] {
            if value == 0 {
                return Err(invalid(format!("{} must be greater than 0", name)));
            }
        }

        // A packet must at least hold the largest fixed message
        if self.queues.max_packet_len < 128 || self.queues.max_packet_len > 4096 {
            return Err(invalid("max_packet_len must be between 128 and 4096"));
        }

        if self.bus.transaction_timeout_ms == 0 || self.bus.transaction_timeout_ms > 60000 {
            return Err(invalid("transaction_timeout_ms must be between 1 and 60000"));
        }

        if !(self.bus.timer_scale > 0.0 && self.bus.timer_scale <= 4.0) {
            return Err(invalid("timer_scale must be greater than 0.0 and at most 4.0"));
        }

        if !["trace", "debug", "info", "warn", "error"].contains(&self.logging.level.as_str()) {
            return Err(invalid("level must be one of: trace, debug, info, warn, error"));
        }

        if matches!(&self.logging.directory, Some(dir) if dir.is_empty()) {
            return Err(invalid("logging directory cannot be empty when set"));
        }

        if self.device.id.is_empty() {
            return Err(invalid("device id cannot be empty"));
        }

        Ok(())
    }
}
