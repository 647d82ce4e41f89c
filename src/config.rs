//! # Configuration Management
//!
//! Centralized configuration for the datagram transport.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()`
//! - Direct instantiation with defaults
//! - `DATAGRAM_PROTOCOL_*` environment overrides
//!
//! ## Timing
//! Reliability timing is expressed in ticks. With the defaults (50 ms tick, 20-tick check
//! interval, 5 attempts) an unanswered transfer is abandoned after five seconds.

use crate::core::frame::HEADER_LEN;
use crate::error::{ProtocolError, Result};
use crate::utils::crypto::OVERHEAD;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use tracing::Level;

/// Max payload bytes carried by a single fragment
pub const MAX_FRAGMENT_PAYLOAD: usize = 1024;

/// Max allowed application payload size (e.g. 16 MB)
pub const MAX_PAYLOAD_SIZE: usize = 16 * 1024 * 1024;

/// Largest UDP payload over IPv4
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

/// Reference tick period
pub const TICK_INTERVAL: Duration = Duration::from_millis(50);

/// Ticks between timeout checks (1 second at the reference tick)
pub const CHECK_INTERVAL_TICKS: u32 = 20;

/// Check windows a transfer may go unanswered, counting the initial exchange
pub const MAX_ATTEMPTS: u32 = 5;

/// Duplicates tolerated per (peer, transfer) before giving up
pub const DUPLICATE_THRESHOLD: u32 = 10;

/// Main configuration structure that contains all configurable settings
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct NetworkConfig {
    /// Transport configuration
    #[serde(default)]
    pub transport: TransportConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl NetworkConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to open config file: {e}")))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to read config file: {e}")))?;

        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to parse TOML: {e}")))
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("DATAGRAM_PROTOCOL_BIND_ADDRESS") {
            config.transport.bind_address = addr;
        }

        if let Ok(size) = std::env::var("DATAGRAM_PROTOCOL_MAX_FRAGMENT_PAYLOAD") {
            if let Ok(val) = size.parse::<usize>() {
                config.transport.max_fragment_payload = val;
            }
        }

        if let Ok(tick) = std::env::var("DATAGRAM_PROTOCOL_TICK_INTERVAL_MS") {
            if let Ok(val) = tick.parse::<u64>() {
                config.transport.tick_interval = Duration::from_millis(val);
            }
        }

        if let Ok(ticks) = std::env::var("DATAGRAM_PROTOCOL_CHECK_INTERVAL_TICKS") {
            if let Ok(val) = ticks.parse::<u32>() {
                config.transport.check_interval_ticks = val;
            }
        }

        if let Ok(attempts) = std::env::var("DATAGRAM_PROTOCOL_MAX_ATTEMPTS") {
            if let Ok(val) = attempts.parse::<u32>() {
                config.transport.max_attempts = val;
            }
        }

        if let Ok(level) = std::env::var("DATAGRAM_PROTOCOL_LOG_LEVEL") {
            config.logging.log_level = level.parse::<Level>().map_err(|_| {
                ProtocolError::ConfigError(format!("Invalid log level: {level}"))
            })?;
        }

        Ok(config)
    }

    /// Apply overrides to the default configuration
    pub fn default_with_overrides<F>(mutator: F) -> Self
    where
        F: FnOnce(&mut Self),
    {
        let mut config = Self::default();
        mutator(&mut config);
        config
    }

    /// Generate example configuration file content
    pub fn example_config() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Failed to generate example config"))
    }

    /// Save configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to write config file: {e}")))?;

        Ok(())
    }

    /// Validate the configuration for common issues and misconfigurations
    ///
    /// Returns a list of validation errors. Empty list means configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        errors.extend(self.transport.validate());
        errors.extend(self.logging.validate());
        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ProtocolError::ConfigError(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

/// Transport configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Local socket address (e.g., "0.0.0.0:9000"; port 0 picks an ephemeral port)
    pub bind_address: String,

    /// Max payload bytes per fragment
    pub max_fragment_payload: usize,

    /// Maximum allowed application payload size in bytes
    pub max_payload_size: usize,

    /// Period of the reliability tick
    #[serde(with = "duration_serde")]
    pub tick_interval: Duration,

    /// Ticks between timeout checks for each transfer
    pub check_interval_ticks: u32,

    /// Check windows a transfer may go unanswered before it is abandoned
    pub max_attempts: u32,

    /// Duplicates tolerated per (peer, transfer) before a give-up NACK
    pub duplicate_threshold: u32,

    /// How long retired transfers are remembered
    #[serde(with = "duration_serde")]
    pub duplicate_ttl: Duration,

    /// Max (peer, transfer) pairs remembered by the duplicate guard
    pub duplicate_capacity: usize,

    /// Capacity of the application event channel
    pub event_queue_capacity: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            bind_address: String::from("127.0.0.1:0"),
            max_fragment_payload: MAX_FRAGMENT_PAYLOAD,
            max_payload_size: MAX_PAYLOAD_SIZE,
            tick_interval: TICK_INTERVAL,
            check_interval_ticks: CHECK_INTERVAL_TICKS,
            max_attempts: MAX_ATTEMPTS,
            duplicate_threshold: DUPLICATE_THRESHOLD,
            duplicate_ttl: Duration::from_secs(300),
            duplicate_capacity: 10_000,
            event_queue_capacity: 1024,
        }
    }
}

impl TransportConfig {
    /// Largest fragment payload that still fits one UDP datagram once framed and sealed
    pub const fn fragment_payload_limit() -> usize {
        MAX_DATAGRAM_SIZE - 1 - HEADER_LEN - OVERHEAD
    }

    /// How long an unanswered transfer lives before it is abandoned
    pub fn abandon_after(&self) -> Duration {
        self.tick_interval * self.check_interval_ticks.saturating_mul(self.max_attempts)
    }

    /// Validate transport configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.bind_address.is_empty() {
            errors.push("Bind address cannot be empty".to_string());
        } else if self.bind_address.parse::<std::net::SocketAddr>().is_err() {
            errors.push(format!(
                "Invalid bind address format: '{}' (expected format: '0.0.0.0:9000')",
                self.bind_address
            ));
        }

        if self.max_fragment_payload == 0 {
            errors.push("Max fragment payload cannot be 0".to_string());
        } else if self.max_fragment_payload > Self::fragment_payload_limit() {
            errors.push(format!(
                "Max fragment payload too large: {} bytes (maximum: {})",
                self.max_fragment_payload,
                Self::fragment_payload_limit()
            ));
        }

        if self.max_payload_size == 0 {
            errors.push("Max payload size cannot be 0".to_string());
        } else if self.max_fragment_payload > 0
            && self.max_payload_size > self.max_fragment_payload * u16::MAX as usize
        {
            errors.push(format!(
                "Max payload size too large: {} bytes would need more than {} fragments",
                self.max_payload_size,
                u16::MAX
            ));
        }

        if self.tick_interval.is_zero() {
            errors.push("Tick interval cannot be 0".to_string());
        } else if self.tick_interval.as_secs() > 10 {
            errors.push("Tick interval too long (maximum: 10s)".to_string());
        }

        if self.check_interval_ticks == 0 {
            errors.push("Check interval must be at least 1 tick".to_string());
        }

        if self.max_attempts == 0 {
            errors.push("Max attempts must be greater than 0".to_string());
        }

        if self.duplicate_threshold == 0 {
            errors.push("Duplicate threshold must be greater than 0".to_string());
        }

        if self.duplicate_ttl < self.abandon_after() {
            errors.push(format!(
                "Duplicate TTL ({:?}) shorter than the abandon window ({:?})",
                self.duplicate_ttl,
                self.abandon_after()
            ));
        }

        if self.duplicate_capacity == 0 {
            errors.push("Duplicate capacity must be greater than 0".to_string());
        }

        if self.event_queue_capacity == 0 {
            errors.push("Event queue capacity must be greater than 0".to_string());
        } else if self.event_queue_capacity > 1_000_000 {
            errors.push(format!(
                "Event queue capacity too large: {} (max recommended: 1,000,000)",
                self.event_queue_capacity
            ));
        }

        errors
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Application name for logs
    pub app_name: String,

    /// Log level
    #[serde(with = "log_level_serde")]
    pub log_level: Level,

    /// Whether to log to console
    pub log_to_console: bool,

    /// Whether to log to file
    pub log_to_file: bool,

    /// Path to log file (if log_to_file is true)
    pub log_file_path: Option<String>,

    /// Whether to use JSON formatting for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: String::from("datagram-protocol"),
            log_level: Level::INFO,
            log_to_console: true,
            log_to_file: false,
            log_file_path: None,
            json_format: false,
        }
    }
}

impl LoggingConfig {
    /// Validate logging configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.app_name.is_empty() {
            errors.push("Application name cannot be empty".to_string());
        } else if self.app_name.len() > 64 {
            errors.push(format!(
                "Application name too long: {} characters (maximum: 64)",
                self.app_name.len()
            ));
        }

        if self.log_to_file {
            if let Some(ref path) = self.log_file_path {
                if let Some(parent) = std::path::Path::new(path).parent() {
                    if !parent.as_os_str().is_empty() && !parent.exists() {
                        errors.push(format!(
                            "Log file directory does not exist: {}",
                            parent.display()
                        ));
                    }
                }
            } else {
                errors.push("log_file_path must be specified when log_to_file is true".to_string());
            }
        }

        if !self.log_to_console && !self.log_to_file {
            errors
                .push("At least one logging output (console or file) must be enabled".to_string());
        }

        errors
    }
}

/// Helper module for Duration serialization/deserialization
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = duration.as_millis() as u64;
        millis.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Helper module for tracing::Level serialization/deserialization
mod log_level_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::str::FromStr;
    use tracing::Level;

    pub fn serialize<S>(level: &Level, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let level_str = match *level {
            Level::TRACE => "trace",
            Level::DEBUG => "debug",
            Level::INFO => "info",
            Level::WARN => "warn",
            Level::ERROR => "error",
        };
        level_str.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Level, D::Error>
    where
        D: Deserializer<'de>,
    {
        let level_str = String::deserialize(deserializer)?;
        Level::from_str(&level_str)
            .map_err(|_| serde::de::Error::custom(format!("Invalid log level: {level_str}")))
    }
}
