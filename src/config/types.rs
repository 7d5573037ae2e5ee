//! Configuration types

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::protocol::DEFAULT_MAX_RECORD_LEN;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Device session settings
    #[serde(default)]
    pub device: DeviceConfig,

    /// HTTP gateway settings
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Logging settings
    #[serde(default)]
    pub log: LogConfig,
}

impl Config {
    /// Load configuration from defaults, config file and environment
    pub fn from_env() -> crate::error::Result<Self> {
        crate::config::load_config()
    }
}

/// Device session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Controller host
    #[serde(default = "default_device_host")]
    pub controller_host: String,
    /// Controller port for device connections
    #[serde(default = "default_device_port")]
    pub controller_port: u16,
    /// TCP connect timeout
    #[serde(with = "humantime_serde", default = "default_connect_timeout")]
    pub connect_timeout: Duration,
    /// Wait for the controller's status reply after `init`
    #[serde(default)]
    pub await_init_ack: bool,
    /// How long to wait for that reply
    #[serde(with = "humantime_serde", default = "default_ack_timeout")]
    pub ack_timeout: Duration,
    /// Maximum accepted incoming record length in bytes
    #[serde(default = "default_max_record_len")]
    pub max_record_len: usize,
    /// Incoming messages buffered ahead of the consumer
    #[serde(default = "default_incoming_capacity")]
    pub incoming_capacity: usize,
    /// Unique id announced by the sample device
    #[serde(default = "default_unique_id")]
    pub unique_id: String,
    /// Output kind announced by the sample device
    #[serde(default = "default_output")]
    pub output: String,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig {
            controller_host: default_device_host(),
            controller_port: default_device_port(),
            connect_timeout: default_connect_timeout(),
            await_init_ack: false,
            ack_timeout: default_ack_timeout(),
            max_record_len: default_max_record_len(),
            incoming_capacity: default_incoming_capacity(),
            unique_id: default_unique_id(),
            output: default_output(),
        }
    }
}

impl DeviceConfig {
    /// `host:port` of the controller
    pub fn controller_addr(&self) -> String {
        format!("{}:{}", self.controller_host, self.controller_port)
    }
}

fn default_device_host() -> String {
    "127.0.0.1".to_string()
}

fn default_device_port() -> u16 {
    8999
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_ack_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_max_record_len() -> usize {
    DEFAULT_MAX_RECORD_LEN
}

fn default_incoming_capacity() -> usize {
    64
}

fn default_unique_id() -> String {
    "devlinkSampleDevice".to_string()
}

fn default_output() -> String {
    "light".to_string()
}

/// HTTP gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Address the HTTP server binds to
    #[serde(default = "default_bind")]
    pub bind: String,
    /// HTTP port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Controller host requests are relayed to
    #[serde(default = "default_target_host")]
    pub target_host: String,
    /// Controller port requests are relayed to
    #[serde(default = "default_target_port")]
    pub target_port: u16,
    /// TCP connect timeout per request
    #[serde(with = "humantime_serde", default = "default_connect_timeout")]
    pub connect_timeout: Duration,
    /// Deadline for the controller's reply line
    #[serde(with = "humantime_serde", default = "default_read_timeout")]
    pub read_timeout: Duration,
    /// Bytes read from the controller per read call
    #[serde(default = "default_read_chunk_size")]
    pub read_chunk_size: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        GatewayConfig {
            bind: default_bind(),
            port: default_port(),
            target_host: default_target_host(),
            target_port: default_target_port(),
            connect_timeout: default_connect_timeout(),
            read_timeout: default_read_timeout(),
            read_chunk_size: default_read_chunk_size(),
        }
    }
}

impl GatewayConfig {
    /// `bind:port` for the HTTP listener
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

fn default_bind() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_target_host() -> String {
    "localhost".to_string()
}

fn default_target_port() -> u16 {
    8090
}

fn default_read_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_read_chunk_size() -> usize {
    128
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable
    #[default]
    Pretty,
    /// One JSON object per line
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> crate::error::Result<Self> {
        match s.to_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            _ => Err(crate::error::Error::Config(format!(
                "Invalid log format: {}. Valid options: pretty, json",
                s
            ))),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Default filter when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Output format
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.device.controller_addr(), "127.0.0.1:8999");
        assert_eq!(config.gateway.target_host, "localhost");
        assert_eq!(config.gateway.target_port, 8090);
        assert_eq!(config.gateway.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.gateway.read_chunk_size, 128);
        assert!(!config.device.await_init_ack);
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: Config = serde_json::from_str(
            r#"{"gateway": {"target_port": 9000, "read_timeout": "1500ms"}}"#,
        )
        .unwrap();
        assert_eq!(config.gateway.target_port, 9000);
        assert_eq!(config.gateway.read_timeout, Duration::from_millis(1500));
        assert_eq!(config.gateway.port, 8080);
        assert_eq!(config.device.controller_port, 8999);
    }

    #[test]
    fn test_log_format_parse() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert!("xml".parse::<LogFormat>().is_err());
    }
}
