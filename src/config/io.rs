//! Configuration I/O - Loading and saving configuration
//!
//! Handles reading configuration from files and environment variables.

use std::path::Path;

use super::types::Config;
use crate::error::{Error, Result};

/// Load configuration with layered precedence:
/// 1. Config file if it exists, otherwise defaults
/// 2. Environment variable overrides (includes .env)
pub fn load_config() -> Result<Config> {
    let config_path = super::paths::config_path();

    let mut config = if config_path.exists() {
        load_config_from_path(&config_path)?
    } else {
        Config::default()
    };

    dotenvy::dotenv().ok();
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());

    Ok(config)
}

/// Load configuration from a specific path
pub fn load_config_from_path(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;

    // Detect format by extension
    let config: Config = if path.extension().map_or(false, |ext| ext == "json") {
        json5::from_str(&content).map_err(|e| Error::Config(format!("Invalid JSON config: {}", e)))?
    } else if path.extension().map_or(false, |ext| ext == "toml") {
        toml::from_str(&content).map_err(|e| Error::Config(format!("Invalid TOML config: {}", e)))?
    } else {
        json5::from_str(&content)
            .or_else(|_| toml::from_str(&content).map_err(|e| Error::Config(e.to_string())))
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?
    };

    Ok(config)
}

/// Overlay environment variables onto an existing config.
///
/// `lookup` is usually `std::env::var`; unparsable values are ignored.
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    // Device overrides
    if let Some(host) = lookup("DEVLINK_CONTROLLER_HOST") {
        config.device.controller_host = host;
    }
    if let Some(port) = lookup("DEVLINK_CONTROLLER_PORT").and_then(|v| v.parse().ok()) {
        config.device.controller_port = port;
    }
    if let Some(v) = lookup("DEVLINK_AWAIT_INIT_ACK") {
        config.device.await_init_ack = v == "true" || v == "1";
    }
    if let Some(id) = lookup("DEVLINK_UNIQUE_ID") {
        config.device.unique_id = id;
    }

    // Gateway overrides
    if let Some(bind) = lookup("DEVLINK_GATEWAY_BIND") {
        config.gateway.bind = bind;
    }
    if let Some(port) = lookup("DEVLINK_GATEWAY_PORT").and_then(|v| v.parse().ok()) {
        config.gateway.port = port;
    }
    if let Some(host) = lookup("DEVLINK_GATEWAY_TARGET_HOST") {
        config.gateway.target_host = host;
    }
    if let Some(port) = lookup("DEVLINK_GATEWAY_TARGET_PORT").and_then(|v| v.parse().ok()) {
        config.gateway.target_port = port;
    }
    if let Some(timeout) =
        lookup("DEVLINK_GATEWAY_TIMEOUT").and_then(|v| humantime_serde::re::humantime::parse_duration(&v).ok())
    {
        config.gateway.connect_timeout = timeout;
        config.gateway.read_timeout = timeout;
    }

    // Logging overrides
    if let Some(level) = lookup("DEVLINK_LOG_LEVEL") {
        config.log.level = level;
    }
    if let Some(format) = lookup("DEVLINK_LOG_FORMAT").and_then(|v| v.parse().ok()) {
        config.log.format = format;
    }
}

/// Save configuration to a file
pub fn save_config(config: &Config, path: &Path) -> Result<()> {
    let content = if path.extension().map_or(false, |ext| ext == "toml") {
        toml::to_string_pretty(config).map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?
    } else {
        serde_json::to_string_pretty(config).map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?
    };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    std::fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogFormat;
    use std::collections::HashMap;
    use std::time::Duration;
    use tempfile::tempdir;

    #[test]
    fn test_save_and_load_config() {
        let dir = tempdir().unwrap();

        for name in ["config.json", "config.toml"] {
            let path = dir.path().join(name);
            let mut config = Config::default();
            config.gateway.target_port = 9100;
            config.device.ack_timeout = Duration::from_millis(250);
            save_config(&config, &path).unwrap();

            let loaded = load_config_from_path(&path).unwrap();
            assert_eq!(loaded.gateway.target_port, 9100);
            assert_eq!(loaded.device.ack_timeout, Duration::from_millis(250));
        }
    }

    #[test]
    fn test_json5_config_with_comments() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            "{\n  // relay to the hub\n  gateway: { target_host: 'hub.local', connect_timeout: '2s' },\n}\n",
        )
        .unwrap();

        let config = load_config_from_path(&path).unwrap();
        assert_eq!(config.gateway.target_host, "hub.local");
        assert_eq!(config.gateway.connect_timeout, Duration::from_secs(2));
    }

    #[test]
    fn test_invalid_config_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ gateway: ").unwrap();
        assert!(matches!(load_config_from_path(&path), Err(Error::Config(_))));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("DEVLINK_CONTROLLER_PORT", "9999"),
            ("DEVLINK_GATEWAY_TARGET_HOST", "10.0.0.5"),
            ("DEVLINK_GATEWAY_PORT", "not-a-port"),
            ("DEVLINK_GATEWAY_TIMEOUT", "3s"),
            ("DEVLINK_LOG_FORMAT", "json"),
            ("DEVLINK_AWAIT_INIT_ACK", "1"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        apply_env_overrides(&mut config, |key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.device.controller_port, 9999);
        assert!(config.device.await_init_ack);
        assert_eq!(config.gateway.target_host, "10.0.0.5");
        assert_eq!(config.gateway.port, 8080);
        assert_eq!(config.gateway.read_timeout, Duration::from_secs(3));
        assert_eq!(config.log.format, LogFormat::Json);
    }
}
