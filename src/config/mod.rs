//! Configuration module
//!
//! - types.rs: configuration types (Config, DeviceConfig, GatewayConfig, LogConfig)
//! - io.rs: loading and saving, environment overrides
//! - validation.rs: configuration validation
//! - paths.rs: configuration file paths

mod io;
mod paths;
mod types;
mod validation;

pub use types::{Config, DeviceConfig, GatewayConfig, LogConfig, LogFormat};

pub use io::{apply_env_overrides, load_config, load_config_from_path, save_config};
pub use paths::{config_dir, config_path};
pub use validation::{validate_config, ConfigValidationResult, ValidationIssue};
