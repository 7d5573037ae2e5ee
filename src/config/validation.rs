//! Configuration validation
//!
//! Validates configuration and reports issues.

use super::types::Config;

/// Result of configuration validation
#[derive(Debug, Clone)]
pub struct ConfigValidationResult {
    /// Whether the config is valid
    pub valid: bool,
    /// Validation errors (critical)
    pub errors: Vec<ValidationIssue>,
    /// Validation warnings (non-critical)
    pub warnings: Vec<ValidationIssue>,
}

impl ConfigValidationResult {
    /// Create a valid result
    pub fn valid() -> Self {
        ConfigValidationResult {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Add an error
    pub fn with_error(mut self, issue: ValidationIssue) -> Self {
        self.valid = false;
        self.errors.push(issue);
        self
    }

    /// Add a warning
    pub fn with_warning(mut self, issue: ValidationIssue) -> Self {
        self.warnings.push(issue);
        self
    }
}

/// A validation issue
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    /// Path to the config field
    pub path: String,
    /// Issue message
    pub message: String,
    /// Suggested fix
    pub suggestion: Option<String>,
}

impl ValidationIssue {
    /// Create a new issue
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        ValidationIssue {
            path: path.into(),
            message: message.into(),
            suggestion: None,
        }
    }

    /// Add a suggestion
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)?;
        if let Some(suggestion) = &self.suggestion {
            write!(f, " ({})", suggestion)?;
        }
        Ok(())
    }
}

/// Validate the configuration
pub fn validate_config(config: &Config) -> ConfigValidationResult {
    let mut result = ConfigValidationResult::valid();

    result = validate_device_config(config, result);
    result = validate_gateway_config(config, result);

    result
}

fn validate_device_config(config: &Config, mut result: ConfigValidationResult) -> ConfigValidationResult {
    let device = &config.device;

    if device.controller_port == 0 {
        result = result.with_error(
            ValidationIssue::new("device.controller_port", "Controller port must not be 0")
                .with_suggestion("Set DEVLINK_CONTROLLER_PORT or device.controller_port"),
        );
    }
    if device.connect_timeout.is_zero() {
        result = result.with_error(ValidationIssue::new(
            "device.connect_timeout",
            "Connect timeout must be greater than zero",
        ));
    }
    if device.await_init_ack && device.ack_timeout.is_zero() {
        result = result.with_error(ValidationIssue::new(
            "device.ack_timeout",
            "Waiting for init acknowledgement requires a non-zero timeout",
        ));
    }
    if device.unique_id.trim().is_empty() {
        result = result.with_error(ValidationIssue::new(
            "device.unique_id",
            "Unique id must not be empty",
        ));
    }
    if device.max_record_len < 64 {
        result = result.with_warning(
            ValidationIssue::new(
                "device.max_record_len",
                format!("Record limit of {} bytes will drop most init replies", device.max_record_len),
            )
            .with_suggestion("Use the default of 1 MiB"),
        );
    }

    result
}

fn validate_gateway_config(config: &Config, mut result: ConfigValidationResult) -> ConfigValidationResult {
    let gateway = &config.gateway;

    if gateway.target_port == 0 {
        result = result.with_error(
            ValidationIssue::new("gateway.target_port", "Target port must not be 0")
                .with_suggestion("Set DEVLINK_GATEWAY_TARGET_PORT or gateway.target_port"),
        );
    }
    if gateway.read_chunk_size == 0 {
        result = result.with_error(ValidationIssue::new(
            "gateway.read_chunk_size",
            "Read chunk size must be greater than zero",
        ));
    }
    if gateway.connect_timeout.is_zero() || gateway.read_timeout.is_zero() {
        result = result.with_error(ValidationIssue::new(
            "gateway.timeouts",
            "Connect and read timeouts must be greater than zero",
        ));
    }

    let loopback = matches!(gateway.bind.as_str(), "127.0.0.1" | "::1" | "localhost");
    if !loopback {
        result = result.with_warning(
            ValidationIssue::new(
                "gateway.bind",
                format!("Gateway binds to {} and has no authentication", gateway.bind),
            )
            .with_suggestion("Bind to 127.0.0.1 unless the network is trusted"),
        );
    }

    result
}
