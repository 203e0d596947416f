//! Core error types for Clip RS
//!
//! Configuration problems are rejected when an attachment is configured,
//! never at first use.

use thiserror::Error;

/// Core error type shared by the storage adapters
#[derive(Error, Debug)]
pub enum ClipError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Telemetry error: {0}")]
    Telemetry(String),
}

/// Configuration error
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Missing required option: {0}")]
    MissingOption(String),
}

impl ConfigError {
    pub fn invalid(key: impl Into<String>, message: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            key: key.into(),
            message: message.into(),
        }
    }
}

impl ClipError {
    pub fn error_code(&self) -> &'static str {
        match self {
            ClipError::Config(ConfigError::InvalidValue { .. }) => "invalid_configuration",
            ClipError::Config(ConfigError::MissingOption(_)) => "missing_configuration",
            ClipError::Telemetry(_) => "telemetry_error",
        }
    }
}

pub type ClipResult<T> = Result<T, ClipError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err: ClipError = ConfigError::invalid("visibility", "unknown").into();
        assert_eq!(err.error_code(), "invalid_configuration");
        assert_eq!(
            err.to_string(),
            "Configuration error: Invalid value for visibility: unknown"
        );

        let err: ClipError = ConfigError::MissingOption("name".into()).into();
        assert_eq!(err.error_code(), "missing_configuration");
    }
}
