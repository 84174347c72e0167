// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Error types for the apiscope agent.
//!
//! None of these errors ever reach the instrumented application: the request
//! path absorbs everything, and the background sync engine logs failures
//! through `tracing` before dropping or retrying the affected data.

use thiserror::Error;

/// Errors that can occur while talking to the hub.
#[derive(Error, Debug)]
pub enum HubError {
    #[error("Hub API error: {message}")]
    Api {
        message: String,
        status_code: Option<u16>,
    },

    #[error("Request logging is not available for this client")]
    PaymentRequired,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Timeout after {0}ms")]
    Timeout(u64),

    #[error("Payload serialization error: {0}")]
    Serialization(String),

    #[error("Response parsing error: {0}")]
    Parse(String),
}

impl HubError {
    /// Create an API error with status code.
    pub fn api(message: impl Into<String>, status_code: u16) -> Self {
        Self::Api {
            message: message.into(),
            status_code: Some(status_code),
        }
    }

    /// Check if this error is worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout(_) => true,
            Self::Api {
                status_code: Some(code),
                ..
            } => *code == 429 || *code >= 500,
            _ => false,
        }
    }

    /// HTTP status code reported by the hub, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Api { status_code, .. } => *status_code,
            Self::PaymentRequired => Some(402),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for HubError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(0)
        } else if err.is_decode() {
            Self::Parse(err.to_string())
        } else if let Some(status) = err.status() {
            Self::api(err.to_string(), status.as_u16())
        } else {
            Self::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for HubError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Errors that can occur during configuration loading and validation.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Invalid config format: {0}")]
    InvalidFormat(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("IO error reading config: {0}")]
    IoError(String),

    #[error("YAML parsing error: {0}")]
    YamlError(String),

    #[error("JSON parsing error: {0}")]
    JsonError(String),
}

impl ConfigError {
    /// Create an invalid value error.
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(err.to_string()),
            _ => Self::IoError(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        Self::JsonError(err.to_string())
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::YamlError(err.to_string())
    }
}

/// Errors that can occur while writing or reading request log files.
#[derive(Error, Debug)]
pub enum LogFileError {
    #[error("Log file not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<std::io::Error> for LogFileError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(err.to_string()),
            _ => Self::IoError(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for LogFileError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hub_error_retryable() {
        assert!(HubError::Network("connection reset".to_string()).is_retryable());
        assert!(HubError::Timeout(10_000).is_retryable());
        assert!(HubError::api("unavailable", 503).is_retryable());
        assert!(HubError::api("slow down", 429).is_retryable());
        assert!(!HubError::api("bad request", 400).is_retryable());
        assert!(!HubError::PaymentRequired.is_retryable());
        assert!(!HubError::Serialization("bad".to_string()).is_retryable());
    }

    #[test]
    fn test_hub_error_status_code() {
        assert_eq!(HubError::api("not found", 404).status_code(), Some(404));
        assert_eq!(HubError::PaymentRequired.status_code(), Some(402));
        assert_eq!(HubError::Timeout(5).status_code(), None);
    }

    #[test]
    fn test_config_error_from_json() {
        let result: std::result::Result<serde_json::Value, _> = serde_json::from_str("invalid json");
        let config_err: ConfigError = result.unwrap_err().into();
        assert!(matches!(config_err, ConfigError::JsonError(_)));
    }

    #[test]
    fn test_config_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let config_err: ConfigError = io_err.into();
        assert!(matches!(config_err, ConfigError::NotFound(_)));
    }

    #[test]
    fn test_log_file_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: LogFileError = io_err.into();
        assert!(matches!(err, LogFileError::IoError(_)));
    }

    #[test]
    fn test_error_display() {
        let err = ConfigError::invalid("clientId", "must be a UUID");
        let display = format!("{}", err);
        assert!(display.contains("clientId"));
        assert!(display.contains("must be a UUID"));
    }
}
