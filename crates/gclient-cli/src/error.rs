//! Error types and handling for the CLI
//!
//! This module provides error types and utilities for handling
//! various failure modes in the CLI application.

use std::io;
use std::path::PathBuf;

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for CLI operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error (file operations, etc.)
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Error from gclient-core library
    #[error("{0}")]
    Core(#[from] gclient_core::Error),

    /// Configuration file could not be read or parsed
    #[error("Invalid configuration file {}: {}", path.display(), message)]
    InvalidConfig { path: PathBuf, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid argument value
    #[error("Invalid arguments: {0}")]
    InvalidArgs(String),

    /// The service answered with a non-success status and `--fail` was given
    #[error("Request failed with HTTP status {status}")]
    RequestFailed { status: u16 },

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Generic error with context
    #[error("{message}")]
    Other { message: String },
}

impl Error {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create an invalid arguments error
    pub fn invalid_args(message: impl Into<String>) -> Self {
        Self::InvalidArgs(message.into())
    }

    /// Create a generic error with message
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
        }
    }

    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Io(_) => 1,
            Self::Core(core) => match core {
                gclient_core::Error::ProfileNotFound { .. } => 7,
                gclient_core::Error::Authentication { .. } => 8,
                gclient_core::Error::Http { .. } => 10,
                gclient_core::Error::UnsupportedMethod { .. } => 6,
                _ if core.is_configuration() => 5,
                _ => 2,
            },
            Self::InvalidConfig { .. } => 4,
            Self::Config(_) => 5,
            Self::InvalidArgs(_) => 6,
            Self::RequestFailed { .. } => 22,
            Self::Json(_) => 12,
            Self::Yaml(_) => 13,
            Self::Other { .. } => 99,
        }
    }

    /// Check if this error should display usage help
    pub fn should_show_help(&self) -> bool {
        matches!(self, Self::InvalidArgs(_))
    }
}

/// Format an error for display to the user
pub fn format_error(error: &Error, use_color: bool) -> String {
    let mut message = error.to_string();

    // Failed token exchanges keep the raw body around for diagnostics
    if let Error::Core(gclient_core::Error::Authentication {
        response: Some(body), ..
    }) = error
    {
        message.push_str(&format!("\n  response: {}", crate::logging::redaction::redact_sensitive(body)));
    }

    if use_color {
        use colored::Colorize;
        format!("{} {}", "Error:".red().bold(), message)
    } else {
        format!("Error: {}", message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        let not_found = Error::from(gclient_core::Error::ProfileNotFound {
            service: "svc".into(),
        });
        assert_eq!(not_found.exit_code(), 7);

        let bad_level = Error::from(gclient_core::Error::config("bad security level"));
        assert_eq!(bad_level.exit_code(), 5);

        assert_eq!(Error::RequestFailed { status: 503 }.exit_code(), 22);
        assert!(Error::invalid_args("x").should_show_help());
    }

    #[test]
    fn test_format_error_includes_auth_response() {
        let err = Error::from(gclient_core::Error::authentication(
            "An error occurred during auth",
            Some(r#"{"error":"invalid_grant"}"#.to_string()),
        ));
        let formatted = format_error(&err, false);
        assert!(formatted.starts_with("Error: Authentication error"));
        assert!(formatted.contains("invalid_grant"));
    }
}
