//! Error types for the gclient core library
//!
//! One error enum covers the whole authenticated client layer. Variants map
//! onto the failure classes callers need to tell apart: bad configuration
//! (never retried, raised before any network call), failed token exchange,
//! transport failures that survived the retry budget, and unsupported verbs.

use thiserror::Error;

/// Main error type for gclient operations
#[derive(Error, Debug)]
pub enum Error {
    /// Missing or invalid configuration (base API, endpoint, cipher list,
    /// security level, header values, template placeholders)
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// Token exchange failed; `response` keeps the raw body for diagnostics
    #[error("Authentication error: {message}")]
    Authentication {
        message: String,
        response: Option<String>,
    },

    /// HTTP/Network related errors
    #[error("HTTP error: {message}")]
    Http {
        message: String,
        status_code: Option<u16>,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// Verb other than GET or POST
    #[error("Unsupported HTTP method: {method}")]
    UnsupportedMethod { method: String },

    /// No profile registered under the requested service name
    #[error("Service profile not found: {service}")]
    ProfileNotFound { service: String },

    /// JSON parsing and serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: serde_json::Error,
    },

    /// IO errors
    #[error("IO error: {message}")]
    Io {
        message: String,
        #[source]
        source: std::io::Error,
    },

    /// Generic internal error with context
    #[error("Internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Convenience type alias for Results using our Error type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Configuration error without an underlying cause
    pub fn config(message: impl Into<String>) -> Self {
        Error::Configuration {
            message: message.into(),
            source: None,
        }
    }

    /// Authentication error, optionally carrying the raw exchange response
    pub fn authentication(message: impl Into<String>, response: Option<String>) -> Self {
        Error::Authentication {
            message: message.into(),
            response,
        }
    }

    /// Check whether this error was raised before any network call was made
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::Configuration { .. } | Error::UnsupportedMethod { .. } | Error::ProfileNotFound { .. }
        )
    }
}

// Conversion implementations
impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json {
            message: err.to_string(),
            source: err,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io {
            message: err.to_string(),
            source: err,
        }
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Internal {
            message: err.to_string(),
            source: err,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Http {
            message: err.to_string(),
            status_code: err.status().map(|s| s.as_u16()),
            source: Some(anyhow::Error::new(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::config("Missing url base api");
        assert_eq!(err.to_string(), "Configuration error: Missing url base api");

        let err = Error::UnsupportedMethod {
            method: "DELETE".to_string(),
        };
        assert_eq!(err.to_string(), "Unsupported HTTP method: DELETE");
    }

    #[test]
    fn test_authentication_keeps_response() {
        let err = Error::authentication(
            "An error occurred during auth",
            Some(r#"{"error":"invalid_grant"}"#.to_string()),
        );
        match err {
            Error::Authentication { response, .. } => {
                assert_eq!(response.as_deref(), Some(r#"{"error":"invalid_grant"}"#));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_configuration_classification() {
        assert!(Error::config("x").is_configuration());
        assert!(Error::ProfileNotFound { service: "x".into() }.is_configuration());
        assert!(!Error::authentication("x", None).is_configuration());
    }
}
