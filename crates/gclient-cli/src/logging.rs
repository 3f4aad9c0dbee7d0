//! Logging utilities for the gclient CLI
//!
//! This module provides:
//! - Structured logging setup (compact, full or JSON, console or file)
//! - A session ID attached to every operation span
//! - Sensitive data redaction for tokens, credentials and cookies
//! - Performance timing spans

use crate::config::LoggingSection;
use crate::error::{Error, Result};
use is_terminal::IsTerminal;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::OnceLock;
use tracing::{field, Span};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// Session ID for the current invocation
static SESSION_ID: OnceLock<String> = OnceLock::new();

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter
    pub level: String,
    /// Output format: compact, full, json
    pub format: LogFormat,
    /// Enable console output
    pub console: bool,
    /// Optional file output path
    pub file: Option<PathBuf>,
    /// Include thread IDs
    pub thread_ids: bool,
    /// Include file and line numbers
    pub source_location: bool,
}

/// Log output format
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum LogFormat {
    /// Compact format for production
    Compact,
    /// Full format with all details
    Full,
    /// JSON structured format
    Json,
}

impl LogFormat {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "compact" => Some(LogFormat::Compact),
            "full" => Some(LogFormat::Full),
            "json" => Some(LogFormat::Json),
            _ => None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            format: LogFormat::Compact,
            console: true,
            file: None,
            thread_ids: false,
            source_location: false,
        }
    }
}

impl LoggingConfig {
    /// Create logging config from verbosity level
    pub fn from_verbosity(verbosity: u8) -> Self {
        let mut config = Self::default();

        match verbosity {
            0 => {}
            1 => {
                config.level = "info".to_string();
            }
            2 => {
                config.level = "debug".to_string();
                config.source_location = true;
            }
            _ => {
                config.level = "trace".to_string();
                config.format = LogFormat::Full;
                config.source_location = true;
                config.thread_ids = true;
            }
        }

        config
    }

    /// Apply the config file's logging section; `-v` flags win over its level
    pub fn merge_with_file(&mut self, section: &LoggingSection, verbosity: u8) {
        if verbosity == 0 {
            if let Some(level) = &section.level {
                self.level = level.clone();
            }
        }
        if let Some(format) = section.format.as_deref().and_then(LogFormat::from_name) {
            self.format = format;
        }
        if let Some(file) = &section.file {
            self.file = Some(file.clone());
        }
    }

    /// Apply environment overrides
    pub fn merge_with_env(&mut self) {
        // RUST_LOG takes precedence
        if let Ok(rust_log) = std::env::var("RUST_LOG") {
            self.level = rust_log;
        }

        if let Ok(format) = std::env::var("GCLIENT_LOG_FORMAT") {
            match LogFormat::from_name(&format) {
                Some(format) => self.format = format,
                None => eprintln!("Warning: invalid GCLIENT_LOG_FORMAT '{}', using default", format),
            }
        }

        if let Ok(file) = std::env::var("GCLIENT_LOG_FILE") {
            self.file = Some(PathBuf::from(file));
        }

        if let Ok(console) = std::env::var("GCLIENT_LOG_CONSOLE") {
            self.console = console.to_lowercase() == "true" || console == "1";
        }
    }
}

/// Initialize the global logging system
///
/// Events go to the log file when one is configured, otherwise to stderr.
/// Records emitted through the `log` facade are forwarded as well.
pub fn init_logging(config: LoggingConfig) -> Result<()> {
    let env_filter = create_env_filter(&config);
    let (writer, to_file) = create_writer(&config)?;
    let ansi = !to_file && config.console && std::io::stderr().is_terminal();

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(writer)
        .with_target(true)
        .with_thread_ids(config.thread_ids)
        .with_file(config.source_location)
        .with_line_number(config.source_location);

    let initialized = match config.format {
        LogFormat::Compact => builder.with_ansi(ansi).compact().finish().try_init(),
        LogFormat::Full => builder.with_ansi(ansi).finish().try_init(),
        LogFormat::Json => builder.with_ansi(false).json().finish().try_init(),
    };
    initialized.map_err(|e| Error::other(format!("Failed to initialize logging: {}", e)))?;

    let session_id = generate_session_id();
    SESSION_ID
        .set(session_id.clone())
        .map_err(|_| Error::other("Session ID already set"))?;

    tracing::debug!(
        session_id = %session_id,
        config = ?config,
        "Logging system initialized"
    );

    Ok(())
}

fn create_writer(config: &LoggingConfig) -> Result<(BoxMakeWriter, bool)> {
    if let Some(file) = &config.file {
        let directory = file
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        let name = file
            .file_name()
            .ok_or_else(|| Error::config(format!("Invalid log file path: {}", file.display())))?;
        std::fs::create_dir_all(&directory)?;
        let appender = RollingFileAppender::builder()
            .rotation(Rotation::NEVER)
            .filename_prefix(name.to_string_lossy().into_owned())
            .build(&directory)
            .map_err(|e| Error::config(format!("Cannot open log file {}: {}", file.display(), e)))?;
        return Ok((BoxMakeWriter::new(appender), true));
    }

    if config.console {
        Ok((BoxMakeWriter::new(std::io::stderr), false))
    } else {
        Ok((BoxMakeWriter::new(std::io::sink), false))
    }
}

/// Create environment filter based on configuration
fn create_env_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_new(&config.level).unwrap_or_else(|_| {
        eprintln!("Warning: invalid log filter '{}', using 'warn'", config.level);
        EnvFilter::new("warn")
    })
}

/// Generate a unique ID for this invocation
pub fn generate_session_id() -> String {
    format!("gc_{}", Uuid::new_v4().simple())
}

/// Get the current session ID
pub fn current_session_id() -> Option<&'static str> {
    SESSION_ID.get().map(|s| s.as_str())
}

/// Create a span with session ID and timing
pub fn create_operation_span(operation: &str, details: Option<&str>) -> Span {
    tracing::info_span!(
        "operation",
        operation = operation,
        session_id = current_session_id().unwrap_or("unknown"),
        details = details.unwrap_or(""),
        duration_ms = field::Empty,
    )
}

/// Sensitive data redaction utilities
pub mod redaction {
    use regex::Regex;
    use std::sync::OnceLock;

    static TOKEN_REGEX: OnceLock<Option<Regex>> = OnceLock::new();
    static SECRET_REGEX: OnceLock<Option<Regex>> = OnceLock::new();

    const MASK: &str = "***";

    fn token_regex() -> Option<&'static Regex> {
        TOKEN_REGEX
            .get_or_init(|| Regex::new(r"(?i)\b(bearer|basic)\s+[A-Za-z0-9._~+/=-]+").ok())
            .as_ref()
    }

    fn secret_regex() -> Option<&'static Regex> {
        SECRET_REGEX
            .get_or_init(|| {
                Regex::new(r#"(?i)"?(access_token|refresh_token|id_token|password|api[_-]?key)"?\s*[=:]\s*"?[^\s",&}]+"?"#).ok()
            })
            .as_ref()
    }

    /// Redact sensitive information from a string
    pub fn redact_sensitive(input: &str) -> String {
        let mut result = input.to_string();

        if let Some(regex) = token_regex() {
            result = regex.replace_all(&result, format!("$1 {}", MASK)).to_string();
        }
        if let Some(regex) = secret_regex() {
            result = regex.replace_all(&result, format!("$1={}", MASK)).to_string();
        }

        result
    }

    /// Redact sensitive information from JSON values
    pub fn redact_json_value(value: &mut serde_json::Value) {
        match value {
            serde_json::Value::Object(map) => {
                for (key, val) in map.iter_mut() {
                    if is_sensitive_key(key) {
                        *val = serde_json::Value::String(MASK.to_string());
                    } else {
                        redact_json_value(val);
                    }
                }
            }
            serde_json::Value::Array(arr) => {
                for item in arr.iter_mut() {
                    redact_json_value(item);
                }
            }
            serde_json::Value::String(s) => {
                *s = redact_sensitive(s);
            }
            _ => {}
        }
    }

    /// Redact the value of a single header
    pub fn redact_header(name: &str, value: &str) -> String {
        if is_sensitive_key(name) {
            MASK.to_string()
        } else {
            redact_sensitive(value)
        }
    }

    /// Check if a key names a secret
    pub fn is_sensitive_key(key: &str) -> bool {
        let key_lower = key.to_lowercase();
        key_lower.contains("token")
            || key_lower.contains("password")
            || key_lower.contains("secret")
            || key_lower.contains("credential")
            || key_lower.contains("authorization")
            || key_lower.contains("cookie")
            || key_lower.contains("api-key")
            || key_lower.contains("api_key")
    }
}

/// Performance timing utilities
pub mod timing {
    use std::time::Instant;
    use tracing::Span;

    /// A timer that logs its duration when dropped
    pub struct Timer {
        start: Instant,
        span: Span,
        operation: String,
    }

    impl Timer {
        pub fn new(operation: &str) -> Self {
            Self {
                start: Instant::now(),
                span: super::create_operation_span(operation, None),
                operation: operation.to_string(),
            }
        }

        pub fn with_details(operation: &str, details: &str) -> Self {
            Self {
                start: Instant::now(),
                span: super::create_operation_span(operation, Some(details)),
                operation: operation.to_string(),
            }
        }

        /// Get elapsed time without finishing the timer
        pub fn elapsed(&self) -> std::time::Duration {
            self.start.elapsed()
        }
    }

    impl Drop for Timer {
        fn drop(&mut self) {
            let duration = self.start.elapsed();
            self.span.record("duration_ms", duration.as_millis() as u64);

            tracing::debug!(
                operation = %self.operation,
                duration_ms = duration.as_millis() as u64,
                "Operation completed"
            );
        }
    }
}
