//! Output formatting and writing utilities
//!
//! This module formats responses and profile listings as JSON, YAML or
//! human-readable text, with secrets masked before anything is printed.

use crate::cli::OutputFormat;
use crate::error::Result;
use crate::logging::redaction;
use colored::Colorize;
use gclient_core::Response;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use is_terminal::IsTerminal;
use std::io::{self, Write};
use std::time::Duration;
use tracing::trace;

/// Printable view of a response
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseView {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    /// Parsed JSON when the body is JSON, the raw text otherwise
    pub body: Value,
    pub elapsed_ms: u64,
}

impl ResponseView {
    /// Build a view with sensitive headers masked
    pub fn from_response(response: &Response, elapsed: Duration) -> Self {
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| (name.to_lowercase(), redaction::redact_header(name, value)))
            .collect();

        let body = match response.json::<Value>() {
            Ok(value) => value,
            Err(_) if response.body().is_empty() => Value::Null,
            Err(_) => Value::String(response.text()),
        };

        Self {
            status: response.status(),
            headers,
            body,
            elapsed_ms: elapsed.as_millis() as u64,
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Trait for formatting output with specialized support for responses
pub trait OutputFormatter {
    /// Format a serializable value
    fn format<T: Serialize>(&self, value: &T) -> Result<String>;

    /// Format a response; `include` adds status and headers
    fn format_response(&self, response: &ResponseView, include: bool) -> Result<String>;
}

impl OutputFormatter for OutputFormat {
    fn format<T: Serialize>(&self, value: &T) -> Result<String> {
        match self {
            OutputFormat::Json => Ok(serde_json::to_string(value)?),
            OutputFormat::JsonPretty | OutputFormat::Human => Ok(serde_json::to_string_pretty(value)?),
            OutputFormat::Yaml => Ok(serde_yaml::to_string(value)?),
        }
    }

    fn format_response(&self, response: &ResponseView, include: bool) -> Result<String> {
        match self {
            OutputFormat::Human => format_response_human(response, include),
            _ if include => self.format(response),
            _ => self.format(&response.body),
        }
    }
}

/// Output writer that handles different output formats and colors
pub struct OutputWriter {
    format: OutputFormat,
    use_color: bool,
    show_progress: bool,
    quiet: bool,
    writer: Box<dyn Write>,
}

impl OutputWriter {
    /// Create a new output writer
    pub fn new(format: OutputFormat, use_color: bool, quiet: bool) -> Self {
        Self {
            format,
            use_color,
            show_progress: !quiet && io::stderr().is_terminal(),
            quiet,
            writer: Box::new(io::stdout()),
        }
    }

    /// Create an output writer with a custom writer
    #[cfg(test)]
    pub fn with_writer(format: OutputFormat, use_color: bool, quiet: bool, writer: Box<dyn Write>) -> Self {
        Self {
            format,
            use_color,
            show_progress: false, // No progress bars with custom writers
            quiet,
            writer,
        }
    }

    /// Get the output format
    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Write a line of output
    pub fn writeln(&mut self, content: &str) -> Result<()> {
        writeln!(self.writer, "{}", content)?;
        self.writer.flush()?;
        Ok(())
    }

    /// Write a success message
    pub fn success(&mut self, message: &str) -> Result<()> {
        if self.quiet || self.format != OutputFormat::Human {
            return Ok(());
        }

        if self.use_color {
            self.writeln(&message.green().to_string())
        } else {
            self.writeln(message)
        }
    }

    /// Write a warning message
    pub fn warning(&mut self, message: &str) -> Result<()> {
        if self.format != OutputFormat::Human {
            return Ok(());
        }

        if self.use_color {
            self.writeln(&message.yellow().to_string())
        } else {
            self.writeln(&format!("WARNING: {}", message))
        }
    }

    /// Write data in the configured format, secrets masked
    pub fn data<T: Serialize>(&mut self, value: &T) -> Result<()> {
        let mut value_json = serde_json::to_value(value)?;
        redaction::redact_json_value(&mut value_json);
        trace!(data = %value_json, "Outputting data");

        let formatted = self.format.format(&value_json)?;
        self.writeln(formatted.trim_end())
    }

    /// Write a response
    pub fn response(&mut self, response: &ResponseView, include: bool) -> Result<()> {
        trace!(status = response.status, elapsed_ms = response.elapsed_ms, "Outputting response");

        let formatted = self.format.format_response(response, include)?;
        let formatted = if self.use_color && include && self.format == OutputFormat::Human {
            colorize_status_line(&formatted, response.status)
        } else {
            formatted
        };
        self.writeln(formatted.trim_end())
    }

    /// Write a table (for human format)
    pub fn table(&mut self, headers: &[&str], rows: Vec<Vec<String>>) -> Result<()> {
        if self.format != OutputFormat::Human {
            return Ok(());
        }

        let mut widths = headers.iter().map(|h| h.len()).collect::<Vec<_>>();
        for row in &rows {
            for (i, cell) in row.iter().enumerate() {
                if i < widths.len() {
                    widths[i] = widths[i].max(cell.len());
                }
            }
        }

        let header_row = headers
            .iter()
            .enumerate()
            .map(|(i, h)| format!("{:width$}", h, width = widths[i]))
            .collect::<Vec<_>>()
            .join(" │ ");

        if self.use_color {
            self.writeln(header_row.trim_end().bold().to_string().as_str())?;
        } else {
            self.writeln(header_row.trim_end())?;
        }

        let separator = widths
            .iter()
            .map(|w| "─".repeat(*w))
            .collect::<Vec<_>>()
            .join("─┼─");
        self.writeln(&separator)?;

        for row in rows {
            let row_str = row
                .iter()
                .enumerate()
                .map(|(i, cell)| match widths.get(i) {
                    Some(width) => format!("{:width$}", cell, width = *width),
                    None => cell.clone(),
                })
                .collect::<Vec<_>>()
                .join(" │ ");
            self.writeln(row_str.trim_end())?;
        }

        Ok(())
    }

    /// Create a spinner for indeterminate progress
    pub fn spinner(&self, message: &str) -> Option<ProgressBar> {
        if !self.show_progress {
            return None;
        }

        let pb = ProgressBar::new_spinner();
        pb.set_style(default_spinner_style());
        pb.set_message(message.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        Some(pb)
    }
}

/// Helper function to create a spinner style
pub fn default_spinner_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("{spinner:.green} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

/// Format a response for human reading
fn format_response_human(response: &ResponseView, include: bool) -> Result<String> {
    let mut output = String::new();

    if include {
        output.push_str(&format!("HTTP {} ({} ms)\n", response.status, response.elapsed_ms));
        for (name, value) in &response.headers {
            output.push_str(&format!("{}: {}\n", name, value));
        }
        output.push('\n');
    }

    match &response.body {
        Value::Null => {}
        Value::String(text) => output.push_str(text),
        other => output.push_str(&serde_json::to_string_pretty(other)?),
    }
    output.push('\n');

    Ok(output)
}

fn colorize_status_line(formatted: &str, status: u16) -> String {
    let (first, rest) = formatted.split_once('\n').unwrap_or((formatted, ""));
    let first = match status {
        200..=299 => first.green().bold(),
        300..=399 => first.cyan().bold(),
        400..=499 => first.yellow().bold(),
        _ => first.red().bold(),
    };
    format!("{}\n{}", first, rest)
}

#[cfg(test)]
mod tests {
    include!("output/tests.rs");
}
