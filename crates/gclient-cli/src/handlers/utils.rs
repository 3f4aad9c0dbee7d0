//! Shared utilities for command handlers

use crate::error::{Error, Result};
use gclient_core::{Headers, Payload, RequestOptions};
use serde_json::Value;

/// Parse a `Name: value` header argument
pub fn parse_header(raw: &str) -> Result<(String, String)> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| Error::invalid_args(format!("Header must look like 'Name: value', got '{}'", raw)))?;

    let name = name.trim();
    if name.is_empty() {
        return Err(Error::invalid_args(format!("Header name is empty in '{}'", raw)));
    }
    Ok((name.to_string(), value.trim().to_string()))
}

/// Parse a `key=value` argument
pub fn parse_key_value(raw: &str) -> Result<(String, String)> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| Error::invalid_args(format!("Expected 'key=value', got '{}'", raw)))?;

    if key.is_empty() {
        return Err(Error::invalid_args(format!("Key is empty in '{}'", raw)));
    }
    Ok((key.to_string(), value.to_string()))
}

/// Build request options from header and query arguments
pub fn request_options(headers: &[String], params: &[String]) -> Result<RequestOptions> {
    let mut options = RequestOptions::new();

    if !headers.is_empty() {
        let mut map = Headers::new();
        for raw in headers {
            let (name, value) = parse_header(raw)?;
            map.insert(name, Value::String(value));
        }
        options = options.headers(map);
    }

    for raw in params {
        let (key, value) = parse_key_value(raw)?;
        options = options.param(key, value);
    }

    Ok(options)
}

/// Build a POST body from `--form` pairs or a `--json` document
pub fn request_payload(form: &[String], json: Option<&str>) -> Result<Option<Payload>> {
    if let Some(json) = json {
        let value: Value = serde_json::from_str(json)
            .map_err(|e| Error::invalid_args(format!("--json must be a valid JSON document: {}", e)))?;
        return Ok(Some(Payload::json(value)));
    }

    if form.is_empty() {
        return Ok(None);
    }

    let pairs = form
        .iter()
        .map(|raw| parse_key_value(raw))
        .collect::<Result<Vec<_>>>()?;
    Ok(Some(Payload::form(pairs)))
}
