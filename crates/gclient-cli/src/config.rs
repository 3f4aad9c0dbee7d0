//! Configuration management for the CLI
//!
//! Configuration is read from a YAML or JSON file given with `--config`
//! (or `GCLIENT_CONFIG`), otherwise from the first default location that
//! exists. Command-line flags override file values.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Profile directory used when nothing else is configured
pub const DEFAULT_PROFILES_DIR: &str = "client_settings";

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding `<service>.json` profiles
    pub profiles_dir: Option<PathBuf>,

    /// Forward proxy applied to every client
    pub proxy: Option<String>,

    /// Output settings
    pub output: OutputConfig,

    /// Logging settings
    pub logging: LoggingSection,
}

/// Output configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Default output format
    pub format: String,

    /// Use colored output by default
    pub color: bool,
}

/// Logging configuration as written in the file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level (trace, debug, info, warn, error)
    pub level: Option<String>,

    /// Log format (compact, full, json)
    pub format: Option<String>,

    /// Log file path
    pub file: Option<PathBuf>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: "human".to_string(),
            color: true,
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;

        let is_yaml = matches!(
            path.extension().and_then(|s| s.to_str()),
            Some("yaml") | Some("yml")
        );

        let parsed = if is_yaml {
            serde_yaml::from_str(&content).map_err(|e| e.to_string())
        } else {
            serde_json::from_str(&content).map_err(|e| e.to_string())
        };

        parsed.map_err(|message| Error::InvalidConfig {
            path: path.to_path_buf(),
            message,
        })
    }

    /// Load configuration from default locations
    pub fn load() -> Result<Self> {
        for path in Self::default_config_paths() {
            if path.exists() {
                match Self::from_file(&path) {
                    Ok(config) => {
                        tracing::debug!(path = %path.display(), "loaded configuration");
                        return Ok(config);
                    }
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "failed to load config, skipping");
                    }
                }
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file or default locations
    pub fn load_with_file(file: Option<&Path>) -> Result<Self> {
        if let Some(path) = file {
            if !path.exists() {
                return Err(Error::config(format!("Config file not found: {}", path.display())));
            }
            Self::from_file(path)
        } else {
            Self::load()
        }
    }

    /// Get default configuration file paths to check
    fn default_config_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(".gclient.yaml"), PathBuf::from(".gclient.json")];

        if let Some(config_dir) = dirs::config_dir() {
            let gclient_dir = config_dir.join("gclient");
            paths.push(gclient_dir.join("config.yaml"));
            paths.push(gclient_dir.join("config.json"));
        }

        paths
    }

    /// Resolve the profile directory: flag, then file, then defaults
    pub fn resolve_profiles_dir(&self, flag: Option<&Path>) -> PathBuf {
        if let Some(dir) = flag {
            return dir.to_path_buf();
        }
        if let Some(dir) = &self.profiles_dir {
            return dir.clone();
        }

        let local = PathBuf::from(DEFAULT_PROFILES_DIR);
        if local.is_dir() {
            return local;
        }
        dirs::config_dir()
            .map(|dir| dir.join("gclient").join("profiles"))
            .filter(|dir| dir.is_dir())
            .unwrap_or(local)
    }

    /// Resolve the proxy: flag first, then file
    pub fn resolve_proxy<'a>(&'a self, flag: Option<&'a str>) -> Option<&'a str> {
        flag.or(self.proxy.as_deref())
    }
}
