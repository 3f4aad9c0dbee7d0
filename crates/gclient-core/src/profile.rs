//! Service profiles and the providers that load them
//!
//! A profile is the declarative description of one service: its base API,
//! default headers, optional token exchange section and TLS settings.
//! Providers look profiles up by service name.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::http::auth::AuthConfig;
use crate::http::client::ClientConfig;
use crate::http::merge::Headers;
use crate::{Error, Result};

/// Security level applied when a profile does not set one
pub const DEFAULT_PROFILE_SECURITY_LEVEL: i64 = 2;

const REDACTED: &str = "***";

fn default_security_level() -> i64 {
    DEFAULT_PROFILE_SECURITY_LEVEL
}

/// Declarative configuration for one service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceProfile {
    pub base_api: String,
    #[serde(default)]
    pub default_headers: Headers,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthProfile>,
    #[serde(default = "default_security_level")]
    pub security_level: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cipher_list: Option<String>,
}

/// Token exchange section of a profile
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthProfile {
    /// Overrides the profile's `base_api` for the exchange
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_api: Option<String>,
    pub endpoint: String,
    #[serde(default)]
    pub headers: Headers,
    #[serde(default)]
    pub payload: Headers,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl ServiceProfile {
    pub fn new(base_api: impl Into<String>) -> Self {
        Self {
            base_api: base_api.into(),
            default_headers: Headers::new(),
            auth: None,
            security_level: DEFAULT_PROFILE_SECURITY_LEVEL,
            cipher_list: None,
        }
    }

    pub fn with_auth(mut self, auth: AuthProfile) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn with_default_headers(mut self, headers: Headers) -> Self {
        self.default_headers = headers;
        self
    }

    /// Exchange configuration with templates still unresolved
    pub fn auth_config(&self) -> Option<AuthConfig> {
        self.auth.as_ref().map(|auth| AuthConfig {
            base_api: auth.base_api.clone().unwrap_or_else(|| self.base_api.clone()),
            endpoint: auth.endpoint.clone(),
            headers: auth.headers.clone(),
            payload: auth.payload.clone(),
        })
    }

    /// Client configuration with templates still unresolved
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig::new(self.base_api.clone()).with_default_headers(self.default_headers.clone())
    }

    /// Copy with the auth user and password masked, for display
    pub fn redacted(&self) -> Self {
        let mut profile = self.clone();
        if let Some(auth) = profile.auth.as_mut() {
            for secret in [&mut auth.user, &mut auth.password].into_iter().flatten() {
                *secret = REDACTED.to_string();
            }
        }
        profile
    }
}

/// Looks up service profiles by name
pub trait ProfileProvider: Send + Sync {
    /// Load the profile for `service`; [`Error::ProfileNotFound`] if absent
    fn load(&self, service: &str) -> Result<ServiceProfile>;

    /// Names of all available profiles, sorted
    fn list(&self) -> Result<Vec<String>>;
}

/// Reads `<dir>/<service>.json`
#[derive(Debug, Clone)]
pub struct DirectoryProfileProvider {
    dir: PathBuf,
}

impl DirectoryProfileProvider {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn profile_path(&self, service: &str) -> Result<PathBuf> {
        if service.is_empty() || service.contains(['/', '\\']) || service.starts_with('.') {
            return Err(Error::config(format!("Invalid service name: {:?}", service)));
        }
        Ok(self.dir.join(format!("{}.json", service)))
    }
}

impl ProfileProvider for DirectoryProfileProvider {
    fn load(&self, service: &str) -> Result<ServiceProfile> {
        let path = self.profile_path(service)?;
        if !path.is_file() {
            return Err(Error::ProfileNotFound {
                service: service.to_string(),
            });
        }

        let content = fs::read_to_string(&path)?;
        serde_json::from_str(&content).map_err(|e| Error::Configuration {
            message: format!("Invalid profile {}: {}", path.display(), e),
            source: Some(anyhow::Error::new(e)),
        })
    }

    fn list(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }
}

/// Profiles held in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryProfileProvider {
    profiles: BTreeMap<String, ServiceProfile>,
}

impl InMemoryProfileProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_profile(mut self, service: impl Into<String>, profile: ServiceProfile) -> Self {
        self.insert(service, profile);
        self
    }

    pub fn insert(&mut self, service: impl Into<String>, profile: ServiceProfile) {
        self.profiles.insert(service.into(), profile);
    }
}

impl ProfileProvider for InMemoryProfileProvider {
    fn load(&self, service: &str) -> Result<ServiceProfile> {
        self.profiles
            .get(service)
            .cloned()
            .ok_or_else(|| Error::ProfileNotFound {
                service: service.to_string(),
            })
    }

    fn list(&self) -> Result<Vec<String>> {
        Ok(self.profiles.keys().cloned().collect())
    }
}
