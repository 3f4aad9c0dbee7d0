//! Placeholder resolution for profile templates
//!
//! Templates contain `{name}` or `{name:argument}` tokens. Each name maps to
//! a resolver function; names without a resolver are left as written.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use regex::{Captures, Regex};
use serde_json::Value;
use uuid::Uuid;

use crate::http::merge::Headers;
use crate::{Error, Result};

/// Resolver for one placeholder name; receives the optional `:argument`
pub type ResolveFn = Arc<dyn Fn(Option<&str>) -> Result<String> + Send + Sync>;

/// Maps placeholder names to resolver functions
#[derive(Clone)]
pub struct TemplateResolver {
    resolvers: HashMap<String, ResolveFn>,
    pattern: Regex,
}

impl fmt::Debug for TemplateResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.resolvers.keys().collect();
        names.sort();
        f.debug_struct("TemplateResolver").field("placeholders", &names).finish()
    }
}

impl Default for TemplateResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateResolver {
    /// Resolver with no registered placeholders
    pub fn new() -> Self {
        Self {
            resolvers: HashMap::new(),
            pattern: Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)(?::([^{}]+))?\}").expect("Valid regex pattern"),
        }
    }

    /// Resolver with `{credentials}`, `{uuid}` and `{env:NAME}`
    ///
    /// `{token}` and `{id}` are accepted as the older names of
    /// `{credentials}` and `{uuid}`. The UUID is generated here, so every
    /// `{uuid}` or `{id}` resolved through this instance yields the same value.
    pub fn with_builtins(user: Option<&str>, password: Option<&str>) -> Self {
        let credentials = match (user, password) {
            (Some(user), Some(password)) => Some(BASE64.encode(format!("{}:{}", user, password))),
            _ => None,
        };
        let id = Uuid::new_v4().to_string();

        Self::new()
            .register("credentials", move |_| {
                credentials.clone().ok_or_else(|| {
                    Error::config("{credentials} requires both auth.user and auth.password")
                })
            })
            .register("uuid", move |_| Ok(id.clone()))
            .register("env", |name| {
                let name = name.ok_or_else(|| Error::config("{env} requires a variable name, as in {env:NAME}"))?;
                std::env::var(name).map_err(|_| Error::Configuration {
                    message: format!("Environment variable {} not found", name),
                    source: None,
                })
            })
            .alias("token", "credentials")
            .alias("id", "uuid")
    }

    /// Make `name` resolve exactly like the already registered `target`
    pub fn alias(mut self, name: impl Into<String>, target: &str) -> Self {
        if let Some(resolver) = self.resolvers.get(target).cloned() {
            self.resolvers.insert(name.into(), resolver);
        }
        self
    }

    /// Register or replace the resolver for `name`
    pub fn register<F>(mut self, name: impl Into<String>, resolver: F) -> Self
    where
        F: Fn(Option<&str>) -> Result<String> + Send + Sync + 'static,
    {
        self.resolvers.insert(name.into(), Arc::new(resolver));
        self
    }

    pub fn has_placeholder(&self, name: &str) -> bool {
        self.resolvers.contains_key(name)
    }

    /// Resolve every placeholder in a string
    pub fn resolve_str(&self, input: &str) -> Result<String> {
        let mut output = String::with_capacity(input.len());
        let mut last = 0;

        for caps in self.pattern.captures_iter(input) {
            let Some(whole) = caps.get(0) else {
                continue;
            };
            output.push_str(&input[last..whole.start()]);
            output.push_str(&self.resolve_one(&caps)?);
            last = whole.end();
        }
        output.push_str(&input[last..]);

        Ok(output)
    }

    fn resolve_one(&self, caps: &Captures<'_>) -> Result<String> {
        let whole = &caps[0];
        let name = &caps[1];
        let argument = caps.get(2).map(|m| m.as_str());

        match self.resolvers.get(name) {
            Some(resolver) => resolver(argument),
            None => {
                tracing::warn!(placeholder = %whole, "unknown template placeholder left unresolved");
                Ok(whole.to_string())
            }
        }
    }

    /// Resolve placeholders in every string inside a JSON value
    pub fn resolve_value(&self, value: &Value) -> Result<Value> {
        Ok(match value {
            Value::String(s) => Value::String(self.resolve_str(s)?),
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|item| self.resolve_value(item))
                    .collect::<Result<_>>()?,
            ),
            Value::Object(map) => Value::Object(self.resolve_map(map)?),
            other => other.clone(),
        })
    }

    /// Resolve placeholders in the values of a mapping; keys are kept as is
    pub fn resolve_map(&self, map: &Headers) -> Result<Headers> {
        map.iter()
            .map(|(key, value)| Ok((key.clone(), self.resolve_value(value)?)))
            .collect()
    }
}
