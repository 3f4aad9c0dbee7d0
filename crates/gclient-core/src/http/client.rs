//! Authenticated HTTP client
//!
//! Validates the request target, refreshes the bearer token when it has
//! expired, merges the authorization header under the caller's headers and
//! dispatches through the retry-enabled transport.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::http::auth::AuthController;
use crate::http::merge::{deep_merge, Headers};
use crate::http::transport::{Method, Payload, ReqwestTransport, Response, Transport, TransportRequest};
use crate::{Error, Result};

/// Static client configuration, immutable after construction
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClientConfig {
    pub base_api: String,
    pub default_headers: Headers,
}

impl ClientConfig {
    pub fn new(base_api: impl Into<String>) -> Self {
        Self {
            base_api: base_api.into(),
            default_headers: Headers::new(),
        }
    }

    pub fn with_default_headers(mut self, headers: Headers) -> Self {
        self.default_headers = headers;
        self
    }
}

/// Per-request headers, body and query parameters
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub headers: Option<Headers>,
    pub payload: Option<Payload>,
    pub params: Vec<(String, String)>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a single header
    pub fn header(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.headers
            .get_or_insert_with(Headers::new)
            .insert(name.into(), value.into());
        self
    }

    pub fn headers(mut self, headers: Headers) -> Self {
        self.headers = Some(headers);
        self
    }

    pub fn payload(mut self, payload: Payload) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Add a query parameter
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }
}

/// Client bound to one service's base API
pub struct HttpClient {
    config: ClientConfig,
    auth: Option<AuthController>,
    transport: Arc<dyn Transport>,
}

impl fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpClient")
            .field("base_api", &self.config.base_api)
            .field("has_auth", &self.auth.is_some())
            .finish()
    }
}

impl HttpClient {
    /// Client over a default [`ReqwestTransport`] carrying the config's default headers
    pub fn new(config: ClientConfig, auth: Option<AuthController>) -> Result<Self> {
        let transport = ReqwestTransport::builder()
            .default_headers(config.default_headers.clone())
            .build()?;
        Ok(Self::with_transport(config, auth, Arc::new(transport)))
    }

    /// Client over a caller-provided transport
    pub fn with_transport(
        config: ClientConfig,
        auth: Option<AuthController>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            config,
            auth,
            transport,
        }
    }

    pub fn base_api(&self) -> &str {
        &self.config.base_api
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn has_auth(&self) -> bool {
        self.auth.is_some()
    }

    pub fn auth(&self) -> Option<&AuthController> {
        self.auth.as_ref()
    }

    /// Send a request to `base_api + endpoint`
    pub async fn request(&self, method: Method, endpoint: &str, options: RequestOptions) -> Result<Response> {
        if self.config.base_api.is_empty() {
            return Err(Error::config("Missing url base api"));
        }
        if endpoint.is_empty() {
            return Err(Error::config("Missing endpoint"));
        }

        let auth_headers = match &self.auth {
            Some(auth) => {
                let value = auth.ensure_fresh(self.transport.as_ref()).await?;
                let mut headers = Headers::new();
                headers.insert("Authorization".to_string(), Value::String(value));
                Some(headers)
            }
            None => None,
        };

        let request = TransportRequest {
            method,
            url: format!("{}{}", self.config.base_api, endpoint),
            headers: deep_merge(auth_headers.as_ref(), options.headers.as_ref()),
            payload: options.payload,
            params: options.params,
        };

        self.transport.send(request).await
    }

    /// Send a request with a verb given by name; only GET and POST are accepted
    pub async fn request_verb(&self, method: &str, endpoint: &str, options: RequestOptions) -> Result<Response> {
        let method: Method = method.parse()?;
        self.request(method, endpoint, options).await
    }

    pub async fn get(&self, endpoint: &str, options: RequestOptions) -> Result<Response> {
        self.request(Method::Get, endpoint, options).await
    }

    pub async fn post(&self, endpoint: &str, options: RequestOptions) -> Result<Response> {
        self.request(Method::Post, endpoint, options).await
    }
}
