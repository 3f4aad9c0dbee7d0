//! Retry-enabled transport over a pooled reqwest client
//!
//! The transport owns everything that is fixed per service: the TLS context,
//! the retry policy, default headers, the cookie store and the optional
//! forward proxy. Callers hand it fully resolved requests.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::de::DeserializeOwned;
use serde_json::Value;
use url::Url;

use crate::http::merge::Headers;
use crate::http::retry::{execute_with_retry, RetryPolicy};
use crate::http::tls::{build_tls_context, TlsContext};
use crate::{Error, Result};

/// Security level used when no TLS context is supplied
pub const DEFAULT_SECURITY_LEVEL: i64 = 2;

/// Supported HTTP verbs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            _ => Err(Error::UnsupportedMethod {
                method: s.to_string(),
            }),
        }
    }
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
        }
    }
}

/// Request body, one encoding per content type
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// `application/x-www-form-urlencoded`
    Form(BTreeMap<String, String>),
    /// `application/json`
    Json(Value),
}

impl Payload {
    /// Build a form payload from key/value pairs
    pub fn form<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Payload::Form(pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }

    pub fn json(value: Value) -> Self {
        Payload::Json(value)
    }

    /// Build a form payload from a JSON object of scalar values
    ///
    /// `null` entries are dropped; nested values are rejected.
    pub fn form_from_map(map: &serde_json::Map<String, Value>) -> Result<Self> {
        let mut form = BTreeMap::new();
        for (key, value) in map {
            if let Some(text) = scalar_to_string(key, value)? {
                form.insert(key.clone(), text);
            }
        }
        Ok(Payload::Form(form))
    }
}

/// A fully resolved outbound request
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: Method,
    pub url: String,
    pub headers: Option<Headers>,
    pub payload: Option<Payload>,
    pub params: Vec<(String, String)>,
}

impl TransportRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: None,
            payload: None,
            params: Vec::new(),
        }
    }
}

/// Buffered HTTP response
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    status: u16,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl Response {
    pub fn new(status: u16, headers: Vec<(String, String)>, body: Vec<u8>) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    async fn from_reqwest(response: reqwest::Response) -> std::result::Result<Self, reqwest::Error> {
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        let body = response.bytes().await?.to_vec();

        Ok(Self {
            status,
            headers,
            body,
        })
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// First value of a header, matched case-insensitively
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

/// Sends resolved requests; implementations own retry behaviour
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a request, retrying transient failures
    async fn send(&self, request: TransportRequest) -> Result<Response>;
}

/// Transport backed by a pooled reqwest client
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    retry_policy: RetryPolicy,
    tls: TlsContext,
}

impl ReqwestTransport {
    /// Start building a new transport
    pub fn builder() -> ReqwestTransportBuilder {
        ReqwestTransportBuilder::default()
    }

    /// Convenience constructor with default configuration
    pub fn new() -> Result<Self> {
        Self::builder().build()
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    pub fn tls(&self) -> &TlsContext {
        &self.tls
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: TransportRequest) -> Result<Response> {
        let url = Url::parse(&request.url).map_err(|e| Error::Configuration {
            message: format!("Invalid request URL: {}", request.url),
            source: Some(anyhow::Error::new(e)),
        })?;
        let headers = to_header_map(request.headers.as_ref())?;
        let method = request.method;

        let mut attempt = 0u32;
        execute_with_retry(
            || {
                attempt += 1;
                tracing::debug!(attempt, %method, %url, "sending HTTP request");

                let mut builder = self
                    .client
                    .request(method.into(), url.clone())
                    .headers(headers.clone());
                if !request.params.is_empty() {
                    builder = builder.query(&request.params);
                }
                builder = match &request.payload {
                    Some(Payload::Form(form)) => builder.form(form),
                    Some(Payload::Json(value)) => builder.json(value),
                    None => builder,
                };

                async move {
                    let response = builder.send().await?;
                    tracing::debug!(status = response.status().as_u16(), "received HTTP response");
                    Response::from_reqwest(response).await
                }
            },
            method,
            &self.retry_policy,
        )
        .await
    }
}

/// Builder for [`ReqwestTransport`]
#[derive(Debug)]
pub struct ReqwestTransportBuilder {
    tls: Option<TlsContext>,
    retry_policy: RetryPolicy,
    default_headers: Headers,
    proxy: Option<String>,
    cookie_store: bool,
    user_agent: Option<String>,
}

impl Default for ReqwestTransportBuilder {
    fn default() -> Self {
        Self {
            tls: None,
            retry_policy: RetryPolicy::default(),
            default_headers: Headers::new(),
            proxy: None,
            cookie_store: true,
            user_agent: None,
        }
    }
}

impl ReqwestTransportBuilder {
    /// TLS context; defaults to `DEFAULT` ciphers at security level 2
    pub fn tls(mut self, tls: TlsContext) -> Self {
        self.tls = Some(tls);
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Headers sent with every request unless the request overrides them
    pub fn default_headers(mut self, headers: Headers) -> Self {
        self.default_headers = headers;
        self
    }

    /// Forward proxy for both HTTP and HTTPS traffic
    pub fn proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    pub fn cookie_store(mut self, enabled: bool) -> Self {
        self.cookie_store = enabled;
        self
    }

    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    pub fn build(self) -> Result<ReqwestTransport> {
        let tls = match self.tls {
            Some(tls) => tls,
            None => build_tls_context(None, DEFAULT_SECURITY_LEVEL)?,
        };

        let mut builder = reqwest::Client::builder()
            .use_preconfigured_tls(tls.client_config().clone())
            .cookie_store(self.cookie_store)
            .default_headers(to_header_map(Some(&self.default_headers))?);

        if let Some(proxy) = &self.proxy {
            let proxy = reqwest::Proxy::all(proxy.as_str()).map_err(|e| Error::Configuration {
                message: format!("Invalid proxy URL: {}", proxy),
                source: Some(anyhow::Error::new(e)),
            })?;
            builder = builder.proxy(proxy);
        }

        if let Some(agent) = self.user_agent {
            builder = builder.user_agent(agent);
        }

        let client = builder.build().map_err(|e| Error::Configuration {
            message: format!("Failed to create HTTP client: {}", e),
            source: Some(anyhow::Error::new(e)),
        })?;

        Ok(ReqwestTransport {
            client,
            retry_policy: self.retry_policy,
            tls,
        })
    }
}

fn scalar_to_string(key: &str, value: &Value) -> Result<Option<String>> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s.clone())),
        Value::Bool(_) | Value::Number(_) => Ok(Some(value.to_string())),
        Value::Array(_) | Value::Object(_) => Err(Error::config(format!(
            "Value for '{}' must be a string, number or boolean",
            key
        ))),
    }
}

/// Convert a header mapping into a reqwest header map
fn to_header_map(headers: Option<&Headers>) -> Result<HeaderMap> {
    let mut map = HeaderMap::new();
    let Some(headers) = headers else {
        return Ok(map);
    };

    for (key, value) in headers {
        let Some(text) = scalar_to_string(key, value)? else {
            continue;
        };
        let name = HeaderName::from_bytes(key.as_bytes()).map_err(|e| Error::Configuration {
            message: format!("Invalid header name: {}", key),
            source: Some(anyhow::Error::new(e)),
        })?;
        let value = HeaderValue::from_str(&text).map_err(|e| Error::Configuration {
            message: format!("Invalid value for header {}", key),
            source: Some(anyhow::Error::new(e)),
        })?;
        map.insert(name, value);
    }

    Ok(map)
}
