//! Bearer-token lifecycle
//!
//! An [`AuthController`] owns the token exchange configuration and the
//! current [`AuthState`]. The state is replaced wholesale by a successful
//! exchange and otherwise only goes stale with time. Refreshes are
//! single-flight: concurrent callers that observe an expired token wait for
//! one shared exchange instead of issuing their own.

use std::sync::RwLock;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;

use crate::http::merge::Headers;
use crate::http::transport::{Method, Payload, Transport, TransportRequest};
use crate::{Error, Result};

/// Token type used when the exchange response omits one
const DEFAULT_TOKEN_TYPE: &str = "Bearer";

/// Upper bound accepted for `expires_in` (one year)
pub const MAX_EXPIRES_IN_SECS: f64 = 365.0 * 24.0 * 3600.0;

/// Token exchange configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthConfig {
    pub base_api: String,
    pub endpoint: String,
    #[serde(default)]
    pub headers: Headers,
    #[serde(default)]
    pub payload: Headers,
}

impl AuthConfig {
    pub fn new(base_api: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            base_api: base_api.into(),
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }

    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_payload(mut self, payload: Headers) -> Self {
        self.payload = payload;
        self
    }

    /// Both `base_api` and `endpoint` must be set before an exchange
    pub fn validate(&self) -> Result<()> {
        if self.base_api.is_empty() {
            return Err(Error::config("Missing auth url base api"));
        }
        if self.endpoint.is_empty() {
            return Err(Error::config("Missing auth endpoint"));
        }
        Ok(())
    }

    pub fn url(&self) -> String {
        format!("{}{}", self.base_api, self.endpoint)
    }
}

/// Snapshot of the bearer-token state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthState {
    pub token: Option<String>,
    pub expiry: Option<DateTime<Utc>>,
    pub token_type: Option<String>,
    pub country: Option<String>,
}

impl AuthState {
    /// State produced by a successful exchange completed at `now`
    ///
    /// Returns `None` when the expiry does not fit in a timestamp.
    pub fn from_token_response(response: &TokenResponse, now: DateTime<Utc>) -> Option<Self> {
        let expiry = now.checked_add_signed(response.ttl())?;
        Some(Self {
            token: Some(response.access_token.clone()),
            expiry: Some(expiry),
            token_type: Some(response.token_type.clone()),
            country: response.country.clone(),
        })
    }

    /// True unless both token and expiry are set and expiry is after `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match (&self.token, self.expiry) {
            (Some(_), Some(expiry)) => expiry <= now,
            _ => true,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// `"<token_type> <token>"`, or `None` while the state is not valid
    pub fn authorization_header_value(&self) -> Option<String> {
        if self.is_expired() {
            return None;
        }
        let token = self.token.as_deref()?;
        let token_type = self.token_type.as_deref().unwrap_or(DEFAULT_TOKEN_TYPE);
        Some(format!("{} {}", token_type, token))
    }
}

/// Successful token exchange body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    /// Time to live in seconds
    pub expires_in: f64,
    pub token_type: String,
    #[serde(default, alias = "scope", skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

impl TokenResponse {
    /// Parse an exchange body; any `error` key is a hard failure
    pub fn parse(body: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(body).map_err(|_| {
            Error::authentication("Token exchange returned a non-JSON body", Some(body.to_string()))
        })?;

        if value.get("error").is_some() {
            return Err(Error::authentication(
                "An error occurred during auth",
                Some(body.to_string()),
            ));
        }

        let response: TokenResponse = serde_json::from_value(value).map_err(|e| {
            Error::authentication(
                format!("Malformed token response: {}", e),
                Some(body.to_string()),
            )
        })?;

        if !response.expires_in.is_finite()
            || response.expires_in < 0.0
            || response.expires_in > MAX_EXPIRES_IN_SECS
        {
            return Err(Error::authentication(
                format!("Invalid expires_in: {}", response.expires_in),
                Some(body.to_string()),
            ));
        }

        Ok(response)
    }

    pub fn ttl(&self) -> Duration {
        Duration::milliseconds((self.expires_in * 1000.0) as i64)
    }
}

/// Owns the exchange configuration and the current token state
#[derive(Debug)]
pub struct AuthController {
    config: AuthConfig,
    state: RwLock<AuthState>,
    refresh_lock: Mutex<()>,
}

impl AuthController {
    pub fn new(config: AuthConfig) -> Self {
        Self::with_state(config, AuthState::default())
    }

    /// Controller seeded with a previously obtained state
    pub fn with_state(config: AuthConfig, state: AuthState) -> Self {
        Self {
            config,
            state: RwLock::new(state),
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Snapshot of the current state
    pub fn state(&self) -> AuthState {
        self.state.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.state.read().unwrap_or_else(|e| e.into_inner()).is_expired_at(now)
    }

    pub fn authorization_header_value(&self) -> Option<String> {
        self.state
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .authorization_header_value()
    }

    /// Perform a token exchange and replace the state on success
    ///
    /// Non-empty overrides take the place of the stored header and payload
    /// templates. A failed exchange leaves the state untouched.
    pub async fn refresh(
        &self,
        transport: &dyn Transport,
        headers: Option<&Headers>,
        payload: Option<&Headers>,
    ) -> Result<TokenResponse> {
        let _guard = self.refresh_lock.lock().await;
        self.exchange(transport, headers, payload).await
    }

    /// Return a valid authorization header value, refreshing if needed
    pub async fn ensure_fresh(&self, transport: &dyn Transport) -> Result<String> {
        if let Some(value) = self.authorization_header_value() {
            return Ok(value);
        }

        let _guard = self.refresh_lock.lock().await;

        // Another caller may have refreshed while we waited
        if let Some(value) = self.authorization_header_value() {
            return Ok(value);
        }

        self.exchange(transport, None, None).await?;

        self.authorization_header_value()
            .ok_or_else(|| Error::authentication("Token expired immediately after refresh", None))
    }

    async fn exchange(
        &self,
        transport: &dyn Transport,
        headers: Option<&Headers>,
        payload: Option<&Headers>,
    ) -> Result<TokenResponse> {
        self.config.validate()?;

        let headers = headers
            .filter(|h| !h.is_empty())
            .unwrap_or(&self.config.headers);
        let payload = payload
            .filter(|p| !p.is_empty())
            .unwrap_or(&self.config.payload);

        let mut request = TransportRequest::new(Method::Post, self.config.url());
        if !headers.is_empty() {
            request.headers = Some(headers.clone());
        }
        request.payload = Some(Payload::form_from_map(payload)?);

        tracing::debug!(url = %request.url, "requesting access token");
        let response = transport.send(request).await?;
        let body = response.text();
        let token = TokenResponse::parse(&body)?;

        let state = AuthState::from_token_response(&token, Utc::now()).ok_or_else(|| {
            Error::authentication(format!("Invalid expires_in: {}", token.expires_in), Some(body.clone()))
        })?;
        *self.state.write().unwrap_or_else(|e| e.into_inner()) = state;

        tracing::info!(
            token_type = %token.token_type,
            expires_in = token.expires_in,
            "access token refreshed"
        );

        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::transport::Response;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StaticTransport {
        body: String,
        calls: AtomicUsize,
    }

    impl StaticTransport {
        fn new(body: Value) -> Self {
            Self {
                body: body.to_string(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Transport for StaticTransport {
        async fn send(&self, request: TransportRequest) -> Result<Response> {
            assert_eq!(request.method, Method::Post);
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Response::new(200, Vec::new(), self.body.clone().into_bytes()))
        }
    }

    fn config() -> AuthConfig {
        AuthConfig::new("https://auth.example.com", "/token")
    }

    #[test]
    fn test_expiry_boundary_is_exclusive() {
        let now = Utc::now();
        let state = AuthState {
            token: Some("t".into()),
            expiry: Some(now),
            token_type: Some("Bearer".into()),
            country: None,
        };
        assert!(state.is_expired_at(now));
        assert!(!state.is_expired_at(now - Duration::seconds(1)));
        assert!(state.is_expired_at(now + Duration::seconds(1)));
    }

    #[test]
    fn test_incomplete_state_is_expired() {
        let later = Utc::now() + Duration::hours(1);
        assert!(AuthState::default().is_expired());

        let no_token = AuthState {
            expiry: Some(later),
            ..Default::default()
        };
        assert!(no_token.is_expired());

        let no_expiry = AuthState {
            token: Some("t".into()),
            ..Default::default()
        };
        assert!(no_expiry.is_expired());
        assert_eq!(no_expiry.authorization_header_value(), None);
    }

    #[test]
    fn test_parse_token_response() {
        let token = TokenResponse::parse(
            r#"{"access_token":"abc","expires_in":300,"token_type":"Bearer","country":"IT"}"#,
        )
        .unwrap();
        assert_eq!(token.access_token, "abc");
        assert_eq!(token.ttl(), Duration::seconds(300));
        assert_eq!(token.country.as_deref(), Some("IT"));

        let scoped =
            TokenResponse::parse(r#"{"access_token":"abc","expires_in":1.5,"token_type":"Bearer","scope":"US"}"#)
                .unwrap();
        assert_eq!(scoped.country.as_deref(), Some("US"));
        assert_eq!(scoped.ttl(), Duration::milliseconds(1500));
    }

    #[test]
    fn test_parse_rejects_error_body() {
        let body = r#"{"error":"invalid_grant","access_token":"abc","expires_in":300,"token_type":"Bearer"}"#;
        match TokenResponse::parse(body) {
            Err(Error::Authentication { response, .. }) => assert_eq!(response.as_deref(), Some(body)),
            other => panic!("expected authentication error, got {other:?}"),
        }

        assert!(matches!(
            TokenResponse::parse("<html>"),
            Err(Error::Authentication { .. })
        ));
        assert!(matches!(
            TokenResponse::parse(r#"{"access_token":"abc"}"#),
            Err(Error::Authentication { .. })
        ));
    }

    #[tokio::test]
    async fn test_refresh_sets_state() {
        let transport = StaticTransport::new(json!({
            "access_token": "abc",
            "expires_in": 3600,
            "token_type": "Bearer",
            "country": "IT",
        }));
        let controller = AuthController::new(config());
        assert!(controller.is_expired());

        controller.refresh(&transport, None, None).await.unwrap();

        let state = controller.state();
        assert_eq!(state.token.as_deref(), Some("abc"));
        assert_eq!(state.country.as_deref(), Some("IT"));
        assert!(!controller.is_expired());
        assert_eq!(controller.authorization_header_value().as_deref(), Some("Bearer abc"));
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_state() {
        let previous = AuthState {
            token: Some("old".into()),
            expiry: Some(Utc::now() - Duration::seconds(5)),
            token_type: Some("Bearer".into()),
            country: Some("IT".into()),
        };
        let controller = AuthController::with_state(config(), previous.clone());
        let transport = StaticTransport::new(json!({"error": "invalid_client"}));

        let err = controller.refresh(&transport, None, None).await.unwrap_err();
        assert!(matches!(err, Error::Authentication { .. }));
        assert_eq!(controller.state(), previous);
    }

    #[tokio::test]
    async fn test_refresh_requires_endpoint() {
        let transport = StaticTransport::new(json!({}));
        for config in [
            AuthConfig::new("", "/token"),
            AuthConfig::new("https://auth.example.com", ""),
        ] {
            let controller = AuthController::new(config);
            let err = controller.refresh(&transport, None, None).await.unwrap_err();
            assert!(err.is_configuration());
        }
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_ensure_fresh_reuses_valid_token() {
        let transport = StaticTransport::new(json!({
            "access_token": "abc",
            "expires_in": 3600,
            "token_type": "Bearer",
        }));
        let controller = AuthController::new(config());

        assert_eq!(controller.ensure_fresh(&transport).await.unwrap(), "Bearer abc");
        assert_eq!(controller.ensure_fresh(&transport).await.unwrap(), "Bearer abc");
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_zero_ttl_is_an_error() {
        let transport = StaticTransport::new(json!({
            "access_token": "abc",
            "expires_in": 0,
            "token_type": "Bearer",
        }));
        let controller = AuthController::new(config());
        assert!(matches!(
            controller.ensure_fresh(&transport).await,
            Err(Error::Authentication { .. })
        ));
    }

    #[tokio::test]
    async fn test_huge_ttl_is_rejected_and_state_kept() {
        let transport = StaticTransport::new(json!({
            "access_token": "abc",
            "expires_in": 1e15,
            "token_type": "Bearer",
        }));
        let controller = AuthController::new(config());

        let err = controller.ensure_fresh(&transport).await.unwrap_err();
        match err {
            Error::Authentication { response, .. } => {
                assert!(response.unwrap().contains("access_token"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(controller.state(), AuthState::default());
    }

    #[test]
    fn test_expiry_overflow_yields_none() {
        let token = TokenResponse {
            access_token: "abc".into(),
            expires_in: MAX_EXPIRES_IN_SECS,
            token_type: "Bearer".into(),
            country: None,
        };
        assert!(AuthState::from_token_response(&token, DateTime::<Utc>::MAX_UTC).is_none());
        assert!(AuthState::from_token_response(&token, Utc::now()).is_some());
    }
}
