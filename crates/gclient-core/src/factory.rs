//! Per-service client construction
//!
//! The factory loads a [`ServiceProfile`], resolves its templates once and
//! wires the TLS context, transport, token controller and client together.

use std::path::PathBuf;
use std::sync::Arc;

use crate::http::auth::{AuthConfig, AuthController};
use crate::http::client::{ClientConfig, HttpClient};
use crate::http::retry::RetryPolicy;
use crate::http::tls::build_tls_context;
use crate::http::transport::ReqwestTransport;
use crate::profile::{DirectoryProfileProvider, ProfileProvider, ServiceProfile};
use crate::template::TemplateResolver;
use crate::Result;

/// Builds ready-to-use clients from service profiles
#[derive(Clone)]
pub struct ServiceClientFactory {
    provider: Arc<dyn ProfileProvider>,
    retry_policy: RetryPolicy,
}

impl std::fmt::Debug for ServiceClientFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceClientFactory")
            .field("retry_policy", &self.retry_policy)
            .finish_non_exhaustive()
    }
}

impl ServiceClientFactory {
    pub fn new<P: ProfileProvider + 'static>(provider: P) -> Self {
        Self::from_provider(Arc::new(provider))
    }

    pub fn from_provider(provider: Arc<dyn ProfileProvider>) -> Self {
        Self {
            provider,
            retry_policy: RetryPolicy::default(),
        }
    }

    /// Factory reading `<dir>/<service>.json`
    pub fn from_dir(dir: impl Into<PathBuf>) -> Self {
        Self::new(DirectoryProfileProvider::new(dir))
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn provider(&self) -> &dyn ProfileProvider {
        self.provider.as_ref()
    }

    /// Build the client for `service`, optionally through a forward proxy
    pub fn build(&self, service: &str, proxy: Option<&str>) -> Result<HttpClient> {
        let profile = self.provider.load(service)?;
        let client = self.build_from_profile(&profile, proxy)?;

        tracing::info!(
            service,
            has_auth = client.has_auth(),
            proxied = proxy.is_some(),
            "built service client"
        );
        Ok(client)
    }

    /// Build a client from an already loaded profile
    pub fn build_from_profile(&self, profile: &ServiceProfile, proxy: Option<&str>) -> Result<HttpClient> {
        let (client_config, auth_config) = resolve_profile(profile)?;

        let tls = build_tls_context(profile.cipher_list.as_deref(), profile.security_level)?;
        let mut builder = ReqwestTransport::builder()
            .tls(tls)
            .retry_policy(self.retry_policy.clone())
            .default_headers(client_config.default_headers.clone());
        if let Some(proxy) = proxy {
            builder = builder.proxy(proxy);
        }
        let transport = builder.build()?;

        Ok(HttpClient::with_transport(
            client_config,
            auth_config.map(AuthController::new),
            Arc::new(transport),
        ))
    }
}

/// Resolve a profile's templates into client and exchange configuration
///
/// One resolver is used for the whole profile, so every `{uuid}` in it
/// resolves to the same identifier.
pub fn resolve_profile(profile: &ServiceProfile) -> Result<(ClientConfig, Option<AuthConfig>)> {
    let (user, password) = profile
        .auth
        .as_ref()
        .map(|auth| (auth.user.as_deref(), auth.password.as_deref()))
        .unwrap_or((None, None));
    let resolver = TemplateResolver::with_builtins(user, password);

    let mut client_config = profile.client_config();
    client_config.default_headers = resolver.resolve_map(&client_config.default_headers)?;

    let auth_config = profile
        .auth_config()
        .map(|mut config| -> Result<AuthConfig> {
            config.headers = resolver.resolve_map(&config.headers)?;
            config.payload = resolver.resolve_map(&config.payload)?;
            Ok(config)
        })
        .transpose()?;

    Ok((client_config, auth_config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{AuthProfile, InMemoryProfileProvider};
    use crate::Error;
    use serde_json::json;

    fn auth_profile() -> ServiceProfile {
        ServiceProfile::new("https://api.example.com").with_auth(AuthProfile {
            endpoint: "/auth/v1/token".into(),
            headers: json!({
                "Authorization": "Basic {credentials}",
                "ETP-Anonymous-ID": "{uuid}",
            })
            .as_object()
            .cloned()
            .unwrap(),
            payload: json!({"grant_type": "client_id", "device_id": "{uuid}"})
                .as_object()
                .cloned()
                .unwrap(),
            user: Some("user".into()),
            password: Some("pass".into()),
            ..Default::default()
        })
    }

    #[test]
    fn test_resolve_profile_interpolates_once() {
        let (client, auth) = resolve_profile(&auth_profile()).unwrap();
        let auth = auth.unwrap();

        assert_eq!(client.base_api, "https://api.example.com");
        assert_eq!(auth.headers["Authorization"], "Basic dXNlcjpwYXNz");
        assert_eq!(auth.headers["ETP-Anonymous-ID"], auth.payload["device_id"]);

        let (_, again) = resolve_profile(&auth_profile()).unwrap();
        assert_ne!(again.unwrap().headers["ETP-Anonymous-ID"], auth.headers["ETP-Anonymous-ID"]);
    }

    #[test]
    fn test_build_without_auth() {
        let factory = ServiceClientFactory::new(
            InMemoryProfileProvider::new().with_profile("prime_video", ServiceProfile::new("https://api.example.com")),
        );
        let client = factory.build("prime_video", None).unwrap();
        assert!(!client.has_auth());
        assert_eq!(client.base_api(), "https://api.example.com");
    }

    #[test]
    fn test_build_with_auth_and_proxy() {
        let factory = ServiceClientFactory::new(InMemoryProfileProvider::new().with_profile("svc", auth_profile()));
        let client = factory.build("svc", Some("http://127.0.0.1:8888")).unwrap();

        let auth = client.auth().unwrap();
        assert!(auth.is_expired());
        assert_eq!(auth.config().headers["Authorization"], "Basic dXNlcjpwYXNz");
    }

    #[test]
    fn test_build_errors() {
        let mut bad_level = ServiceProfile::new("https://api.example.com");
        bad_level.security_level = 9;
        let mut bad_ciphers = ServiceProfile::new("https://api.example.com");
        bad_ciphers.cipher_list = Some("HIGH:@SECLEVEL=1".into());

        let factory = ServiceClientFactory::new(
            InMemoryProfileProvider::new()
                .with_profile("level", bad_level)
                .with_profile("ciphers", bad_ciphers),
        );

        assert!(matches!(factory.build("missing", None), Err(Error::ProfileNotFound { .. })));
        assert!(factory.build("level", None).unwrap_err().is_configuration());
        assert!(factory.build("ciphers", None).unwrap_err().is_configuration());
    }
}
