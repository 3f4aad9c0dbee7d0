//! gclient core - authenticated HTTP clients for third-party service APIs
//!
//! This crate provides the pieces needed to talk to services that want a
//! bearer token, a particular TLS cipher policy and patient retries:
//!
//! - **TLS**: build a client TLS context from a cipher list and security level
//! - **Transport**: pooled, retrying HTTP transport with cookies and proxy support
//! - **Auth**: bearer-token lifecycle with single-flight refresh
//! - **Client**: request orchestration with auth header injection
//! - **Factory**: per-service clients built from declarative profiles
//!
//! # Example
//!
//! ```no_run
//! use gclient_core::{RequestOptions, Result, ServiceClientFactory};
//!
//! async fn example() -> Result<()> {
//!     let factory = ServiceClientFactory::from_dir("client_settings");
//!     let client = factory.build("crunchyroll", None)?;
//!     let response = client.get("/content/v2/cms/objects", RequestOptions::new()).await?;
//!     println!("{}", response.status());
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod factory;
pub mod http;
pub mod profile;
pub mod template;

pub use error::{Error, Result};
pub use factory::{resolve_profile, ServiceClientFactory};
pub use http::{
    build_tls_context, deep_merge, AuthConfig, AuthController, AuthState, CipherPolicy, ClientConfig, Headers,
    HttpClient, Method, Payload, RequestOptions, ReqwestTransport, Response, RetryPolicy, TlsContext,
    TokenResponse, Transport, TransportRequest,
};
pub use profile::{AuthProfile, DirectoryProfileProvider, InMemoryProfileProvider, ProfileProvider, ServiceProfile};
pub use template::TemplateResolver;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_version() {
        assert!(!VERSION.is_empty());
    }
}
