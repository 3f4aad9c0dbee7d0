//! HTTP layer for authenticated service clients
//!
//! This module provides:
//! - TLS context construction from a cipher list and security level
//! - Retry logic with exponential backoff
//! - A pooled, retrying transport
//! - Bearer-token lifecycle management
//! - The client that ties them together

pub mod auth;
pub mod client;
pub mod merge;
pub mod retry;
pub mod tls;
pub mod transport;

pub use auth::{AuthConfig, AuthController, AuthState, TokenResponse};
pub use client::{ClientConfig, HttpClient, RequestOptions};
pub use merge::{deep_merge, Headers};
pub use retry::{RetryDecision, RetryPolicy};
pub use tls::{build_tls_context, CipherPolicy, TlsContext};
pub use transport::{Method, Payload, ReqwestTransport, Response, Transport, TransportRequest};
