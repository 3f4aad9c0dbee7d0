//! TLS cipher policy for outbound connections
//!
//! Builds a rustls client configuration from an OpenSSL-style cipher string
//! and a numeric security level (0 weakest, 5 strictest). The resulting
//! context is used for cipher negotiation only: certificate chains are still
//! validated against the web PKI roots, but hostname matching is disabled.
//! Callers that rely on hostname validation must layer it separately.

use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::client::WebPkiServerVerifier;
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{CertificateError, ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};

use crate::{Error, Result};

/// Directive owned by the policy; callers must not put it in the cipher list
pub const SECURITY_LEVEL_DIRECTIVE: &str = "@SECLEVEL";

/// Cipher list used when none is supplied
pub const DEFAULT_CIPHER_LIST: &str = "DEFAULT";

/// Highest accepted security level
pub const MAX_SECURITY_LEVEL: u8 = 5;

/// Validated cipher list and security level
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CipherPolicy {
    cipher_list: String,
    security_level: u8,
}

impl CipherPolicy {
    /// Validate a cipher list and security level
    ///
    /// An absent or empty list falls back to [`DEFAULT_CIPHER_LIST`].
    pub fn new(cipher_list: Option<&str>, security_level: i64) -> Result<Self> {
        if let Some(list) = cipher_list {
            if list.contains(SECURITY_LEVEL_DIRECTIVE) {
                return Err(Error::config(
                    "You must not specify the Security Level manually in the cipher list",
                ));
            }
        }

        let security_level = u8::try_from(security_level)
            .ok()
            .filter(|level| *level <= MAX_SECURITY_LEVEL)
            .ok_or_else(|| {
                Error::config(format!(
                    "The security_level must be a value between 0 and {}, not {}",
                    MAX_SECURITY_LEVEL, security_level
                ))
            })?;

        let cipher_list = match cipher_list.map(str::trim) {
            Some(list) if !list.is_empty() => list.to_string(),
            _ => DEFAULT_CIPHER_LIST.to_string(),
        };

        Ok(Self {
            cipher_list,
            security_level,
        })
    }

    pub fn cipher_list(&self) -> &str {
        &self.cipher_list
    }

    pub fn security_level(&self) -> u8 {
        self.security_level
    }

    /// Cipher string with the security level directive appended
    pub fn cipher_string(&self) -> String {
        format!(
            "{}:{}={}",
            self.cipher_list, SECURITY_LEVEL_DIRECTIVE, self.security_level
        )
    }

    /// Build the TLS context for this policy
    pub fn build(&self) -> Result<TlsContext> {
        let provider = rustls::crypto::ring::default_provider();

        let selected = select_suites(&provider, &self.cipher_list, self.security_level);
        if selected.is_empty() {
            return Err(Error::config(format!(
                "No cipher suite matches '{}'",
                self.cipher_string()
            )));
        }

        let suite_names = selected.iter().map(|(_, info)| info.openssl_name).collect();
        let provider = Arc::new(CryptoProvider {
            cipher_suites: selected.into_iter().map(|(suite, _)| suite).collect(),
            ..provider
        });

        let mut roots = RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

        let verifier = WebPkiServerVerifier::builder_with_provider(Arc::new(roots), provider.clone())
            .build()
            .map_err(|e| Error::Configuration {
                message: format!("Failed to build certificate verifier: {}", e),
                source: Some(anyhow::Error::new(e)),
            })?;

        let config = ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .map_err(|e| Error::Configuration {
                message: format!("Cipher string '{}' is unusable: {}", self.cipher_string(), e),
                source: Some(anyhow::Error::new(e)),
            })?
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(SkipHostnameVerification { inner: verifier }))
            .with_no_client_auth();

        Ok(TlsContext {
            cipher_string: self.cipher_string(),
            security_level: self.security_level,
            suites: suite_names,
            config: Arc::new(config),
        })
    }
}

/// Validate the inputs and build a TLS context in one step
pub fn build_tls_context(cipher_list: Option<&str>, security_level: i64) -> Result<TlsContext> {
    CipherPolicy::new(cipher_list, security_level)?.build()
}

/// A built TLS client context
///
/// Cheap to clone; every clone shares the same rustls configuration, so
/// direct and proxy-tunneled connections negotiate with identical policy.
#[derive(Debug, Clone)]
pub struct TlsContext {
    cipher_string: String,
    security_level: u8,
    suites: Vec<&'static str>,
    config: Arc<ClientConfig>,
}

impl TlsContext {
    /// Effective cipher string, including the security level directive
    pub fn cipher_string(&self) -> &str {
        &self.cipher_string
    }

    pub fn security_level(&self) -> u8 {
        self.security_level
    }

    /// OpenSSL names of the negotiable suites, in preference order
    pub fn suites(&self) -> &[&'static str] {
        &self.suites
    }

    pub fn client_config(&self) -> &ClientConfig {
        &self.config
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Auth {
    Any,
    Ecdsa,
    Rsa,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cipher {
    Aes128Gcm,
    Aes256Gcm,
    Chacha20,
}

#[derive(Debug, Clone, Copy)]
struct SuiteInfo {
    iana_name: &'static str,
    openssl_name: &'static str,
    tls13: bool,
    auth: Auth,
    cipher: Cipher,
    mac: &'static str,
}

impl SuiteInfo {
    fn strength_bits(&self) -> u16 {
        match self.cipher {
            Cipher::Aes128Gcm => 128,
            Cipher::Aes256Gcm | Cipher::Chacha20 => 256,
        }
    }

    /// `None` when the keyword is not understood
    fn matches(&self, keyword: &str) -> Option<bool> {
        let matched = match keyword {
            "DEFAULT" | "ALL" | "HIGH" => true,
            "ECDHE" | "EECDH" | "kECDHE" | "AEAD" => true,
            "ECDSA" | "aECDSA" => self.auth == Auth::Ecdsa,
            "RSA" | "aRSA" => self.auth == Auth::Rsa,
            "AES" => matches!(self.cipher, Cipher::Aes128Gcm | Cipher::Aes256Gcm),
            "AESGCM" => matches!(self.cipher, Cipher::Aes128Gcm | Cipher::Aes256Gcm),
            "AES128" => self.cipher == Cipher::Aes128Gcm,
            "AES256" => self.cipher == Cipher::Aes256Gcm,
            "CHACHA20" => self.cipher == Cipher::Chacha20,
            "SHA256" | "SHA384" => self.mac == keyword,
            "NULL" | "eNULL" | "aNULL" | "MD5" | "RC4" | "3DES" | "DES" | "EXPORT" | "LOW" | "MEDIUM" => false,
            name if name == self.openssl_name || name == self.iana_name => true,
            _ if KNOWN_SUITES.iter().any(|s| s.openssl_name == keyword) => false,
            _ => return None,
        };
        Some(matched)
    }
}

const fn suite(
    iana_name: &'static str,
    openssl_name: &'static str,
    tls13: bool,
    auth: Auth,
    cipher: Cipher,
    mac: &'static str,
) -> SuiteInfo {
    SuiteInfo {
        iana_name,
        openssl_name,
        tls13,
        auth,
        cipher,
        mac,
    }
}

/// Suites the ring provider ships, keyed by their rustls debug name
const KNOWN_SUITES: &[SuiteInfo] = &[
    suite("TLS13_AES_256_GCM_SHA384", "TLS_AES_256_GCM_SHA384", true, Auth::Any, Cipher::Aes256Gcm, "SHA384"),
    suite("TLS13_AES_128_GCM_SHA256", "TLS_AES_128_GCM_SHA256", true, Auth::Any, Cipher::Aes128Gcm, "SHA256"),
    suite("TLS13_CHACHA20_POLY1305_SHA256", "TLS_CHACHA20_POLY1305_SHA256", true, Auth::Any, Cipher::Chacha20, "SHA256"),
    suite("TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384", "ECDHE-ECDSA-AES256-GCM-SHA384", false, Auth::Ecdsa, Cipher::Aes256Gcm, "SHA384"),
    suite("TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256", "ECDHE-ECDSA-AES128-GCM-SHA256", false, Auth::Ecdsa, Cipher::Aes128Gcm, "SHA256"),
    suite("TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256", "ECDHE-ECDSA-CHACHA20-POLY1305", false, Auth::Ecdsa, Cipher::Chacha20, "SHA256"),
    suite("TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384", "ECDHE-RSA-AES256-GCM-SHA384", false, Auth::Rsa, Cipher::Aes256Gcm, "SHA384"),
    suite("TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256", "ECDHE-RSA-AES128-GCM-SHA256", false, Auth::Rsa, Cipher::Aes128Gcm, "SHA256"),
    suite("TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256", "ECDHE-RSA-CHACHA20-POLY1305", false, Auth::Rsa, Cipher::Chacha20, "SHA256"),
];

/// Minimum symmetric strength demanded by an OpenSSL security level
fn min_strength_bits(security_level: u8) -> u16 {
    match security_level {
        0 => 0,
        1 => 80,
        2 => 112,
        3 => 128,
        4 => 192,
        _ => 256,
    }
}

/// Evaluate the TLS 1.2 part of an OpenSSL cipher string
///
/// Returns indices into `candidates`, in preference order.
fn evaluate_cipher_list(candidates: &[SuiteInfo], cipher_list: &str) -> Vec<usize> {
    let mut selected: Vec<usize> = Vec::new();
    let mut banned: Vec<usize> = Vec::new();

    for token in cipher_list
        .split(|c: char| c == ':' || c == ',' || c.is_whitespace())
        .filter(|t| !t.is_empty())
    {
        if token == "@STRENGTH" {
            selected.sort_by_key(|&i| std::cmp::Reverse(candidates[i].strength_bits()));
            continue;
        }
        if token.starts_with('@') {
            continue;
        }

        let (op, expr) = match token.chars().next() {
            Some(c @ ('!' | '-' | '+')) => (c, &token[1..]),
            _ => (' ', token),
        };

        let mut matching = Vec::new();
        let mut understood = true;
        for (idx, info) in candidates.iter().enumerate() {
            let mut all = true;
            for keyword in expr.split('+').filter(|k| !k.is_empty()) {
                match info.matches(keyword) {
                    Some(hit) => all &= hit,
                    None => {
                        understood = false;
                        break;
                    }
                }
            }
            if !understood {
                break;
            }
            if all {
                matching.push(idx);
            }
        }
        if !understood {
            tracing::debug!(token, "ignoring unknown cipher string token");
            continue;
        }

        match op {
            '!' => {
                selected.retain(|i| !matching.contains(i));
                banned.extend(matching);
            }
            '-' => selected.retain(|i| !matching.contains(i)),
            '+' => {
                let (moved, kept): (Vec<usize>, Vec<usize>) =
                    selected.iter().copied().partition(|i| matching.contains(i));
                selected = kept;
                selected.extend(moved);
            }
            _ => {
                for idx in matching {
                    if !selected.contains(&idx) && !banned.contains(&idx) {
                        selected.push(idx);
                    }
                }
            }
        }
    }

    selected
}

/// Pick the provider suites allowed by the cipher list and security level
fn select_suites(
    provider: &CryptoProvider,
    cipher_list: &str,
    security_level: u8,
) -> Vec<(rustls::SupportedCipherSuite, SuiteInfo)> {
    let available: Vec<(rustls::SupportedCipherSuite, SuiteInfo)> = provider
        .cipher_suites
        .iter()
        .filter_map(|suite| {
            let name = format!("{:?}", suite.suite());
            KNOWN_SUITES
                .iter()
                .find(|info| info.iana_name == name)
                .map(|info| (*suite, *info))
        })
        .collect();

    let tls12: Vec<SuiteInfo> = available.iter().filter(|(_, i)| !i.tls13).map(|(_, i)| *i).collect();
    let order = evaluate_cipher_list(&tls12, cipher_list);
    let floor = min_strength_bits(security_level);

    let tls13_suites = available.iter().filter(|(_, info)| info.tls13).cloned();
    let tls12_suites = order.into_iter().filter_map(|idx| {
        let info = tls12[idx];
        available.iter().find(|(_, i)| i.iana_name == info.iana_name).cloned()
    });

    tls13_suites
        .chain(tls12_suites)
        .filter(|(_, info)| info.strength_bits() >= floor)
        .collect()
}

/// Verifier that validates the chain but accepts a hostname mismatch
#[derive(Debug)]
struct SkipHostnameVerification {
    inner: Arc<WebPkiServerVerifier>,
}

fn is_name_mismatch(err: &rustls::Error) -> bool {
    matches!(
        err,
        rustls::Error::InvalidCertificate(
            CertificateError::NotValidForName | CertificateError::NotValidForNameContext { .. }
        )
    )
}

impl ServerCertVerifier for SkipHostnameVerification {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        match self
            .inner
            .verify_server_cert(end_entity, intermediates, server_name, ocsp_response, now)
        {
            Err(err) if is_name_mismatch(&err) => Ok(ServerCertVerified::assertion()),
            other => other,
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.inner.supported_verify_schemes()
    }
}
