//! Retry logic with exponential backoff for HTTP requests
//!
//! Transient failures are a fixed set of response statuses plus connect and
//! timeout errors. Everything else is returned to the caller on the first
//! attempt. Status and timeout retries only apply to the policy's retry
//! methods (GET by default); a POST is only re-sent when the connection was
//! never established.

use std::future::Future;
use std::time::Duration;

use backoff::{backoff::Backoff, ExponentialBackoff};

use crate::http::transport::{Method, Response};
use crate::Result;

/// Statuses retried by the default policy
pub const RETRY_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

/// Statuses whose `Retry-After` header overrides the computed delay
const RETRY_AFTER_STATUSES: [u16; 2] = [429, 503];

/// Retry policy configuration
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts, the first one included
    pub max_attempts: u32,
    /// Delay before the first retry; doubles on every further retry
    pub backoff_factor: Duration,
    /// Upper bound for any single delay
    pub max_backoff: Duration,
    /// Response statuses considered transient
    pub retry_statuses: Vec<u16>,
    /// Honour integer `Retry-After` headers on 429/503 responses
    pub respect_retry_after: bool,
    /// Methods that may be re-sent after a response or a timeout
    pub retry_methods: Vec<Method>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 15,
            backoff_factor: Duration::from_millis(200),
            max_backoff: Duration::from_secs(120),
            retry_statuses: RETRY_STATUSES.to_vec(),
            respect_retry_after: true,
            retry_methods: vec![Method::Get],
        }
    }
}

impl RetryPolicy {
    /// Create a new retry policy with a custom attempt budget
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Default::default()
        }
    }

    /// Set the backoff factor
    pub fn with_backoff_factor(mut self, factor: Duration) -> Self {
        self.backoff_factor = factor;
        self
    }

    /// Set the maximum delay
    pub fn with_max_backoff(mut self, max: Duration) -> Self {
        self.max_backoff = max;
        self
    }

    /// Set the methods retried on statuses and timeouts
    pub fn with_retry_methods(mut self, methods: impl IntoIterator<Item = Method>) -> Self {
        self.retry_methods = methods.into_iter().collect();
        self
    }

    /// Policy that never retries
    pub fn disabled() -> Self {
        Self::new(1)
    }

    pub fn is_retry_status(&self, status: u16) -> bool {
        self.retry_statuses.contains(&status)
    }

    pub fn is_retry_method(&self, method: Method) -> bool {
        self.retry_methods.contains(&method)
    }

    /// Create an exponential backoff instance without jitter
    pub fn create_backoff(&self) -> ExponentialBackoff {
        let mut backoff = ExponentialBackoff {
            current_interval: self.backoff_factor,
            initial_interval: self.backoff_factor,
            max_interval: self.max_backoff,
            multiplier: 2.0,
            randomization_factor: 0.0,
            max_elapsed_time: None, // attempts are bounded separately
            ..Default::default()
        };
        backoff.reset();
        backoff
    }
}

/// Decision on whether to retry a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry the request after the specified delay
    Retry { delay: Duration },
    /// Do not retry the request
    NoRetry,
}

/// Retry bookkeeping for a single logical request
#[derive(Debug)]
pub struct RetryHandler {
    policy: RetryPolicy,
    attempts: u32,
    backoff: ExponentialBackoff,
}

impl RetryHandler {
    /// Create a new retry handler with the given policy
    pub fn new(policy: RetryPolicy) -> Self {
        let backoff = policy.create_backoff();
        Self {
            policy,
            attempts: 0,
            backoff,
        }
    }

    /// Record a failed attempt and decide whether another one is allowed
    pub fn should_retry(&mut self, retry_after: Option<Duration>) -> RetryDecision {
        self.attempts += 1;

        if self.attempts >= self.policy.max_attempts {
            return RetryDecision::NoRetry;
        }

        RetryDecision::Retry {
            delay: self.calculate_delay(retry_after),
        }
    }

    /// Calculate the delay before the next retry
    fn calculate_delay(&mut self, retry_after: Option<Duration>) -> Duration {
        // The schedule advances even when Retry-After wins
        let computed = self.backoff.next_backoff().unwrap_or(self.policy.max_backoff);

        match retry_after {
            Some(delay) if self.policy.respect_retry_after => delay.min(self.policy.max_backoff),
            _ => computed,
        }
    }

    /// Reset the retry handler for a new request
    pub fn reset(&mut self) {
        self.attempts = 0;
        self.backoff.reset();
    }

    /// Number of failed attempts recorded so far
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

/// Transport errors worth another attempt for `method`
///
/// A refused connection never reached the server, so it is safe for any
/// method. A timeout may have, so it follows the retry methods.
pub fn is_transient_error(error: &reqwest::Error, method: Method, policy: &RetryPolicy) -> bool {
    error.is_connect() || (error.is_timeout() && policy.is_retry_method(method))
}

/// Parse an integer `Retry-After` header from a retryable response
fn retry_after(response: &Response) -> Option<Duration> {
    if !RETRY_AFTER_STATUSES.contains(&response.status()) {
        return None;
    }
    response
        .header("Retry-After")
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Execute a request with retry logic
///
/// Once the budget is exhausted the last response is returned as is, or the
/// last transport error is converted into [`crate::Error::Http`].
pub async fn execute_with_retry<F, Fut>(
    mut request_fn: F,
    method: Method,
    policy: &RetryPolicy,
) -> Result<Response>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<Response, reqwest::Error>>,
{
    let mut handler = RetryHandler::new(policy.clone());
    let retry_statuses = policy.is_retry_method(method);

    loop {
        match request_fn().await {
            Ok(response) => {
                if !retry_statuses || !policy.is_retry_status(response.status()) {
                    return Ok(response);
                }
                match handler.should_retry(retry_after(&response)) {
                    RetryDecision::Retry { delay } => {
                        log::warn!(
                            "Request returned {} (attempt {}), retrying after {:?}",
                            response.status(),
                            handler.attempts(),
                            delay
                        );
                        tokio::time::sleep(delay).await;
                    }
                    RetryDecision::NoRetry => {
                        log::error!(
                            "Request still returning {} after {} attempts, giving up",
                            response.status(),
                            handler.attempts()
                        );
                        return Ok(response);
                    }
                }
            }
            Err(error) => {
                if !is_transient_error(&error, method, policy) {
                    return Err(error.into());
                }
                match handler.should_retry(None) {
                    RetryDecision::Retry { delay } => {
                        log::warn!(
                            "Request failed (attempt {}), retrying after {:?}: {}",
                            handler.attempts(),
                            delay,
                            error
                        );
                        tokio::time::sleep(delay).await;
                    }
                    RetryDecision::NoRetry => {
                        log::error!(
                            "Request failed after {} attempts, not retrying: {}",
                            handler.attempts(),
                            error
                        );
                        return Err(error.into());
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_default_retry_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 15);
        assert_eq!(policy.backoff_factor, Duration::from_millis(200));
        assert_eq!(policy.retry_statuses, vec![429, 500, 502, 503, 504]);
        assert!(policy.is_retry_status(503));
        assert!(!policy.is_retry_status(501));
        assert!(!policy.is_retry_status(404));
        assert!(policy.is_retry_method(Method::Get));
        assert!(!policy.is_retry_method(Method::Post));
    }

    #[test]
    fn test_retry_handler_max_attempts() {
        let mut handler = RetryHandler::new(RetryPolicy::new(3));

        assert!(matches!(handler.should_retry(None), RetryDecision::Retry { .. }));
        assert_eq!(handler.attempts(), 1);

        assert!(matches!(handler.should_retry(None), RetryDecision::Retry { .. }));
        assert_eq!(handler.attempts(), 2);

        // Third failure exhausts the budget of three attempts
        assert_eq!(handler.should_retry(None), RetryDecision::NoRetry);
    }

    #[test]
    fn test_exponential_backoff() {
        let mut handler = RetryHandler::new(RetryPolicy::default());

        let delays: Vec<Duration> = (0..4)
            .map(|_| match handler.should_retry(None) {
                RetryDecision::Retry { delay } => delay,
                RetryDecision::NoRetry => panic!("Expected retry decision"),
            })
            .collect();

        assert_eq!(
            delays,
            vec![
                Duration::from_millis(200),
                Duration::from_millis(400),
                Duration::from_millis(800),
                Duration::from_millis(1600),
            ]
        );
    }

    #[test]
    fn test_backoff_is_capped() {
        let policy = RetryPolicy::new(30).with_max_backoff(Duration::from_secs(1));
        let mut handler = RetryHandler::new(policy);

        let mut last = Duration::ZERO;
        while let RetryDecision::Retry { delay } = handler.should_retry(None) {
            last = delay;
        }
        assert_eq!(last, Duration::from_secs(1));
    }

    #[test]
    fn test_retry_after_overrides_delay() {
        let mut handler = RetryHandler::new(RetryPolicy::default());

        if let RetryDecision::Retry { delay } = handler.should_retry(Some(Duration::from_secs(10))) {
            assert_eq!(delay, Duration::from_secs(10));
        } else {
            panic!("Expected retry decision");
        }
    }

    #[test]
    fn test_reset() {
        let mut handler = RetryHandler::new(RetryPolicy::default());
        handler.should_retry(None);
        handler.should_retry(None);
        handler.reset();
        assert_eq!(handler.attempts(), 0);
        assert_eq!(
            handler.should_retry(None),
            RetryDecision::Retry {
                delay: Duration::from_millis(200)
            }
        );
    }

    #[tokio::test]
    async fn test_execute_returns_last_response_when_exhausted() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(3).with_backoff_factor(Duration::from_millis(1));

        let response = execute_with_retry(
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(Response::new(502, Vec::new(), b"bad gateway".to_vec())) }
            },
            Method::Get,
            &policy,
        )
        .await
        .unwrap();

        assert_eq!(response.status(), 502);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_execute_sends_post_once_on_retry_status() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(15).with_backoff_factor(Duration::from_millis(1));

        let response = execute_with_retry(
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(Response::new(503, Vec::new(), Vec::new())) }
            },
            Method::Post,
            &policy,
        )
        .await
        .unwrap();

        assert_eq!(response.status(), 503);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_execute_retries_post_when_allowed() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(3)
            .with_backoff_factor(Duration::from_millis(1))
            .with_retry_methods([Method::Get, Method::Post]);

        execute_with_retry(
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(Response::new(503, Vec::new(), Vec::new())) }
            },
            Method::Post,
            &policy,
        )
        .await
        .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_execute_does_not_retry_client_errors() {
        let calls = AtomicU32::new(0);

        let response = execute_with_retry(
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(Response::new(404, Vec::new(), Vec::new())) }
            },
            Method::Get,
            &RetryPolicy::default(),
        )
        .await
        .unwrap();

        assert_eq!(response.status(), 404);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_retry_after_header_parsing() {
        let limited = Response::new(429, vec![("Retry-After".into(), "3".into())], Vec::new());
        assert_eq!(retry_after(&limited), Some(Duration::from_secs(3)));

        let server_error = Response::new(500, vec![("Retry-After".into(), "3".into())], Vec::new());
        assert_eq!(retry_after(&server_error), None);

        let http_date = Response::new(
            503,
            vec![("Retry-After".into(), "Wed, 21 Oct 2015 07:28:00 GMT".into())],
            Vec::new(),
        );
        assert_eq!(retry_after(&http_date), None);
    }
}
