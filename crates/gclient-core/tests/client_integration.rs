//! End-to-end client behaviour against a mock HTTP server


use std::net::TcpListener;
use std::sync::Arc;
use std::time::{Duration, Instant};

use gclient_core::{AuthState, Error, Payload, RequestOptions, RetryPolicy};
use serde_json::json;
use test_support::*;
use wiremock::matchers::{body_json, body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_anonymous_get_sends_defaults_without_authorization() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/ping"))
        .and(header("x-client", "gclient"))
        .and(header("user-agent", "gclient-tests"))
        .respond_with(ResponseTemplate::new(200).set_body_string("pong"))
        .expect(1)
        .mount(&server)
        .await;

    let client = anonymous_client(&server, RetryPolicy::default());
    let response = client.get("/v1/ping", RequestOptions::new()).await.unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(response.text(), "pong");

    let received = server.received_requests().await.unwrap();
    assert_eq!(received.len(), 1);
    assert!(received[0].headers.get("authorization").is_none());
}

#[tokio::test]
async fn test_first_request_exchanges_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_ENDPOINT))
        .and(header("authorization", "Basic dXNlcjpwYXNz"))
        .and(body_string_contains("grant_type=client_credentials"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("abc", 3600)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/data"))
        .and(header("authorization", "Bearer abc"))
        .and(header("x-client", "gclient"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": []})))
        .expect(1)
        .mount(&server)
        .await;

    let client = authenticated_client(&server, RetryPolicy::default());
    let response = client.get("/v1/data", RequestOptions::new()).await.unwrap();

    assert_eq!(response.json::<serde_json::Value>().unwrap(), json!({"items": []}));

    let state = client.auth().unwrap().state();
    assert_eq!(state.token.as_deref(), Some("abc"));
    assert_eq!(state.token_type.as_deref(), Some("Bearer"));
    assert_eq!(state.country.as_deref(), Some("IT"));
}

#[tokio::test]
async fn test_cached_token_is_reused() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_ENDPOINT))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("abc", 3600)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/data"))
        .and(header("authorization", "Bearer abc"))
        .respond_with(ResponseTemplate::new(200))
        .expect(2)
        .mount(&server)
        .await;

    let client = authenticated_client(&server, RetryPolicy::default());
    client.get("/v1/data", RequestOptions::new()).await.unwrap();
    client.get("/v1/data", RequestOptions::new()).await.unwrap();
}

#[tokio::test]
async fn test_retries_service_unavailable_with_backoff() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/flaky"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&server)
        .await;

    let client = anonymous_client(&server, RetryPolicy::default());
    let started = Instant::now();
    let response = client.get("/v1/flaky", RequestOptions::new()).await.unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
    // 0.2s before the second attempt, 0.4s before the third
    assert!(started.elapsed() >= Duration::from_millis(600));
}

#[tokio::test]
async fn test_exhausted_retries_return_last_response() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/down"))
        .respond_with(ResponseTemplate::new(500).set_body_string("still down"))
        .expect(4)
        .mount(&server)
        .await;

    let client = anonymous_client(&server, fast_retry(4));
    let response = client.get("/v1/down", RequestOptions::new()).await.unwrap();

    assert_eq!(response.status(), 500);
    assert_eq!(response.text(), "still down");
}

#[tokio::test]
async fn test_client_errors_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/missing"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let client = anonymous_client(&server, fast_retry(15));
    let response = client.get("/v1/missing", RequestOptions::new()).await.unwrap();
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn test_connection_failure_surfaces_http_error() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let client = gclient_core::HttpClient::with_transport(
        gclient_core::ClientConfig::new(format!("http://127.0.0.1:{}", port)),
        None,
        transport(fast_retry(2)),
    );

    let err = client.get("/v1/ping", RequestOptions::new()).await.unwrap_err();
    assert!(matches!(err, Error::Http { .. }), "unexpected error: {err:?}");
}

#[tokio::test]
async fn test_unsupported_verb_makes_no_call() {
    let server = MockServer::start().await;
    let client = authenticated_client(&server, RetryPolicy::default());

    let err = client
        .request_verb("DELETE", "/v1/data", RequestOptions::new())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::UnsupportedMethod { .. }));
    assert!(server.received_requests().await.unwrap().is_empty());
    assert_eq!(client.auth().unwrap().state(), AuthState::default());
}

#[tokio::test]
async fn test_failed_exchange_leaves_state_and_skips_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_ENDPOINT))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({"error": "invalid_grant"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/data"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let client = authenticated_client(&server, RetryPolicy::default());
    let err = client.get("/v1/data", RequestOptions::new()).await.unwrap_err();

    match err {
        Error::Authentication { response, .. } => {
            assert!(response.unwrap().contains("invalid_grant"));
        }
        other => panic!("expected authentication error, got {other:?}"),
    }
    assert_eq!(client.auth().unwrap().state(), AuthState::default());
}

#[tokio::test]
async fn test_concurrent_requests_share_one_exchange() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_ENDPOINT))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(token_body("shared", 3600))
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/data"))
        .and(header("authorization", "Bearer shared"))
        .respond_with(ResponseTemplate::new(200))
        .expect(8)
        .mount(&server)
        .await;

    let client = Arc::new(authenticated_client(&server, RetryPolicy::default()));
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let client = Arc::clone(&client);
            tokio::spawn(async move { client.get("/v1/data", RequestOptions::new()).await })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap().status(), 200);
    }
}

#[tokio::test]
async fn test_expired_token_is_refreshed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_ENDPOINT))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("short", 1)))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/data"))
        .respond_with(ResponseTemplate::new(200))
        .expect(2)
        .mount(&server)
        .await;

    let client = authenticated_client(&server, RetryPolicy::default());
    client.get("/v1/data", RequestOptions::new()).await.unwrap();

    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert!(client.auth().unwrap().is_expired());

    client.get("/v1/data", RequestOptions::new()).await.unwrap();
}

#[tokio::test]
async fn test_post_payloads_and_query_params() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/search"))
        .and(query_param("page", "2"))
        .and(body_json(json!({"term": "rust"})))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/login"))
        .and(header("content-type", "application/x-www-form-urlencoded"))
        .and(body_string_contains("user=me"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let client = anonymous_client(&server, RetryPolicy::default());

    let created = client
        .post(
            "/v1/search",
            RequestOptions::new()
                .param("page", "2")
                .payload(Payload::json(json!({"term": "rust"}))),
        )
        .await
        .unwrap();
    assert_eq!(created.status(), 201);

    client
        .post("/v1/login", RequestOptions::new().payload(Payload::form([("user", "me")])))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_explicit_refresh_with_overrides() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_ENDPOINT))
        .and(header("x-device", "tv"))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("renewed", 600)))
        .expect(1)
        .mount(&server)
        .await;

    let client = authenticated_client(&server, RetryPolicy::default());
    let auth = client.auth().unwrap();
    let transport = transport(RetryPolicy::default());

    let token = auth
        .refresh(
            transport.as_ref(),
            Some(&headers(json!({"X-Device": "tv"}))),
            Some(&headers(json!({"grant_type": "refresh_token"}))),
        )
        .await
        .unwrap();

    assert_eq!(token.access_token, "renewed");
    assert_eq!(auth.authorization_header_value().as_deref(), Some("Bearer renewed"));
}

#[tokio::test]
async fn test_post_is_not_replayed_on_retry_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/order"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let client = anonymous_client(&server, fast_retry(15));
    let response = client.post("/v1/order", RequestOptions::new()).await.unwrap();

    assert_eq!(response.status(), 503);
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_token_exchange_is_not_replayed_on_retry_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_ENDPOINT))
        .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
        .expect(1)
        .mount(&server)
        .await;

    let client = authenticated_client(&server, fast_retry(15));
    let err = client.get("/v1/data", RequestOptions::new()).await.unwrap_err();
    assert!(matches!(err, Error::Authentication { .. }), "unexpected error: {err:?}");
}

#[tokio::test]
async fn test_out_of_range_expires_in_is_an_authentication_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_ENDPOINT))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "abc",
            "expires_in": 1e15,
            "token_type": "Bearer",
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/data"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let client = authenticated_client(&server, RetryPolicy::default());
    let err = client.get("/v1/data", RequestOptions::new()).await.unwrap_err();

    assert!(matches!(err, Error::Authentication { .. }), "unexpected error: {err:?}");
    assert_eq!(client.auth().unwrap().state(), AuthState::default());
}
