//! Integration tests for the campus HTTP client

use campus_http::client::{ApiClient, CSRF_HEADER, error::ClientError};
use campus_http::types::{LoginRequest, RefreshRequest};
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_client_builder() {
    let client = ApiClient::builder()
        .base_url("http://localhost:8000/")
        .csrf_token("csrf-abc")
        .build();

    assert!(client.is_ok());
    let client = client.unwrap();
    assert_eq!(client.base_url(), "http://localhost:8000");
}

#[tokio::test]
async fn test_client_builder_requires_base_url() {
    let result = ApiClient::builder().build();
    assert!(matches!(result, Err(ClientError::Configuration(_))));
}

#[tokio::test]
async fn test_login_endpoint() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/login/"))
        .and(header("content-type", "application/json"))
        .and(body_json(json!({"email": "ada@campus.edu", "password": "hunter2"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access": "A1",
            "refresh": "R1",
            "user": {"id": 4, "email": "ada@campus.edu", "role": "customer"}
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = ApiClient::new(mock_server.uri()).unwrap();
    let request = LoginRequest {
        email: "ada@campus.edu".to_string(),
        password: "hunter2".to_string(),
    };

    let response = client.login(&request, Duration::from_secs(5)).await.unwrap();
    assert_eq!(response.access.as_deref(), Some("A1"));
    assert_eq!(response.refresh.as_deref(), Some("R1"));
    assert_eq!(response.user.unwrap().role.as_deref(), Some("customer"));
}

#[tokio::test]
async fn test_csrf_header_on_unsafe_methods_only() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/token/refresh/"))
        .and(header(CSRF_HEADER, "csrf-abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access": "A2"})))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/profile/"))
        .and(header("authorization", "Bearer A2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 4})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = ApiClient::builder()
        .base_url(mock_server.uri())
        .csrf_token("csrf-abc")
        .build()
        .unwrap();

    let refreshed = client
        .refresh(
            &RefreshRequest {
                refresh: "R1".to_string(),
            },
            Duration::from_secs(5),
        )
        .await
        .unwrap();
    assert_eq!(refreshed.access.as_deref(), Some("A2"));
    assert!(refreshed.refresh.is_none());

    client.profile("A2").await.unwrap();

    let requests = mock_server.received_requests().await.unwrap();
    let profile = requests
        .iter()
        .find(|r| r.url.path() == "/api/profile/")
        .unwrap();
    assert!(!profile.headers.contains_key(CSRF_HEADER));
}

#[tokio::test]
async fn test_error_handling() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/login/"))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_json(json!({"detail": "No active account found with the given credentials"})),
        )
        .mount(&mock_server)
        .await;

    let client = ApiClient::new(mock_server.uri()).unwrap();
    let request = LoginRequest {
        email: "ada@campus.edu".to_string(),
        password: "wrong".to_string(),
    };

    let result = client.login(&request, Duration::from_secs(5)).await;
    let err = result.unwrap_err();
    assert!(matches!(err, ClientError::AuthenticationFailed(_)));
    assert_eq!(err.status(), Some(401));
    assert_eq!(
        err.detail().as_deref(),
        Some("No active account found with the given credentials")
    );
    assert!(!err.is_token_invalid());
}

#[tokio::test]
async fn test_timeout_is_reported_as_transport_failure() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/token/refresh/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"access": "A2"}))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&mock_server)
        .await;

    let client = ApiClient::new(mock_server.uri()).unwrap();
    let err = client
        .refresh(
            &RefreshRequest {
                refresh: "R1".to_string(),
            },
            Duration::from_millis(200),
        )
        .await
        .unwrap_err();

    assert!(err.is_timeout());
    assert_eq!(err.status(), None);
}
