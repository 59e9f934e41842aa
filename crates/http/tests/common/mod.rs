//! Shared fixtures for session integration tests

#![allow(dead_code)]

use campus_core::ClientConfig;
use campus_http::session::{MemoryTokenStorage, RecordingNavigator, Session};
use chrono::Utc;
use jsonwebtoken::{EncodingKey, Header, encode};
use serde_json::{Value, json};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use wiremock::MockServer;

static JTI: AtomicU64 = AtomicU64::new(1);

pub const ONE_HOUR: i64 = 3600;
pub const ONE_WEEK: i64 = 7 * 24 * 3600;

/// Mint a backend-style JWT expiring `ttl_secs` from now
pub fn jwt(user_id: u64, ttl_secs: i64, token_type: &str) -> String {
    let claims = json!({
        "token_type": token_type,
        "exp": Utc::now().timestamp() + ttl_secs,
        "iat": Utc::now().timestamp(),
        "jti": JTI.fetch_add(1, Ordering::SeqCst).to_string(),
        "user_id": user_id,
    });
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(b"campus-test-secret"),
    )
    .unwrap()
}

/// Access token with a raw `exp` claim, for expiries `jwt` cannot express
pub fn access_expiring_at(exp: f64) -> String {
    let claims = json!({
        "token_type": "access",
        "exp": exp,
        "jti": JTI.fetch_add(1, Ordering::SeqCst).to_string(),
        "user_id": 7,
    });
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(b"campus-test-secret"),
    )
    .unwrap()
}

pub fn access(ttl_secs: i64) -> String {
    jwt(7, ttl_secs, "access")
}

pub fn refresh() -> String {
    jwt(7, ONE_WEEK, "refresh")
}

pub fn token_not_valid() -> Value {
    json!({
        "detail": "Given token not valid for any token type",
        "code": "token_not_valid",
        "messages": [{"token_class": "AccessToken", "token_type": "access", "message": "Token is invalid or expired"}]
    })
}

pub fn config(server: &MockServer) -> ClientConfig {
    let mut config = ClientConfig::default();
    config.api.base_url = server.uri();
    config.api.timeout_secs = 5;
    config.api.refresh_timeout_secs = 5;
    config.api.login_timeout_secs = 5;
    config
}

pub struct Harness {
    pub session: Session,
    pub storage: Arc<MemoryTokenStorage>,
    pub navigator: Arc<RecordingNavigator>,
}

pub fn harness(config: ClientConfig, storage: MemoryTokenStorage) -> Harness {
    init_tracing();
    let storage = Arc::new(storage);
    let navigator = Arc::new(RecordingNavigator::new());
    let session = Session::new(config, storage.clone(), navigator.clone()).unwrap();
    Harness {
        session,
        storage,
        navigator,
    }
}

/// Poll `condition` until it holds or `limit` elapses
pub async fn eventually<F, Fut>(limit: Duration, mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if condition().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    condition().await
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("campus_http=debug")
        .with_test_writer()
        .try_init();
}
