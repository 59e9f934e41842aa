//! Authenticated request path
//!
//! Attaches the current bearer token and, when the backend rejects it as
//! invalid, refreshes once and replays the request once.

use super::error::{GatewayError, RefreshError};
use super::scheduler::RefreshScheduler;
use super::store::SessionStore;
use crate::client::ApiClient;
use crate::client::error::ClientError;
use reqwest::{Method, header};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Endpoints that never carry a bearer token: they exist to obtain or
/// verify credentials before one exists.
pub const PUBLIC_ENDPOINTS: &[&str] = &[
    "/api/login/",
    "/api/register/",
    "/api/token/",
    "/api/token/refresh/",
    "/api/send-verification-code/",
    "/api/verify-code/",
    "/api/set-password/",
];

/// True when `path` (query string ignored, trailing slash optional) is on
/// the public allow-list
pub fn is_public_endpoint(path: &str) -> bool {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    let trimmed = path.trim_end_matches('/');
    PUBLIC_ENDPOINTS
        .iter()
        .any(|endpoint| endpoint.trim_end_matches('/') == trimmed)
}

/// A replayable request description
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    body: Option<JsonValue>,
    timeout: Option<Duration>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            timeout: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Attach a JSON body
    pub fn json<B: Serialize>(mut self, body: &B) -> Result<Self, ClientError> {
        self.body = Some(serde_json::to_value(body)?);
        Ok(self)
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Override the client-wide timeout for this request
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub const fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

pub struct RequestGateway {
    client: ApiClient,
    store: Arc<SessionStore>,
    scheduler: Arc<RefreshScheduler>,
}

impl RequestGateway {
    pub fn new(client: ApiClient, store: Arc<SessionStore>, scheduler: Arc<RefreshScheduler>) -> Self {
        Self {
            client,
            store,
            scheduler,
        }
    }

    /// Send `request`, refreshing and retrying once on an invalid token
    ///
    /// Non-2xx responses become errors. A failure after the retry is
    /// [`GatewayError::RetryExhausted`]; if the backend still rejects the
    /// renewed token the session is also logged out.
    pub async fn send(&self, request: &ApiRequest) -> Result<reqwest::Response, GatewayError> {
        let public = is_public_endpoint(&request.path);
        let attached = if public { None } else { self.store.access_token() };

        let error = match self.attempt(request, attached.as_deref()).await {
            Ok(response) => return Ok(response),
            Err(error) => error,
        };

        if public || !error.is_token_invalid() {
            return Err(error.into());
        }

        let current = self.store.access_token();
        if current.is_some() && current != attached {
            // Another caller already renewed the token this request carried.
            debug!(method = %request.method, path = %request.path, "access token already renewed, retrying");
        } else {
            debug!(method = %request.method, path = %request.path, "access token rejected, refreshing");
            match self.scheduler.refresh_now().await {
                Ok(_) => {}
                // A login raced the refresh; its token is as good as a fresh one.
                Err(RefreshError::Superseded) if self.store.access_token().is_some() => {}
                Err(e) => return Err(GatewayError::SessionExpired(e)),
            }
        }

        let renewed = self.store.access_token();
        match self.attempt(request, renewed.as_deref()).await {
            Ok(response) => Ok(response),
            Err(error) => {
                if error.is_token_invalid() {
                    warn!(path = %request.path, "renewed token rejected as well");
                    self.scheduler.force_logout();
                }
                Err(GatewayError::RetryExhausted(error))
            }
        }
    }

    /// Send `request` and decode a JSON response
    pub async fn execute<T: DeserializeOwned>(&self, request: &ApiRequest) -> Result<T, GatewayError> {
        let response = self.send(request).await?;
        Ok(response.json().await.map_err(ClientError::from)?)
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, GatewayError> {
        self.execute(&ApiRequest::get(path)).await
    }

    pub async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, GatewayError> {
        self.execute(&ApiRequest::post(path).json(body)?).await
    }

    /// One round trip carrying `token`, if any, as the bearer
    async fn attempt(&self, request: &ApiRequest, token: Option<&str>) -> Result<reqwest::Response, ClientError> {
        let mut builder = self.client.request(request.method.clone(), &request.path);

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }

        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            let message = response.text().await.unwrap_or_else(|_| status.to_string());
            Err(ClientError::from_status(status, message))
        }
    }
}
