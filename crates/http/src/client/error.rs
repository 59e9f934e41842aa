//! Client error types

use crate::types::ApiErrorBody;
use thiserror::Error;

/// Error code the backend puts on a 401 when the bearer token is expired or
/// otherwise rejected.
pub const TOKEN_NOT_VALID: &str = "token_not_valid";

/// Client error types
#[derive(Debug, Error)]
pub enum ClientError {
    /// Network, timeout or request construction error
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Server returned an error status
    #[error("Server error {status}: {message}")]
    ServerError { status: u16, message: String },

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Resource not found
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Bad request
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Forbidden
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Configuration(String),
}

impl ClientError {
    /// Create error from HTTP status code
    pub fn from_status(status: reqwest::StatusCode, message: String) -> Self {
        match status.as_u16() {
            400 => Self::BadRequest(message),
            401 => Self::AuthenticationFailed(message),
            403 => Self::Forbidden(message),
            404 => Self::NotFound(message),
            _ => Self::ServerError {
                status: status.as_u16(),
                message,
            },
        }
    }

    /// HTTP status carried by the error, if the server answered
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::BadRequest(_) => Some(400),
            Self::AuthenticationFailed(_) => Some(401),
            Self::Forbidden(_) => Some(403),
            Self::NotFound(_) => Some(404),
            Self::ServerError { status, .. } => Some(*status),
            Self::Request(err) => err.status().map(|s| s.as_u16()),
            Self::Serialization(_) | Self::Configuration(_) => None,
        }
    }

    /// Raw response body for status errors
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::BadRequest(message)
            | Self::AuthenticationFailed(message)
            | Self::Forbidden(message)
            | Self::NotFound(message)
            | Self::ServerError { message, .. } => Some(message),
            _ => None,
        }
    }

    /// The backend's human-readable `detail`, when the body carries one
    pub fn detail(&self) -> Option<String> {
        self.message()
            .and_then(ApiErrorBody::parse)
            .and_then(|body| body.detail)
    }

    /// True for a 401 whose body carries the invalid-token code
    pub fn is_token_invalid(&self) -> bool {
        match self {
            Self::AuthenticationFailed(message) => ApiErrorBody::parse(message)
                .and_then(|body| body.code)
                .is_some_and(|code| code == TOKEN_NOT_VALID),
            _ => false,
        }
    }

    /// True when the request timed out before a response arrived
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Request(err) if err.is_timeout())
    }
}
