//! Session error taxonomy
//!
//! Session-fatal failures ([`RefreshError`]) are handled inside the session
//! by a forced logout; callers only ever see them wrapped in
//! [`GatewayError::SessionExpired`]. Request-scoped failures are returned to
//! the immediate caller.

use crate::client::error::ClientError;
use thiserror::Error;

/// Message shown when login fails without a backend-provided detail
pub const LOGIN_FALLBACK_MESSAGE: &str = "Login failed. Please try again.";

/// The refresh token could not mint a new access token
///
/// Cloned to every caller coalesced onto the same refresh.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RefreshError {
    #[error("no refresh token available")]
    MissingRefreshToken,

    #[error("refresh token is expired or unreadable")]
    RefreshTokenExpired,

    #[error("refresh rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("refresh response carried no usable access token")]
    InvalidResponse,

    #[error("refresh request failed: {0}")]
    Transport(String),

    #[error("refresh was superseded by a logout or a new login")]
    Superseded,

    #[error("refresh task aborted: {0}")]
    Aborted(String),
}

impl From<ClientError> for RefreshError {
    fn from(err: ClientError) -> Self {
        match err.status() {
            Some(status) if !matches!(err, ClientError::Request(_)) => Self::Rejected {
                status,
                message: err.message().unwrap_or_default().to_string(),
            },
            _ => Self::Transport(err.to_string()),
        }
    }
}

/// Login did not establish a session; the prior session is untouched
#[derive(Debug, Error)]
pub enum LoginError {
    #[error("Email and password are required")]
    MissingCredentials,

    /// Backend rejected the credentials; carries its `detail` verbatim
    #[error("{message}")]
    Rejected { status: u16, message: String },

    #[error("Invalid response from server")]
    InvalidResponse,

    #[error("Login failed. Please try again.")]
    Transport(#[source] ClientError),
}

impl LoginError {
    /// Message suitable for display next to the login form
    pub fn user_message(&self) -> String {
        self.to_string()
    }
}

impl From<ClientError> for LoginError {
    fn from(err: ClientError) -> Self {
        let status = match err.status() {
            Some(status) if !matches!(err, ClientError::Request(_)) => status,
            _ => return Self::Transport(err),
        };
        Self::Rejected {
            status,
            message: err
                .detail()
                .unwrap_or_else(|| LOGIN_FALLBACK_MESSAGE.to_string()),
        }
    }
}

/// A request sent through the gateway failed
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Ordinary request failure
    #[error(transparent)]
    Client(#[from] ClientError),

    /// The request failed again after a successful refresh and one retry
    #[error("request failed after token refresh: {0}")]
    RetryExhausted(#[source] ClientError),

    /// The session could not be renewed and has been logged out
    #[error("session expired: {0}")]
    SessionExpired(#[source] RefreshError),
}

impl GatewayError {
    /// The underlying client error for request-scoped failures
    pub fn client_error(&self) -> Option<&ClientError> {
        match self {
            Self::Client(err) | Self::RetryExhausted(err) => Some(err),
            Self::SessionExpired(_) => None,
        }
    }

    pub fn status(&self) -> Option<u16> {
        self.client_error().and_then(ClientError::status)
    }
}
