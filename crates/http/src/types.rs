//! Wire types for the backend endpoints the session client consumes

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// `POST /api/login/` request body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// `POST /api/login/` response body
///
/// Both tokens are optional on the wire so that a partial payload can be
/// reported as an invalid response instead of a deserialization failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoginResponse {
    #[serde(default)]
    pub access: Option<String>,
    #[serde(default)]
    pub refresh: Option<String>,
    #[serde(default)]
    pub user: Option<UserProfile>,
}

/// `POST /api/token/refresh/` request body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshRequest {
    pub refresh: String,
}

/// `POST /api/token/refresh/` response body
///
/// `refresh` is only present when the backend rotates refresh tokens.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RefreshResponse {
    #[serde(default)]
    pub access: Option<String>,
    #[serde(default)]
    pub refresh: Option<String>,
}

/// User profile as returned by `/api/profile/` and the login payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub id: Option<JsonValue>,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub is_approved: Option<bool>,
    #[serde(default)]
    pub location: Option<String>,
    /// Addresses, payment methods and anything else the backend adds
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

/// Error body shape used by the backend
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiErrorBody {
    /// Human-readable message
    #[serde(default)]
    pub detail: Option<String>,
    /// Machine-readable code, e.g. `token_not_valid`
    #[serde(default)]
    pub code: Option<String>,
}

impl ApiErrorBody {
    /// Parse an error body, returning `None` when it is not JSON
    pub fn parse(body: &str) -> Option<Self> {
        serde_json::from_str(body).ok()
    }
}
