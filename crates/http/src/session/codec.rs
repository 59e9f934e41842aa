//! Bearer token decoding
//!
//! Only the claims are read; signature verification is the backend's job.
//! Every helper here fails safe: a token that cannot be decoded, or that
//! carries no expiry, is treated as expired.

use base64::Engine;
use base64::alphabet::URL_SAFE;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use thiserror::Error;

const PAYLOAD_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Structural failure while decoding a token
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("token must have three dot-separated segments, found {0}")]
    Segments(usize),

    #[error("token payload is not valid base64url: {0}")]
    Base64(String),

    #[error("token payload is not a JSON claims object: {0}")]
    Json(String),
}

/// Claims carried by an access or refresh token
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// User id; the backend emits a number but strings are accepted
    #[serde(default)]
    pub user_id: Option<JsonValue>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    /// Expiry in seconds since the epoch
    #[serde(default)]
    pub exp: Option<f64>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub jti: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

impl Claims {
    /// The user id rendered as a string
    pub fn subject(&self) -> Option<String> {
        match self.user_id.as_ref()? {
            JsonValue::String(id) => Some(id.clone()),
            JsonValue::Null => None,
            other => Some(other.to_string()),
        }
    }

    /// Expiry in milliseconds since the epoch
    pub fn expiry_millis(&self) -> Option<i64> {
        let exp = self.exp?;
        if !exp.is_finite() {
            return None;
        }
        #[allow(clippy::cast_possible_truncation)]
        Some((exp * 1000.0) as i64)
    }
}

/// Decode the claims of `token`
pub fn decode(token: &str) -> Result<Claims, DecodeError> {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 {
        return Err(DecodeError::Segments(segments.len()));
    }

    let payload = PAYLOAD_ENGINE
        .decode(segments[1])
        .map_err(|e| DecodeError::Base64(e.to_string()))?;

    serde_json::from_slice(&payload).map_err(|e| DecodeError::Json(e.to_string()))
}

/// Expiry of `token` in milliseconds since the epoch
pub fn expiry_millis(token: &str) -> Option<i64> {
    decode(token).ok()?.expiry_millis()
}

/// True unless `token` decodes, carries an expiry, and that expiry is after
/// `now_millis`
pub fn is_expired(token: &str, now_millis: i64) -> bool {
    expiry_millis(token).is_none_or(|expiry| expiry <= now_millis)
}

/// Current wall-clock time in milliseconds since the epoch
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
