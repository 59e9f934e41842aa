//! Campus delivery client session layer
//!
//! A thin REST client for the campus backend plus the session lifecycle
//! that keeps its bearer tokens fresh: token decoding, durable token
//! storage, proactive refresh, and retry-once on an invalid token.

pub mod client;
pub mod session;
pub mod types;

pub use client::ApiClient;
pub use client::error::ClientError;
pub use session::{
    ApiRequest, Credentials, GatewayError, Identity, LoginError, LoginOutcome, RefreshError,
    Session, SessionSnapshot,
};
