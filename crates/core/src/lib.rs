//! Campus session client core types and utilities

pub mod config;
pub mod error;
#[cfg(feature = "tracing")]
pub mod tracing;

pub use config::{ApiConfig, ClientConfig, RouteConfig, SessionConfig};
pub use error::{CoreError, CoreResult, ErrorContext};
