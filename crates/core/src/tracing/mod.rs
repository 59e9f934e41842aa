//! Shared tracing setup
//!
//! Library code only emits events through `tracing` macros; applications
//! embedding the session client call [`init_tracing`] once at startup.

pub mod config;
pub mod init;

pub use config::{InstrumentationConfig, LogFormat};
pub use init::{init_default, init_tracing};
