//! Bender Common - Shared types and configuration for the Bender relay.
//!
//! This crate provides:
//! - Configuration types, loading and validation
//! - The service-wide error taxonomy and its HTTP status mapping
//! - Logging setup

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod logging;

pub use config::{ApiConfig, ClaudeConfig, Config, ObservabilityConfig, SlackConfig};
pub use error::{Error, Result};

/// Re-export commonly used types for convenience
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{Error, Result};
    pub use crate::logging::init_logging;
}
