//! Configuration Module
//!
//! Environment-driven configuration for the client binary.

mod settings;

pub use settings::{ApiSettings, ConfigError, DashboardConfig, StompCredentials, StreamSettings};
