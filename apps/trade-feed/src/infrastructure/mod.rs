//! Infrastructure Layer - Adapters and external integrations.
//!
//! Concrete implementations of the ports defined in the domain and
//! application layers, plus the binary's ambient services.

/// Configuration loaded from the environment.
pub mod config;

/// REST client for the trading backend.
pub mod http;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// Status and metrics HTTP endpoint.
pub mod status;

/// STOMP-over-WebSocket push transport and connection manager.
pub mod stomp;

/// Logging and OpenTelemetry tracing.
pub mod telemetry;
