//! Application Layer - Consumers and port definitions.
//!
//! Binds the domain's refresh sequencing and feed buffer to the trades topic
//! and to the trading API port.

/// Port interfaces for external systems.
pub mod ports;

/// Consumers: refresh coordinator, trade feed, portfolio and order views.
pub mod services;
