//! Domain Layer - Trade events, connection lifecycle, and consumer state.
//!
//! Everything here is synchronous and transport-agnostic. The session task,
//! the REST client, and the status server live in the infrastructure layer.

/// Trade events and the frame body decoder.
pub mod trade;

/// Connection lifecycle state machine.
pub mod connection;

/// Topic subscriptions and fan-out.
pub mod subscription;

/// Bounded newest-first trade feed.
pub mod feed;

/// Refresh sequencing for consumer state.
pub mod refresh;

/// Account data returned by the REST boundary.
pub mod account;
