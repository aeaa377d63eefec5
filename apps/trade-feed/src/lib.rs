#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! Trade Feed - Live Trade Stream Client
//!
//! Holds one STOMP-over-WebSocket connection to the trading backend, fans the
//! trade topic out to local consumers, and keeps each consumer's REST-backed
//! state fresh with coalesced, sequence-guarded re-fetches.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Pure types and state machines
//!   - `trade`: Trade events and the frame body decoder
//!   - `connection`: Connection lifecycle with its two retry regimes
//!   - `subscription`: Topic registry with reference-counted subscriptions
//!   - `feed`: Bounded newest-first buffer
//!   - `refresh`: Sequence numbers for coalesced refreshes
//!   - `account`: Portfolio, orders, and trade history
//!
//! - **Application**: Consumers and port definitions
//!   - `ports`: The trading REST API
//!   - `services`: Refresh coordinator, feed, portfolio, orders, order entry
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `stomp`: Frame codec, heart-beats, retry, connection manager
//!   - `http`: REST client
//!   - `config`: Environment configuration
//!   - `status`: Health, feed, and metrics endpoint
//!   - `metrics`, `telemetry`: Prometheus and tracing setup
//!
//! # Data Flow
//!
//! ```text
//!                        ┌──────────────────┐
//! Backend STOMP /ws ────►│ ConnectionManager│
//!                        └────────┬─────────┘
//!                                 │ decode
//!                        ┌────────▼─────────┐     ┌──────────────┐
//!                        │   Subscription   │────►│  TradeFeed   │
//!                        │     Registry     │     └──────────────┘
//!                        └────────┬─────────┘
//!                                 │ invalidate
//!                  ┌──────────────┴──────────────┐
//!           ┌──────▼───────┐              ┌──────▼───────┐
//!           │PortfolioView │              │  OrdersView  │
//!           └──────┬───────┘              └──────┬───────┘
//!                  └──────────► REST API ◄───────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Trade events and state machines with no I/O.
pub mod domain;

/// Application layer - Consumers and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::account::{OrderId, UserId};
pub use domain::connection::ConnectionState;
pub use domain::feed::{FEED_CAPACITY, FeedBuffer};
pub use domain::subscription::{SubscriptionRegistry, SubscriptionStats, Unsubscribe};
pub use domain::trade::{DecodeError, Side, TRADES_TOPIC, TradeEvent, decode_trade};

// Consumers
pub use application::ports::{ApiError, TradingApi};
pub use application::services::{OrderEntry, OrdersView, PortfolioView, TradeFeed};

// Push transport
pub use infrastructure::stomp::{ConnectionConfig, ConnectionManager};

// REST client
pub use infrastructure::http::{HttpConfig, HttpTradingApi};

// Configuration
pub use infrastructure::config::{ConfigError, DashboardConfig};

// Status server
pub use infrastructure::status::{StatusServer, StatusServerError, StatusState};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
