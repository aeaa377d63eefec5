//! Port Interfaces
//!
//! Contracts the application layer depends on. Infrastructure adapters
//! implement them.
//!
//! ## Driven Ports (Outbound)
//!
//! - [`TradingApi`]: authoritative account data and order entry over REST
//!
//! The push transport's port, [`TopicTransport`], lives next to the registry
//! it serves.
//!
//! [`TopicTransport`]: crate::domain::subscription::TopicTransport

use async_trait::async_trait;

use crate::domain::account::{Order, OrderId, Portfolio, Trade, TradeOrder, TradeResponse, UserId};

/// Errors returned by the trading API.
///
/// All of them are recoverable: consumers surface them and let the user
/// retry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// Connection could not be established or was reset.
    #[error("network error: {message}")]
    Network {
        /// Error details.
        message: String,
    },

    /// The request exceeded the configured timeout.
    #[error("request timed out")]
    Timeout,

    /// The backend rejected the credentials (HTTP 401).
    #[error("unauthorized")]
    Unauthorized,

    /// Any other non-success status.
    #[error("HTTP {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, possibly truncated.
        body: String,
    },

    /// The response body did not match the expected shape.
    #[error("failed to decode response: {message}")]
    Decode {
        /// Error details.
        message: String,
    },

    /// The request could not be built.
    #[error("invalid request: {message}")]
    InvalidRequest {
        /// Error details.
        message: String,
    },
}

/// Port for the trading backend's REST API.
///
/// Implementations perform exactly one request per call and never retry.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TradingApi: Send + Sync {
    /// `GET /api/portfolio/{userId}`.
    async fn portfolio(&self, user: UserId) -> Result<Portfolio, ApiError>;

    /// `GET /api/orders/pending/{userId}`.
    async fn pending_orders(&self, user: UserId) -> Result<Vec<Order>, ApiError>;

    /// `GET /api/orders/history/{userId}`.
    async fn history(&self, user: UserId) -> Result<Vec<Trade>, ApiError>;

    /// `POST /trade`.
    async fn place_order(&self, order: &TradeOrder) -> Result<TradeResponse, ApiError>;

    /// `DELETE /api/orders/{orderId}`.
    async fn cancel_order(&self, order: OrderId) -> Result<(), ApiError>;
}
