//! Account Types
//!
//! Authoritative data served by the trading backend's REST API. These are
//! what the refresh coordinators fetch; pushed trade events only signal that
//! they may be stale.
//!
//! Field names follow the backend's camelCase JSON. Prices are JSON numbers.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};

use crate::domain::trade::{Side, parse_instant};

// =============================================================================
// Identifiers
// =============================================================================

/// Backend user identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(u64);

impl UserId {
    /// Wrap a raw id.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Raw id.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Backend order identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(u64);

impl OrderId {
    /// Wrap a raw id.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Raw id.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Portfolio
// =============================================================================

/// One position in a portfolio.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Holding {
    /// Instrument ticker.
    pub ticker: String,
    /// Shares held.
    pub quantity: i64,
    /// Average acquisition price.
    #[serde(with = "rust_decimal::serde::float")]
    pub avg_price: Decimal,
    /// Last traded price, or the average price when none is known.
    #[serde(with = "rust_decimal::serde::float")]
    pub current_price: Decimal,
}

impl Holding {
    /// Position value at the current price.
    #[must_use]
    pub fn market_value(&self) -> Decimal {
        self.current_price * Decimal::from(self.quantity)
    }

    /// Unrealized profit or loss against the average price.
    #[must_use]
    pub fn unrealized_pnl(&self) -> Decimal {
        (self.current_price - self.avg_price) * Decimal::from(self.quantity)
    }
}

/// A user's cash balance and positions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Portfolio {
    /// Owner.
    pub id: UserId,
    /// Display name.
    pub username: String,
    /// Cash balance.
    #[serde(with = "rust_decimal::serde::float")]
    pub balance: Decimal,
    /// Open positions.
    #[serde(default)]
    pub holdings: Vec<Holding>,
}

impl Portfolio {
    /// Sum of all positions at current prices.
    #[must_use]
    pub fn holdings_value(&self) -> Decimal {
        self.holdings.iter().map(Holding::market_value).sum()
    }

    /// Cash plus positions.
    #[must_use]
    pub fn total_value(&self) -> Decimal {
        self.balance + self.holdings_value()
    }
}

// =============================================================================
// Orders and Trades
// =============================================================================

/// Lifecycle status of a resting order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Resting on the book.
    Pending,
    /// Partially executed.
    PartiallyFilled,
    /// Fully executed.
    Filled,
    /// Cancelled by the user.
    Cancelled,
    /// Any status this client does not know.
    #[serde(other)]
    Unknown,
}

/// An order as returned by the pending-orders endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    /// Order id, used for cancellation.
    pub id: OrderId,
    /// Owner, when the backend includes it.
    #[serde(default)]
    pub user_id: Option<UserId>,
    /// Instrument ticker.
    pub ticker: String,
    /// Limit price.
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    /// Order quantity.
    pub quantity: u64,
    /// Order side.
    #[serde(rename = "type")]
    pub side: Side,
    /// Status, when the backend includes it.
    #[serde(default)]
    pub status: Option<OrderStatus>,
}

/// An executed trade as returned by the history endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trade {
    /// Trade id.
    pub id: u64,
    /// Instrument ticker.
    pub ticker: String,
    /// Execution price.
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    /// Executed quantity.
    pub quantity: u64,
    /// Buying user, when known.
    #[serde(default)]
    pub buyer_id: Option<UserId>,
    /// Selling user, when known.
    #[serde(default)]
    pub seller_id: Option<UserId>,
    /// Execution time. Offsetless timestamps are read as UTC.
    #[serde(deserialize_with = "instant")]
    pub timestamp: DateTime<Utc>,
}

impl Trade {
    /// The side `user` took in this trade, if they took part.
    #[must_use]
    pub fn side_for(&self, user: UserId) -> Option<Side> {
        if self.buyer_id == Some(user) {
            Some(Side::Buy)
        } else if self.seller_id == Some(user) {
            Some(Side::Sell)
        } else {
            None
        }
    }
}

/// Pending orders and trade history fetched together.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OrderBook {
    /// Orders still resting.
    pub pending: Vec<Order>,
    /// Executed trades, as ordered by the backend.
    pub history: Vec<Trade>,
}

// =============================================================================
// Order Entry
// =============================================================================

/// Order submission body for `POST /trade`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeOrder {
    /// Instrument ticker.
    pub ticker: String,
    /// Limit price.
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    /// Quantity.
    pub quantity: u64,
    /// Side.
    #[serde(rename = "type")]
    pub side: Side,
    /// Submitting user.
    pub user_id: UserId,
}

impl TradeOrder {
    /// Build an order for `user`.
    #[must_use]
    pub fn new(
        user_id: UserId,
        ticker: impl Into<String>,
        side: Side,
        price: Decimal,
        quantity: u64,
    ) -> Self {
        Self {
            ticker: ticker.into(),
            price,
            quantity,
            side,
            user_id,
        }
    }
}

/// Outcome of an order submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeStatus {
    /// Matched immediately.
    Executed,
    /// Accepted and resting or queued.
    Pending,
    /// Refused by the backend.
    Rejected,
}

/// Response to an order submission.
///
/// `id` and `timestamp` are absent when the backend only acknowledged
/// receipt without a structured body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeResponse {
    /// Backend order id, when returned.
    #[serde(default, deserialize_with = "lenient_id")]
    pub id: Option<String>,
    /// Instrument ticker.
    pub ticker: String,
    /// Price.
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    /// Quantity.
    pub quantity: u64,
    /// Side.
    #[serde(rename = "type")]
    pub side: Side,
    /// Submission time, when returned.
    #[serde(default, deserialize_with = "optional_instant")]
    pub timestamp: Option<DateTime<Utc>>,
    /// Submission outcome.
    pub status: TradeStatus,
}

impl TradeResponse {
    /// Acknowledgement for an order the backend queued without details.
    #[must_use]
    pub fn queued(order: &TradeOrder) -> Self {
        Self {
            id: None,
            ticker: order.ticker.clone(),
            price: order.price,
            quantity: order.quantity,
            side: order.side,
            timestamp: None,
            status: TradeStatus::Pending,
        }
    }
}

// =============================================================================
// Serde Helpers
// =============================================================================

fn instant<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_instant(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp `{raw}`")))
}

fn optional_instant<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        None => Ok(None),
        Some(raw) => parse_instant(&raw)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp `{raw}`"))),
    }
}

fn lenient_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(u64),
    }

    Ok(Option::<RawId>::deserialize(deserializer)?.map(|raw| match raw {
        RawId::Text(text) => text,
        RawId::Number(number) => number.to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use chrono::TimeZone;
    use serde_json::json;

    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn portfolio_from_backend_json() {
        let portfolio: Portfolio = serde_json::from_value(json!({
            "id": 1,
            "username": "trader1",
            "balance": 10000.5,
            "holdings": [
                {"ticker": "AAPL", "quantity": 10, "avgPrice": 150.5, "currentPrice": 160.25}
            ]
        }))
        .unwrap();

        assert_eq!(portfolio.id, UserId::new(1));
        assert_eq!(portfolio.balance, dec("10000.5"));
        assert_eq!(portfolio.holdings[0].avg_price, dec("150.5"));
        assert_eq!(portfolio.holdings_value(), dec("1602.5"));
        assert_eq!(portfolio.total_value(), dec("11603.0"));
        assert_eq!(portfolio.holdings[0].unrealized_pnl(), dec("97.5"));
    }

    #[test]
    fn portfolio_without_holdings() {
        let portfolio: Portfolio =
            serde_json::from_value(json!({"id": 2, "username": "bob", "balance": 0})).unwrap();
        assert!(portfolio.holdings.is_empty());
    }

    #[test]
    fn order_with_status() {
        let order: Order = serde_json::from_value(json!({
            "id": 42, "userId": 1, "ticker": "TSLA", "type": "SELL",
            "price": 250.0, "quantity": 5, "status": "PENDING"
        }))
        .unwrap();

        assert_eq!(order.id, OrderId::new(42));
        assert_eq!(order.side, Side::Sell);
        assert_eq!(order.status, Some(OrderStatus::Pending));
    }

    #[test]
    fn unknown_order_status_is_tolerated() {
        let order: Order = serde_json::from_value(json!({
            "id": 1, "ticker": "TSLA", "type": "BUY", "price": 1, "quantity": 1,
            "status": "EXPIRED"
        }))
        .unwrap();
        assert_eq!(order.status, Some(OrderStatus::Unknown));
    }

    #[test]
    fn trade_side_relative_to_user() {
        let trade: Trade = serde_json::from_value(json!({
            "id": 7, "ticker": "AAPL", "price": 178.5, "quantity": 3,
            "buyerId": 1, "sellerId": 2, "timestamp": "2024-01-01T09:30:00"
        }))
        .unwrap();

        assert_eq!(trade.side_for(UserId::new(1)), Some(Side::Buy));
        assert_eq!(trade.side_for(UserId::new(2)), Some(Side::Sell));
        assert_eq!(trade.side_for(UserId::new(3)), None);
        assert_eq!(
            trade.timestamp,
            Utc.with_ymd_and_hms(2024, 1, 1, 9, 30, 0).unwrap()
        );
    }

    #[test]
    fn trade_order_serializes_camel_case() {
        let order = TradeOrder::new(UserId::new(1), "AAPL", Side::Buy, dec("150.5"), 10);
        let body = serde_json::to_value(&order).unwrap();

        assert_eq!(
            body,
            json!({"ticker": "AAPL", "price": 150.5, "quantity": 10, "type": "BUY", "userId": 1})
        );
    }

    #[test]
    fn trade_response_accepts_numeric_id() {
        let response: TradeResponse = serde_json::from_value(json!({
            "id": 99, "ticker": "AAPL", "price": 150.5, "quantity": 10, "type": "BUY",
            "timestamp": "2024-01-01T00:00:00Z", "status": "EXECUTED"
        }))
        .unwrap();

        assert_eq!(response.id.as_deref(), Some("99"));
        assert_eq!(response.status, TradeStatus::Executed);
        assert!(response.timestamp.is_some());
    }

    #[test]
    fn queued_response_mirrors_order() {
        let order = TradeOrder::new(UserId::new(1), "MSFT", Side::Sell, dec("300"), 2);
        let response = TradeResponse::queued(&order);

        assert_eq!(response.status, TradeStatus::Pending);
        assert_eq!(response.ticker, "MSFT");
        assert_eq!(response.id, None);
    }
}
