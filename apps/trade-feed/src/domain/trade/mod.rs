//! Trade Events
//!
//! The pushed trade event and its side. Events are only ever produced by the
//! decoder in [`decode`], so every `TradeEvent` in the system has already
//! passed validation.

mod decode;

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub use decode::{DecodeError, DecodeFailure, decode_trade};
pub(crate) use decode::parse_instant;

/// Topic carrying executed trades.
pub const TRADES_TOPIC: &str = "trades";

/// Side of a trade or order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    /// Buy side.
    Buy,
    /// Sell side.
    Sell,
}

impl Side {
    /// Parse the wire representation (`BUY` / `SELL`).
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "BUY" => Some(Self::Buy),
            "SELL" => Some(Self::Sell),
            _ => None,
        }
    }

    /// Wire representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A trade pushed on the trades topic.
///
/// Immutable after decoding. Every listener receives its own clone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TradeEvent {
    id: String,
    ticker: String,
    #[serde(with = "rust_decimal::serde::float")]
    price: Decimal,
    quantity: u64,
    #[serde(rename = "type")]
    side: Side,
    timestamp: DateTime<Utc>,
}

impl TradeEvent {
    /// Trade identifier as sent by the backend.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Instrument ticker.
    #[must_use]
    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    /// Execution price, always positive.
    #[must_use]
    pub const fn price(&self) -> Decimal {
        self.price
    }

    /// Executed quantity, always positive.
    #[must_use]
    pub const fn quantity(&self) -> u64 {
        self.quantity
    }

    /// Aggressor side.
    #[must_use]
    pub const fn side(&self) -> Side {
        self.side
    }

    /// Execution time.
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Notional value (`price * quantity`).
    #[must_use]
    pub fn notional(&self) -> Decimal {
        self.price * Decimal::from(self.quantity)
    }
}
