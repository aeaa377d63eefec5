//! Trade Event Decoder
//!
//! Turns the JSON body of a pushed frame into a [`TradeEvent`], or rejects it
//! with a typed reason. A rejected body is a single dropped event; it never
//! affects the connection.
//!
//! # Wire Format
//!
//! ```json
//! {"id":"1","ticker":"AAPL","price":178.52,"quantity":150,"type":"BUY","timestamp":"2024-01-01T00:00:00Z"}
//! ```
//!
//! The backend serializes numeric ids and local date-times without an offset,
//! so both are accepted: an integer `id` becomes its decimal string and a
//! naive timestamp is read as UTC.

use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Number, Value};

use super::{Side, TradeEvent};

/// Why a frame body was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeFailure {
    /// Body is not valid JSON.
    #[error("malformed JSON: {0}")]
    MalformedJson(String),

    /// Body is valid JSON but not an object.
    #[error("expected a JSON object")]
    NotAnObject,

    /// A required field is absent or null.
    #[error("missing field `{0}`")]
    MissingField(&'static str),

    /// A field has the wrong JSON type.
    #[error("field `{field}` must be {expected}")]
    WrongType {
        /// Field name.
        field: &'static str,
        /// Expected type description.
        expected: &'static str,
    },

    /// Ticker is empty or whitespace.
    #[error("ticker must not be empty")]
    EmptyTicker,

    /// Price is zero or negative.
    #[error("price must be positive, got {0}")]
    NonPositivePrice(String),

    /// Quantity is zero or negative.
    #[error("quantity must be positive, got {0}")]
    NonPositiveQuantity(i64),

    /// Side is not `BUY` or `SELL`.
    #[error("unknown side `{0}`")]
    UnknownSide(String),

    /// Timestamp is not ISO-8601.
    #[error("invalid timestamp `{0}`")]
    InvalidTimestamp(String),
}

/// A rejected frame body, kept for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{reason}")]
pub struct DecodeError {
    raw: String,
    reason: DecodeFailure,
}

impl DecodeError {
    fn new(raw: &str, reason: DecodeFailure) -> Self {
        Self {
            raw: raw.to_string(),
            reason,
        }
    }

    /// The body exactly as received.
    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// The rejection reason.
    #[must_use]
    pub const fn reason(&self) -> &DecodeFailure {
        &self.reason
    }

    /// The raw body shortened for log lines.
    #[must_use]
    pub fn preview(&self) -> String {
        const MAX_CHARS: usize = 120;
        let mut preview: String = self.raw.chars().take(MAX_CHARS).collect();
        if self.raw.chars().count() > MAX_CHARS {
            preview.push_str("...");
        }
        preview
    }
}

/// Decode a frame body into a trade event.
///
/// # Errors
///
/// Returns [`DecodeError`] with the raw body if any field is missing, has the
/// wrong type, or fails validation.
pub fn decode_trade(body: &str) -> Result<TradeEvent, DecodeError> {
    parse(body).map_err(|reason| DecodeError::new(body, reason))
}

fn parse(body: &str) -> Result<TradeEvent, DecodeFailure> {
    let value: Value =
        serde_json::from_str(body).map_err(|e| DecodeFailure::MalformedJson(e.to_string()))?;
    if !value.is_object() {
        return Err(DecodeFailure::NotAnObject);
    }
    let raw: RawTrade =
        serde_json::from_value(value).map_err(|e| DecodeFailure::MalformedJson(e.to_string()))?;
    TradeEvent::try_from(raw)
}

// =============================================================================
// Wire Shape
// =============================================================================

/// Trade body as pushed. Fields stay untyped here so each one can be
/// rejected with its own reason.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawTrade {
    id: Option<Value>,
    ticker: Option<Value>,
    price: Option<Value>,
    quantity: Option<Value>,
    #[serde(rename = "type")]
    side: Option<Value>,
    timestamp: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(u64),
}

impl TryFrom<RawTrade> for TradeEvent {
    type Error = DecodeFailure;

    fn try_from(raw: RawTrade) -> Result<Self, Self::Error> {
        let id = match field::<RawId>(raw.id, "id", ID_EXPECTED)? {
            RawId::Text(id) if !id.is_empty() => id,
            RawId::Text(_) => {
                return Err(DecodeFailure::WrongType {
                    field: "id",
                    expected: ID_EXPECTED,
                });
            }
            RawId::Number(id) => id.to_string(),
        };

        let ticker = field::<String>(raw.ticker, "ticker", "a string")?;
        let ticker = ticker.trim();
        if ticker.is_empty() {
            return Err(DecodeFailure::EmptyTicker);
        }

        let price = positive_price(field(raw.price, "price", "a number")?)?;
        let quantity = positive_quantity(field(raw.quantity, "quantity", "an integer")?)?;

        let side = field::<String>(raw.side, "type", "a string")?;
        let side = Side::parse(&side).ok_or(DecodeFailure::UnknownSide(side))?;

        let timestamp = field::<String>(raw.timestamp, "timestamp", "an ISO-8601 string")?;
        let timestamp =
            parse_instant(&timestamp).ok_or(DecodeFailure::InvalidTimestamp(timestamp))?;

        Ok(Self {
            id,
            ticker: ticker.to_string(),
            price,
            quantity,
            side,
            timestamp,
        })
    }
}

const ID_EXPECTED: &str = "a non-empty string or non-negative integer";

/// Deserialize one required field.
fn field<T: DeserializeOwned>(
    value: Option<Value>,
    name: &'static str,
    expected: &'static str,
) -> Result<T, DecodeFailure> {
    let value = value.ok_or(DecodeFailure::MissingField(name))?;
    serde_json::from_value(value).map_err(|_| DecodeFailure::WrongType {
        field: name,
        expected,
    })
}

fn positive_price(number: Number) -> Result<Decimal, DecodeFailure> {
    // Going through the textual form keeps 178.52 exact instead of the
    // nearest binary double.
    let text = number.to_string();
    let price = Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map_err(|_| DecodeFailure::WrongType {
            field: "price",
            expected: "a number",
        })?;

    if price <= Decimal::ZERO {
        return Err(DecodeFailure::NonPositivePrice(text));
    }
    Ok(price)
}

fn positive_quantity(number: Number) -> Result<u64, DecodeFailure> {
    match (number.as_u64(), number.as_i64()) {
        (Some(0), _) => Err(DecodeFailure::NonPositiveQuantity(0)),
        (Some(quantity), _) => Ok(quantity),
        (None, Some(negative)) => Err(DecodeFailure::NonPositiveQuantity(negative)),
        (None, None) => Err(DecodeFailure::WrongType {
            field: "quantity",
            expected: "an integer",
        }),
    }
}

/// Parse an RFC 3339 instant, or a naive ISO-8601 date-time read as UTC.
pub(crate) fn parse_instant(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(instant) = DateTime::parse_from_rfc3339(raw) {
        return Some(instant.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}
