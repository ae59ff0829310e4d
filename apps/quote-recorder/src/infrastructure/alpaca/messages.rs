//! Alpaca WebSocket Message Types
//!
//! Wire format types for the stock market data stream. Only the frames the
//! recorder acts on are modelled in full: control messages and quotes.
//! Trades, bars and the other data types decode to [`AlpacaMessage::Ignored`].
//!
//! # References
//!
//! - [Stock Streaming](https://docs.alpaca.markets/docs/real-time-stock-pricing-data)

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

use crate::domain::quote::{QuoteError, QuoteObservation, Symbol};

// =============================================================================
// Inbound Messages (Server -> Client)
// =============================================================================

/// Decoded inbound frame element.
#[derive(Debug, Clone, PartialEq)]
pub enum AlpacaMessage {
    /// `{"T":"success",...}`
    Success(SuccessMessage),
    /// `{"T":"error",...}`
    Error(ErrorMessage),
    /// `{"T":"subscription",...}`
    Subscription(SubscriptionMessage),
    /// `{"T":"q",...}`
    StockQuote(StockQuoteMessage),
    /// Any other data type; carries the `T` tag.
    Ignored(String),
}

/// Success message indicating connection or authentication succeeded.
///
/// # Wire Format (JSON)
/// ```json
/// {"T": "success", "msg": "connected"}
/// {"T": "success", "msg": "authenticated"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuccessMessage {
    /// Message type (always "success")
    #[serde(rename = "T")]
    pub msg_type: String,

    /// "connected" or "authenticated"
    pub msg: SuccessKind,
}

/// Kind of success message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuccessKind {
    /// Initial connection established
    Connected,
    /// Authentication successful
    Authenticated,
}

/// Error message with code and description.
///
/// # Wire Format (JSON)
/// ```json
/// {"T": "error", "code": 402, "msg": "auth failed"}
/// ```
///
/// # Error Codes
/// - 400: Invalid syntax
/// - 401: Not authenticated
/// - 402: Auth failed
/// - 403: Already authenticated
/// - 404: Auth timeout
/// - 405: Symbol limit exceeded
/// - 406: Connection limit exceeded
/// - 407: Slow client
/// - 408: Insufficient subscription
/// - 409: Not allowed (internal)
/// - 500: Internal error
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorMessage {
    /// Message type (always "error")
    #[serde(rename = "T")]
    pub msg_type: String,

    /// Error code
    pub code: i32,

    /// Error message
    pub msg: String,
}

impl ErrorMessage {
    /// Authentication-related codes (401-404).
    #[must_use]
    pub const fn is_auth_error(&self) -> bool {
        matches!(self.code, 401..=404)
    }

    /// Codes after which the server drops the connection.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self.code, 401..=409 | 500)
    }
}

/// Subscription confirmation.
///
/// # Wire Format (JSON)
/// ```json
/// {"T": "subscription", "trades": [], "quotes": ["AAPL", "MSFT"], "bars": []}
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionMessage {
    /// Message type (always "subscription")
    #[serde(rename = "T")]
    pub msg_type: String,

    /// Subscribed quote symbols
    #[serde(default)]
    pub quotes: Vec<String>,

    /// Subscribed trade symbols
    #[serde(default)]
    pub trades: Vec<String>,

    /// Subscribed bar symbols
    #[serde(default)]
    pub bars: Vec<String>,
}

/// Real-time stock quote.
///
/// # Wire Format (JSON)
/// ```json
/// {
///   "T": "q",
///   "S": "AMD",
///   "bx": "U",
///   "bp": 87.66,
///   "bs": 1,
///   "ax": "Q",
///   "ap": 87.68,
///   "as": 4,
///   "t": "2021-02-22T15:51:45.335689322Z",
///   "c": ["R"],
///   "z": "C"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockQuoteMessage {
    /// Message type (always "q")
    #[serde(rename = "T")]
    pub msg_type: String,

    /// Ticker symbol
    #[serde(rename = "S")]
    pub symbol: String,

    /// Bid exchange code
    #[serde(rename = "bx", default)]
    pub bid_exchange: String,

    /// Bid price
    #[serde(rename = "bp")]
    pub bid_price: Decimal,

    /// Bid size (round lots)
    #[serde(rename = "bs")]
    pub bid_size: i64,

    /// Ask exchange code
    #[serde(rename = "ax", default)]
    pub ask_exchange: String,

    /// Ask price
    #[serde(rename = "ap", default)]
    pub ask_price: Decimal,

    /// Ask size (round lots)
    #[serde(rename = "as", default)]
    pub ask_size: i64,

    /// Quote timestamp (RFC-3339, nanosecond precision)
    #[serde(rename = "t")]
    pub timestamp: DateTime<Utc>,

    /// Quote condition codes
    #[serde(rename = "c", default)]
    pub conditions: Vec<String>,

    /// Tape
    #[serde(rename = "z", default)]
    pub tape: String,
}

impl StockQuoteMessage {
    /// Convert to a domain observation received at `fetched_at`.
    ///
    /// Uses the bid side: bid price as price, bid size as volume.
    ///
    /// # Errors
    ///
    /// Returns an error for an empty symbol or a negative price or size.
    pub fn to_observation(&self, fetched_at: DateTime<Utc>) -> Result<QuoteObservation, QuoteError> {
        let symbol = Symbol::new(&self.symbol)?;
        let price = self.bid_price.to_f64().unwrap_or(f64::NAN);
        QuoteObservation::new(symbol, price, self.bid_size, self.timestamp, fetched_at)
    }
}

// =============================================================================
// Outbound Messages (Client -> Server)
// =============================================================================

/// Authentication request.
#[derive(Debug, Clone, Serialize)]
pub struct AuthRequest {
    /// Action: "auth"
    pub action: &'static str,

    /// API key
    pub key: String,

    /// API secret
    pub secret: String,
}

impl AuthRequest {
    /// Create a new authentication request.
    #[must_use]
    pub const fn new(key: String, secret: String) -> Self {
        Self {
            action: "auth",
            key,
            secret,
        }
    }
}

/// Quote subscription request.
///
/// # Wire Format (JSON)
/// ```json
/// {"action": "subscribe", "quotes": ["AAPL", "MSFT"]}
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionRequest {
    /// Action: "subscribe" or "unsubscribe"
    pub action: &'static str,

    /// Quote symbols
    pub quotes: Vec<String>,
}

impl SubscriptionRequest {
    /// Subscribe to quotes for `symbols`.
    #[must_use]
    pub fn quotes(symbols: &[Symbol]) -> Self {
        Self {
            action: "subscribe",
            quotes: symbols.iter().map(|s| s.as_str().to_string()).collect(),
        }
    }
}
