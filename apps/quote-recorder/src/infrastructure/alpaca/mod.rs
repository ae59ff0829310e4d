//! Alpaca WebSocket Adapter
//!
//! Implements [`QuoteFeed`](crate::application::ports::QuoteFeed) over
//! Alpaca's stock market data stream (IEX or SIP, JSON codec).

pub mod auth;
pub mod codec;
pub mod messages;
pub mod stream;

pub use auth::{AUTH_TIMEOUT, AuthError, AuthHandler, AuthState, Credentials};
pub use codec::{CodecError, JsonCodec};
pub use messages::*;
pub use stream::{AlpacaFeedConfig, AlpacaQuoteFeed};
