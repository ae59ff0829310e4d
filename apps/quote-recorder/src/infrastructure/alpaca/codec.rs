//! Stream Codec
//!
//! Decodes Alpaca's JSON text frames. The server batches messages into a
//! JSON array; a few control messages arrive as a bare object.

use serde::Serialize;

use super::messages::{
    AlpacaMessage, ErrorMessage, StockQuoteMessage, SubscriptionMessage, SuccessMessage,
};

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON encoding/decoding failed.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// Element has no `T` discriminator.
    #[error("message without type field: {0}")]
    MissingType(String),

    /// Frame is neither an array nor an object.
    #[error("invalid message format: {0}")]
    InvalidFormat(String),
}

/// JSON codec for the stock data stream.
#[derive(Debug, Default, Clone)]
pub struct JsonCodec;

impl JsonCodec {
    /// Create a new JSON codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Decode one text frame into its messages, in frame order.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame is not valid JSON, is not an array or
    /// object, or contains an element that does not match its declared type.
    pub fn decode(&self, text: &str) -> Result<Vec<AlpacaMessage>, CodecError> {
        let value: serde_json::Value = serde_json::from_str(text.trim())?;

        match value {
            serde_json::Value::Array(items) => items.into_iter().map(decode_element).collect(),
            object @ serde_json::Value::Object(_) => Ok(vec![decode_element(object)?]),
            other => {
                let preview: String = other.to_string().chars().take(50).collect();
                Err(CodecError::InvalidFormat(format!(
                    "expected JSON array or object, got: {preview}"
                )))
            }
        }
    }

    /// Encode a value to a JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn encode<T: Serialize>(&self, value: &T) -> Result<String, CodecError> {
        Ok(serde_json::to_string(value)?)
    }
}

fn decode_element(value: serde_json::Value) -> Result<AlpacaMessage, CodecError> {
    let Some(msg_type) = value.get("T").and_then(|v| v.as_str()).map(str::to_owned) else {
        return Err(CodecError::MissingType(value.to_string()));
    };

    let message = match msg_type.as_str() {
        "success" => AlpacaMessage::Success(serde_json::from_value::<SuccessMessage>(value)?),
        "error" => AlpacaMessage::Error(serde_json::from_value::<ErrorMessage>(value)?),
        "subscription" => {
            AlpacaMessage::Subscription(serde_json::from_value::<SubscriptionMessage>(value)?)
        }
        "q" => AlpacaMessage::StockQuote(serde_json::from_value::<StockQuoteMessage>(value)?),
        _ => AlpacaMessage::Ignored(msg_type),
    };

    Ok(message)
}
