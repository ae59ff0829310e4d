//! Quote Observation Types
//!
//! A [`QuoteObservation`] is one tick of top-of-book data for a single
//! ticker, stamped with both the source time and the local receive time.
//! A [`Batch`] is an ordered run of observations handed from the buffer to
//! the persistence sink as one unit.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Errors
// =============================================================================

/// Errors raised when constructing quote domain values.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum QuoteError {
    /// Ticker text was empty or whitespace.
    #[error("ticker symbol cannot be empty")]
    EmptySymbol,

    /// Price was negative, NaN or infinite.
    #[error("invalid price for {symbol}: {price}")]
    InvalidPrice {
        /// Ticker the price belonged to.
        symbol: String,
        /// Offending price.
        price: f64,
    },

    /// Size was negative.
    #[error("invalid volume for {symbol}: {volume}")]
    InvalidVolume {
        /// Ticker the volume belonged to.
        symbol: String,
        /// Offending volume.
        volume: i64,
    },
}

// =============================================================================
// Symbol
// =============================================================================

/// Ticker symbol (e.g., "AAPL").
///
/// Always non-empty and upper-case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Symbol(String);

impl Symbol {
    /// Create a symbol, trimming whitespace and upper-casing.
    ///
    /// # Errors
    ///
    /// Returns [`QuoteError::EmptySymbol`] if nothing is left after trimming.
    pub fn new(value: impl AsRef<str>) -> Result<Self, QuoteError> {
        let trimmed = value.as_ref().trim();
        if trimmed.is_empty() {
            return Err(QuoteError::EmptySymbol);
        }
        Ok(Self(trimmed.to_uppercase()))
    }

    /// Parse a comma separated symbol list.
    ///
    /// Blank entries are skipped and duplicates dropped; first-seen order
    /// is kept.
    #[must_use]
    pub fn parse_list(value: &str) -> Vec<Self> {
        let mut symbols: Vec<Self> = Vec::new();
        for part in value.split(',') {
            if let Ok(symbol) = Self::new(part)
                && !symbols.contains(&symbol)
            {
                symbols.push(symbol);
            }
        }
        symbols
    }

    /// Borrow the symbol text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Symbol {
    type Error = QuoteError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Symbol> for String {
    fn from(symbol: Symbol) -> Self {
        symbol.0
    }
}

// =============================================================================
// Quote Observation
// =============================================================================

/// One received quote, ready to be persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteObservation {
    ticker: Symbol,
    price: f64,
    volume: i64,
    event_timestamp: DateTime<Utc>,
    fetch_timestamp: DateTime<Utc>,
}

impl QuoteObservation {
    /// Build an observation.
    ///
    /// # Errors
    ///
    /// Returns an error if `price` is negative or not finite, or if
    /// `volume` is negative.
    pub fn new(
        ticker: Symbol,
        price: f64,
        volume: i64,
        event_timestamp: DateTime<Utc>,
        fetch_timestamp: DateTime<Utc>,
    ) -> Result<Self, QuoteError> {
        if !price.is_finite() || price < 0.0 {
            return Err(QuoteError::InvalidPrice {
                symbol: ticker.0,
                price,
            });
        }
        if volume < 0 {
            return Err(QuoteError::InvalidVolume {
                symbol: ticker.0,
                volume,
            });
        }

        Ok(Self {
            ticker,
            price,
            volume,
            event_timestamp,
            fetch_timestamp,
        })
    }

    /// Ticker the quote is for.
    #[must_use]
    pub const fn ticker(&self) -> &Symbol {
        &self.ticker
    }

    /// Best bid price.
    #[must_use]
    pub const fn price(&self) -> f64 {
        self.price
    }

    /// Bid size.
    #[must_use]
    pub const fn volume(&self) -> i64 {
        self.volume
    }

    /// Time the quote was generated at the source.
    #[must_use]
    pub const fn event_timestamp(&self) -> DateTime<Utc> {
        self.event_timestamp
    }

    /// Time the quote was received locally.
    #[must_use]
    pub const fn fetch_timestamp(&self) -> DateTime<Utc> {
        self.fetch_timestamp
    }

    /// Receive latency (fetch minus event time).
    ///
    /// Negative values indicate clock skew between source and host.
    #[must_use]
    pub fn receive_lag(&self) -> chrono::TimeDelta {
        self.fetch_timestamp - self.event_timestamp
    }
}

// =============================================================================
// Batch
// =============================================================================

/// Ordered group of observations written as one transaction.
///
/// Batches may mix tickers; order is arrival order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    observations: Vec<QuoteObservation>,
}

impl Batch {
    /// Number of observations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.observations.len()
    }

    /// Check whether the batch holds no observations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    /// Iterate observations in arrival order.
    pub fn iter(&self) -> std::slice::Iter<'_, QuoteObservation> {
        self.observations.iter()
    }

    /// Borrow the observations.
    #[must_use]
    pub fn as_slice(&self) -> &[QuoteObservation] {
        &self.observations
    }

    /// Take ownership of the observations.
    #[must_use]
    pub fn into_inner(self) -> Vec<QuoteObservation> {
        self.observations
    }
}

impl From<Vec<QuoteObservation>> for Batch {
    fn from(observations: Vec<QuoteObservation>) -> Self {
        Self { observations }
    }
}

impl<'a> IntoIterator for &'a Batch {
    type Item = &'a QuoteObservation;
    type IntoIter = std::slice::Iter<'a, QuoteObservation>;

    fn into_iter(self) -> Self::IntoIter {
        self.observations.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn symbol_is_trimmed_and_uppercased() {
        let symbol = Symbol::new("  aapl ").unwrap();
        assert_eq!(symbol.as_str(), "AAPL");
        assert_eq!(symbol.to_string(), "AAPL");
    }

    #[test]
    fn empty_symbol_is_rejected() {
        assert_eq!(Symbol::new("   "), Err(QuoteError::EmptySymbol));
        assert_eq!(Symbol::new(""), Err(QuoteError::EmptySymbol));
    }

    #[test]
    fn parse_list_skips_blanks_and_duplicates() {
        let symbols = Symbol::parse_list("AAPL, msft,,aapl , GOOG");
        let names: Vec<&str> = symbols.iter().map(Symbol::as_str).collect();
        assert_eq!(names, vec!["AAPL", "MSFT", "GOOG"]);
    }

    #[test]
    fn symbol_deserialize_validates() {
        let ok: Symbol = serde_json::from_str(r#""tsla""#).unwrap();
        assert_eq!(ok.as_str(), "TSLA");
        assert!(serde_json::from_str::<Symbol>(r#""""#).is_err());
    }

    #[test]
    fn observation_accessors() {
        let obs =
            QuoteObservation::new(Symbol::new("AAPL").unwrap(), 187.25, 3, ts(0), ts(2)).unwrap();
        assert_eq!(obs.ticker().as_str(), "AAPL");
        assert!((obs.price() - 187.25).abs() < f64::EPSILON);
        assert_eq!(obs.volume(), 3);
        assert_eq!(obs.event_timestamp(), ts(0));
        assert_eq!(obs.fetch_timestamp(), ts(2));
        assert_eq!(obs.receive_lag(), chrono::TimeDelta::seconds(2));
    }

    #[test]
    fn zero_price_and_volume_are_valid() {
        let obs = QuoteObservation::new(Symbol::new("MSFT").unwrap(), 0.0, 0, ts(0), ts(0));
        assert!(obs.is_ok());
    }

    #[test]
    fn negative_price_is_rejected() {
        let err = QuoteObservation::new(Symbol::new("MSFT").unwrap(), -0.01, 1, ts(0), ts(0))
            .unwrap_err();
        assert!(matches!(err, QuoteError::InvalidPrice { .. }));
    }

    #[test]
    fn nan_price_is_rejected() {
        let err = QuoteObservation::new(Symbol::new("MSFT").unwrap(), f64::NAN, 1, ts(0), ts(0))
            .unwrap_err();
        assert!(matches!(err, QuoteError::InvalidPrice { .. }));
    }

    #[test]
    fn negative_volume_is_rejected() {
        let err = QuoteObservation::new(Symbol::new("MSFT").unwrap(), 1.0, -1, ts(0), ts(0))
            .unwrap_err();
        assert_eq!(
            err,
            QuoteError::InvalidVolume {
                symbol: "MSFT".to_string(),
                volume: -1
            }
        );
    }

    #[test]
    fn batch_preserves_order() {
        let a = QuoteObservation::new(Symbol::new("A").unwrap(), 1.0, 1, ts(0), ts(0)).unwrap();
        let b = QuoteObservation::new(Symbol::new("B").unwrap(), 2.0, 2, ts(1), ts(1)).unwrap();
        let batch = Batch::from(vec![a.clone(), b.clone()]);

        assert_eq!(batch.len(), 2);
        assert!(!batch.is_empty());
        let tickers: Vec<&str> = batch.iter().map(|o| o.ticker().as_str()).collect();
        assert_eq!(tickers, vec!["A", "B"]);
        assert_eq!(batch.into_inner(), vec![a, b]);
    }
}
