//! Persistence Adapters
//!
//! Implementations of the [`QuoteStore`](crate::application::ports::QuoteStore)
//! port.

pub mod in_memory;
pub mod postgres;

pub use in_memory::{InMemoryQuoteStore, StoredQuote};
pub use postgres::{PostgresQuoteStore, TABLE_NAME};
