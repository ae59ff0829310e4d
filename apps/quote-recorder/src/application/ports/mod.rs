//! Port Interfaces
//!
//! Defines the interfaces (ports) for external systems following
//! the Hexagonal Architecture pattern. These are the contracts that
//! infrastructure adapters must implement.
//!
//! ## Driven Ports (Outbound)
//!
//! - `QuoteFeed`: push-based source of quotes for a symbol set
//! - `QuoteStore`: table-backed sink for quote batches

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::domain::quote::{Batch, QuoteObservation, Symbol};

// =============================================================================
// Errors
// =============================================================================

/// Transport failures surfaced by a quote feed.
///
/// Every variant ends the ingestion run; feeds do not reconnect.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    /// Could not establish the connection.
    #[error("feed connection failed: {0}")]
    Connect(String),

    /// The feed rejected our credentials or subscription.
    #[error("feed authentication failed: {0}")]
    Auth(String),

    /// The connection ended (close frame, EOF or socket error).
    #[error("feed disconnected: {0}")]
    Disconnected(String),

    /// The feed sent something we could not understand.
    #[error("feed protocol error: {0}")]
    Protocol(String),

    /// No frame arrived within the configured idle timeout.
    #[error("feed idle for {0:?}")]
    IdleTimeout(Duration),
}

/// Storage failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Could not reach the database.
    #[error("database connection error: {0}")]
    Connection(String),

    /// A statement or transaction failed.
    #[error("query error: {0}")]
    Query(String),

    /// The write did not finish within the configured timeout.
    #[error("write timed out after {0:?}")]
    Timeout(Duration),
}

// =============================================================================
// Ports
// =============================================================================

/// Push-based quote source.
#[async_trait]
pub trait QuoteFeed: Send + Sync {
    /// Subscribe to quotes for `symbols` and forward each one into `tx`
    /// in delivery order.
    ///
    /// Returns `Ok(())` when `cancel` fires or the receiving side of `tx`
    /// is closed. Any transport failure is returned as an error.
    async fn stream_quotes(
        &self,
        symbols: &[Symbol],
        tx: mpsc::Sender<QuoteObservation>,
        cancel: CancellationToken,
    ) -> Result<(), FeedError>;
}

/// Append-only quote table.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QuoteStore: Send + Sync {
    /// Create the quote table if it does not exist. Idempotent.
    async fn ensure_table(&self) -> Result<(), StoreError>;

    /// Append every observation of `batch` inside one transaction.
    ///
    /// Returns the number of rows written. On error nothing is written.
    async fn append_batch(&self, batch: &Batch) -> Result<u64, StoreError>;

    /// Total number of stored rows.
    async fn row_count(&self) -> Result<u64, StoreError>;
}
