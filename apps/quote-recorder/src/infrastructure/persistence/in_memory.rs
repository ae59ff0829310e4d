//! In-memory quote store for testing.

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::application::ports::{QuoteStore, StoreError};
use crate::domain::quote::{Batch, QuoteObservation};

/// A persisted row with its assigned identity key.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredQuote {
    /// Identity key, starting at 1.
    pub id: i64,
    /// Stored fields.
    pub observation: QuoteObservation,
}

#[derive(Debug, Default)]
struct State {
    table_created: bool,
    rows: Vec<StoredQuote>,
    next_id: i64,
    failing_writes: usize,
    fail_schema: bool,
    write_attempts: usize,
}

/// In-memory implementation of `QuoteStore`.
///
/// Suitable for testing and development. Not for production use.
#[derive(Debug, Default)]
pub struct InMemoryQuoteStore {
    state: Mutex<State>,
    write_delay: Option<Duration>,
}

impl InMemoryQuoteStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep for `delay` inside every batch write.
    #[must_use]
    pub const fn with_write_delay(mut self, delay: Duration) -> Self {
        self.write_delay = Some(delay);
        self
    }

    /// Make the next `count` batch writes fail without storing anything.
    pub fn fail_next_writes(&self, count: usize) {
        self.state.lock().failing_writes = count;
    }

    /// Make `ensure_table` fail.
    pub fn fail_schema(&self, fail: bool) {
        self.state.lock().fail_schema = fail;
    }

    /// Snapshot of all stored rows in insertion order.
    #[must_use]
    pub fn rows(&self) -> Vec<StoredQuote> {
        self.state.lock().rows.clone()
    }

    /// Number of stored rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().rows.len()
    }

    /// Check if the store holds no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.lock().rows.is_empty()
    }

    /// Whether `ensure_table` has succeeded at least once.
    #[must_use]
    pub fn table_created(&self) -> bool {
        self.state.lock().table_created
    }

    /// Number of `append_batch` calls, including failed ones.
    #[must_use]
    pub fn write_attempts(&self) -> usize {
        self.state.lock().write_attempts
    }
}

#[async_trait]
impl QuoteStore for InMemoryQuoteStore {
    async fn ensure_table(&self) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        if state.fail_schema {
            return Err(StoreError::Connection(
                "schema creation failed (injected)".to_string(),
            ));
        }
        state.table_created = true;
        Ok(())
    }

    async fn append_batch(&self, batch: &Batch) -> Result<u64, StoreError> {
        if let Some(delay) = self.write_delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock();
        state.write_attempts += 1;

        if !state.table_created {
            return Err(StoreError::Query(
                "relation \"real_time_prices\" does not exist".to_string(),
            ));
        }
        if state.failing_writes > 0 {
            state.failing_writes -= 1;
            return Err(StoreError::Query("write failed (injected)".to_string()));
        }

        for observation in batch {
            state.next_id += 1;
            let id = state.next_id;
            state.rows.push(StoredQuote {
                id,
                observation: observation.clone(),
            });
        }
        Ok(batch.len() as u64)
    }

    async fn row_count(&self) -> Result<u64, StoreError> {
        Ok(self.state.lock().rows.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::quote::Symbol;
    use chrono::Utc;

    fn batch(symbols: &[&str]) -> Batch {
        let now = Utc::now();
        symbols
            .iter()
            .map(|s| QuoteObservation::new(Symbol::new(s).unwrap(), 1.5, 2, now, now).unwrap())
            .collect::<Vec<_>>()
            .into()
    }

    #[tokio::test]
    async fn writes_require_table() {
        let store = InMemoryQuoteStore::new();
        assert!(store.append_batch(&batch(&["AAPL"])).await.is_err());

        store.ensure_table().await.unwrap();
        assert_eq!(store.append_batch(&batch(&["AAPL"])).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn assigns_increasing_ids() {
        let store = InMemoryQuoteStore::new();
        store.ensure_table().await.unwrap();
        store.append_batch(&batch(&["AAPL", "MSFT"])).await.unwrap();
        store.append_batch(&batch(&["GOOG"])).await.unwrap();

        let ids: Vec<i64> = store.rows().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(store.row_count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn injected_failure_writes_nothing() {
        let store = InMemoryQuoteStore::new();
        store.ensure_table().await.unwrap();
        store.fail_next_writes(1);

        assert!(store.append_batch(&batch(&["AAPL", "MSFT"])).await.is_err());
        assert!(store.is_empty());

        assert_eq!(store.append_batch(&batch(&["AAPL"])).await.unwrap(), 1);
        assert_eq!(store.write_attempts(), 2);
    }

    #[tokio::test]
    async fn schema_failure_is_reported() {
        let store = InMemoryQuoteStore::new();
        store.fail_schema(true);
        assert!(matches!(
            store.ensure_table().await,
            Err(StoreError::Connection(_))
        ));
        assert!(!store.table_created());
    }
}
