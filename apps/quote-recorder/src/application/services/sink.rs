//! Persistence Sink
//!
//! Writes batches to the quote store. Delivery is at-most-once: a batch
//! whose write fails is reported and discarded, never retried or
//! re-queued.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::application::ports::{QuoteStore, StoreError};
use crate::domain::quote::Batch;
use crate::infrastructure::metrics;

/// Result of handing one batch to the sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The batch was empty; nothing was written.
    Skipped,
    /// The batch was committed.
    Written {
        /// Rows appended.
        rows: u64,
    },
    /// The write failed and the batch was discarded.
    Dropped {
        /// Observations lost with the batch.
        lost: usize,
        /// Human-readable failure.
        error: String,
    },
}

/// Batch writer in front of a [`QuoteStore`].
#[derive(Clone)]
pub struct PersistenceSink {
    store: Arc<dyn QuoteStore>,
    write_timeout: Option<Duration>,
}

impl PersistenceSink {
    /// Create a sink with no write timeout.
    #[must_use]
    pub fn new(store: Arc<dyn QuoteStore>) -> Self {
        Self {
            store,
            write_timeout: None,
        }
    }

    /// Bound each batch write by `timeout`.
    #[must_use]
    pub const fn with_write_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Append `batch` in one transaction.
    ///
    /// An empty batch returns `Ok(0)` without touching the store. A timed
    /// out write is abandoned and reported as [`StoreError::Timeout`].
    /// Abandoning an open transaction rolls it back, but a timeout that
    /// lands while the commit is in flight cannot tell whether the server
    /// applied it, so the rows may exist even though the batch counts as
    /// dropped.
    ///
    /// # Errors
    ///
    /// Returns the store error or [`StoreError::Timeout`].
    pub async fn persist(&self, batch: &Batch) -> Result<u64, StoreError> {
        if batch.is_empty() {
            return Ok(0);
        }

        let write = self.store.append_batch(batch);
        match self.write_timeout {
            Some(limit) => tokio::time::timeout(limit, write)
                .await
                .map_err(|_| StoreError::Timeout(limit))?,
            None => write.await,
        }
    }

    /// Persist `batch`, absorbing any failure.
    ///
    /// Failures are logged and counted; the batch is consumed either way.
    pub async fn deliver(&self, batch: Batch) -> DeliveryOutcome {
        if batch.is_empty() {
            return DeliveryOutcome::Skipped;
        }

        let started = Instant::now();
        match self.persist(&batch).await {
            Ok(rows) => {
                metrics::record_batch_persisted(rows, started.elapsed());
                tracing::info!(
                    rows,
                    elapsed_ms = started.elapsed().as_millis(),
                    "Batch persisted"
                );
                DeliveryOutcome::Written { rows }
            }
            Err(e) => {
                metrics::record_batch_dropped(error_type(&e));
                tracing::error!(
                    error = %e,
                    lost = batch.len(),
                    "Batch write failed, discarding batch"
                );
                DeliveryOutcome::Dropped {
                    lost: batch.len(),
                    error: e.to_string(),
                }
            }
        }
    }
}

const fn error_type(err: &StoreError) -> &'static str {
    match err {
        StoreError::Connection(_) => "connection",
        StoreError::Query(_) => "query",
        StoreError::Timeout(_) => "timeout",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::MockQuoteStore;
    use crate::domain::quote::{QuoteObservation, Symbol};
    use chrono::Utc;
    use tokio_test::{assert_err, assert_ok};

    fn batch(n: usize) -> Batch {
        let now = Utc::now();
        (0..n)
            .map(|i| {
                QuoteObservation::new(Symbol::new("AAPL").unwrap(), 100.0, i as i64, now, now)
                    .unwrap()
            })
            .collect::<Vec<_>>()
            .into()
    }

    #[tokio::test]
    async fn empty_batch_does_not_touch_store() {
        let mut store = MockQuoteStore::new();
        store.expect_append_batch().never();

        let sink = PersistenceSink::new(Arc::new(store));
        assert_eq!(assert_ok!(sink.persist(&Batch::default()).await), 0);
        assert_eq!(sink.deliver(Batch::default()).await, DeliveryOutcome::Skipped);
    }

    #[tokio::test]
    async fn successful_write_reports_rows() {
        let mut store = MockQuoteStore::new();
        store
            .expect_append_batch()
            .times(1)
            .returning(|b| Ok(b.len() as u64));

        let sink = PersistenceSink::new(Arc::new(store));
        assert_eq!(
            sink.deliver(batch(5)).await,
            DeliveryOutcome::Written { rows: 5 }
        );
    }

    #[tokio::test]
    async fn failed_write_is_dropped_without_retry() {
        let mut store = MockQuoteStore::new();
        store
            .expect_append_batch()
            .times(1)
            .returning(|_| Err(StoreError::Query("deadlock detected".to_string())));

        let sink = PersistenceSink::new(Arc::new(store));
        let outcome = sink.deliver(batch(5)).await;

        match outcome {
            DeliveryOutcome::Dropped { lost, error } => {
                assert_eq!(lost, 5);
                assert!(error.contains("deadlock"));
            }
            other => panic!("expected Dropped, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn persist_surfaces_error() {
        let mut store = MockQuoteStore::new();
        store
            .expect_append_batch()
            .returning(|_| Err(StoreError::Connection("gone".to_string())));

        let sink = PersistenceSink::new(Arc::new(store));
        let err = assert_err!(sink.persist(&batch(1)).await);
        assert!(matches!(err, StoreError::Connection(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_write_times_out() {
        let store = crate::infrastructure::persistence::InMemoryQuoteStore::new()
            .with_write_delay(Duration::from_secs(60));
        assert_ok!(store.ensure_table().await);

        let sink = PersistenceSink::new(Arc::new(store))
            .with_write_timeout(Some(Duration::from_secs(1)));
        let err = assert_err!(sink.persist(&batch(2)).await);
        assert!(matches!(err, StoreError::Timeout(limit) if limit == Duration::from_secs(1)));
    }

    #[test]
    fn error_type_labels() {
        assert_eq!(error_type(&StoreError::Connection(String::new())), "connection");
        assert_eq!(error_type(&StoreError::Query(String::new())), "query");
        assert_eq!(error_type(&StoreError::Timeout(Duration::ZERO)), "timeout");
    }
}
