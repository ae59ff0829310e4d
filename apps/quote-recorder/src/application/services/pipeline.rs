//! Ingestion Pipeline
//!
//! Wires the quote feed, the batching buffer and the persistence sink.
//!
//! ```text
//! feed ──quotes (bounded)──► ingest task ──batches (bounded)──► sink task ──► store
//!                            (BatchBuffer)                      (PersistenceSink)
//! ```
//!
//! The feed is the only producer on the quote channel and the ingest task
//! is its only consumer, so appends are serial without any lock. A slow
//! store fills the batch channel, which stalls the ingest task, which in
//! turn fills the quote channel and blocks the feed: backpressure flows
//! upstream through the channels instead of through inline writes.
//!
//! A run ends on cancellation, when the feed ends, or on a feed error.
//! When the feed ends on its own, batches already handed to the sink are
//! written before `run` returns. Cancellation stops both tasks at once: the
//! write in flight and any queued batches are abandoned and counted, and no
//! new batch is cut. Quotes still buffered are reported and discarded in
//! either case.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::schema::SchemaInitializer;
use super::sink::{DeliveryOutcome, PersistenceSink};
use crate::application::ports::{FeedError, QuoteFeed, QuoteStore, StoreError};
use crate::domain::buffer::{BatchBuffer, DEFAULT_FLUSH_THRESHOLD};
use crate::domain::quote::{Batch, QuoteObservation, Symbol};
use crate::infrastructure::metrics;

// =============================================================================
// Settings and Report
// =============================================================================

/// Tuning knobs for one pipeline.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Buffered quotes that trigger a batch.
    pub flush_threshold: usize,
    /// Flush a partial batch on this period (`None` = count-only).
    pub flush_interval: Option<Duration>,
    /// Capacity of the feed → ingest channel.
    pub quote_channel_capacity: usize,
    /// Capacity of the ingest → sink channel.
    pub batch_channel_capacity: usize,
    /// Upper bound on a single batch write (`None` = unbounded).
    pub write_timeout: Option<Duration>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            flush_threshold: DEFAULT_FLUSH_THRESHOLD,
            flush_interval: None,
            quote_channel_capacity: 1024,
            batch_channel_capacity: 16,
            write_timeout: Some(Duration::from_secs(30)),
        }
    }
}

/// Counters for a finished run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Quotes received from the feed.
    pub quotes_received: u64,
    /// Batches committed.
    pub batches_persisted: u64,
    /// Batches discarded after a write failure.
    pub batches_dropped: u64,
    /// Rows written across all committed batches.
    pub rows_written: u64,
    /// Quotes lost with dropped batches.
    pub quotes_lost: u64,
    /// Batches cut but not written because the run was cancelled.
    pub batches_abandoned: u64,
    /// Quotes in abandoned batches.
    pub quotes_abandoned: u64,
    /// Quotes still buffered when the run ended (not written).
    pub unflushed: usize,
}

/// Errors that end a pipeline run.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The symbol set was empty.
    #[error("no symbols to subscribe")]
    NoSymbols,

    /// The quote table could not be created.
    #[error("schema initialization failed: {0}")]
    Schema(#[source] StoreError),

    /// The feed failed; the report covers everything up to the failure.
    #[error("quote feed failed: {source}")]
    Feed {
        /// Transport failure.
        #[source]
        source: FeedError,
        /// Counters at termination.
        report: Box<RunReport>,
    },

    /// An internal task panicked or was aborted.
    #[error("pipeline task failed: {0}")]
    Task(String),
}

impl PipelineError {
    /// Run counters, when the run got far enough to produce any.
    #[must_use]
    pub fn report(&self) -> Option<&RunReport> {
        match self {
            Self::Feed { report, .. } => Some(report),
            _ => None,
        }
    }
}

// =============================================================================
// Pipeline
// =============================================================================

/// Feed → buffer → sink driver.
pub struct Pipeline {
    feed: Arc<dyn QuoteFeed>,
    store: Arc<dyn QuoteStore>,
    settings: PipelineSettings,
}

impl Pipeline {
    /// Create a pipeline.
    #[must_use]
    pub fn new(
        feed: Arc<dyn QuoteFeed>,
        store: Arc<dyn QuoteStore>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            feed,
            store,
            settings,
        }
    }

    /// Run until `cancel` fires or the feed ends.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::Schema`] if the table cannot be created; the feed
    ///   is never contacted in that case.
    /// - [`PipelineError::Feed`] if the feed fails.
    /// - [`PipelineError::Task`] if an internal task dies.
    pub async fn run(
        &self,
        symbols: &[Symbol],
        cancel: CancellationToken,
    ) -> Result<RunReport, PipelineError> {
        if symbols.is_empty() {
            return Err(PipelineError::NoSymbols);
        }

        let span = tracing::info_span!("ingest", run_id = %uuid::Uuid::new_v4());
        self.run_inner(symbols, cancel).instrument(span).await
    }

    async fn run_inner(
        &self,
        symbols: &[Symbol],
        cancel: CancellationToken,
    ) -> Result<RunReport, PipelineError> {
        SchemaInitializer::new(Arc::clone(&self.store))
            .ensure_table()
            .await
            .map_err(PipelineError::Schema)?;

        let (quote_tx, quote_rx) = mpsc::channel(self.settings.quote_channel_capacity.max(1));
        let (batch_tx, batch_rx) = mpsc::channel(self.settings.batch_channel_capacity.max(1));

        let buffer = BatchBuffer::new(self.settings.flush_threshold);
        let ingest = tokio::spawn(
            ingest_loop(
                quote_rx,
                batch_tx,
                buffer,
                self.settings.flush_interval,
                cancel.clone(),
            )
            .in_current_span(),
        );

        let sink = PersistenceSink::new(Arc::clone(&self.store))
            .with_write_timeout(self.settings.write_timeout);
        let writer = tokio::spawn(sink_loop(batch_rx, sink, cancel.clone()).in_current_span());

        tracing::info!(
            symbols = ?symbols.iter().map(Symbol::as_str).collect::<Vec<_>>(),
            flush_threshold = self.settings.flush_threshold,
            "Streaming quotes"
        );

        // The sender is moved into the feed; when the feed returns the
        // channel closes and the ingest task winds down.
        let feed_result = self.feed.stream_quotes(symbols, quote_tx, cancel).await;

        let ingest_stats = ingest
            .await
            .map_err(|e| PipelineError::Task(format!("ingest task: {e}")))?;
        let sink_stats = writer
            .await
            .map_err(|e| PipelineError::Task(format!("sink task: {e}")))?;

        let report = RunReport {
            quotes_received: ingest_stats.received,
            batches_persisted: sink_stats.persisted,
            batches_dropped: sink_stats.dropped,
            rows_written: sink_stats.rows,
            quotes_lost: sink_stats.lost,
            batches_abandoned: ingest_stats.abandoned_batches + sink_stats.abandoned_batches,
            quotes_abandoned: ingest_stats.abandoned_quotes + sink_stats.abandoned_quotes,
            unflushed: ingest_stats.unflushed,
        };

        if report.batches_abandoned > 0 {
            tracing::warn!(
                batches = report.batches_abandoned,
                quotes = report.quotes_abandoned,
                "Abandoned unwritten batches on shutdown"
            );
        }

        if report.unflushed > 0 {
            tracing::warn!(
                unflushed = report.unflushed,
                "Discarding buffered quotes that never reached the flush threshold"
            );
        }

        match feed_result {
            Ok(()) => {
                tracing::info!(?report, "Ingestion stopped");
                Ok(report)
            }
            Err(source) => {
                tracing::error!(error = %source, ?report, "Ingestion halted by feed failure");
                Err(PipelineError::Feed {
                    source,
                    report: Box::new(report),
                })
            }
        }
    }
}

// =============================================================================
// Tasks
// =============================================================================

#[derive(Debug, Default)]
struct IngestStats {
    received: u64,
    unflushed: usize,
    abandoned_batches: u64,
    abandoned_quotes: u64,
}

#[derive(Debug, Default)]
struct SinkStats {
    persisted: u64,
    dropped: u64,
    rows: u64,
    lost: u64,
    abandoned_batches: u64,
    abandoned_quotes: u64,
}

impl SinkStats {
    fn abandon(&mut self, size: usize) {
        self.abandoned_batches += 1;
        self.abandoned_quotes += size as u64;
    }
}

enum IngestStep {
    Quote(QuoteObservation),
    Tick,
    Closed,
    Cancelled,
}

async fn ingest_loop(
    mut rx: mpsc::Receiver<QuoteObservation>,
    batch_tx: mpsc::Sender<Batch>,
    mut buffer: BatchBuffer,
    flush_interval: Option<Duration>,
    cancel: CancellationToken,
) -> IngestStats {
    let mut stats = IngestStats::default();
    let mut ticker = flush_interval.map(|period| {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval
    });

    loop {
        let step = tokio::select! {
            biased;
            () = cancel.cancelled() => IngestStep::Cancelled,
            quote = rx.recv() => quote.map_or(IngestStep::Closed, IngestStep::Quote),
            () = next_tick(&mut ticker) => IngestStep::Tick,
        };

        let ready = match step {
            IngestStep::Quote(observation) => {
                stats.received += 1;
                buffer.append(observation);
                buffer.try_flush()
            }
            IngestStep::Tick => buffer.drain(),
            IngestStep::Closed | IngestStep::Cancelled => break,
        };
        metrics::set_buffered_quotes(buffer.len());

        let Some(batch) = ready else {
            continue;
        };
        let size = batch.len();
        tracing::debug!(size, "Batch ready");

        let sent = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(size),
            sent = batch_tx.send(batch) => sent.map_err(|mpsc::error::SendError(batch)| batch.len()),
        };
        if let Err(lost) = sent {
            if !cancel.is_cancelled() {
                tracing::error!("Sink task gone, stopping ingest");
            }
            stats.abandoned_batches += 1;
            stats.abandoned_quotes += lost as u64;
            break;
        }
    }

    // Quotes still queued never reach a batch.
    rx.close();
    let mut pending = 0;
    while rx.try_recv().is_ok() {
        pending += 1;
    }
    stats.received += pending as u64;
    stats.unflushed = buffer.len() + pending;
    metrics::set_buffered_quotes(0);
    stats
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

async fn sink_loop(
    mut rx: mpsc::Receiver<Batch>,
    sink: PersistenceSink,
    cancel: CancellationToken,
) -> SinkStats {
    let mut stats = SinkStats::default();

    loop {
        let batch = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            batch = rx.recv() => match batch {
                Some(batch) => batch,
                None => break,
            },
        };

        // Dropping the write on cancellation rolls its transaction back.
        let size = batch.len();
        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                stats.abandon(size);
                break;
            }
            outcome = sink.deliver(batch) => outcome,
        };

        match outcome {
            DeliveryOutcome::Written { rows } => {
                stats.persisted += 1;
                stats.rows += rows;
            }
            DeliveryOutcome::Dropped { lost, .. } => {
                stats.dropped += 1;
                stats.lost += lost as u64;
            }
            DeliveryOutcome::Skipped => {}
        }
    }

    rx.close();
    while let Ok(batch) = rx.try_recv() {
        stats.abandon(batch.len());
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::persistence::InMemoryQuoteStore;
    use chrono::Utc;

    fn obs(symbol: &str) -> QuoteObservation {
        let now = Utc::now();
        QuoteObservation::new(Symbol::new(symbol).unwrap(), 10.0, 1, now, now).unwrap()
    }

    #[tokio::test]
    async fn ingest_emits_full_batches_and_reports_remainder() {
        let (tx, rx) = mpsc::channel(32);
        let (batch_tx, mut batch_rx) = mpsc::channel(8);

        let handle = tokio::spawn(ingest_loop(
            rx,
            batch_tx,
            BatchBuffer::new(3),
            None,
            CancellationToken::new(),
        ));
        for _ in 0..7 {
            tx.send(obs("AAPL")).await.unwrap();
        }
        drop(tx);

        let stats = handle.await.unwrap();
        assert_eq!(stats.received, 7);
        assert_eq!(stats.unflushed, 1);

        let mut sizes = Vec::new();
        while let Some(batch) = batch_rx.recv().await {
            sizes.push(batch.len());
        }
        assert_eq!(sizes, vec![3, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn interval_flush_drains_partial_batch() {
        let (tx, rx) = mpsc::channel(32);
        let (batch_tx, mut batch_rx) = mpsc::channel(8);

        let handle = tokio::spawn(ingest_loop(
            rx,
            batch_tx,
            BatchBuffer::new(100),
            Some(Duration::from_secs(5)),
            CancellationToken::new(),
        ));
        tx.send(obs("AAPL")).await.unwrap();
        tx.send(obs("MSFT")).await.unwrap();

        let batch = batch_rx.recv().await.unwrap();
        assert_eq!(batch.len(), 2);

        drop(tx);
        let stats = handle.await.unwrap();
        assert_eq!(stats.unflushed, 0);
    }

    #[tokio::test]
    async fn cancelled_ingest_cuts_no_new_batches() {
        let (tx, rx) = mpsc::channel(32);
        let (batch_tx, mut batch_rx) = mpsc::channel(8);
        for _ in 0..7 {
            tx.send(obs("AAPL")).await.unwrap();
        }

        let cancel = CancellationToken::new();
        cancel.cancel();
        let stats = ingest_loop(rx, batch_tx, BatchBuffer::new(3), None, cancel).await;

        assert_eq!(stats.received, 7);
        assert_eq!(stats.unflushed, 7);
        assert!(batch_rx.recv().await.is_none());
        assert!(tx.send(obs("AAPL")).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_sink_abandons_write_in_flight_and_queue() {
        let store = Arc::new(InMemoryQuoteStore::new().with_write_delay(Duration::from_secs(3600)));
        store.ensure_table().await.unwrap();

        let (batch_tx, batch_rx) = mpsc::channel(8);
        for _ in 0..3 {
            let batch: Batch = vec![obs("AAPL"), obs("MSFT")].into();
            batch_tx.send(batch).await.unwrap();
        }

        let cancel = CancellationToken::new();
        let sink = PersistenceSink::new(Arc::clone(&store) as Arc<dyn QuoteStore>);
        let handle = tokio::spawn(sink_loop(batch_rx, sink, cancel.clone()));

        tokio::time::sleep(Duration::from_secs(1)).await;
        cancel.cancel();

        let stats = tokio_test::assert_ok!(handle.await);
        assert_eq!(stats.abandoned_batches, 3);
        assert_eq!(stats.abandoned_quotes, 6);
        assert_eq!(stats.persisted, 0);
        assert!(store.is_empty());
    }

    #[test]
    fn report_only_on_feed_error() {
        assert!(PipelineError::NoSymbols.report().is_none());
        let err = PipelineError::Feed {
            source: FeedError::Disconnected("eof".to_string()),
            report: Box::new(RunReport {
                quotes_received: 3,
                unflushed: 3,
                ..RunReport::default()
            }),
        };
        assert_eq!(err.report().map(|r| r.unflushed), Some(3));
        assert!(err.to_string().contains("eof"));
    }
}
