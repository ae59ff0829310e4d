#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::cast_possible_wrap,
        clippy::cast_possible_truncation,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! Quote Recorder - Streaming Quote Ingestion
//!
//! Subscribes to Alpaca's real-time stock quote stream for a fixed symbol
//! set, batches the quotes in memory and appends each full batch to the
//! `real_time_prices` table in one transaction.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Quote types and batching, no I/O
//!   - `quote`: `Symbol`, `QuoteObservation`, `Batch`
//!   - `buffer`: threshold-based `BatchBuffer`
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: `QuoteFeed` and `QuoteStore` traits
//!   - `services`: schema setup, persistence sink, pipeline driver
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `alpaca`: WebSocket quote feed
//!   - `persistence`: PostgreSQL and in-memory stores
//!   - `config`: environment configuration
//!   - `metrics`, `telemetry`: observability
//!
//! # Data Flow
//!
//! ```text
//! Alpaca WS ──► AlpacaQuoteFeed ──► [quotes] ──► BatchBuffer ──► [batches] ──► PersistenceSink ──► Postgres
//!                                    bounded      (ingest task)    bounded       (sink task)
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Quote types and batching with no external dependencies.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::buffer::{BatchBuffer, DEFAULT_FLUSH_THRESHOLD};
pub use domain::quote::{Batch, QuoteError, QuoteObservation, Symbol};

// Ports and services
pub use application::ports::{FeedError, QuoteFeed, QuoteStore, StoreError};
pub use application::services::{
    DeliveryOutcome, PersistenceSink, Pipeline, PipelineError, PipelineSettings, RunReport,
    SchemaInitializer,
};

// Adapters
pub use infrastructure::alpaca::{AlpacaFeedConfig, AlpacaQuoteFeed, Credentials};
pub use infrastructure::config::{ConfigError, DataFeed, RecorderConfig};
pub use infrastructure::persistence::{InMemoryQuoteStore, PostgresQuoteStore, StoredQuote};

// Observability
pub use infrastructure::metrics::init_metrics;
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
