//! Domain Layer - Quote observations and batching.
//!
//! This layer contains the core types for quote ingestion with no I/O.
//! Everything here is synchronous and deterministic.

/// Quote observations, tickers and batches.
pub mod quote;

/// Threshold-based batching buffer.
pub mod buffer;
