//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer.

/// Alpaca WebSocket quote feed.
pub mod alpaca;

/// Configuration loading.
pub mod config;

/// PostgreSQL and in-memory quote stores.
pub mod persistence;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// OpenTelemetry tracing integration.
pub mod telemetry;
