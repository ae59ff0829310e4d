//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the ingestion services and the port interfaces
//! that define how the domain interacts with the feed and the database.

/// Port interfaces for external systems (quote feed, quote store).
pub mod ports;

/// Application services: schema setup, persistence sink and pipeline.
pub mod services;
