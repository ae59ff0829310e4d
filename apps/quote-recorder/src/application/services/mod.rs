//! Application Services
//!
//! - `schema`: one-shot table creation before ingestion starts
//! - `sink`: batch persistence with at-most-once delivery
//! - `pipeline`: feed → buffer → sink wiring and run lifecycle

pub mod pipeline;
pub mod schema;
pub mod sink;

pub use pipeline::{Pipeline, PipelineError, PipelineSettings, RunReport};
pub use schema::SchemaInitializer;
pub use sink::{DeliveryOutcome, PersistenceSink};
