//! Configuration Module
//!
//! Environment-driven configuration for the recorder.

mod settings;

pub use settings::{
    ConfigError, DEFAULT_DATABASE_URL, DEFAULT_SYMBOLS, DataFeed, DatabaseSettings,
    IngestSettings, RecorderConfig,
};
