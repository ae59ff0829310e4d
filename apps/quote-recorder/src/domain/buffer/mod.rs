//! Batching Buffer
//!
//! Accumulates observations until a size threshold is reached, then hands
//! the whole run over as a [`Batch`]. The buffer has a single owner; the
//! ingest task is the only writer, so no locking is needed.

use std::mem;

use super::quote::{Batch, QuoteObservation};

/// Default flush threshold.
pub const DEFAULT_FLUSH_THRESHOLD: usize = 5;

/// Count-triggered quote buffer.
#[derive(Debug)]
pub struct BatchBuffer {
    threshold: usize,
    pending: Vec<QuoteObservation>,
}

impl Default for BatchBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_FLUSH_THRESHOLD)
    }
}

impl BatchBuffer {
    /// Create a buffer that flushes at `threshold` observations.
    ///
    /// A threshold of zero is treated as one.
    #[must_use]
    pub fn new(threshold: usize) -> Self {
        let threshold = threshold.max(1);
        Self {
            threshold,
            pending: Vec::with_capacity(threshold),
        }
    }

    /// Flush threshold.
    #[must_use]
    pub const fn threshold(&self) -> usize {
        self.threshold
    }

    /// Number of buffered observations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Check whether anything is buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Append an observation.
    pub fn append(&mut self, observation: QuoteObservation) {
        self.pending.push(observation);
    }

    /// Take the buffered observations if the threshold has been reached.
    ///
    /// On `Some`, the buffer is left empty.
    pub fn try_flush(&mut self) -> Option<Batch> {
        if self.pending.len() >= self.threshold {
            self.take()
        } else {
            None
        }
    }

    /// Take whatever is buffered regardless of the threshold.
    ///
    /// Returns `None` when the buffer is empty.
    pub fn drain(&mut self) -> Option<Batch> {
        if self.pending.is_empty() {
            None
        } else {
            self.take()
        }
    }

    fn take(&mut self) -> Option<Batch> {
        let taken = mem::replace(&mut self.pending, Vec::with_capacity(self.threshold));
        Some(Batch::from(taken))
    }
}
