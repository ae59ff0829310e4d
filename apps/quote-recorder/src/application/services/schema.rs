//! Schema initialization.

use std::sync::Arc;

use crate::application::ports::{QuoteStore, StoreError};

/// Ensures the quote table exists before any batch is written.
pub struct SchemaInitializer {
    store: Arc<dyn QuoteStore>,
}

impl SchemaInitializer {
    /// Create an initializer for `store`.
    #[must_use]
    pub fn new(store: Arc<dyn QuoteStore>) -> Self {
        Self { store }
    }

    /// Create the table if absent. Safe to call repeatedly.
    ///
    /// # Errors
    ///
    /// Returns the store error unchanged; callers treat it as fatal.
    pub async fn ensure_table(&self) -> Result<(), StoreError> {
        if let Err(e) = self.store.ensure_table().await {
            tracing::error!(error = %e, "Failed to create quote table");
            return Err(e);
        }
        tracing::info!("Quote table ready");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::MockQuoteStore;

    #[tokio::test]
    async fn propagates_store_failure() {
        let mut store = MockQuoteStore::new();
        store
            .expect_ensure_table()
            .times(1)
            .returning(|| Err(StoreError::Connection("refused".to_string())));

        let init = SchemaInitializer::new(Arc::new(store));
        let err = init.ensure_table().await.unwrap_err();
        assert!(matches!(err, StoreError::Connection(_)));
    }

    #[tokio::test]
    async fn repeated_calls_hit_store_each_time() {
        let mut store = MockQuoteStore::new();
        store.expect_ensure_table().times(2).returning(|| Ok(()));

        let init = SchemaInitializer::new(Arc::new(store));
        init.ensure_table().await.unwrap();
        init.ensure_table().await.unwrap();
    }
}
