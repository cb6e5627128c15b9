//! Envelope ingestion: validate, normalize, append.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::event::CollectRequest;
use crate::storage::EventStore;

/// Validates incoming envelopes and appends them to the event store.
#[derive(Debug, Clone)]
pub struct IngestionService {
    store: Arc<EventStore>,
}

impl IngestionService {
    /// Create a service writing to `store`.
    #[must_use]
    pub fn new(store: Arc<EventStore>) -> Self {
        Self { store }
    }

    /// Validate one envelope and persist it, returning the stored id.
    ///
    /// Unknown and missing optional fields never cause a rejection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingRequiredField`] or [`Error::InvalidField`] for a
    /// rejected envelope (nothing is written), or a storage-class error if the
    /// insert fails.
    pub async fn collect(&self, request: CollectRequest) -> Result<i64> {
        let envelope = request.validate().inspect_err(|e| {
            debug!(error = %e, "Rejected envelope");
        })?;

        let store = Arc::clone(&self.store);
        let id = tokio::task::spawn_blocking(move || store.insert(&envelope))
            .await
            .map_err(|e| Error::internal(format!("insert task failed: {e}")))?
            .inspect_err(|e| warn!(error = %e, "Failed to persist event"))?;

        Ok(id)
    }
}
