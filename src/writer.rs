use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use uuid::Uuid;

use crate::backend::{BulkDocument, IndexBackend, DOC_TYPE};
use crate::error::ShipperError;
use crate::index::IndexManager;
use crate::record::{LogError, LogRecord, Severity};
use crate::sink::LogSink;

/// Shape of a log document as stored in the index.
#[derive(Serialize)]
struct LogDocument<'a> {
    time: &'a DateTime<Utc>,
    source: &'a str,
    level: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    correlation_id: Option<&'a str>,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a LogError>,
}

impl<'a> From<&'a LogRecord> for LogDocument<'a> {
    fn from(record: &'a LogRecord) -> Self {
        LogDocument {
            time: &record.timestamp,
            source: &record.source,
            level: record.level,
            correlation_id: record.correlation_id.as_deref(),
            message: &record.message,
            error: record.error.as_ref(),
        }
    }
}

/// [`LogSink`] that writes batches to the active index with one bulk call.
///
/// The writer is inert until a backend session is attached; the shipper
/// attaches one on open and detaches it on close.
pub struct BatchWriter {
    index: IndexManager,
    backend: RwLock<Option<Arc<dyn IndexBackend>>>,
}

impl BatchWriter {
    pub fn new(index: IndexManager) -> Self {
        BatchWriter {
            index,
            backend: RwLock::new(None),
        }
    }

    pub fn index_manager(&self) -> &IndexManager {
        &self.index
    }

    pub fn attach(&self, backend: Arc<dyn IndexBackend>) {
        *self.backend.write() = Some(backend);
    }

    /// Drop the backend session and forget the confirmed index.
    pub fn detach(&self) -> Option<Arc<dyn IndexBackend>> {
        let previous = self.backend.write().take();
        self.index.reset();
        previous
    }

    pub fn is_attached(&self) -> bool {
        self.backend.read().is_some()
    }

    fn session(&self) -> Option<Arc<dyn IndexBackend>> {
        self.backend.read().clone()
    }

    /// Resolve the active index and make sure it exists. Returns the
    /// resolved name.
    pub async fn prepare_index(&self, force: bool) -> Result<String, ShipperError> {
        let backend = self.session().ok_or(ShipperError::NotOpen)?;
        let index = self.index.resolve_current_index_name();
        self.index
            .ensure_index_ready(backend.as_ref(), &index, force)
            .await?;
        Ok(index)
    }

    /// Turn `records` into bulk documents for `index`, each with a fresh id.
    pub fn build_batch(
        &self,
        index: &str,
        records: &[LogRecord],
    ) -> Result<Vec<BulkDocument>, ShipperError> {
        records
            .iter()
            .map(|record| -> Result<BulkDocument, ShipperError> {
                Ok(BulkDocument {
                    id: Uuid::new_v4().to_string(),
                    index: index.to_string(),
                    source: serde_json::to_value(LogDocument::from(record))?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl LogSink for BatchWriter {
    async fn write_batch(&self, records: &[LogRecord]) -> Result<(), ShipperError> {
        if records.is_empty() {
            return Ok(());
        }

        // Hold on to the session for the whole call so a concurrent close
        // cannot pull it out from under an in-flight write.
        let backend = self.session().ok_or(ShipperError::NotOpen)?;
        let index = self.index.resolve_current_index_name();
        self.index
            .ensure_index_ready(backend.as_ref(), &index, false)
            .await?;

        let documents = self.build_batch(&index, records)?;
        backend
            .bulk_write(&index, DOC_TYPE, &documents)
            .await
            .map_err(|e| ShipperError::StorageWrite(e.into()))?;

        tracing::debug!(index = %index, count = documents.len(), "persisted log batch");
        Ok(())
    }
}
