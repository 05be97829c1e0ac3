//! In-memory fakes shared by the unit tests.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::backend::{BackendConnector, BackendError, BulkDocument, ClientOptions, IndexBackend};
use crate::connection::ConnectionTarget;
use crate::error::{ShipperError, WriteFailure};
use crate::record::LogRecord;
use crate::schema::IndexSchema;
use crate::sink::LogSink;

#[derive(Default)]
struct BackendState {
    indices: Mutex<BTreeSet<String>>,
    created: Mutex<Vec<String>>,
    bulks: Mutex<Vec<(String, Vec<BulkDocument>)>>,
    bulk_attempts: AtomicUsize,
    exists_calls: AtomicUsize,
    fail_create: AtomicBool,
    fail_bulk: Mutex<Option<BackendError>>,
}

/// Backend keeping indices and bulk calls in memory.
#[derive(Clone, Default)]
pub struct FakeBackend {
    state: Arc<BackendState>,
}

impl FakeBackend {
    pub fn with_index(self, index: &str) -> Self {
        self.state.indices.lock().insert(index.to_string());
        self
    }

    pub fn create_calls(&self) -> usize {
        self.state.created.lock().len()
    }

    pub fn exists_calls(&self) -> usize {
        self.state.exists_calls.load(Ordering::SeqCst)
    }

    pub fn created_indices(&self) -> Vec<String> {
        self.state.created.lock().clone()
    }

    /// Successful bulk calls, in order.
    pub fn bulks(&self) -> Vec<(String, Vec<BulkDocument>)> {
        self.state.bulks.lock().clone()
    }

    /// Bulk calls attempted, successful or not.
    pub fn bulk_attempts(&self) -> usize {
        self.state.bulk_attempts.load(Ordering::SeqCst)
    }

    pub fn fail_create(&self, fail: bool) {
        self.state.fail_create.store(fail, Ordering::SeqCst);
    }

    pub fn fail_bulk(&self, error: Option<BackendError>) {
        *self.state.fail_bulk.lock() = error;
    }
}

#[async_trait]
impl IndexBackend for FakeBackend {
    async fn index_exists(&self, index: &str) -> Result<bool, BackendError> {
        self.state.exists_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.state.indices.lock().contains(index))
    }

    async fn create_index(&self, index: &str, _schema: &IndexSchema) -> Result<(), BackendError> {
        if self.state.fail_create.load(Ordering::SeqCst) {
            return Err(BackendError::Status {
                status: 400,
                body: "mapper_parsing_exception".into(),
            });
        }
        self.state.created.lock().push(index.to_string());
        self.state.indices.lock().insert(index.to_string());
        Ok(())
    }

    async fn bulk_write(
        &self,
        index: &str,
        _doc_type: &str,
        documents: &[BulkDocument],
    ) -> Result<(), BackendError> {
        self.state.bulk_attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.state.fail_bulk.lock().clone() {
            return Err(err);
        }
        self.state
            .bulks
            .lock()
            .push((index.to_string(), documents.to_vec()));
        Ok(())
    }
}

/// Connector handing out a shared [`FakeBackend`].
#[derive(Clone, Default)]
pub struct FakeConnector {
    pub backend: FakeBackend,
    connects: Arc<AtomicUsize>,
}

impl FakeConnector {
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BackendConnector for FakeConnector {
    async fn connect(
        &self,
        _target: &ConnectionTarget,
        _options: &ClientOptions,
    ) -> Result<Arc<dyn IndexBackend>, ShipperError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(self.backend.clone()))
    }
}

/// Sink recording every batch it is handed; can be told to fail.
#[derive(Clone, Default)]
pub struct RecordingSink {
    batches: Arc<Mutex<Vec<Vec<LogRecord>>>>,
    fail: Arc<AtomicBool>,
}

impl RecordingSink {
    pub fn batches(&self) -> Vec<Vec<LogRecord>> {
        self.batches.lock().clone()
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl LogSink for RecordingSink {
    async fn write_batch(&self, records: &[LogRecord]) -> Result<(), ShipperError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(WriteFailure::Unreachable("connection refused".into()).into());
        }
        self.batches.lock().push(records.to_vec());
        Ok(())
    }
}
