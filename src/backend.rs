use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::connection::ConnectionTarget;
use crate::error::{ShipperError, WriteFailure};
use crate::schema::IndexSchema;

/// Document type tag attached to every bulk action. `_doc` is the typeless
/// default understood by OpenSearch and Elasticsearch 7+.
pub const DOC_TYPE: &str = "_doc";

/// One entry of a bulk request.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkDocument {
    pub id: String,
    pub index: String,
    pub source: Value,
}

/// Transport-level settings handed to a backend session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientOptions {
    /// Per-request timeout.
    pub timeout: Duration,
    /// Extra attempts after a transient failure.
    pub max_retries: u32,
    /// How long a node stays marked dead after it was found unreachable.
    pub reconnect: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        ClientOptions {
            timeout: Duration::from_millis(30_000),
            max_retries: 3,
            reconnect: Duration::from_millis(60_000),
        }
    }
}

/// Errors reported by an [`IndexBackend`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("node marked dead for another {0:?}")]
    NodeDead(Duration),

    #[error("failed to encode request: {0}")]
    Encode(String),

    #[error("{failed} of {total} bulk items failed: {reason}")]
    ItemsFailed {
        failed: usize,
        total: usize,
        reason: String,
    },
}

impl From<BackendError> for WriteFailure {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::ItemsFailed {
                failed,
                total,
                reason,
            } => WriteFailure::Rejected {
                failed,
                total,
                reason,
            },
            other => WriteFailure::Unreachable(other.to_string()),
        }
    }
}

/// Client session against a search-indexed storage backend.
#[async_trait]
pub trait IndexBackend: Send + Sync {
    async fn index_exists(&self, index: &str) -> Result<bool, BackendError>;

    /// Create `index` with `schema`. An index that already exists counts
    /// as success, so concurrent callers may race safely.
    async fn create_index(&self, index: &str, schema: &IndexSchema) -> Result<(), BackendError>;

    /// Submit all `documents` as a single bulk call. Any failed item fails
    /// the whole call.
    async fn bulk_write(
        &self,
        index: &str,
        doc_type: &str,
        documents: &[BulkDocument],
    ) -> Result<(), BackendError>;
}

/// Opens [`IndexBackend`] sessions for a resolved target.
#[async_trait]
pub trait BackendConnector: Send + Sync {
    async fn connect(
        &self,
        target: &ConnectionTarget,
        options: &ClientOptions,
    ) -> Result<Arc<dyn IndexBackend>, ShipperError>;
}
