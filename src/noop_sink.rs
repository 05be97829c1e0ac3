use crate::error::ShipperError;
use crate::record::LogRecord;
use crate::sink::LogSink;
use async_trait::async_trait;

/// A sink that accepts and drops every batch.
///
/// Useful for measuring the overhead of the cache and tracing layer without
/// any external I/O, and for tests that don't care about persistence.
#[derive(Clone, Default)]
pub struct NoopSink;

#[async_trait]
impl LogSink for NoopSink {
    async fn write_batch(&self, _records: &[LogRecord]) -> Result<(), ShipperError> {
        Ok(())
    }
}
