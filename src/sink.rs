use crate::error::ShipperError;
use crate::record::LogRecord;
use async_trait::async_trait;

/// Asynchronous destination for batches of [`LogRecord`]s.
///
/// The log cache calls `write_batch` with a snapshot of its pending
/// records whenever it flushes, either on the shipper's timer or on its own
/// size policy.
#[async_trait]
pub trait LogSink: Send + Sync {
    /// Persist `records` as one unit.
    ///
    /// **Parameters**
    /// - `records`: pending records in the order they were produced.
    ///
    /// **Returns**
    /// - `Ok(())` once every record has been accepted by the backend. The
    ///   caller may then drop them.
    /// - `Err(..)` if any part of the batch failed. Nothing is considered
    ///   persisted and the caller should keep the records for the next
    ///   attempt; a retry may write duplicates.
    async fn write_batch(&self, records: &[LogRecord]) -> Result<(), ShipperError>;
}
