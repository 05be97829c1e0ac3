use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::ShipperError;
use crate::record::{LogRecord, Severity};
use crate::sink::LogSink;

/// Buffer of pending records that knows how to flush itself.
///
/// The shipper's timer and `close` call `flush`; implementations decide
/// which records are pending and drop them only after the sink reports
/// success.
#[async_trait]
pub trait LogCache: Send + Sync {
    async fn flush(&self) -> Result<(), ShipperError>;
}

/// In-memory [`LogCache`] with a severity filter and a size cap.
///
/// Each flush takes an atomic snapshot of the pending records, so two
/// overlapping flushes never see the same record. A failed batch is put
/// back at the front of the queue, ahead of anything produced meanwhile.
///
/// The queue never holds more than `max_size` records. Past that the
/// oldest are dropped, so an outage costs old records rather than memory.
pub struct MemoryCache {
    sink: Arc<dyn LogSink>,
    level: Severity,
    max_size: usize,
    pending: Mutex<VecDeque<LogRecord>>,
    forced_flush: AtomicBool,
    dropped: AtomicUsize,
}

impl MemoryCache {
    /// **Parameters**
    /// - `sink`: where flushed batches go.
    /// - `level`: least severe level that is kept; anything below is
    ///   discarded on `push`.
    /// - `max_size`: pending count that triggers a flush without waiting
    ///   for the timer, and the most records kept while flushes fail.
    pub fn new(sink: Arc<dyn LogSink>, level: Severity, max_size: usize) -> Arc<Self> {
        Arc::new(MemoryCache {
            sink,
            level,
            max_size: max_size.max(1),
            pending: Mutex::new(VecDeque::new()),
            forced_flush: AtomicBool::new(false),
            dropped: AtomicUsize::new(0),
        })
    }

    pub fn level(&self) -> Severity {
        self.level
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    /// Records dropped to the size cap since the last successful flush.
    pub fn dropped(&self) -> usize {
        self.dropped.load(Ordering::Acquire)
    }

    /// Copy of the pending records, oldest first.
    pub fn pending(&self) -> Vec<LogRecord> {
        self.pending.lock().iter().cloned().collect()
    }

    /// Buffer `record` if it passes the severity filter. Returns whether it
    /// was kept.
    ///
    /// Reaching `max_size` spawns a flush on the current Tokio runtime; at
    /// most one such flush runs at a time. Outside a runtime the records
    /// simply wait for the next timer tick.
    pub fn push(self: &Arc<Self>, record: LogRecord) -> bool {
        if record.level < self.level {
            return false;
        }

        let (len, dropped) = {
            let mut pending = self.pending.lock();
            pending.push_back(record);
            let dropped = self.trim(&mut pending);
            (pending.len(), dropped)
        };
        self.note_dropped(dropped);

        if len >= self.max_size {
            self.spawn_forced_flush();
        }
        true
    }

    fn spawn_forced_flush(self: &Arc<Self>) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        if self.forced_flush.swap(true, Ordering::AcqRel) {
            return;
        }

        let cache = Arc::clone(self);
        handle.spawn(async move {
            if let Err(e) = cache.flush().await {
                tracing::warn!(error = %e, pending = cache.len(), "size-triggered log flush failed");
            }
            cache.forced_flush.store(false, Ordering::Release);
        });
    }

    fn take(&self) -> Vec<LogRecord> {
        self.pending.lock().drain(..).collect()
    }

    fn restore(&self, batch: Vec<LogRecord>) {
        let dropped = {
            let mut pending = self.pending.lock();
            for record in batch.into_iter().rev() {
                pending.push_front(record);
            }
            self.trim(&mut pending)
        };
        self.note_dropped(dropped);
    }

    /// Drop the oldest records beyond `max_size`. Returns how many went.
    fn trim(&self, pending: &mut VecDeque<LogRecord>) -> usize {
        let excess = pending.len().saturating_sub(self.max_size);
        pending.drain(..excess);
        excess
    }

    fn note_dropped(&self, count: usize) {
        if count == 0 {
            return;
        }
        // Warn once per outage; the total is reported when a flush succeeds.
        if self.dropped.fetch_add(count, Ordering::AcqRel) == 0 {
            tracing::warn!(max_size = self.max_size, "log cache full, dropping oldest records");
        }
    }
}

#[async_trait]
impl LogCache for MemoryCache {
    async fn flush(&self) -> Result<(), ShipperError> {
        let batch = self.take();
        if batch.is_empty() {
            return Ok(());
        }

        match self.sink.write_batch(&batch).await {
            Ok(()) => {
                let dropped = self.dropped.swap(0, Ordering::AcqRel);
                if dropped > 0 {
                    tracing::warn!(dropped, "log cache dropped records while the sink was failing");
                }
                Ok(())
            }
            Err(e) => {
                self.restore(batch);
                Err(e)
            }
        }
    }
}
