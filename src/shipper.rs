use std::sync::Arc;

use parking_lot::Mutex;
use uuid::Uuid;

use crate::backend::BackendConnector;
use crate::cache::{LogCache, MemoryCache};
use crate::config::ShipperConfig;
use crate::connection::{ConnectionResolver, ConnectionTarget};
use crate::error::ShipperError;
use crate::index::IndexManager;
use crate::record::LogRecord;
use crate::scheduler::FlushScheduler;
use crate::schema::IndexSchema;
use crate::writer::BatchWriter;

/// Lifecycle state of a [`Shipper`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShipperState {
    Closed,
    Opening,
    Open,
    Closing,
}

/// Log shipping component: buffers records in a [`LogCache`] and flushes
/// them to the active index on a timer while open.
///
/// `open` resolves the backend, checks the index and starts the timer.
/// `close` stops the timer, flushes whatever is left once and drops the
/// backend session. Both are idempotent and serialized with each other.
pub struct Shipper<C: LogCache + 'static = MemoryCache> {
    config: ShipperConfig,
    resolver: Arc<dyn ConnectionResolver>,
    connector: Arc<dyn BackendConnector>,
    writer: Arc<BatchWriter>,
    cache: Arc<C>,
    transition: tokio::sync::Mutex<()>,
    state: Mutex<ShipperState>,
    scheduler: Mutex<Option<FlushScheduler>>,
    target: Mutex<Option<ConnectionTarget>>,
}

impl Shipper<MemoryCache> {
    /// Shipper with the built-in [`MemoryCache`], filtered at
    /// `config.level`, flushing early and capped at `options.max_cache_size`.
    pub fn new(
        config: ShipperConfig,
        resolver: Arc<dyn ConnectionResolver>,
        connector: Arc<dyn BackendConnector>,
    ) -> Result<Self, ShipperError> {
        let level = config.level;
        let max_size = config.options.max_cache_size;
        Self::with_cache(config, resolver, connector, |writer| {
            MemoryCache::new(writer, level, max_size)
        })
    }

    /// Buffer a record for the next flush. Returns whether the cache kept
    /// it.
    pub fn log(&self, record: LogRecord) -> bool {
        self.cache.push(record)
    }
}

#[cfg(feature = "opensearch")]
impl Shipper<MemoryCache> {
    /// Shipper talking to OpenSearch at the configured connection.
    pub fn opensearch(config: ShipperConfig) -> Result<Self, ShipperError> {
        let resolver = Arc::new(crate::connection::StaticResolver::new(config.connection.clone()));
        let connector = Arc::new(crate::opensearch::OpenSearchConnector);
        Self::new(config, resolver, connector)
    }
}

impl<C: LogCache + 'static> Shipper<C> {
    /// Shipper around a caller-provided cache. `make_cache` receives the
    /// batch writer the cache must flush into.
    pub fn with_cache<F>(
        config: ShipperConfig,
        resolver: Arc<dyn ConnectionResolver>,
        connector: Arc<dyn BackendConnector>,
        make_cache: F,
    ) -> Result<Self, ShipperError>
    where
        F: FnOnce(Arc<BatchWriter>) -> Arc<C>,
    {
        config.validate()?;
        let index = IndexManager::new(
            config.index_descriptor()?,
            IndexSchema::for_options(config.options.index_message),
        );
        let writer = Arc::new(BatchWriter::new(index));
        let cache = make_cache(Arc::clone(&writer));

        Ok(Shipper {
            config,
            resolver,
            connector,
            writer,
            cache,
            transition: tokio::sync::Mutex::new(()),
            state: Mutex::new(ShipperState::Closed),
            scheduler: Mutex::new(None),
            target: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &ShipperConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<C> {
        &self.cache
    }

    pub fn writer(&self) -> &Arc<BatchWriter> {
        &self.writer
    }

    pub fn state(&self) -> ShipperState {
        *self.state.lock()
    }

    /// Target resolved by the last successful `open`, while open.
    pub fn target(&self) -> Option<ConnectionTarget> {
        self.target.lock().clone()
    }

    /// True while the flush timer is running.
    pub fn is_open(&self) -> bool {
        self.scheduler
            .lock()
            .as_ref()
            .map_or(false, |s| s.is_running())
    }

    pub async fn open(&self) -> Result<(), ShipperError> {
        let _transition = self.transition.lock().await;
        if self.is_open() {
            return Ok(());
        }

        *self.state.lock() = ShipperState::Opening;
        match self.start().await {
            Ok((target, scheduler)) => {
                tracing::info!(
                    url = %target.base_url(),
                    index = %self.writer.index_manager().resolve_current_index_name(),
                    interval_ms = scheduler.period().as_millis() as u64,
                    "log shipper opened"
                );
                *self.target.lock() = Some(target);
                *self.scheduler.lock() = Some(scheduler);
                *self.state.lock() = ShipperState::Open;
                Ok(())
            }
            Err(e) => {
                self.writer.detach();
                *self.state.lock() = ShipperState::Closed;
                tracing::error!(error = %e, "failed to open log shipper");
                Err(e)
            }
        }
    }

    async fn start(&self) -> Result<(ConnectionTarget, FlushScheduler), ShipperError> {
        let trace_id = Uuid::new_v4().to_string();
        let target = self.resolver.resolve(&trace_id).await?;
        let backend = self
            .connector
            .connect(&target, &self.config.client_options())
            .await?;
        self.writer.attach(backend);

        // Surface a bad mapping or unreachable cluster now rather than on
        // the first flush.
        self.writer.prepare_index(true).await?;

        let cache: Arc<dyn LogCache> = self.cache.clone();
        Ok((target, FlushScheduler::start(cache, self.config.interval())))
    }

    /// Stop the timer, flush once, and drop the backend session.
    ///
    /// The final flush is not retried. If it fails the shipper still ends
    /// up closed and the error is returned afterwards.
    pub async fn close(&self) -> Result<(), ShipperError> {
        let _transition = self.transition.lock().await;
        let scheduler = self.scheduler.lock().take();
        let Some(scheduler) = scheduler else {
            return Ok(());
        };

        *self.state.lock() = ShipperState::Closing;
        scheduler.stop();
        drop(scheduler);

        let flushed = self.cache.flush().await;
        if let Err(e) = &flushed {
            tracing::warn!(error = %e, "final log flush failed");
        }

        self.writer.detach();
        *self.target.lock() = None;
        *self.state.lock() = ShipperState::Closed;
        tracing::info!("log shipper closed");

        flushed
    }

    /// Flush pending records now. Errors are returned to the caller; the
    /// records stay cached for the next attempt.
    pub async fn flush(&self) -> Result<(), ShipperError> {
        self.cache.flush().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendError;
    use crate::connection::{ConnectionConfig, StaticResolver};
    use crate::record::Severity;
    use crate::testing::FakeConnector;
    use chrono::Utc;
    use std::time::Duration;

    fn config() -> ShipperConfig {
        ShipperConfig {
            level: Severity::Trace,
            connection: ConnectionConfig {
                host: Some("localhost".into()),
                ..Default::default()
            },
            ..Default::default()
        }
        .with_interval(Duration::from_millis(100))
    }

    fn shipper(config: ShipperConfig, connector: &FakeConnector) -> Shipper {
        let resolver = Arc::new(StaticResolver::new(config.connection.clone()));
        Shipper::new(config, resolver, Arc::new(connector.clone())).unwrap()
    }

    fn record(level: Severity, msg: &str) -> LogRecord {
        LogRecord::new(level, "orders", msg)
    }

    #[tokio::test]
    async fn open_without_connection_fails_and_stays_closed() {
        let connector = FakeConnector::default();
        let mut cfg = config();
        cfg.connection = ConnectionConfig::default();
        let shipper = shipper(cfg, &connector);

        let err = shipper.open().await.unwrap_err();
        assert!(matches!(err, ShipperError::Configuration(ref m) if m == ShipperError::NO_CONNECTION));
        assert!(!shipper.is_open());
        assert_eq!(shipper.state(), ShipperState::Closed);
        assert_eq!(connector.connects(), 0);
    }

    #[tokio::test]
    async fn open_creates_index_eagerly() {
        let connector = FakeConnector::default();
        let shipper = shipper(config(), &connector);

        shipper.open().await.unwrap();

        assert!(shipper.is_open());
        assert_eq!(shipper.state(), ShipperState::Open);
        assert_eq!(connector.backend.created_indices(), vec!["log"]);
        assert_eq!(
            shipper.target().map(|t| t.base_url()).as_deref(),
            Some("http://localhost:9200")
        );
        shipper.close().await.unwrap();
    }

    #[tokio::test]
    async fn open_fails_when_index_cannot_be_created() {
        let connector = FakeConnector::default();
        connector.backend.fail_create(true);
        let shipper = shipper(config(), &connector);

        let err = shipper.open().await.unwrap_err();
        assert!(matches!(err, ShipperError::IndexCreation { .. }));
        assert!(!shipper.is_open());
        assert!(!shipper.writer().is_attached());
    }

    #[tokio::test]
    async fn open_and_close_are_idempotent() {
        let connector = FakeConnector::default();
        let shipper = shipper(config(), &connector);

        shipper.close().await.unwrap();
        shipper.open().await.unwrap();
        shipper.open().await.unwrap();
        assert_eq!(connector.connects(), 1);

        shipper.close().await.unwrap();
        shipper.close().await.unwrap();
        assert!(!shipper.is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn periodic_flush_ships_buffered_records() {
        let connector = FakeConnector::default();
        let cfg = config().with_daily("yyyyMMdd");
        let shipper = shipper(cfg, &connector);
        shipper.open().await.unwrap();

        let levels = [
            Severity::Debug,
            Severity::Info,
            Severity::Warn,
            Severity::Error,
            Severity::Fatal,
        ];
        for (i, level) in levels.iter().enumerate() {
            assert!(shipper.log(record(*level, &format!("step {}", i))));
        }

        tokio::time::sleep(Duration::from_millis(150)).await;

        let expected = format!("log-{}", Utc::now().format("%Y%m%d"));
        let bulks = connector.backend.bulks();
        assert_eq!(bulks.len(), 1);
        assert_eq!(bulks[0].0, expected);
        assert_eq!(bulks[0].1.len(), 5);
        assert!(shipper.cache().is_empty());

        shipper.close().await.unwrap();
        let attempts = connector.backend.bulk_attempts();
        shipper.log(record(Severity::Error, "too late"));
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(connector.backend.bulk_attempts(), attempts);
    }

    #[tokio::test(start_paused = true)]
    async fn close_flushes_once_then_stops() {
        let connector = FakeConnector::default();
        let shipper = shipper(config().with_interval(Duration::from_secs(60)), &connector);
        shipper.open().await.unwrap();
        shipper.log(record(Severity::Info, "a"));
        shipper.log(record(Severity::Info, "b"));

        shipper.close().await.unwrap();

        assert!(!shipper.is_open());
        assert_eq!(shipper.state(), ShipperState::Closed);
        assert_eq!(connector.backend.bulk_attempts(), 1);
        assert_eq!(connector.backend.bulks()[0].1.len(), 2);
        assert_eq!(shipper.writer().index_manager().confirmed_index(), None);
        assert_eq!(shipper.target(), None);

        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(connector.backend.bulk_attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_ticks_keep_records_and_timer() {
        let connector = FakeConnector::default();
        let shipper = shipper(config(), &connector);
        shipper.open().await.unwrap();
        connector
            .backend
            .fail_bulk(Some(BackendError::Transport("connection reset".into())));
        shipper.log(record(Severity::Warn, "first"));
        shipper.log(record(Severity::Warn, "second"));
        let before = shipper.cache().pending();

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(connector.backend.bulk_attempts(), 2);
        assert_eq!(shipper.cache().pending(), before);
        assert!(shipper.is_open());

        connector.backend.fail_bulk(None);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(connector.backend.bulks().len(), 1);
        assert!(shipper.cache().is_empty());
        shipper.close().await.unwrap();
    }

    #[tokio::test]
    async fn explicit_flush_reports_errors() {
        let connector = FakeConnector::default();
        let shipper = shipper(config(), &connector);
        shipper.open().await.unwrap();
        connector.backend.fail_bulk(Some(BackendError::ItemsFailed {
            failed: 1,
            total: 1,
            reason: "version_conflict_engine_exception".into(),
        }));
        shipper.log(record(Severity::Error, "boom"));

        assert!(matches!(
            shipper.flush().await,
            Err(ShipperError::StorageWrite(_))
        ));
        assert_eq!(shipper.cache().len(), 1);

        let closed = shipper.close().await;
        assert!(closed.is_err());
        assert!(!shipper.is_open());
        assert_eq!(shipper.state(), ShipperState::Closed);
    }

    #[tokio::test]
    async fn reopen_reconfirms_index() {
        let connector = FakeConnector::default();
        let shipper = shipper(config(), &connector);

        shipper.open().await.unwrap();
        shipper.close().await.unwrap();
        shipper.open().await.unwrap();

        assert_eq!(connector.backend.exists_calls(), 2);
        assert_eq!(connector.backend.create_calls(), 1);
        assert_eq!(connector.connects(), 2);
        shipper.close().await.unwrap();
    }
}
