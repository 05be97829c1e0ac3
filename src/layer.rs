use crate::cache::MemoryCache;
use crate::record::{LogError, LogRecord, Severity};
use chrono::Utc;
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

/// Targets whose events are never captured: the modules of this crate that
/// log while flushing, and the HTTP stack underneath them.
const IGNORED_TARGETS: &[&str] = &[
    concat!(env!("CARGO_CRATE_NAME"), "::shipper"),
    concat!(env!("CARGO_CRATE_NAME"), "::writer"),
    concat!(env!("CARGO_CRATE_NAME"), "::index"),
    concat!(env!("CARGO_CRATE_NAME"), "::cache"),
    concat!(env!("CARGO_CRATE_NAME"), "::scheduler"),
    concat!(env!("CARGO_CRATE_NAME"), "::opensearch"),
    concat!(env!("CARGO_CRATE_NAME"), "::connection"),
    "reqwest",
    "hyper",
    "h2",
    "rustls",
];

/// `tracing_subscriber` layer that turns events into [`LogRecord`]s and
/// buffers them in a [`MemoryCache`].
///
/// Recognized event fields:
/// - `message`: the record message.
/// - `correlation_id`: copied to the record.
/// - `error`: a `dyn Error` value; its `source()` chain becomes nested
///   causes.
/// - `error.type`, `error.category`, `error.status`, `error.code`,
///   `error.stack_trace`: structured error fields; any other `error.*`
///   field lands in the error details.
///
/// Remaining fields are appended to the message as `key=value`.
pub struct CacheLayer {
    cache: Arc<MemoryCache>,
    source: String,
}

impl CacheLayer {
    pub fn new(cache: Arc<MemoryCache>, source: impl Into<String>) -> Self {
        CacheLayer {
            cache,
            source: source.into(),
        }
    }
}

impl<S> Layer<S> for CacheLayer
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    fn on_event(&self, event: &Event, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        let level = Severity::from(*meta.level());
        if level < self.cache.level() {
            return;
        }
        let target = meta.target();
        if IGNORED_TARGETS.iter().any(|ignored| {
            target
                .strip_prefix(ignored)
                .map_or(false, |rest| rest.is_empty() || rest.starts_with("::"))
        }) {
            return;
        }

        let mut visitor = RecordVisitor::default();
        event.record(&mut visitor);
        visitor.finish_message();

        let record = LogRecord {
            timestamp: Utc::now(),
            level,
            source: self.source.clone(),
            correlation_id: visitor.correlation_id,
            message: visitor.message,
            error: visitor.error,
        };

        self.cache.push(record);
    }
}

#[derive(Default)]
struct RecordVisitor {
    message: String,
    extra: String,
    correlation_id: Option<String>,
    error: Option<LogError>,
}

impl RecordVisitor {
    fn error_mut(&mut self) -> &mut LogError {
        self.error.get_or_insert_with(LogError::default)
    }

    fn record_value(&mut self, field: &Field, value: serde_json::Value, display: String) {
        match field.name() {
            "message" => self.message = display,
            "correlation_id" => self.correlation_id = Some(display),
            "error.type" => self.error_mut().kind = Some(display),
            "error.category" => self.error_mut().category = Some(display),
            "error.code" => self.error_mut().code = Some(display),
            "error.message" => self.error_mut().message = Some(display),
            "error.stack_trace" => self.error_mut().stack_trace = Some(display),
            "error.status" => self.error_mut().status = value.as_u64().and_then(|s| u16::try_from(s).ok()),
            name if name.starts_with("error.") => {
                let key = name.trim_start_matches("error.").to_string();
                self.error_mut().details.insert(key, value);
            }
            name => {
                let _ = write!(self.extra, " {}={}", name, display);
            }
        }
    }

    fn finish_message(&mut self) {
        if !self.extra.is_empty() {
            self.message.push_str(&self.extra);
            self.extra.clear();
        }
    }
}

fn error_chain(err: &(dyn std::error::Error + 'static)) -> LogError {
    let mut root = LogError::new(err.to_string());
    if let Some(source) = err.source() {
        root = root.with_cause(error_chain(source));
    }
    root
}

impl Visit for RecordVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.record_value(field, serde_json::Value::from(value), value.to_string());
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.record_value(field, serde_json::Value::from(value), value.to_string());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.record_value(field, serde_json::Value::from(value), value.to_string());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.record_value(field, serde_json::Value::from(value), value.to_string());
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        if field.name() == "error" {
            let chain = error_chain(value);
            let error = self.error_mut();
            error.message = chain.message;
            error.cause = chain.cause;
        } else {
            self.record_value(field, serde_json::Value::from(value.to_string()), value.to_string());
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        let display = format!("{:?}", value);
        self.record_value(field, serde_json::Value::String(display.clone()), display);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::noop_sink::NoopSink;
    use tracing_subscriber::layer::SubscriberExt;

    #[derive(Debug, thiserror::Error)]
    #[error("order rejected")]
    struct OrderError(#[source] std::io::Error);

    fn capture(level: Severity, emit: impl FnOnce()) -> Vec<LogRecord> {
        let cache = MemoryCache::new(Arc::new(NoopSink), level, usize::MAX);
        let subscriber =
            tracing_subscriber::registry().with(CacheLayer::new(Arc::clone(&cache), "checkout"));
        tracing::subscriber::with_default(subscriber, emit);
        cache.pending()
    }

    #[test]
    fn captures_message_level_and_correlation() {
        let records = capture(Severity::Info, || {
            tracing::debug!("ignored");
            tracing::warn!(correlation_id = "req-7", user = 42, "slow checkout");
        });

        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.level, Severity::Warn);
        assert_eq!(record.source, "checkout");
        assert_eq!(record.correlation_id.as_deref(), Some("req-7"));
        assert_eq!(record.message, "slow checkout user=42");
        assert!(record.error.is_none());
    }

    #[test]
    fn builds_structured_error_with_cause_chain() {
        let records = capture(Severity::Error, || {
            let err = OrderError(std::io::Error::new(std::io::ErrorKind::Other, "disk full"));
            tracing::error!(
                error = &err as &(dyn std::error::Error + 'static),
                error.code = "E_ORDER",
                error.status = 507,
                error.shard = "eu-1",
                "order failed"
            );
        });

        let error = records[0].error.as_ref().unwrap();
        assert_eq!(error.message.as_deref(), Some("order rejected"));
        assert_eq!(
            error.cause.as_ref().and_then(|c| c.message.as_deref()),
            Some("disk full")
        );
        assert_eq!(error.code.as_deref(), Some("E_ORDER"));
        assert_eq!(error.status, Some(507));
        assert_eq!(error.details["shard"], "eu-1");
    }

    #[test]
    fn skips_own_diagnostics() {
        let records = capture(Severity::Trace, || {
            tracing::warn!(target: "index_log_shipper::writer", "internal");
            tracing::warn!(target: "index_log_shipper::opensearch", "retrying");
            tracing::warn!(target: "hyper::client", "wire");
            tracing::warn!(target: "index_log_shippers", "lookalike");
            tracing::warn!(target: "billing", "kept");
        });
        let messages: Vec<_> = records.iter().map(|r| r.message.as_str()).collect();
        assert_eq!(messages, vec!["lookalike", "kept"]);
    }

    #[test]
    fn captures_events_from_crate_modules_that_do_not_flush() {
        let records = capture(Severity::Info, || {
            tracing::info!("from the layer's own module");
        });
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].message, "from the layer's own module");
    }
}
