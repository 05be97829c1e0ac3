use crate::cache::MemoryCache;
use crate::layer::CacheLayer;
use std::sync::Arc;
use tracing::subscriber::SetGlobalDefaultError;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Registry;

/// Settings for the globally installed tracing subscriber.
///
/// **Fields**
/// - `source`: context name stamped on every captured [`LogRecord`].
/// - `enable_stdout`: if `true`, a `tracing_subscriber::fmt::Layer` is
///   stacked on top of [`CacheLayer`] so events are also printed to the
///   console.
///
/// [`LogRecord`]: crate::record::LogRecord
#[derive(Clone, Debug)]
pub struct LayerConfig {
    pub source: String,
    pub enable_stdout: bool,
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self {
            source: "app".to_string(),
            enable_stdout: true,
        }
    }
}

/// Install a global `tracing` subscriber that feeds `cache`.
///
/// **Parameters**
/// - `cache`: buffer the shipper flushes, usually `shipper.cache()`.
/// - `config`: [`LayerConfig`] controlling the record source and console
///   output.
///
/// **Returns**
/// - `Err(..)` if a global subscriber was already installed.
pub fn init_tracing_with_config(
    cache: Arc<MemoryCache>,
    config: LayerConfig,
) -> Result<(), SetGlobalDefaultError> {
    let layer = CacheLayer::new(cache, config.source);

    // The two subscriber shapes have different types, hence two branches.
    if config.enable_stdout {
        let fmt_layer = tracing_subscriber::fmt::layer();
        let subscriber = Registry::default().with(layer).with(fmt_layer);
        tracing::subscriber::set_global_default(subscriber)
    } else {
        let subscriber = Registry::default().with(layer);
        tracing::subscriber::set_global_default(subscriber)
    }
}

/// Install the subscriber with records tagged by `source` and console
/// output enabled.
pub fn init_tracing(cache: Arc<MemoryCache>, source: impl Into<String>) -> Result<(), SetGlobalDefaultError> {
    init_tracing_with_config(
        cache,
        LayerConfig {
            source: source.into(),
            ..LayerConfig::default()
        },
    )
}
