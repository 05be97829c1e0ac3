//! Buffers log records in memory and ships them in bulk to a
//! search-indexed store, rotating the target index by date.
//!
//! A [`Shipper`] ties the pieces together: records go into a
//! [`MemoryCache`] (directly or through the [`CacheLayer`] tracing layer), a
//! [`FlushScheduler`] flushes the cache on a timer while the shipper is
//! open, and the [`BatchWriter`] writes each flush as one bulk request to
//! the index resolved by the [`IndexManager`].

pub mod backend;
pub mod cache;
pub mod config;
pub mod connection;
pub mod env;
pub mod error;
pub mod index;
pub mod init;
pub mod layer;
pub mod noop_sink;
pub mod record;
pub mod scheduler;
pub mod schema;
pub mod shipper;
pub mod sink;
pub mod writer;

#[cfg(feature = "opensearch")]
pub mod opensearch;

#[cfg(test)]
mod testing;

pub use cache::{LogCache, MemoryCache};
pub use config::ShipperConfig;
pub use error::{ShipperError, WriteFailure};
pub use index::IndexManager;
pub use layer::CacheLayer;
pub use record::{LogError, LogRecord, Severity};
pub use scheduler::FlushScheduler;
pub use shipper::{Shipper, ShipperState};
pub use sink::LogSink;
pub use writer::BatchWriter;
