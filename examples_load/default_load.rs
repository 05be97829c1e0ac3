use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, Duration};
use tracing::error;

use index_log_shipper::init::{init_tracing_with_config, LayerConfig};
use index_log_shipper::noop_sink::NoopSink;
use index_log_shipper::{LogCache, MemoryCache, Severity};

#[tokio::main]
async fn main() {
    // Measure the capture + buffering path only; flushed batches go nowhere.
    let cache = MemoryCache::new(Arc::new(NoopSink), Severity::Error, 1_000);
    let layer_config = LayerConfig {
        source: "load-test".to_string(),
        enable_stdout: false,
    };
    init_tracing_with_config(Arc::clone(&cache), layer_config).expect("install subscriber");

    let n: u64 = 100_000;
    let start = Instant::now();

    for i in 0..n {
        error!(iteration = i, "default load test error");
    }

    let elapsed = start.elapsed();
    println!("default config: captured {} events in {:?} (~{:.0} ev/s)",
        n,
        elapsed,
        n as f64 / elapsed.as_secs_f64()
    );

    // Give size-triggered flushes a moment, then drain the rest
    sleep(Duration::from_millis(200)).await;
    println!("dropped at cache cap: {}", cache.dropped());
    cache.flush().await.expect("final flush");
    println!("pending after flush: {}", cache.len());
}
