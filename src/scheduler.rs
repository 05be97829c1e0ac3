use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::cache::LogCache;

/// Periodic flush timer.
///
/// Owns a background task that calls [`LogCache::flush`] every `period`,
/// starting one period after `start`. A failed flush is logged and the
/// timer keeps going. Stopping (or dropping) the scheduler prevents any
/// further tick; a flush already running is left to finish on its own.
pub struct FlushScheduler {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
    period: Duration,
}

impl FlushScheduler {
    /// Start ticking on the current Tokio runtime.
    ///
    /// Periods below 10ms are raised to 10ms.
    pub fn start(cache: Arc<dyn LogCache>, period: Duration) -> Self {
        let period = period.max(Duration::from_millis(10));
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                // Run the flush in its own task so cancellation never
                // aborts it half way.
                let cache = Arc::clone(&cache);
                let flush = tokio::spawn(async move { cache.flush().await });
                match flush.await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => tracing::warn!(error = %e, "periodic log flush failed"),
                    Err(e) => tracing::error!(error = %e, "periodic log flush panicked"),
                }
            }

            tracing::debug!("flush timer stopped");
        });

        FlushScheduler {
            cancel,
            handle,
            period,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn is_running(&self) -> bool {
        !self.cancel.is_cancelled() && !self.handle.is_finished()
    }

    /// Cancel future ticks. Does not wait for an in-flight flush.
    pub fn stop(&self) {
        self.cancel.cancel();
    }
}

impl Drop for FlushScheduler {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ShipperError, WriteFailure};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingCache {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl LogCache for CountingCache {
        async fn flush(&self) -> Result<(), ShipperError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(WriteFailure::Unreachable("down".into()).into());
            }
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_once_per_period() {
        let cache = Arc::new(CountingCache::default());
        let scheduler = FlushScheduler::start(cache.clone(), Duration::from_millis(100));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(cache.calls.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(cache.calls.load(Ordering::SeqCst), 3);
        assert!(scheduler.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn failures_do_not_stop_the_timer() {
        let cache = Arc::new(CountingCache {
            fail: true,
            ..Default::default()
        });
        let _scheduler = FlushScheduler::start(cache.clone(), Duration::from_millis(100));

        tokio::time::sleep(Duration::from_millis(550)).await;
        assert_eq!(cache.calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_prevents_further_ticks() {
        let cache = Arc::new(CountingCache::default());
        let scheduler = FlushScheduler::start(cache.clone(), Duration::from_millis(100));

        tokio::time::sleep(Duration::from_millis(150)).await;
        scheduler.stop();
        assert!(!scheduler.is_running());

        tokio::time::sleep(Duration::from_millis(1_000)).await;
        assert_eq!(cache.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_cancels_the_timer() {
        let cache = Arc::new(CountingCache::default());
        drop(FlushScheduler::start(cache.clone(), Duration::from_millis(100)));

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(cache.calls.load(Ordering::SeqCst), 0);
    }
}
