//! Background refresh loop with backoff

use crate::services::cache::PricingDirectoryCache;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Periodically refreshes a cache until shut down
pub struct RefreshScheduler {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl RefreshScheduler {
    /// Start refreshing `cache` now, then every `interval`.
    ///
    /// While refreshes come back stale the delay doubles up to `max_backoff`.
    pub fn spawn(cache: PricingDirectoryCache, interval: Duration, max_backoff: Duration) -> Self {
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run(cache, interval, max_backoff, cancel.clone()));
        Self { cancel, handle }
    }

    /// Stop the loop and wait for it to exit.
    ///
    /// A refresh still running is dropped without touching the cache.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            tracing::warn!(error = %e, "refresh scheduler task failed");
        }
    }
}

async fn run(
    cache: PricingDirectoryCache,
    interval: Duration,
    max_backoff: Duration,
    cancel: CancellationToken,
) {
    let mut delay = interval;

    loop {
        let snapshot = tokio::select! {
            _ = cancel.cancelled() => break,
            snapshot = cache.refresh() => snapshot,
        };
        if cache.is_closed() {
            break;
        }

        delay = next_delay(delay, snapshot.stale, interval, max_backoff);
        if snapshot.stale {
            tracing::warn!(retry_in_secs = delay.as_secs(), "all sources failed, backing off");
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    tracing::debug!("refresh scheduler stopped");
}

/// Delay before the next cycle given how the last one went
pub fn next_delay(
    previous: Duration,
    stale: bool,
    interval: Duration,
    max_backoff: Duration,
) -> Duration {
    if !stale {
        return interval;
    }
    previous
        .saturating_mul(2)
        .min(max_backoff.max(interval))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::aggregator::Aggregator;
    use crate::sources::testing::{raw, Script, StubSource};
    use crate::sources::{SourceAdapter, SourceRegistry};
    use std::sync::Arc;

    const INTERVAL: Duration = Duration::from_secs(60);
    const MAX_BACKOFF: Duration = Duration::from_secs(300);

    fn cache_with(source: Arc<StubSource>) -> PricingDirectoryCache {
        let sources: Vec<Arc<dyn SourceAdapter>> = vec![source as Arc<dyn SourceAdapter>];
        PricingDirectoryCache::init(Aggregator::new(
            SourceRegistry::with_sources(sources),
            Duration::from_secs(5),
        ))
    }

    /// Let the scheduler task run until it is parked on a timer
    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    // ========== next_delay ==========

    #[test]
    fn test_next_delay_success_resets() {
        assert_eq!(next_delay(MAX_BACKOFF, false, INTERVAL, MAX_BACKOFF), INTERVAL);
    }

    #[test]
    fn test_next_delay_doubles_when_stale() {
        let first = next_delay(INTERVAL, true, INTERVAL, MAX_BACKOFF);
        let second = next_delay(first, true, INTERVAL, MAX_BACKOFF);
        assert_eq!(first, Duration::from_secs(120));
        assert_eq!(second, Duration::from_secs(240));
    }

    #[test]
    fn test_next_delay_capped() {
        assert_eq!(
            next_delay(Duration::from_secs(240), true, INTERVAL, MAX_BACKOFF),
            MAX_BACKOFF
        );
        assert_eq!(next_delay(MAX_BACKOFF, true, INTERVAL, MAX_BACKOFF), MAX_BACKOFF);
    }

    #[test]
    fn test_next_delay_cap_below_interval() {
        let cap = Duration::from_secs(10);
        assert_eq!(next_delay(INTERVAL, true, INTERVAL, cap), INTERVAL);
    }

    // ========== spawn / shutdown ==========

    #[tokio::test(start_paused = true)]
    async fn test_scheduler_refreshes_immediately_then_on_interval() {
        let x = Arc::new(StubSource::offers("x", &[("H100", 2.0)]));
        let cache = cache_with(x.clone());

        let scheduler = RefreshScheduler::spawn(cache.clone(), INTERVAL, MAX_BACKOFF);
        settle().await;
        assert_eq!(x.calls(), 1);
        assert_eq!(cache.snapshot().directory.len(), 1);

        tokio::time::sleep(INTERVAL + Duration::from_secs(1)).await;
        settle().await;
        assert_eq!(x.calls(), 2);

        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduler_backs_off_then_resets() {
        let x = Arc::new(StubSource::failing("x"));
        let cache = cache_with(x.clone());

        let scheduler = RefreshScheduler::spawn(cache.clone(), INTERVAL, MAX_BACKOFF);
        settle().await;
        assert_eq!(x.calls(), 1);
        assert!(cache.is_stale());

        // Backed off to 120s, so nothing at the normal interval
        tokio::time::sleep(INTERVAL + Duration::from_secs(1)).await;
        settle().await;
        assert_eq!(x.calls(), 1);

        tokio::time::sleep(INTERVAL).await;
        settle().await;
        assert_eq!(x.calls(), 2);

        // Recovers on the next attempt (240s later), then back to 60s
        x.set_script(Script::Offers(raw(&[("H100", 2.0)])));
        tokio::time::sleep(Duration::from_secs(240)).await;
        settle().await;
        assert_eq!(x.calls(), 3);
        assert!(!cache.is_stale());

        tokio::time::sleep(INTERVAL + Duration::from_secs(1)).await;
        settle().await;
        assert_eq!(x.calls(), 4);

        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_refreshing() {
        let x = Arc::new(StubSource::offers("x", &[("H100", 2.0)]));
        let cache = cache_with(x.clone());

        let scheduler = RefreshScheduler::spawn(cache.clone(), INTERVAL, MAX_BACKOFF);
        settle().await;
        scheduler.shutdown().await;

        tokio::time::sleep(INTERVAL * 5).await;
        assert_eq!(x.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_drops_in_flight_refresh() {
        let x = Arc::new(StubSource::offers("x", &[("H100", 2.0)]).with_delay(Duration::from_secs(2)));
        let cache = cache_with(x.clone());

        let scheduler = RefreshScheduler::spawn(cache.clone(), INTERVAL, MAX_BACKOFF);
        while x.calls() == 0 {
            tokio::task::yield_now().await;
        }
        scheduler.shutdown().await;
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert!(cache.snapshot().built_at.is_none());
        assert!(cache.snapshot().directory.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduler_exits_after_cache_teardown() {
        let x = Arc::new(StubSource::offers("x", &[("H100", 2.0)]));
        let cache = cache_with(x.clone());

        let scheduler = RefreshScheduler::spawn(cache.clone(), INTERVAL, MAX_BACKOFF);
        settle().await;
        cache.teardown();
        tokio::time::sleep(INTERVAL * 3).await;
        settle().await;

        assert_eq!(x.calls(), 1);
        scheduler.shutdown().await;
    }
}
