use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::SessionConfig;
use crate::endpoint::CloseReason;
use crate::session::SessionRegistry;

/// Periodically evicts sessions that have been idle past the timeout.
#[derive(Clone)]
pub struct IdleReaper {
    registry: Arc<SessionRegistry>,
    timeout: Duration,
    interval: Duration,
}

impl IdleReaper {
    pub fn new(registry: Arc<SessionRegistry>, timeout: Duration, interval: Duration) -> Self {
        Self {
            registry,
            timeout,
            interval,
        }
    }

    pub fn from_config(registry: Arc<SessionRegistry>, config: &SessionConfig) -> Self {
        Self::new(registry, config.timeout(), config.sweep_interval())
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// One sweep: mark idle sessions, then evict them. Returns the number
    /// evicted. A session touched between the two phases is still evicted.
    pub async fn cleanup_now(&self) -> usize {
        let marked = self.registry.expired(Instant::now(), self.timeout);
        if marked.is_empty() {
            return 0;
        }

        let mut evicted = 0;
        for id in &marked {
            if self.registry.remove(id, CloseReason::IdleTimeout).await {
                evicted += 1;
            }
        }
        info!(
            evicted,
            remaining = self.registry.count(),
            timeout_secs = self.timeout.as_secs(),
            "Evicted idle sessions"
        );
        evicted
    }

    /// Sweep every `interval` until `shutdown` fires. The first sweep runs
    /// one interval after spawning.
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        self.cleanup_now().await;
                    }
                }
            }
            debug!("Idle reaper stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::ProtocolEndpoint;
    use crate::session::registry::tests::StubEndpoint;
    use std::sync::atomic::Ordering;

    const TIMEOUT: Duration = Duration::from_secs(30 * 60);

    #[tokio::test(start_paused = true)]
    async fn test_evicts_only_past_timeout() {
        let registry = Arc::new(SessionRegistry::new());
        let reaper = IdleReaper::new(registry.clone(), TIMEOUT, Duration::from_secs(300));

        let stale = StubEndpoint::new(false);
        registry.set(stale.clone()).unwrap();
        tokio::time::advance(Duration::from_secs(60)).await;
        let fresh = StubEndpoint::new(false);
        registry.set(fresh.clone()).unwrap();

        // stale is now 1ms past the timeout, fresh is 60s short of it
        tokio::time::advance(TIMEOUT - Duration::from_secs(60) + Duration::from_millis(1)).await;
        assert_eq!(reaper.cleanup_now().await, 1);
        assert!(!registry.contains(stale.session_id()));
        assert!(registry.contains(fresh.session_id()));
        assert_eq!(stale.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_just_under_timeout_survives() {
        let registry = Arc::new(SessionRegistry::new());
        let reaper = IdleReaper::new(registry.clone(), TIMEOUT, Duration::from_secs(300));
        let endpoint = StubEndpoint::new(false);
        registry.set(endpoint.clone()).unwrap();

        tokio::time::advance(TIMEOUT - Duration::from_millis(1)).await;
        assert_eq!(reaper.cleanup_now().await, 0);
        assert_eq!(registry.count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_close_does_not_abort_sweep() {
        let registry = Arc::new(SessionRegistry::new());
        let reaper = IdleReaper::new(registry.clone(), TIMEOUT, Duration::from_secs(300));
        for i in 0..5 {
            registry.set(StubEndpoint::new(i % 2 == 0)).unwrap();
        }

        tokio::time::advance(TIMEOUT + Duration::from_secs(1)).await;
        assert_eq!(reaper.cleanup_now().await, 5);
        assert_eq!(registry.count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_sweep_and_cancellation() {
        let registry = Arc::new(SessionRegistry::new());
        let interval = Duration::from_secs(300);
        let reaper = IdleReaper::new(registry.clone(), TIMEOUT, interval);
        registry.set(StubEndpoint::new(false)).unwrap();

        let token = CancellationToken::new();
        let handle = reaper.spawn(token.clone());

        // auto-advance lets the ticker fire once the session is stale
        tokio::time::sleep(TIMEOUT + interval + Duration::from_secs(1)).await;
        assert_eq!(registry.count(), 0);

        token.cancel();
        handle.await.unwrap();
    }
}
