//! Periodic eviction of aged registry entries and expired cache entries.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::domain::{ResultRegistry, TtlCache};

/// Spawns a task that, every `interval`, clears registry entries older
/// than `max_age` and purges expired cache entries.
///
/// The first sweep runs one full `interval` after spawning.
pub fn spawn_sweeper<T, C>(
    registry: Arc<ResultRegistry<T>>,
    cache: Arc<TtlCache<C>>,
    interval: Duration,
    max_age: Duration,
) -> JoinHandle<()>
where
    T: Clone + Send + Sync + 'static,
    C: Clone + Send + Sync + 'static,
{
    tokio::spawn(async move {
        let start = tokio::time::Instant::now() + interval;
        let mut ticker = tokio::time::interval_at(start, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let evicted = registry.clear_old(max_age);
            let purged = cache.purge_expired();
            if evicted > 0 || purged > 0 {
                tracing::info!(evicted, purged, "sweep completed");
            } else {
                tracing::trace!("sweep found nothing to evict");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn sweeper_evicts_aged_entries() {
        let registry = Arc::new(ResultRegistry::<u32>::new());
        let cache = Arc::new(TtlCache::<u32>::new());

        let _ = registry
            .execute("old", || async { Ok::<_, &'static str>(1) })
            .await;
        cache.set("short", 1, Duration::from_secs(5));

        let sweeper = spawn_sweeper(
            Arc::clone(&registry),
            Arc::clone(&cache),
            Duration::from_secs(30),
            Duration::from_secs(20),
        );

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(registry.has("old"));

        tokio::time::sleep(Duration::from_secs(25)).await;
        assert!(!registry.has("old"));
        assert!(cache.is_empty());

        sweeper.abort();
    }
}
