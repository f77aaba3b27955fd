//! Background eviction of idle sessions

use crate::store::SessionStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Spawn a task that sweeps `store` every `interval` until `shutdown` fires.
///
/// The first sweep happens one full interval after spawning.
pub fn spawn_sweeper(
    store: Arc<SessionStore>,
    session_timeout: Duration,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "Session sweeper started (timeout {:?}, interval {:?})",
            session_timeout, interval
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let evicted = store.sweep(session_timeout).await;
                    debug!("Sweep finished, {} evicted, {} active", evicted, store.len());
                }
            }
        }

        info!("Session sweeper stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sweeper_evicts_and_stops() {
        let store = Arc::new(SessionStore::new());
        store.get_or_create("user1", "start").await.unwrap();

        let shutdown = CancellationToken::new();
        let handle = spawn_sweeper(
            store.clone(),
            Duration::from_millis(20),
            Duration::from_millis(10),
            shutdown.clone(),
        );

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(store.is_empty());

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("sweeper did not stop")
            .unwrap();
    }
}
