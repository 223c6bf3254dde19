//! Periodic expiry sweep

use super::store::ActorSessionStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Spawn a task sweeping every live namespace each `interval`
///
/// The first sweep happens one full interval after start. The task exits when
/// `shutdown` fires or its sender is dropped.
pub fn spawn_sweeper(
    store: Arc<ActorSessionStore>,
    interval: Duration,
    retention: Duration,
    mut shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let reports = store.sweep_all(retention).await;
                    let removed: usize = reports.iter().map(|(_, r)| r.removed_count).sum();
                    if removed > 0 {
                        info!("Session sweep removed {} expired sessions", removed);
                    } else {
                        debug!("Session sweep found nothing to remove across {} namespaces", reports.len());
                    }
                }
                _ = shutdown.recv() => {
                    debug!("Session sweeper received shutdown signal");
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionStore;
    use crate::types::{Namespace, SessionId};
    use serde_json::Map;

    #[tokio::test]
    async fn test_sweeper_removes_and_stops() {
        let store = Arc::new(ActorSessionStore::new());
        let namespace = Namespace::parse("sweep").unwrap();
        let id = SessionId::generate();
        store.create(&namespace, id.clone(), Map::new()).await.unwrap();

        let (tx, rx) = broadcast::channel(1);
        let handle = spawn_sweeper(
            store.clone(),
            Duration::from_millis(20),
            Duration::from_millis(1),
            rx,
        );

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(store.get(&namespace, &id).await.is_err());
        assert!(store.namespaces().await.is_empty());

        tx.send(()).unwrap();
        handle.await.unwrap();
        store.shutdown().await;
    }
}
