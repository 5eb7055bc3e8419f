//! Periodic schema refresh
//!
//! The external schema fetcher drops updated documents into a directory on a
//! long cadence (12h by default); this task reloads that directory on an
//! interval and swaps the snapshot. A failed reload keeps the previous
//! snapshot in place.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::snapshot::{load_snapshot_dir, SchemaStore};

/// Spawn the refresher task. Cancelling the token stops it.
pub fn spawn_refresher(
    store: Arc<SchemaStore>,
    dir: PathBuf,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick fires immediately so a populated directory replaces
        // the builtin snapshot at startup.
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match load_snapshot_dir(&dir) {
                        Ok(snapshot) if !snapshot.is_empty() => store.install(snapshot),
                        Ok(_) => {
                            tracing::debug!(dir = %dir.display(), "schema directory empty, keeping current snapshot");
                        }
                        Err(e) => {
                            tracing::warn!(dir = %dir.display(), error = %e, "schema refresh failed, keeping current snapshot");
                        }
                    }
                }
                _ = cancel.cancelled() => {
                    tracing::debug!("schema refresher stopping");
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::SchemaSnapshot;
    use serde_json::json;

    #[tokio::test]
    async fn refresher_installs_directory_contents() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("test.queued.json"),
            serde_json::to_vec(&json!({"required": ["generated_at"]})).unwrap(),
        )
        .unwrap();

        let store = Arc::new(SchemaStore::new(SchemaSnapshot::default()));
        let cancel = CancellationToken::new();
        let task = spawn_refresher(
            Arc::clone(&store),
            dir.path().to_path_buf(),
            Duration::from_secs(3600),
            cancel.clone(),
        );

        // First tick is immediate.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(store.load().len(), 1);

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn missing_directory_keeps_current_snapshot() {
        let store = Arc::new(SchemaStore::new(SchemaSnapshot::builtin()));
        let before = store.load().len();
        let cancel = CancellationToken::new();
        let task = spawn_refresher(
            Arc::clone(&store),
            PathBuf::from("/nonexistent/schemas"),
            Duration::from_secs(3600),
            cancel.clone(),
        );

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(store.load().len(), before);

        cancel.cancel();
        task.await.unwrap();
    }
}
