// Upload queue store - one serialized ordered collection on disk
//
// The whole list is rewritten per mutation through a temp file and an atomic
// rename, so a reader never observes a truncated queue. Insertion order is
// the default scheduling priority. Single worker process per queue file;
// concurrent multi-process writers are not supported.

use crate::errors::QueueError;
use crate::models::QueueItem;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

/// File-backed store for publish-queue items
#[derive(Clone)]
pub struct UploadQueueStore {
    path: PathBuf,
}

impl UploadQueueStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the queue from disk.
    ///
    /// A missing or unreadable file yields an empty queue instead of an
    /// error — losing the ability to make progress is worse than starting
    /// from scratch — but the condition is always surfaced in the log.
    pub async fn load(&self) -> Vec<QueueItem> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "Queue file not present, starting empty");
                return Vec::new();
            }
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Failed to read queue file, treating queue as empty"
                );
                return Vec::new();
            }
        };

        match serde_json::from_slice::<Vec<QueueItem>>(&bytes) {
            Ok(items) => items,
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Queue file is corrupt, treating queue as empty"
                );
                Vec::new()
            }
        }
    }

    /// Replace the on-disk queue with the given list, atomically.
    #[instrument(skip(self, items), fields(count = items.len()))]
    pub async fn save(&self, items: &[QueueItem]) -> Result<(), QueueError> {
        let json = serde_json::to_vec_pretty(items)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| QueueError::Write(e.to_string()))?;
            }
        }

        let tmp = self.tmp_path();
        tokio::fs::write(&tmp, &json)
            .await
            .map_err(|e| QueueError::Write(e.to_string()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| QueueError::Write(e.to_string()))?;

        debug!(path = %self.path.display(), count = items.len(), "Queue saved");
        Ok(())
    }

    /// Append a single item, preserving insertion order.
    pub async fn append(&self, item: QueueItem) -> Result<(), QueueError> {
        let mut items = self.load().await;
        items.push(item);
        self.save(&items).await
    }

    /// Remove terminal items older than the horizon, preserving the order of
    /// the remainder. Returns how many items were dropped. This bounds both
    /// queue growth and the dedup history window.
    #[instrument(skip(self))]
    pub async fn prune(&self, horizon: DateTime<Utc>) -> Result<usize, QueueError> {
        let items = self.load().await;
        let before = items.len();
        let kept: Vec<QueueItem> = items
            .into_iter()
            .filter(|item| !(item.status.is_terminal() && item.added_at < horizon))
            .collect();
        let removed = before - kept.len();

        if removed > 0 {
            self.save(&kept).await?;
            info!(removed, "Pruned terminal queue items past the retention horizon");
        }
        Ok(removed)
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}
