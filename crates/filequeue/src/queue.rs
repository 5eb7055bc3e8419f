//! Queue implementation
//!
//! Entries are ordered by file name; `fq_msg_id` is time-prefixed, so name
//! order is arrival order. Rolled-back entries keep their original name and
//! therefore return to the visible head.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;

use kaijs_protocol::FileQueueMessage;

use crate::error::FileQueueError;

const ENTRY_SUFFIX: &str = ".json";

/// File queue tuning
#[derive(Debug, Clone)]
pub struct FileQueueConfig {
    /// Fallback poll interval for pop when no in-process push wakes us
    /// (another process may be the writer)
    pub poll: Duration,

    /// Claim via a single-pass oldest-name scan instead of collecting and
    /// sorting the whole directory; worthwhile on deep backlogs
    pub optimize_list: bool,
}

impl Default for FileQueueConfig {
    fn default() -> Self {
        Self {
            poll: Duration::from_millis(250),
            optimize_list: false,
        }
    }
}

/// Counters for queue activity
#[derive(Debug, Default)]
pub struct QueueMetrics {
    pub pushes: AtomicU64,
    pub pops: AtomicU64,
    pub commits: AtomicU64,
    pub rollbacks: AtomicU64,
}

impl QueueMetrics {
    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            pushes: self.pushes.load(Ordering::Relaxed),
            pops: self.pops.load(Ordering::Relaxed),
            commits: self.commits.load(Ordering::Relaxed),
            rollbacks: self.rollbacks.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of queue counters
#[derive(Debug, Clone, Copy)]
pub struct QueueSnapshot {
    pub pushes: u64,
    pub pops: u64,
    pub commits: u64,
    pub rollbacks: u64,
}

struct Inner {
    queue_dir: PathBuf,
    tmp_dir: PathBuf,
    claimed_dir: PathBuf,
    poll: Duration,
    optimize_list: bool,
    notify: Notify,
    stopped: AtomicBool,
    metrics: QueueMetrics,
}

/// Durable FIFO handle; cheap to clone across tasks
#[derive(Clone)]
pub struct FileQueue {
    inner: Arc<Inner>,
}

impl FileQueue {
    /// Open (or create) a queue rooted at `path`.
    ///
    /// Recovery: entries left in `claimed/` by a crashed consumer are
    /// returned to the visible queue; half-written files in `tmp/` are
    /// discarded.
    pub fn open(path: impl AsRef<Path>, config: FileQueueConfig) -> Result<Self, FileQueueError> {
        let root = path.as_ref().to_path_buf();
        let queue_dir = root.join("queue");
        let tmp_dir = root.join("tmp");
        let claimed_dir = root.join("claimed");

        for dir in [&queue_dir, &tmp_dir, &claimed_dir] {
            fs::create_dir_all(dir).map_err(|e| FileQueueError::io(dir, e))?;
        }

        let recovered = recover_claimed(&claimed_dir, &queue_dir)?;
        let discarded = clear_dir(&tmp_dir)?;
        if recovered > 0 || discarded > 0 {
            tracing::info!(
                root = %root.display(),
                recovered = recovered,
                discarded = discarded,
                "file queue recovery complete"
            );
        }
        fsync_dir(&queue_dir)?;

        Ok(Self {
            inner: Arc::new(Inner {
                queue_dir,
                tmp_dir,
                claimed_dir,
                poll: config.poll,
                optimize_list: config.optimize_list,
                notify: Notify::new(),
                stopped: AtomicBool::new(false),
                metrics: QueueMetrics::default(),
            }),
        })
    }

    /// Persist one envelope. Returns after the entry is durably visible.
    pub fn push(&self, msg: &FileQueueMessage) -> Result<(), FileQueueError> {
        let encoded = serde_json::to_vec(msg).map_err(|e| FileQueueError::Encode {
            fq_msg_id: msg.fq_msg_id.clone(),
            source: e,
        })?;

        let file_name = format!("{}{}", msg.fq_msg_id, ENTRY_SUFFIX);
        let tmp_path = self.inner.tmp_dir.join(&file_name);
        let final_path = self.inner.queue_dir.join(&file_name);

        let mut file = File::create(&tmp_path).map_err(|e| FileQueueError::io(&tmp_path, e))?;
        file.write_all(&encoded)
            .map_err(|e| FileQueueError::io(&tmp_path, e))?;
        file.sync_all().map_err(|e| FileQueueError::io(&tmp_path, e))?;
        drop(file);

        fs::rename(&tmp_path, &final_path).map_err(|e| FileQueueError::io(&final_path, e))?;
        fsync_dir(&self.inner.queue_dir)?;

        self.inner.metrics.pushes.fetch_add(1, Ordering::Relaxed);
        self.inner.notify.notify_waiters();
        Ok(())
    }

    /// Transactional pop: claim the oldest visible entry.
    ///
    /// Blocks until an entry is available or the queue is stopped (`None`).
    /// The claimed entry stays on disk until `commit`; `rollback` (or a
    /// crash) returns it to the visible head.
    pub async fn tpop(&self) -> Result<Option<PoppedMessage>, FileQueueError> {
        loop {
            if let Some(popped) = self.try_claim()? {
                return Ok(Some(popped));
            }
            if self.inner.stopped.load(Ordering::Acquire) {
                return Ok(None);
            }
            tokio::select! {
                _ = self.inner.notify.notified() => {}
                _ = tokio::time::sleep(self.inner.poll) => {}
            }
        }
    }

    fn try_claim(&self) -> Result<Option<PoppedMessage>, FileQueueError> {
        if self.inner.optimize_list {
            // Single-pass oldest-name scan; rescan after every lost race.
            loop {
                let Some(file_name) = oldest_entry(&self.inner.queue_dir)? else {
                    return Ok(None);
                };
                if let Some(popped) = self.claim_one(file_name)? {
                    return Ok(Some(popped));
                }
            }
        }

        for file_name in visible_entries(&self.inner.queue_dir)? {
            if let Some(popped) = self.claim_one(file_name)? {
                return Ok(Some(popped));
            }
        }
        Ok(None)
    }

    /// Claim one named entry; `None` means it was taken by another consumer
    /// or quarantined, and the caller should move on.
    fn claim_one(&self, file_name: String) -> Result<Option<PoppedMessage>, FileQueueError> {
        let queue_path = self.inner.queue_dir.join(&file_name);
        let claimed_path = self.inner.claimed_dir.join(&file_name);

        // Another consumer may claim the same entry first; losing the
        // rename race just moves us to the next candidate.
        match fs::rename(&queue_path, &claimed_path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(FileQueueError::io(&queue_path, e)),
        }

        let raw = fs::read(&claimed_path).map_err(|e| FileQueueError::io(&claimed_path, e))?;
        let message: FileQueueMessage = match serde_json::from_slice(&raw) {
            Ok(m) => m,
            Err(e) => {
                // Quarantine instead of wedging the queue head.
                let quarantine = claimed_path.with_extension("corrupt");
                tracing::error!(
                    entry = %file_name,
                    error = %e,
                    quarantine = %quarantine.display(),
                    "corrupt queue entry, quarantining"
                );
                fs::rename(&claimed_path, &quarantine)
                    .map_err(|e| FileQueueError::io(&claimed_path, e))?;
                return Ok(None);
            }
        };

        self.inner.metrics.pops.fetch_add(1, Ordering::Relaxed);
        Ok(Some(PoppedMessage {
            message,
            inner: Arc::clone(&self.inner),
            file_name,
            settled: false,
        }))
    }

    /// Number of visible entries.
    pub fn length(&self) -> Result<usize, FileQueueError> {
        Ok(visible_entries(&self.inner.queue_dir)?.len())
    }

    /// Stop blocking pops. In-flight claims stay valid until settled.
    pub fn stop(&self) {
        self.inner.stopped.store(true, Ordering::Release);
        self.inner.notify.notify_waiters();
    }

    pub fn metrics(&self) -> QueueSnapshot {
        self.inner.metrics.snapshot()
    }
}

/// A claimed entry awaiting commit or rollback.
///
/// Dropping without settling rolls the entry back, so a panicking consumer
/// never loses a message.
pub struct PoppedMessage {
    message: FileQueueMessage,
    inner: Arc<Inner>,
    file_name: String,
    settled: bool,
}

impl PoppedMessage {
    pub fn message(&self) -> &FileQueueMessage {
        &self.message
    }

    /// Remove the entry permanently.
    pub fn commit(mut self) -> Result<(), FileQueueError> {
        let path = self.inner.claimed_dir.join(&self.file_name);
        fs::remove_file(&path).map_err(|e| FileQueueError::io(&path, e))?;
        self.inner.metrics.commits.fetch_add(1, Ordering::Relaxed);
        self.settled = true;
        Ok(())
    }

    /// Return the entry to the visible head of the queue.
    pub fn rollback(mut self) -> Result<(), FileQueueError> {
        self.rollback_in_place()?;
        self.settled = true;
        Ok(())
    }

    fn rollback_in_place(&self) -> Result<(), FileQueueError> {
        let claimed = self.inner.claimed_dir.join(&self.file_name);
        let queue = self.inner.queue_dir.join(&self.file_name);
        fs::rename(&claimed, &queue).map_err(|e| FileQueueError::io(&claimed, e))?;
        fsync_dir(&self.inner.queue_dir)?;
        self.inner.metrics.rollbacks.fetch_add(1, Ordering::Relaxed);
        self.inner.notify.notify_waiters();
        Ok(())
    }
}

impl Drop for PoppedMessage {
    fn drop(&mut self) {
        if !self.settled {
            if let Err(e) = self.rollback_in_place() {
                tracing::warn!(
                    entry = %self.file_name,
                    error = %e,
                    "failed to roll back dropped queue entry; will recover on next open"
                );
            }
        }
    }
}

/// Lexicographically smallest entry name without sorting the full listing.
fn oldest_entry(queue_dir: &Path) -> Result<Option<String>, FileQueueError> {
    let mut oldest: Option<String> = None;
    let entries = fs::read_dir(queue_dir).map_err(|e| FileQueueError::io(queue_dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| FileQueueError::io(queue_dir, e))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.ends_with(ENTRY_SUFFIX) {
            continue;
        }
        if oldest.as_deref().map_or(true, |cur| name.as_str() < cur) {
            oldest = Some(name);
        }
    }
    Ok(oldest)
}

fn visible_entries(queue_dir: &Path) -> Result<Vec<String>, FileQueueError> {
    let mut names = Vec::new();
    let entries = fs::read_dir(queue_dir).map_err(|e| FileQueueError::io(queue_dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| FileQueueError::io(queue_dir, e))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.ends_with(ENTRY_SUFFIX) {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

fn recover_claimed(claimed_dir: &Path, queue_dir: &Path) -> Result<usize, FileQueueError> {
    let mut recovered = 0;
    for name in visible_entries(claimed_dir)? {
        let from = claimed_dir.join(&name);
        let to = queue_dir.join(&name);
        fs::rename(&from, &to).map_err(|e| FileQueueError::io(&from, e))?;
        recovered += 1;
    }
    Ok(recovered)
}

fn clear_dir(dir: &Path) -> Result<usize, FileQueueError> {
    let mut discarded = 0;
    let entries = fs::read_dir(dir).map_err(|e| FileQueueError::io(dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| FileQueueError::io(dir, e))?;
        fs::remove_file(entry.path()).map_err(|e| FileQueueError::io(entry.path(), e))?;
        discarded += 1;
    }
    Ok(discarded)
}

#[cfg(unix)]
fn fsync_dir(dir: &Path) -> Result<(), FileQueueError> {
    let handle = File::open(dir).map_err(|e| FileQueueError::io(dir, e))?;
    handle.sync_all().map_err(|e| FileQueueError::io(dir, e))
}

#[cfg(not(unix))]
fn fsync_dir(_dir: &Path) -> Result<(), FileQueueError> {
    Ok(())
}

#[cfg(test)]
#[path = "queue_test.rs"]
mod queue_test;
