//! Debounced Mutation Pipeline
//!
//! Every edit marks its file dirty synchronously, then (re)arms a per-path
//! timer. Only the last edit inside the quiet window is written. Timers of
//! different paths never affect each other.

use crate::notice::{Notice, NoticeSender};
use crate::ports::FileStore;
use crate::session::{lock, SharedSession};
use crate::Result;
use hollow_types::{Bucket, FileNode};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Quiet window used by the editor
pub const DEFAULT_QUIET_WINDOW: Duration = Duration::from_millis(1000);

struct PendingWrite {
    bucket: Bucket,
    file: FileNode,
    generation: u64,
    timer: JoinHandle<()>,
}

struct Inner {
    store: Arc<dyn FileStore>,
    session: SharedSession,
    notices: NoticeSender,
    quiet: Duration,
    /// Timer table: at most one pending write per path
    pending: Mutex<HashMap<String, PendingWrite>>,
    /// Latest edit generation of every path with an unacknowledged edit
    generations: Mutex<HashMap<String, u64>>,
    /// Source of generations, shared by all paths so none is ever reused
    next_generation: AtomicU64,
    /// Serialises writes of one path so they reach the backend in issue order
    write_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

#[derive(Clone)]
pub struct MutationPipeline {
    inner: Arc<Inner>,
}

impl MutationPipeline {
    pub fn new(
        store: Arc<dyn FileStore>,
        session: SharedSession,
        notices: NoticeSender,
        quiet: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                session,
                notices,
                quiet,
                pending: Mutex::new(HashMap::new()),
                generations: Mutex::new(HashMap::new()),
                next_generation: AtomicU64::new(0),
                write_locks: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Record an edit.
    ///
    /// The dirty flag is persisted before this returns; the write itself is
    /// issued once `quiet` has elapsed without another edit of the same path.
    /// Must be called from within a tokio runtime.
    pub fn edit(&self, bucket: Bucket, file: FileNode) -> Result<()> {
        let marked = mark_dirty(&self.inner.session, &file);
        let generation = self.inner.bump(&file.path);

        let path = file.path.clone();
        let inner = self.inner.clone();
        let timer_path = path.clone();
        let quiet = self.inner.quiet;

        // Hold the table while arming so the timer cannot look up its entry
        // before it is inserted.
        let mut pending = lock_map(&self.inner.pending);
        let timer = tokio::spawn(async move {
            tokio::time::sleep(quiet).await;
            let Some(entry) = inner.take_pending(&timer_path, Some(generation)) else {
                return;
            };
            let _ = inner.write(entry.bucket, entry.file, entry.generation).await;
        });
        let replaced = pending.insert(
            path.clone(),
            PendingWrite {
                bucket,
                file,
                generation,
                timer,
            },
        );
        drop(pending);

        if let Some(previous) = replaced {
            debug!("Coalescing pending write for {}", path);
            previous.timer.abort();
        }

        marked
    }

    /// Write `file` now, dropping any pending debounced write of its path.
    pub async fn save_now(&self, bucket: Bucket, file: FileNode) -> Result<()> {
        if let Err(e) = mark_dirty(&self.inner.session, &file) {
            let _ = self.inner.notices.send(Notice::PersistFailed {
                error: e.to_string(),
            });
        }
        if let Some(entry) = self.inner.take_pending(&file.path, None) {
            entry.timer.abort();
        }
        let generation = self.inner.bump(&file.path);
        self.inner.write(bucket, file, generation).await
    }

    /// Write every pending edit immediately. Used before navigating away.
    ///
    /// All writes are attempted; the last error is returned.
    pub async fn flush(&self) -> Result<usize> {
        let entries: Vec<PendingWrite> = lock_map(&self.inner.pending)
            .drain()
            .map(|(_, entry)| entry)
            .collect();

        let mut written = 0;
        let mut last_err = None;
        for entry in entries {
            entry.timer.abort();
            match self
                .inner
                .write(entry.bucket, entry.file, entry.generation)
                .await
            {
                Ok(()) => written += 1,
                Err(e) => last_err = Some(e),
            }
        }
        match last_err {
            Some(e) => Err(e),
            None => Ok(written),
        }
    }

    /// Paths with a write still waiting for its quiet window
    pub fn pending_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = lock_map(&self.inner.pending).keys().cloned().collect();
        paths.sort();
        paths
    }

    pub fn has_pending(&self, path: &str) -> bool {
        lock_map(&self.inner.pending).contains_key(path)
    }

    /// Paths the pipeline still keeps bookkeeping for
    #[cfg(test)]
    fn tracked(&self) -> (usize, usize) {
        (
            lock_map(&self.inner.generations).len(),
            lock_map(&self.inner.write_locks).len(),
        )
    }
}

impl Inner {
    fn bump(&self, path: &str) -> u64 {
        let mut generations = lock_map(&self.generations);
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed) + 1;
        generations.insert(path.to_string(), generation);
        generation
    }

    /// Forget `path` if `generation` is its latest edit. Returns whether it was.
    fn settle(&self, path: &str, generation: u64) -> bool {
        let mut generations = lock_map(&self.generations);
        if generations.get(path) == Some(&generation) {
            generations.remove(path);
            true
        } else {
            false
        }
    }

    /// Remove the pending entry of `path`, optionally only if it still
    /// belongs to `generation`.
    fn take_pending(&self, path: &str, generation: Option<u64>) -> Option<PendingWrite> {
        let mut pending = lock_map(&self.pending);
        match (pending.get(path), generation) {
            (Some(entry), Some(expected)) if entry.generation != expected => None,
            (Some(_), _) => pending.remove(path),
            (None, _) => None,
        }
    }

    fn write_lock(&self, path: &str) -> Arc<tokio::sync::Mutex<()>> {
        lock_map(&self.write_locks)
            .entry(path.to_string())
            .or_default()
            .clone()
    }

    /// Drop the write lock of `path` unless another write holds or awaits it
    fn release_write_lock(&self, path: &str, path_lock: Arc<tokio::sync::Mutex<()>>) {
        let mut locks = lock_map(&self.write_locks);
        if Arc::strong_count(&path_lock) <= 2 {
            locks.remove(path);
        }
    }

    async fn write(&self, bucket: Bucket, file: FileNode, generation: u64) -> Result<()> {
        let path_lock = self.write_lock(&file.path);
        let guard = path_lock.lock().await;
        let result = self.write_locked(bucket, &file, generation).await;
        drop(guard);
        self.release_write_lock(&file.path, path_lock);
        result
    }

    async fn write_locked(&self, bucket: Bucket, file: &FileNode, generation: u64) -> Result<()> {
        debug!("Writing {} (generation {})", file.path, generation);
        match self.store.write(bucket, &file.path, &file.body).await {
            Ok(()) => {
                // A newer edit keeps the file dirty until its own write lands
                if self.settle(&file.path, generation) {
                    if let Err(e) = lock(&self.session).clear_modified(&file.path) {
                        let _ = self.notices.send(Notice::PersistFailed {
                            error: e.to_string(),
                        });
                    }
                }
                let _ = self.notices.send(Notice::Saved {
                    path: file.path.clone(),
                });
                Ok(())
            }
            Err(e) => {
                warn!("Write of {} failed: {}", file.path, e);
                let notice = if e.is_auth() {
                    Notice::AuthRequired
                } else {
                    Notice::WriteFailed {
                        path: file.path.clone(),
                        error: e.to_string(),
                    }
                };
                let _ = self.notices.send(notice);
                Err(e)
            }
        }
    }
}

fn mark_dirty(session: &SharedSession, file: &FileNode) -> Result<()> {
    let mut session = lock(session);
    if !session.mark_modified(file.clone())? {
        session.refresh_modified(file.clone())?;
    }
    Ok(())
}

fn lock_map<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
