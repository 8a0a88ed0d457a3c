//! Task hub: registry of running and recently finished tasks
//!
//! Output of every task is kept in a bounded backlog and fanned out to the
//! attached stream, if any. Backlog snapshot and subscription happen under the
//! same lock as appends, so an attaching stream sees every byte exactly once.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use hollow_types::{TaskInfo, TaskKind, TaskOutcome, TaskState};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

const EVENT_CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HubEvent {
    /// A chunk of output starting at byte `offset` of the task's output
    Output { offset: u64, data: Bytes },
    Finished(TaskOutcome),
}

struct TaskEntry {
    kind: TaskKind,
    project_id: i64,
    started_at: DateTime<Utc>,
    cancel: CancellationToken,
    events: broadcast::Sender<HubEvent>,
    inner: Mutex<EntryState>,
}

struct EntryState {
    backlog: Vec<u8>,
    /// Total bytes written; the backlog holds the tail of this
    written: u64,
    state: TaskState,
    finished_at: Option<DateTime<Utc>>,
    finished: Option<Instant>,
    /// Token of the currently attached stream
    viewer: Option<CancellationToken>,
}

impl TaskEntry {
    fn lock(&self) -> MutexGuard<'_, EntryState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// What a newly attached stream starts from
pub struct Attachment {
    pub backlog: Bytes,
    /// Set when the task had already finished at attach time
    pub finished: Option<TaskOutcome>,
    pub events: broadcast::Receiver<HubEvent>,
    /// Cancelled when another stream attaches to the same key
    pub superseded: CancellationToken,
    /// Position right after the backlog
    pub cursor: Cursor,
}

/// Output a lagging stream missed, taken from the backlog
#[derive(Debug, PartialEq, Eq)]
pub struct CatchUp {
    /// Bytes already dropped from the backlog, lost to this stream
    pub missed: u64,
    pub data: Bytes,
}

/// How far a stream has sent a task's output.
///
/// Live events that overlap what was already sent are trimmed, so a stream
/// that catches up from the backlog never repeats bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    position: u64,
}

impl Cursor {
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Part of an output event not sent yet
    pub fn accept(&mut self, offset: u64, data: &Bytes) -> Option<Bytes> {
        let end = offset + data.len() as u64;
        if end <= self.position {
            return None;
        }
        let skip = self.position.saturating_sub(offset) as usize;
        self.position = end;
        Some(data.slice(skip..))
    }

    /// Everything written since the cursor, as far as the backlog still has it
    pub fn catch_up(&mut self, hub: &TaskHub, key: &str) -> Option<CatchUp> {
        let entry = hub.entry(key)?;
        let inner = entry.lock();
        let start = inner.written - inner.backlog.len() as u64;
        let missed = start.saturating_sub(self.position);
        let from = self.position.saturating_sub(start) as usize;
        let data = Bytes::copy_from_slice(inner.backlog.get(from..).unwrap_or_default());
        self.position = self.position.max(inner.written);
        Some(CatchUp { missed, data })
    }
}

pub struct TaskHub {
    tasks: Arc<DashMap<String, Arc<TaskEntry>>>,
    buffer_bytes: usize,
    retention: Duration,
}

impl TaskHub {
    pub fn new(buffer_bytes: usize, retention: Duration) -> Self {
        Self {
            tasks: Arc::new(DashMap::new()),
            buffer_bytes,
            retention,
        }
    }

    /// Register a new running task. Returns `None` if the key is taken.
    pub fn register(&self, key: &str, kind: TaskKind, project_id: i64) -> Option<CancellationToken> {
        match self.tasks.entry(key.to_string()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                let cancel = CancellationToken::new();
                let (events, _) = broadcast::channel(EVENT_CAPACITY);
                slot.insert(Arc::new(TaskEntry {
                    kind,
                    project_id,
                    started_at: Utc::now(),
                    cancel: cancel.clone(),
                    events,
                    inner: Mutex::new(EntryState {
                        backlog: Vec::new(),
                        written: 0,
                        state: TaskState::Running,
                        finished_at: None,
                        finished: None,
                        viewer: None,
                    }),
                }));
                Some(cancel)
            }
        }
    }

    fn entry(&self, key: &str) -> Option<Arc<TaskEntry>> {
        self.tasks.get(key).map(|e| e.value().clone())
    }

    pub fn append(&self, key: &str, data: Bytes) {
        let Some(entry) = self.entry(key) else {
            return;
        };
        let mut inner = entry.lock();
        if !inner.state.is_running() {
            return;
        }
        let offset = inner.written;
        inner.written += data.len() as u64;
        inner.backlog.extend_from_slice(&data);
        if inner.backlog.len() > self.buffer_bytes {
            let excess = inner.backlog.len() - self.buffer_bytes;
            inner.backlog.drain(0..excess);
        }
        let _ = entry.events.send(HubEvent::Output { offset, data });
    }

    /// Record the outcome. Only the first call for a key has an effect.
    pub fn finish(&self, key: &str, outcome: TaskOutcome) {
        let Some(entry) = self.entry(key) else {
            return;
        };
        let mut inner = entry.lock();
        if !inner.state.is_running() {
            return;
        }
        info!("Task {} {} finished: {}", entry.kind, key, outcome);
        inner.state = TaskState::Finished {
            outcome: outcome.clone(),
        };
        inner.finished_at = Some(Utc::now());
        inner.finished = Some(Instant::now());
        let _ = entry.events.send(HubEvent::Finished(outcome));
    }

    /// Attach a stream to `key`, superseding any stream already attached
    pub fn attach(&self, key: &str) -> Option<Attachment> {
        let entry = self.entry(key)?;
        let mut inner = entry.lock();
        let superseded = CancellationToken::new();
        if let Some(previous) = inner.viewer.replace(superseded.clone()) {
            debug!("Superseding previous stream of task {}", key);
            previous.cancel();
        }
        let finished = match &inner.state {
            TaskState::Finished { outcome } => Some(outcome.clone()),
            TaskState::Running => None,
        };
        Some(Attachment {
            backlog: Bytes::copy_from_slice(&inner.backlog),
            finished,
            events: entry.events.subscribe(),
            superseded,
            cursor: Cursor {
                position: inner.written,
            },
        })
    }

    pub fn info(&self, key: &str) -> Option<TaskInfo> {
        let entry = self.entry(key)?;
        let inner = entry.lock();
        Some(TaskInfo {
            key: key.to_string(),
            kind: entry.kind,
            project_id: entry.project_id,
            state: inner.state.clone(),
            started_at: entry.started_at,
            finished_at: inner.finished_at,
        })
    }

    /// Key of a task still running for `project_id`
    pub fn running_for_project(&self, project_id: i64) -> Option<String> {
        self.tasks
            .iter()
            .find(|e| e.project_id == project_id && e.lock().state.is_running())
            .map(|e| e.key().clone())
    }

    /// Cancellation token of a task, with whether it is still running
    pub fn cancel_token(&self, key: &str) -> Option<(CancellationToken, bool)> {
        let entry = self.entry(key)?;
        let running = entry.lock().state.is_running();
        Some((entry.cancel.clone(), running))
    }

    /// Drop finished tasks older than the retention period
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let expired: Vec<String> = self
            .tasks
            .iter()
            .filter(|e| {
                e.lock()
                    .finished
                    .map(|at| now.duration_since(at) >= self.retention)
                    .unwrap_or(false)
            })
            .map(|e| e.key().clone())
            .collect();
        for key in &expired {
            self.tasks.remove(key);
        }
        if !expired.is_empty() {
            debug!("Swept {} finished tasks", expired.len());
        }
        expired.len()
    }

    pub fn start_cleanup_task(self: &Arc<Self>) {
        let hub = Arc::downgrade(self);
        let period = self
            .retention
            .clamp(Duration::from_secs(1), Duration::from_secs(60));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                match hub.upgrade() {
                    Some(hub) => {
                        hub.sweep();
                    }
                    None => break,
                }
            }
        });
    }
}

/// Write handle a task backend sends its output through
#[derive(Clone)]
pub struct TaskOutput {
    hub: Arc<TaskHub>,
    key: String,
}

impl TaskOutput {
    pub fn new(hub: Arc<TaskHub>, key: impl Into<String>) -> Self {
        Self {
            hub,
            key: key.into(),
        }
    }

    pub fn write(&self, data: impl Into<Bytes>) {
        self.hub.append(&self.key, data.into());
    }

    pub fn line(&self, text: impl std::fmt::Display) {
        self.write(format!("{}\n", text));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hub() -> Arc<TaskHub> {
        Arc::new(TaskHub::new(16, Duration::from_secs(600)))
    }

    #[test]
    fn test_register_rejects_duplicate_key() {
        let hub = hub();
        assert!(hub.register("k1", TaskKind::Pull, 1).is_some());
        assert!(hub.register("k1", TaskKind::Push, 1).is_none());
    }

    #[test]
    fn test_backlog_is_bounded() {
        let hub = hub();
        hub.register("k1", TaskKind::Publish, 1);
        hub.append("k1", Bytes::from_static(b"0123456789"));
        hub.append("k1", Bytes::from_static(b"abcdefghij"));
        let attachment = hub.attach("k1").unwrap();
        assert_eq!(&attachment.backlog[..], b"456789abcdefghij");
        assert!(attachment.finished.is_none());
    }

    #[tokio::test]
    async fn test_live_events_follow_backlog() {
        let hub = hub();
        hub.register("k1", TaskKind::Publish, 1);
        hub.append("k1", Bytes::from_static(b"early "));
        let mut attachment = hub.attach("k1").unwrap();
        hub.append("k1", Bytes::from_static(b"late"));
        hub.finish("k1", TaskOutcome::Succeeded);

        assert_eq!(&attachment.backlog[..], b"early ");
        assert_eq!(
            attachment.events.recv().await.unwrap(),
            HubEvent::Output {
                offset: 6,
                data: Bytes::from_static(b"late")
            }
        );
        assert_eq!(
            attachment.events.recv().await.unwrap(),
            HubEvent::Finished(TaskOutcome::Succeeded)
        );
    }

    #[test]
    fn test_attach_after_finish() {
        let hub = hub();
        hub.register("k1", TaskKind::Pull, 1);
        hub.append("k1", Bytes::from_static(b"done"));
        hub.finish("k1", TaskOutcome::Failed { error: "exit 1".into() });
        // Later outcomes and output are ignored
        hub.finish("k1", TaskOutcome::Succeeded);
        hub.append("k1", Bytes::from_static(b"more"));

        let attachment = hub.attach("k1").unwrap();
        assert_eq!(&attachment.backlog[..], b"done");
        assert_eq!(
            attachment.finished,
            Some(TaskOutcome::Failed { error: "exit 1".into() })
        );
        assert!(hub.attach("missing").is_none());
    }

    #[test]
    fn test_new_attach_supersedes_previous() {
        let hub = hub();
        hub.register("k1", TaskKind::Pull, 1);
        let first = hub.attach("k1").unwrap();
        let second = hub.attach("k1").unwrap();
        assert!(first.superseded.is_cancelled());
        assert!(!second.superseded.is_cancelled());
    }

    fn flood(hub: &TaskHub, key: &str, chunks: usize) {
        for i in 0..chunks {
            hub.append(key, Bytes::from(format!("{:04}", i)));
        }
    }

    #[tokio::test]
    async fn test_lagging_stream_catches_up_from_backlog() {
        let hub = TaskHub::new(64 * 1024, Duration::from_secs(600));
        hub.register("k1", TaskKind::Publish, 1);
        let mut attachment = hub.attach("k1").unwrap();
        flood(&hub, "k1", EVENT_CAPACITY + 10);

        let mut seen = Vec::new();
        match attachment.events.recv().await {
            Err(broadcast::error::RecvError::Lagged(_)) => {
                let catch_up = attachment.cursor.catch_up(&hub, "k1").unwrap();
                assert_eq!(catch_up.missed, 0);
                seen.extend_from_slice(&catch_up.data);
            }
            other => panic!("expected lag, got {:?}", other),
        }

        // Events still queued overlap what the catch-up sent
        hub.append("k1", Bytes::from_static(b"tail"));
        hub.finish("k1", TaskOutcome::Succeeded);
        loop {
            match attachment.events.recv().await.unwrap() {
                HubEvent::Output { offset, data } => {
                    if let Some(fresh) = attachment.cursor.accept(offset, &data) {
                        seen.extend_from_slice(&fresh);
                    }
                }
                HubEvent::Finished(_) => break,
            }
        }

        let expected: String = (0..EVENT_CAPACITY + 10)
            .map(|i| format!("{:04}", i))
            .chain(std::iter::once("tail".to_string()))
            .collect();
        assert_eq!(String::from_utf8(seen).unwrap(), expected);
    }

    #[tokio::test]
    async fn test_catch_up_reports_bytes_gone_from_backlog() {
        let hub = hub();
        hub.register("k1", TaskKind::Publish, 1);
        let mut attachment = hub.attach("k1").unwrap();
        flood(&hub, "k1", EVENT_CAPACITY + 10);

        let catch_up = attachment.cursor.catch_up(&hub, "k1").unwrap();
        let total = ((EVENT_CAPACITY + 10) * 4) as u64;
        assert_eq!(catch_up.missed, total - 16);
        assert_eq!(catch_up.data.len(), 16);
        assert_eq!(attachment.cursor.position(), total);
    }

    #[test]
    fn test_cursor_trims_overlap() {
        let mut cursor = Cursor { position: 4 };
        assert_eq!(cursor.accept(0, &Bytes::from_static(b"abcd")), None);
        assert_eq!(
            cursor.accept(2, &Bytes::from_static(b"cdef")),
            Some(Bytes::from_static(b"ef"))
        );
        assert_eq!(cursor.position(), 6);
    }

    #[test]
    fn test_running_for_project() {
        let hub = hub();
        hub.register("k1", TaskKind::Pull, 1);
        hub.register("k2", TaskKind::Push, 2);
        assert_eq!(hub.running_for_project(1).as_deref(), Some("k1"));
        hub.finish("k1", TaskOutcome::Succeeded);
        assert_eq!(hub.running_for_project(1), None);
        assert_eq!(hub.running_for_project(2).as_deref(), Some("k2"));

        let info = hub.info("k1").unwrap();
        assert_eq!(info.kind, TaskKind::Pull);
        assert!(!info.state.is_running());
        assert!(info.finished_at.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_after_retention() {
        let hub = hub();
        hub.register("done", TaskKind::Pull, 1);
        hub.register("running", TaskKind::Push, 1);
        hub.finish("done", TaskOutcome::Succeeded);

        tokio::time::advance(Duration::from_secs(599)).await;
        assert_eq!(hub.sweep(), 0);
        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(hub.sweep(), 1);
        assert!(hub.info("done").is_none());
        assert!(hub.info("running").is_some());
    }
}
