//! Editor reducer and driver
//!
//! [`reduce`] is a pure function from events to effects and can be exercised
//! without any renderer. [`Editor`] is the shell that executes the effects
//! against the session store, the mutation pipeline, and the ports.

use crate::modal::{ModalEffect, ModalEvent, ModalPhase, TaskModal};
use crate::notice::{Notice, NoticeSender};
use crate::pipeline::MutationPipeline;
use crate::ports::{close_outcome, FileStore, StreamEvent, TaskClient, TaskStream, UploadFile};
use crate::session::{lock, SessionStore, SharedSession};
use crate::task::{TaskMachine, TaskPhase};
use crate::tree;
use crate::{CoreError, Result};
use hollow_types::{join_path, Bucket, FileNode, FileTree, Repo, SessionState, TaskKind, TaskOutcome};
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Every tree-mutating action the editor can issue
#[derive(Debug, Clone)]
pub enum Command {
    NewFile { parent: String, name: String },
    NewDirectory { parent: String, name: String },
    Delete { path: String, is_dir: bool },
    Open { path: String },
    Upload { dir: String, files: Vec<UploadFile> },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::NewFile { .. } => "new file",
            Command::NewDirectory { .. } => "new directory",
            Command::Delete { .. } => "delete",
            Command::Open { .. } => "open",
            Command::Upload { .. } => "upload",
        }
    }
}

/// What the editor currently shows
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EditorState {
    pub tree: FileTree,
    /// Latest snapshot of the session store
    pub session: SessionState,
    pub auth_required: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditorEvent {
    SessionChanged(SessionState),
    TreeLoaded(FileTree),
    ReloadRequested,
    Edited(FileNode),
    FileOpened(FileTree),
    DirToggled(FileNode),
    Deleted { path: String },
    CommandFinished {
        command: &'static str,
        error: Option<String>,
    },
    AuthFailed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditorEffect {
    ScheduleWrite(FileNode),
    SetCurrent(Option<FileTree>),
    OpenDir(FileNode),
    ToggleDir(FileNode),
    ClearDirty(String),
    ReloadTree,
    Notify(Notice),
}

pub fn reduce(state: &mut EditorState, event: EditorEvent) -> Vec<EditorEffect> {
    match event {
        EditorEvent::SessionChanged(session) => {
            state.session = session;
            state.tree = tree::reconcile(std::mem::take(&mut state.tree), &state.session);
            Vec::new()
        }
        EditorEvent::TreeLoaded(fresh) => {
            state.tree = tree::reconcile(fresh, &state.session);
            state.auth_required = false;
            Vec::new()
        }
        EditorEvent::ReloadRequested => vec![EditorEffect::ReloadTree],
        EditorEvent::Edited(file) => vec![EditorEffect::ScheduleWrite(file)],
        EditorEvent::FileOpened(mut file) => {
            // Unsaved local content wins over what the server returned
            if let Some(local) = state
                .session
                .modified_files
                .iter()
                .find(|f| f.path == file.node.path)
            {
                file.node.body = local.body.clone();
            }
            let mut effects: Vec<EditorEffect> = tree::ancestors(&state.tree, &file.node.path)
                .into_iter()
                .filter(|dir| !state.session.is_dir_open(&dir.path))
                .map(|dir| EditorEffect::OpenDir(dir.clone()))
                .collect();
            effects.push(EditorEffect::SetCurrent(Some(file)));
            effects
        }
        EditorEvent::DirToggled(node) if node.is_dir => vec![EditorEffect::ToggleDir(node)],
        EditorEvent::DirToggled(_) => Vec::new(),
        EditorEvent::Deleted { path } => {
            let mut effects: Vec<EditorEffect> = state
                .session
                .modified_files
                .iter()
                .filter(|f| is_under(&f.path, &path))
                .map(|f| EditorEffect::ClearDirty(f.path.clone()))
                .collect();
            let current_removed = state
                .session
                .curr_file
                .as_ref()
                .map(|f| is_under(&f.node.path, &path))
                .unwrap_or(false);
            if current_removed {
                effects.push(EditorEffect::SetCurrent(None));
            }
            effects
        }
        EditorEvent::CommandFinished { command, error } => {
            let mut effects = vec![EditorEffect::ReloadTree];
            if let Some(error) = error {
                effects.push(EditorEffect::Notify(Notice::CommandFailed {
                    command: command.to_string(),
                    error,
                }));
            }
            effects
        }
        EditorEvent::AuthFailed => {
            if state.auth_required {
                return Vec::new();
            }
            state.auth_required = true;
            vec![EditorEffect::Notify(Notice::AuthRequired)]
        }
    }
}

fn is_under(path: &str, root: &str) -> bool {
    path == root
        || path
            .strip_prefix(root.trim_end_matches('/'))
            .map(|rest| rest.starts_with('/'))
            .unwrap_or(false)
}

pub struct Editor {
    bucket: Bucket,
    store: Arc<dyn FileStore>,
    tasks: Arc<dyn TaskClient>,
    session: SharedSession,
    pipeline: MutationPipeline,
    notices: NoticeSender,
    state: EditorState,
    machine: TaskMachine,
    modal: TaskModal,
}

impl Editor {
    pub fn new(
        bucket: Bucket,
        store: Arc<dyn FileStore>,
        tasks: Arc<dyn TaskClient>,
        session: SharedSession,
        pipeline: MutationPipeline,
        notices: NoticeSender,
    ) -> Self {
        let state = EditorState {
            session: lock(&session).state().clone(),
            ..Default::default()
        };
        Self {
            bucket,
            store,
            tasks,
            session,
            pipeline,
            notices,
            state,
            machine: TaskMachine::new(),
            modal: TaskModal::new(),
        }
    }

    pub fn state(&self) -> &EditorState {
        &self.state
    }

    pub fn bucket(&self) -> Bucket {
        self.bucket
    }

    pub fn pipeline(&self) -> &MutationPipeline {
        &self.pipeline
    }

    pub fn task_phase(&self) -> &TaskPhase {
        self.machine.phase()
    }

    /// Pick up session changes made outside the reducer (acknowledged writes)
    pub fn sync_session(&mut self) {
        let snapshot = lock(&self.session).state().clone();
        reduce(&mut self.state, EditorEvent::SessionChanged(snapshot));
    }

    /// Feed one event through the reducer and execute the resulting effects,
    /// including the effects of any events they produce.
    pub async fn apply(&mut self, event: EditorEvent) -> Result<()> {
        let mut queue = VecDeque::from([event]);
        let mut first_err = None;
        while let Some(event) = queue.pop_front() {
            for effect in reduce(&mut self.state, event) {
                if let Err(e) = self.execute(effect, &mut queue).await {
                    first_err.get_or_insert(e);
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn execute(&mut self, effect: EditorEffect, queue: &mut VecDeque<EditorEvent>) -> Result<()> {
        match effect {
            EditorEffect::ScheduleWrite(file) => {
                let result = self.pipeline.edit(self.bucket, file);
                queue.push_back(self.session_changed());
                result
            }
            EditorEffect::SetCurrent(file) => {
                self.mutate_session(queue, |s| s.set_current_file(file))
            }
            EditorEffect::OpenDir(dir) => self.mutate_session(queue, |s| s.open_dir(&dir)),
            EditorEffect::ToggleDir(dir) => {
                self.mutate_session(queue, |s| s.toggle_open_dir(&dir).map(|_| ()))
            }
            EditorEffect::ClearDirty(path) => {
                self.mutate_session(queue, |s| s.clear_modified(&path).map(|_| ()))
            }
            EditorEffect::ReloadTree => match self.store.tree(self.bucket, "").await {
                Ok(fresh) => {
                    queue.push_back(EditorEvent::TreeLoaded(fresh));
                    Ok(())
                }
                Err(e) if e.is_auth() => {
                    queue.push_back(EditorEvent::AuthFailed);
                    Err(e)
                }
                Err(e) => {
                    warn!("Tree reload failed: {}", e);
                    Err(e)
                }
            },
            EditorEffect::Notify(notice) => {
                let _ = self.notices.send(notice);
                Ok(())
            }
        }
    }

    fn mutate_session<F>(&self, queue: &mut VecDeque<EditorEvent>, f: F) -> Result<()>
    where
        F: FnOnce(&mut SessionStore) -> Result<()>,
    {
        let mut guard = lock(&self.session);
        let result = f(&mut *guard);
        drop(guard);
        if let Err(e) = &result {
            let _ = self.notices.send(Notice::PersistFailed {
                error: e.to_string(),
            });
        }
        queue.push_back(self.session_changed());
        result
    }

    fn session_changed(&self) -> EditorEvent {
        EditorEvent::SessionChanged(lock(&self.session).state().clone())
    }

    pub async fn reload_tree(&mut self) -> Result<()> {
        self.apply(EditorEvent::ReloadRequested).await
    }

    /// Record a local edit of an open file
    pub async fn edit(&mut self, file: FileNode) -> Result<()> {
        self.apply(EditorEvent::Edited(file)).await
    }

    /// Write `file` immediately, bypassing the quiet window
    pub async fn save(&mut self, file: FileNode) -> Result<()> {
        let result = self.pipeline.save_now(self.bucket, file).await;
        self.after_write(result)
    }

    pub async fn flush(&mut self) -> Result<usize> {
        let result = self.pipeline.flush().await;
        self.after_write(result)
    }

    fn after_write<T>(&mut self, result: Result<T>) -> Result<T> {
        if matches!(&result, Err(e) if e.is_auth()) {
            reduce(&mut self.state, EditorEvent::AuthFailed);
        }
        self.sync_session();
        result
    }

    pub async fn toggle_dir(&mut self, path: &str) -> Result<()> {
        let node = tree::find(&self.state.tree, path)
            .map(|t| t.node.clone())
            .ok_or_else(|| CoreError::NotFound(path.to_string()))?;
        self.apply(EditorEvent::DirToggled(node)).await
    }

    /// Run a command against the storage port.
    ///
    /// Every mutating command is followed by a full tree reload, whether it
    /// succeeded or not.
    pub async fn dispatch(&mut self, command: Command) -> Result<()> {
        let name = command.name();
        debug!("Dispatching {:?}", command);
        // Local bookkeeping failures surface after the reload
        let mut local = Ok(());
        let result = match command {
            Command::Open { path } => return self.open(&path).await,
            Command::NewFile { parent, name } => {
                self.store
                    .create_file(self.bucket, &join_path(&parent, &name))
                    .await
            }
            Command::NewDirectory { parent, name } => {
                self.store
                    .create_dir(self.bucket, &join_path(&parent, &name))
                    .await
            }
            Command::Delete { path, is_dir } => {
                let result = self.store.delete(self.bucket, &path, is_dir).await;
                if result.is_ok() {
                    local = self.apply(EditorEvent::Deleted { path }).await;
                }
                result
            }
            Command::Upload { dir, files } => {
                self.store
                    .upload(self.bucket, &dir, files)
                    .await
                    .map(|written| debug!("Uploaded {} files", written.len()))
            }
        };

        if matches!(&result, Err(e) if e.is_auth()) {
            let prompted = self.apply(EditorEvent::AuthFailed).await;
            local = local.and(prompted);
        }
        let error = result.as_ref().err().map(|e| e.to_string());
        let reloaded = self
            .apply(EditorEvent::CommandFinished {
                command: name,
                error,
            })
            .await;
        result?;
        local?;
        reloaded
    }

    async fn open(&mut self, path: &str) -> Result<()> {
        match self.store.read(self.bucket, path).await {
            Ok(node) => self.apply(EditorEvent::FileOpened(node.into())).await,
            Err(e) => {
                if e.is_auth() {
                    self.apply(EditorEvent::AuthFailed).await?;
                }
                Err(e)
            }
        }
    }

    /// Cancel a running task by key
    pub async fn cancel_task(&self, key: &str) -> Result<()> {
        self.tasks.cancel(key).await
    }

    /// Start a task and stream its output into `sink` until it closes.
    ///
    /// If `detach` completes first the stream is released and the task keeps
    /// running on the server; the returned outcome is then `Interrupted`.
    pub async fn run_task<S, D>(
        &mut self,
        kind: TaskKind,
        repo: Option<Repo>,
        mut sink: S,
        detach: D,
    ) -> Result<TaskOutcome>
    where
        S: FnMut(&[u8]),
        D: Future<Output = ()>,
    {
        self.machine.request(kind)?;
        let task = match self.tasks.start(kind, repo).await {
            Ok(task) => task,
            Err(e) => {
                self.machine.start_failed()?;
                warn!("Could not start {}: {}", kind, e);
                if e.is_auth() {
                    self.apply(EditorEvent::AuthFailed).await?;
                } else {
                    let _ = self.notices.send(Notice::TaskStartFailed {
                        kind,
                        error: e.to_string(),
                    });
                }
                return Err(e);
            }
        };
        info!("Task started key={} kind={}", task.key, task.kind);
        self.machine.key_received(task.key.clone())?;

        let mut stream: Option<Box<dyn TaskStream>> = None;
        self.run_modal(
            ModalEvent::Show {
                key: task.key.clone(),
                kind,
            },
            &mut stream,
            &mut sink,
        )
        .await?;

        tokio::pin!(detach);
        while self.modal.phase() == ModalPhase::Streaming {
            let Some(active) = stream.as_mut() else {
                break;
            };
            let event = tokio::select! {
                event = active.next_event() => match event {
                    Some(StreamEvent::Output(bytes)) => ModalEvent::Output(bytes),
                    Some(StreamEvent::Closed(outcome)) => ModalEvent::StreamClosed(outcome),
                    None => ModalEvent::StreamClosed(close_outcome(None, None)),
                },
                _ = &mut detach => ModalEvent::Unmount,
            };
            self.run_modal(event, &mut stream, &mut sink).await?;
        }

        let outcome = match self.modal.outcome() {
            Some(outcome) if self.modal.phase() == ModalPhase::Closed => outcome.clone(),
            _ => TaskOutcome::Interrupted {
                reason: "detached".to_string(),
            },
        };
        self.machine.stream_closed(outcome.clone())?;
        info!("Task finished key={} outcome={}", task.key, outcome);
        self.run_modal(ModalEvent::CloseRequested, &mut stream, &mut sink)
            .await?;
        Ok(outcome)
    }

    async fn run_modal<S>(
        &mut self,
        event: ModalEvent,
        stream: &mut Option<Box<dyn TaskStream>>,
        sink: &mut S,
    ) -> Result<()>
    where
        S: FnMut(&[u8]),
    {
        let mut effects: VecDeque<ModalEffect> = self.modal.handle(event).into();
        while let Some(effect) = effects.pop_front() {
            match effect {
                ModalEffect::OpenStream(key) => match self.tasks.attach(&key).await {
                    Ok(opened) => {
                        *stream = Some(opened);
                        self.machine.stream_opened()?;
                    }
                    Err(e) => {
                        warn!("Could not attach to task {}: {}", key, e);
                        let outcome = close_outcome(None, Some(e.to_string()));
                        effects.extend(self.modal.handle(ModalEvent::StreamClosed(outcome)));
                    }
                },
                ModalEffect::Render(bytes) => sink(&bytes[..]),
                ModalEffect::ReloadTree => {
                    if let Err(e) = self.reload_tree().await {
                        warn!("Reload after task failed: {}", e);
                    }
                }
                ModalEffect::Notify(notice) => {
                    let _ = self.notices.send(notice);
                }
                ModalEffect::Dismiss => debug!("Task modal dismissed"),
                ModalEffect::ReleaseStream => {
                    if let Some(mut active) = stream.take() {
                        active.release().await;
                    }
                }
            }
        }
        Ok(())
    }
}
