//! Session Store
//!
//! Single owner of [`SessionState`]: the open file, the dirty-file set, and the
//! open directories. Every mutation is written through to the persistence port
//! before the call returns, so a reload or crash never loses dirty state.

use crate::ports::StatePersistence;
use crate::Result;
use hollow_types::{FileNode, FileTree, SessionState, SESSION_STATE_KEY};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

pub struct SessionStore {
    state: SessionState,
    persistence: Arc<dyn StatePersistence>,
}

/// Session store shared between the pipeline, the tree view, and commands
pub type SharedSession = Arc<Mutex<SessionStore>>;

impl SessionStore {
    /// Load the persisted record, starting empty if there is none.
    ///
    /// A record that fails to parse is discarded with a warning rather than
    /// blocking the editor from starting.
    pub fn open(persistence: Arc<dyn StatePersistence>) -> Result<Self> {
        let state = match persistence.load(SESSION_STATE_KEY)? {
            Some(data) => match serde_json::from_slice::<SessionState>(&data) {
                Ok(state) => state,
                Err(e) => {
                    warn!("Discarding unreadable session record: {}", e);
                    SessionState::default()
                }
            },
            None => SessionState::default(),
        };
        debug!(
            "Session opened: {} modified, {} open dirs",
            state.modified_files.len(),
            state.open_dir_paths().len()
        );
        Ok(Self { state, persistence })
    }

    pub fn shared(self) -> SharedSession {
        Arc::new(Mutex::new(self))
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn is_modified(&self, path: &str) -> bool {
        self.state.is_modified(path)
    }

    /// Record `path` as dirty. Returns `false` (and writes nothing) when it
    /// was already dirty.
    pub fn mark_modified(&mut self, file: FileNode) -> Result<bool> {
        if self.state.is_modified(&file.path) {
            return Ok(false);
        }
        debug!("Marking modified: {}", file.path);
        self.state.modified_files.push(file);
        self.persist()?;
        Ok(true)
    }

    /// Replace the stored snapshot of an already dirty file so a reload
    /// restores the latest local content.
    pub fn refresh_modified(&mut self, file: FileNode) -> Result<()> {
        match self
            .state
            .modified_files
            .iter_mut()
            .find(|f| f.path == file.path)
        {
            Some(entry) => {
                if entry.body == file.body {
                    return Ok(());
                }
                *entry = file;
            }
            None => self.state.modified_files.push(file),
        }
        self.persist()
    }

    /// Forget the dirty flag of `path`. Only called once a write has been
    /// acknowledged. Returns whether an entry was removed.
    pub fn clear_modified(&mut self, path: &str) -> Result<bool> {
        let before = self.state.modified_files.len();
        self.state.modified_files.retain(|f| f.path != path);
        if self.state.modified_files.len() == before {
            return Ok(false);
        }
        debug!("Cleared modified: {}", path);
        self.persist()?;
        Ok(true)
    }

    pub fn set_current_file(&mut self, file: Option<FileTree>) -> Result<()> {
        self.state.curr_file = file;
        self.persist()
    }

    /// Flip the open flag of a directory. Returns whether it is now open.
    pub fn toggle_open_dir(&mut self, dir: &FileNode) -> Result<bool> {
        let dirs = self.state.opened_dir.get_or_insert_with(Vec::new);
        let now_open = if let Some(idx) = dirs.iter().position(|d| d.path == dir.path) {
            dirs.remove(idx);
            false
        } else {
            let mut entry = dir.clone();
            entry.is_open = true;
            entry.body.clear();
            dirs.push(entry);
            true
        };
        self.persist()?;
        Ok(now_open)
    }

    /// Mark a directory open without toggling. Used when revealing a file.
    pub fn open_dir(&mut self, dir: &FileNode) -> Result<()> {
        if self.state.is_dir_open(&dir.path) {
            return Ok(());
        }
        self.toggle_open_dir(dir).map(|_| ())
    }

    fn persist(&self) -> Result<()> {
        let data = serde_json::to_vec(&self.state)?;
        self.persistence.save(SESSION_STATE_KEY, &data)
    }
}

/// Lock a shared session, recovering from a poisoned lock.
///
/// The store performs no partial updates under the lock, so the data behind a
/// poisoned mutex is still consistent.
pub fn lock(session: &SharedSession) -> MutexGuard<'_, SessionStore> {
    session.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
