//! Durable client-side key/value storage for the session record

use crate::{CoreError, Result};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

/// Synchronous durable storage. `save` must not return before the data is
/// durable, and a reader must never observe a partially written value.
pub trait StatePersistence: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>>;
    fn save(&self, key: &str, data: &[u8]) -> Result<()>;
}

/// In-memory persistence, used by tests and ephemeral sessions
#[derive(Default)]
pub struct MemoryPersistence {
    data: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StatePersistence for MemoryPersistence {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let data = self
            .data
            .lock()
            .map_err(|e| CoreError::Persistence(e.to_string()))?;
        Ok(data.get(key).cloned())
    }

    fn save(&self, key: &str, value: &[u8]) -> Result<()> {
        let mut data = self
            .data
            .lock()
            .map_err(|e| CoreError::Persistence(e.to_string()))?;
        data.insert(key.to_string(), value.to_vec());
        Ok(())
    }
}

/// One JSON file per key inside `dir`, replaced atomically on every save
pub struct FilePersistence {
    dir: PathBuf,
}

impl FilePersistence {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl StatePersistence for FilePersistence {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match std::fs::read(self.path_for(key)) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, key: &str, data: &[u8]) -> Result<()> {
        use std::io::Write;

        let target = self.path_for(key);
        let tmp = self.dir.join(format!(".{}.json.tmp", key));
        {
            let mut file = std::fs::File::create(&tmp)?;
            file.write_all(data)?;
            file.sync_all()?;
        }
        std::fs::rename(&tmp, &target)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_persistence_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilePersistence::new(dir.path().join("state")).unwrap();

        assert!(store.load("file_status").unwrap().is_none());

        store.save("file_status", b"{\"a\":1}").unwrap();
        store.save("file_status", b"{\"a\":2}").unwrap();
        assert_eq!(store.load("file_status").unwrap().unwrap(), b"{\"a\":2}");

        // No temp file left behind after the rename
        let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("state"))
            .unwrap()
            .flatten()
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
