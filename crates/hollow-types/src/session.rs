//! Persisted editor session record

use crate::{FileNode, FileTree};
use serde::{Deserialize, Serialize};

/// Key under which the session record is persisted
pub const SESSION_STATE_KEY: &str = "file_status";

/// What the user is looking at and what the user has changed but not saved.
///
/// A path appears in `modified_files` if and only if it has local edits that
/// the storage backend has not yet acknowledged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    #[serde(default)]
    pub modified_files: Vec<FileNode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub curr_file: Option<FileTree>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opened_dir: Option<Vec<FileNode>>,
}

impl SessionState {
    pub fn is_modified(&self, path: &str) -> bool {
        self.modified_files.iter().any(|f| f.path == path)
    }

    pub fn is_current(&self, path: &str) -> bool {
        self.curr_file
            .as_ref()
            .map(|f| f.node.path == path)
            .unwrap_or(false)
    }

    pub fn is_dir_open(&self, path: &str) -> bool {
        self.opened_dir
            .as_ref()
            .map(|dirs| dirs.iter().any(|d| d.path == path))
            .unwrap_or(false)
    }

    /// Paths of all open directories
    pub fn open_dir_paths(&self) -> Vec<&str> {
        self.opened_dir
            .iter()
            .flatten()
            .map(|d| d.path.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_uses_camel_case_keys() {
        let state = SessionState {
            modified_files: vec![FileNode::new("/a.md", false).with_body("x")],
            curr_file: Some(FileTree::file("/a.md")),
            opened_dir: Some(vec![FileNode::new("/src", true)]),
        };
        let value = serde_json::to_value(&state).unwrap();
        assert_eq!(value["modifiedFiles"][0]["path"], "/a.md");
        assert_eq!(value["currFile"]["path"], "/a.md");
        assert_eq!(value["openedDir"][0]["path"], "/src");

        let back: SessionState = serde_json::from_value(value).unwrap();
        assert_eq!(back, state);
    }

    #[test]
    fn test_empty_record() {
        let state: SessionState = serde_json::from_str("{}").unwrap();
        assert!(state.modified_files.is_empty());
        assert!(!state.is_dir_open("/src"));
        assert!(!state.is_current("/a.md"));
    }
}
