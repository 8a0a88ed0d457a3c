//! File tree types

use crate::TypesError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Named partition of one project's file tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Bucket {
    #[default]
    Project,
    Theme,
}

impl Bucket {
    pub fn as_str(&self) -> &'static str {
        match self {
            Bucket::Project => "project",
            Bucket::Theme => "theme",
        }
    }
}

impl std::fmt::Display for Bucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Bucket {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "project" => Ok(Bucket::Project),
            "theme" => Ok(Bucket::Theme),
            other => Err(TypesError::UnknownBucket(other.to_string())),
        }
    }
}

/// A file or directory within one `(project_id, bucket)` scope.
///
/// `path` is absolute and slash separated; it is the identity of the node.
/// `is_open` is client-side presentation state and never comes from the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct FileNode {
    pub name: String,
    pub path: String,
    #[serde(default)]
    pub dir_path: String,
    pub is_dir: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_open: bool,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default, alias = "modify_at")]
    pub modified_at: i64,
    #[serde(default)]
    pub body: String,
}

impl FileNode {
    /// Build a node from an absolute path, deriving `name` and `dir_path`
    pub fn new(path: impl Into<String>, is_dir: bool) -> Self {
        let path = path.into();
        let (dir_path, name) = split_path(&path);
        Self {
            name: name.to_string(),
            dir_path: dir_path.to_string(),
            path,
            is_dir,
            ..Default::default()
        }
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Lower-cased extension of the file name, if any
    pub fn extension(&self) -> Option<String> {
        let (stem, ext) = self.name.rsplit_once('.')?;
        if stem.is_empty() || ext.is_empty() {
            return None;
        }
        Some(ext.to_ascii_lowercase())
    }
}

/// A node together with its ordered children.
///
/// Item order is presentation order. Files never carry items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct FileTree {
    #[serde(flatten)]
    pub node: FileNode,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub items: Vec<FileTree>,
}

impl FileTree {
    pub fn root() -> Self {
        Self {
            node: FileNode {
                is_dir: true,
                ..Default::default()
            },
            items: Vec::new(),
        }
    }

    pub fn dir(path: impl Into<String>, items: Vec<FileTree>) -> Self {
        Self {
            node: FileNode::new(path, true),
            items,
        }
    }

    pub fn file(path: impl Into<String>) -> Self {
        Self {
            node: FileNode::new(path, false),
            items: Vec::new(),
        }
    }

    pub fn path(&self) -> &str {
        &self.node.path
    }

    pub fn is_dir(&self) -> bool {
        self.node.is_dir
    }
}

impl From<FileNode> for FileTree {
    fn from(node: FileNode) -> Self {
        Self {
            node,
            items: Vec::new(),
        }
    }
}

// Older servers send `"items": null` for leaf nodes.
fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<FileTree>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Vec<FileTree>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Split an absolute path into `(dir_path, name)`.
pub fn split_path(path: &str) -> (&str, &str) {
    match path.rfind('/') {
        Some(0) => ("/", &path[1..]),
        Some(idx) => (&path[..idx], &path[idx + 1..]),
        None => ("", path),
    }
}

/// Join a directory path and a child name with exactly one slash.
pub fn join_path(dir: &str, name: &str) -> String {
    let dir = dir.trim_end_matches('/');
    let name = name.trim_start_matches('/');
    format!("{}/{}", dir, name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_parse() {
        assert_eq!("project".parse::<Bucket>().unwrap(), Bucket::Project);
        assert_eq!("theme".parse::<Bucket>().unwrap(), Bucket::Theme);
        assert!(matches!(
            "assets".parse::<Bucket>(),
            Err(TypesError::UnknownBucket(_))
        ));
    }

    #[test]
    fn test_node_from_path() {
        let node = FileNode::new("/src/a.ts", false);
        assert_eq!(node.name, "a.ts");
        assert_eq!(node.dir_path, "/src");
        assert_eq!(node.extension().as_deref(), Some("ts"));

        let top = FileNode::new("/README.md", false);
        assert_eq!(top.dir_path, "/");
        assert_eq!(top.name, "README.md");

        assert_eq!(FileNode::new("/.gitignore", false).extension(), None);
    }

    #[test]
    fn test_join_path() {
        assert_eq!(join_path("/", "a.md"), "/a.md");
        assert_eq!(join_path("/src/", "/a.md"), "/src/a.md");
        assert_eq!(join_path("", "a.md"), "/a.md");
    }

    #[test]
    fn test_tree_wire_format() {
        let json = r#"{
            "name": "", "path": "", "dir_path": "", "is_dir": true,
            "items": [
                {"name": "src", "path": "/src", "dir_path": "/", "is_dir": true,
                 "items": [{"name": "a.ts", "path": "/src/a.ts", "dir_path": "/src",
                            "is_dir": false, "modify_at": 12, "body": "", "items": null}]}
            ]
        }"#;
        let tree: FileTree = serde_json::from_str(json).unwrap();
        let src = &tree.items[0];
        assert!(src.is_dir());
        assert_eq!(src.items[0].node.modified_at, 12);
        assert!(src.items[0].items.is_empty());

        let out = serde_json::to_value(&tree).unwrap();
        assert!(out.get("is_open").is_none());
        assert_eq!(out["items"][0]["path"], "/src");
    }
}
