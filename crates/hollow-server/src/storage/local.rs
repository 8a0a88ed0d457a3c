//! File storage on the local disk
//!
//! Each bucket maps to one root directory. Request paths are absolute,
//! slash separated, and never leave their bucket root.

use async_trait::async_trait;
use hollow_core::ports::{FileStore, UploadFile};
use hollow_core::{CoreError, Result};
use hollow_types::{join_path, Bucket, FileNode, FileTree};
use std::cmp::Ordering;
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

/// Entries never shown in a tree
const HIDDEN: &[&str] = &[".git"];

pub struct LocalFileStore {
    project_root: PathBuf,
    theme_root: PathBuf,
    tree_depth: usize,
}

impl LocalFileStore {
    pub fn new(project_root: PathBuf, theme_root: PathBuf, tree_depth: usize) -> Self {
        Self {
            project_root,
            theme_root,
            tree_depth,
        }
    }

    /// Create missing bucket roots
    pub async fn ensure_roots(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.project_root).await?;
        tokio::fs::create_dir_all(&self.theme_root).await
    }

    fn root(&self, bucket: Bucket) -> &Path {
        match bucket {
            Bucket::Project => &self.project_root,
            Bucket::Theme => &self.theme_root,
        }
    }

    /// Map a request path to `(normalised path, location on disk)`
    fn resolve(&self, bucket: Bucket, path: &str) -> Result<(String, PathBuf)> {
        let logical = normalize(path)?;
        let mut disk = self.root(bucket).to_path_buf();
        disk.extend(logical.split('/').filter(|p| !p.is_empty()));
        Ok((logical, disk))
    }

    /// Like `resolve` but refuses the bucket root itself
    fn resolve_entry(&self, bucket: Bucket, path: &str) -> Result<(String, PathBuf)> {
        let (logical, disk) = self.resolve(bucket, path)?;
        if logical.is_empty() {
            return Err(CoreError::InvalidPath(path.to_string()));
        }
        Ok((logical, disk))
    }
}

/// Collapse `.`/`..`/empty segments. A `..` that would climb above the root
/// is an error.
pub fn normalize(path: &str) -> Result<String> {
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split(['/', '\\']) {
        match part {
            "" | "." => {}
            ".." => {
                if parts.pop().is_none() {
                    return Err(CoreError::InvalidPath(path.to_string()));
                }
            }
            part => parts.push(part),
        }
    }
    if parts.is_empty() {
        Ok(String::new())
    } else {
        Ok(format!("/{}", parts.join("/")))
    }
}

fn unix_secs(time: std::io::Result<SystemTime>) -> i64 {
    time.ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn node_from(logical: &str, meta: &Metadata) -> FileNode {
    let mut node = FileNode::new(logical, meta.is_dir());
    node.modified_at = unix_secs(meta.modified());
    node.created_at = match meta.created() {
        Ok(created) => unix_secs(Ok(created)),
        Err(_) => node.modified_at,
    };
    node
}

fn build_tree(disk: &Path, logical: &str, depth: usize) -> std::io::Result<FileTree> {
    let meta = std::fs::metadata(disk)?;
    let mut tree = FileTree::from(node_from(logical, &meta));
    if meta.is_dir() && depth > 0 {
        tree.items = list_dir(disk, logical, depth - 1)?;
    }
    Ok(tree)
}

fn list_dir(disk: &Path, logical: &str, depth: usize) -> std::io::Result<Vec<FileTree>> {
    let mut items = Vec::new();
    for entry in std::fs::read_dir(disk)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if HIDDEN.contains(&name.as_str()) {
            continue;
        }
        match build_tree(&entry.path(), &join_path(logical, &name), depth) {
            Ok(item) => items.push(item),
            Err(e) => warn!("Skipping {}: {}", entry.path().display(), e),
        }
    }
    items.sort_by(|a, b| match (a.node.is_dir, b.node.is_dir) {
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        _ => a.node.name.cmp(&b.node.name),
    });
    Ok(items)
}

async fn ensure_parent(disk: &Path) -> std::io::Result<()> {
    match disk.parent() {
        Some(parent) => tokio::fs::create_dir_all(parent).await,
        None => Ok(()),
    }
}

#[async_trait]
impl FileStore for LocalFileStore {
    async fn tree(&self, bucket: Bucket, path: &str) -> Result<FileTree> {
        let (logical, disk) = self.resolve(bucket, path)?;
        let depth = self.tree_depth;
        let mut tree = tokio::task::spawn_blocking(move || build_tree(&disk, &logical, depth))
            .await
            .map_err(|e| CoreError::Io(std::io::Error::other(e)))??;
        // The root carries the requested base but no name
        tree.node.name.clear();
        Ok(tree)
    }

    async fn read(&self, bucket: Bucket, path: &str) -> Result<FileNode> {
        let (logical, disk) = self.resolve_entry(bucket, path)?;
        let meta = tokio::fs::metadata(&disk).await?;
        if meta.is_dir() {
            return Err(CoreError::InvalidPath(format!("{} is a directory", logical)));
        }
        // Binary files are only reachable through upload
        let body = String::from_utf8(tokio::fs::read(&disk).await?).map_err(|_| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("{} is not a text file", logical),
            )
        })?;
        Ok(node_from(&logical, &meta).with_body(body))
    }

    async fn write(&self, bucket: Bucket, path: &str, body: &str) -> Result<()> {
        let (logical, disk) = self.resolve_entry(bucket, path)?;
        ensure_parent(&disk).await?;
        tokio::fs::write(&disk, body).await?;
        debug!("Wrote {} ({} bytes)", logical, body.len());
        Ok(())
    }

    async fn create_file(&self, bucket: Bucket, path: &str) -> Result<()> {
        let (logical, disk) = self.resolve_entry(bucket, path)?;
        ensure_parent(&disk).await?;
        tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&disk)
            .await?;
        debug!("Created {}", logical);
        Ok(())
    }

    async fn create_dir(&self, bucket: Bucket, path: &str) -> Result<()> {
        let (logical, disk) = self.resolve_entry(bucket, path)?;
        tokio::fs::create_dir_all(&disk).await?;
        debug!("Created directory {}", logical);
        Ok(())
    }

    async fn delete(&self, bucket: Bucket, path: &str, is_dir: bool) -> Result<()> {
        let (logical, disk) = self.resolve_entry(bucket, path)?;
        if is_dir {
            tokio::fs::remove_dir_all(&disk).await?;
        } else {
            tokio::fs::remove_file(&disk).await?;
        }
        debug!("Deleted {}", logical);
        Ok(())
    }

    async fn upload(&self, bucket: Bucket, dir: &str, files: Vec<UploadFile>) -> Result<Vec<String>> {
        let base = normalize(dir)?;
        let mut written = Vec::with_capacity(files.len());
        for file in files {
            let (logical, disk) = self.resolve_entry(bucket, &join_path(&base, &file.name))?;
            ensure_parent(&disk).await?;
            tokio::fs::write(&disk, &file.data).await?;
            written.push(logical);
        }
        debug!("Uploaded {} files into {}", written.len(), base);
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use hollow_core::tree::flatten_files;

    fn store(dir: &tempfile::TempDir, depth: usize) -> LocalFileStore {
        LocalFileStore::new(dir.path().join("project"), dir.path().join("theme"), depth)
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("").unwrap(), "");
        assert_eq!(normalize("/").unwrap(), "");
        assert_eq!(normalize("a/./b//c").unwrap(), "/a/b/c");
        assert_eq!(normalize("/a/b/../c").unwrap(), "/a/c");
        assert!(matches!(normalize("/../etc/passwd"), Err(CoreError::InvalidPath(_))));
        assert!(normalize("/a/../../b").is_err());
    }

    #[tokio::test]
    async fn test_tree_orders_dirs_first_and_hides_git() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir, 10);
        store.ensure_roots().await.unwrap();
        store.write(Bucket::Project, "/b.md", "b").await.unwrap();
        store.write(Bucket::Project, "/a.md", "a").await.unwrap();
        store.write(Bucket::Project, "/src/x.ts", "x").await.unwrap();
        store.create_dir(Bucket::Project, "/.git/objects").await.unwrap();

        let tree = store.tree(Bucket::Project, "/").await.unwrap();
        assert_eq!(tree.node.name, "");
        assert_eq!(tree.node.path, "");
        let names: Vec<&str> = tree.items.iter().map(|i| i.node.name.as_str()).collect();
        assert_eq!(names, vec!["src", "a.md", "b.md"]);
        assert_eq!(flatten_files(&tree), vec!["/src/x.ts", "/a.md", "/b.md"]);
        assert!(tree.items[1].items.is_empty());
        assert!(tree.items[1].node.modified_at > 0);
    }

    #[tokio::test]
    async fn test_tree_depth_limit() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir, 1);
        store.write(Bucket::Project, "/a/b/c.md", "").await.unwrap();

        let tree = store.tree(Bucket::Project, "").await.unwrap();
        assert_eq!(tree.items.len(), 1);
        assert!(tree.items[0].items.is_empty());
    }

    #[tokio::test]
    async fn test_escape_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir, 10);
        store.ensure_roots().await.unwrap();
        let err = store
            .write(Bucket::Project, "/../outside.md", "x")
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidPath(_)));
        assert!(!dir.path().join("outside.md").exists());
        assert!(store.delete(Bucket::Project, "/", true).await.is_err());
    }

    #[tokio::test]
    async fn test_read_write_create_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir, 10);

        store.write(Bucket::Theme, "/css/site.css", "body{}").await.unwrap();
        let node = store.read(Bucket::Theme, "/css/site.css").await.unwrap();
        assert_eq!(node.body, "body{}");
        assert_eq!(node.name, "site.css");
        assert_eq!(node.dir_path, "/css");
        assert!(dir.path().join("theme/css/site.css").exists());

        store.create_file(Bucket::Project, "/new.md").await.unwrap();
        let err = store.create_file(Bucket::Project, "/new.md").await.unwrap_err();
        assert!(matches!(err, CoreError::Io(ref e) if e.kind() == std::io::ErrorKind::AlreadyExists));

        store.delete(Bucket::Theme, "/css", true).await.unwrap();
        assert!(!dir.path().join("theme/css").exists());
        assert!(store.read(Bucket::Theme, "/css/site.css").await.is_err());
    }

    #[tokio::test]
    async fn test_upload_returns_written_paths() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir, 10);
        let written = store
            .upload(
                Bucket::Project,
                "/img",
                vec![
                    UploadFile {
                        name: "a.png".to_string(),
                        data: Bytes::from_static(b"\x89PNG"),
                    },
                    UploadFile {
                        name: "/nested/b.png".to_string(),
                        data: Bytes::from_static(b"b"),
                    },
                ],
            )
            .await
            .unwrap();
        assert_eq!(written, vec!["/img/a.png", "/img/nested/b.png"]);
        assert_eq!(
            std::fs::read(dir.path().join("project/img/a.png")).unwrap(),
            b"\x89PNG"
        );

        // Binary content is never handed out as lossy text
        let err = store.read(Bucket::Project, "/img/a.png").await.unwrap_err();
        assert!(matches!(err, CoreError::Io(ref e) if e.kind() == std::io::ErrorKind::InvalidData));
    }
}
