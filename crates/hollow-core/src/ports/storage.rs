//! File storage collaborator

use crate::Result;
use async_trait::async_trait;
use bytes::Bytes;
use hollow_types::{Bucket, FileNode, FileTree};

/// A file submitted through the upload endpoint
#[derive(Debug, Clone)]
pub struct UploadFile {
    /// Name relative to the target directory; may contain subdirectories
    pub name: String,
    pub data: Bytes,
}

/// Storage backend holding the authoritative file tree of a project
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Fetch the whole tree below `path`
    async fn tree(&self, bucket: Bucket, path: &str) -> Result<FileTree>;

    /// Read one file including its body
    async fn read(&self, bucket: Bucket, path: &str) -> Result<FileNode>;

    /// Overwrite (or create) a file with `body`
    async fn write(&self, bucket: Bucket, path: &str, body: &str) -> Result<()>;

    /// Create an empty file
    async fn create_file(&self, bucket: Bucket, path: &str) -> Result<()>;

    /// Create a directory and any missing parents
    async fn create_dir(&self, bucket: Bucket, path: &str) -> Result<()>;

    /// Delete a file, or a directory with its content
    async fn delete(&self, bucket: Bucket, path: &str, is_dir: bool) -> Result<()>;

    /// Write several files below `dir`, returning the written paths
    async fn upload(&self, bucket: Bucket, dir: &str, files: Vec<UploadFile>)
        -> Result<Vec<String>>;
}
