//! HTTP request and response bodies

use crate::{Bucket, Repo};
use serde::{Deserialize, Serialize};

/// Query for `GET /api/file/tree` and `GET /api/file`
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FileQuery {
    #[serde(default)]
    pub project_id: i64,
    #[serde(default)]
    pub path: String,
    pub bucket: Option<Bucket>,
}

/// Body for saving, creating, or making a directory
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FileModifyRequest {
    #[serde(default)]
    pub project_id: i64,
    #[serde(default)]
    pub bucket: Bucket,
    pub path: String,
    #[serde(default)]
    pub body: String,
}

/// Query for `DELETE /api/file`
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DeleteQuery {
    #[serde(default)]
    pub project_id: i64,
    pub path: String,
    #[serde(default)]
    pub is_dir: bool,
    #[serde(default)]
    pub bucket: Bucket,
}

/// Body for `POST /api/publish`
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PublishRequest {
    #[serde(default)]
    pub project_id: i64,
}

/// Body for `POST /api/pull` and `POST /api/push`.
///
/// When `repo` is absent the server uses its configured source repository.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GitTaskRequest {
    #[serde(default)]
    pub project_id: i64,
    #[serde(default)]
    pub repo: Option<Repo>,
}

/// Body for `POST /api/auth`. An empty secret asks the server to verify the
/// existing cookie instead of issuing a new one.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuthRequest {
    #[serde(default)]
    pub secret: String,
}

/// Body of `GET /api/setting`
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SettingResponse {
    pub preview_domain: String,
}

/// Error body returned by every failing endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: u16,
    pub msg: String,
}
