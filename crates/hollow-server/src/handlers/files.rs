//! File and directory handlers

use crate::error::{ApiError, ApiResult};
use crate::extractors::Authenticated;
use crate::AppState;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Multipart, Query, State};
use axum::Json;
use hollow_core::ports::{FileStore, UploadFile};
use hollow_types::{Bucket, DeleteQuery, FileModifyRequest, FileNode, FileQuery, FileTree};
use tracing::info;

fn required_bucket(query: &FileQuery) -> ApiResult<Bucket> {
    query
        .bucket
        .ok_or_else(|| ApiError::BadRequest("bucket is required".to_string()))
}

pub async fn tree(
    _auth: Authenticated,
    State(state): State<AppState>,
    query: Result<Query<FileQuery>, QueryRejection>,
) -> ApiResult<Json<FileTree>> {
    let Query(query) = query?;
    let bucket = required_bucket(&query)?;
    let tree = state.store.tree(bucket, &query.path).await?;
    Ok(Json(tree))
}

pub async fn read(
    _auth: Authenticated,
    State(state): State<AppState>,
    query: Result<Query<FileQuery>, QueryRejection>,
) -> ApiResult<Json<FileNode>> {
    let Query(query) = query?;
    let bucket = query.bucket.unwrap_or_default();
    let file = state.store.read(bucket, &query.path).await?;
    Ok(Json(file))
}

pub async fn save(
    _auth: Authenticated,
    State(state): State<AppState>,
    body: Result<Json<FileModifyRequest>, JsonRejection>,
) -> ApiResult<Json<&'static str>> {
    let Json(req) = body?;
    state.store.write(req.bucket, &req.path, &req.body).await?;
    Ok(Json("ok"))
}

pub async fn create(
    _auth: Authenticated,
    State(state): State<AppState>,
    body: Result<Json<FileModifyRequest>, JsonRejection>,
) -> ApiResult<Json<&'static str>> {
    let Json(req) = body?;
    state.store.create_file(req.bucket, &req.path).await?;
    info!("Created file {} in {}", req.path, req.bucket);
    Ok(Json("ok"))
}

pub async fn create_dir(
    _auth: Authenticated,
    State(state): State<AppState>,
    body: Result<Json<FileModifyRequest>, JsonRejection>,
) -> ApiResult<Json<&'static str>> {
    let Json(req) = body?;
    state.store.create_dir(req.bucket, &req.path).await?;
    info!("Created directory {} in {}", req.path, req.bucket);
    Ok(Json("ok"))
}

pub async fn delete(
    _auth: Authenticated,
    State(state): State<AppState>,
    query: Result<Query<DeleteQuery>, QueryRejection>,
) -> ApiResult<Json<&'static str>> {
    let Query(query) = query?;
    state
        .store
        .delete(query.bucket, &query.path, query.is_dir)
        .await?;
    info!("Deleted {} in {}", query.path, query.bucket);
    Ok(Json("ok"))
}

/// Multipart upload: any number of `file[]` (or `file`) parts plus the
/// target `path` and `bucket`
pub async fn upload(
    _auth: Authenticated,
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<Vec<String>>> {
    let mut dir = String::new();
    let mut bucket = Bucket::default();
    let mut files = Vec::new();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file[]" | "file" => {
                let file_name = field
                    .file_name()
                    .map(|n| n.trim_start_matches('/').to_string())
                    .filter(|n| !n.is_empty())
                    .ok_or_else(|| ApiError::BadRequest("file part without a name".to_string()))?;
                let data = field.bytes().await?;
                files.push(UploadFile {
                    name: file_name,
                    data,
                });
            }
            "path" => dir = field.text().await?,
            "bucket" => {
                let value = field.text().await?;
                bucket = value
                    .parse()
                    .map_err(|e: hollow_types::TypesError| ApiError::BadRequest(e.to_string()))?;
            }
            // project_id and anything unknown
            _ => {}
        }
    }

    if files.is_empty() {
        return Err(ApiError::BadRequest("no files uploaded".to_string()));
    }
    let written = state.store.upload(bucket, &dir, files).await?;
    info!("Uploaded {} files to {} in {}", written.len(), dir, bucket);
    Ok(Json(written))
}
