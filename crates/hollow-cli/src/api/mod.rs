//! API client for the Hollow server
//!
//! Implements the storage and task ports of the editor engine over HTTP,
//! and opens task streams over WebSocket.

use crate::config::Settings;
use crate::stream;
use async_trait::async_trait;
use hollow_core::ports::{FileStore, TaskClient, TaskStream, UploadFile};
use hollow_core::{CoreError, Result};
use hollow_types::{
    AuthRequest, Bucket, DeleteQuery, ErrorBody, FileModifyRequest, FileNode, FileQuery, FileTree,
    GitTaskRequest, PublishRequest, Repo, RepoConfig, SettingResponse, Task, TaskInfo, TaskKind,
};
use reqwest::header::SET_COOKIE;
use reqwest::multipart::{Form, Part};
use reqwest::{Client as ReqwestClient, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::sync::RwLock;
use tracing::debug;

pub struct Client {
    http: ReqwestClient,
    base_url: String,
    project_id: i64,
    token: RwLock<Option<String>>,
}

fn transport(e: reqwest::Error) -> CoreError {
    CoreError::Transport(e.to_string())
}

/// Value of the `token` cookie in a `Set-Cookie` header
pub fn token_from_set_cookie(header: &str) -> Option<String> {
    header
        .split(';')
        .next()
        .and_then(|pair| pair.trim().strip_prefix("token="))
        .filter(|token| !token.is_empty())
        .map(str::to_string)
}

/// WebSocket URL for a task stream
pub fn stream_url(base_url: &str, key: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        base.to_string()
    };
    format!("{}/ws/{}", base, key)
}

/// Turn a non-success response into the matching error
async fn check(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::UNAUTHORIZED {
        return Err(CoreError::Unauthorized);
    }
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&body)
        .map(|e| e.msg)
        .unwrap_or(body);
    if status == StatusCode::NOT_FOUND {
        return Err(CoreError::NotFound(message));
    }
    Err(CoreError::Http {
        status: status.as_u16(),
        message,
    })
}

impl Client {
    pub fn new(base_url: impl Into<String>, project_id: i64, token: Option<String>) -> Self {
        Self {
            http: ReqwestClient::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            project_id,
            token: RwLock::new(token),
        }
    }

    /// Create client from settings explicitly
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            settings.server_url.clone(),
            settings.project_id,
            settings.token.clone(),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn token(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn set_token(&self, token: String) {
        *self
            .token
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(token);
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        match self.token() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = self.authed(request).send().await.map_err(transport)?;
        check(response).await
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        self.send(request).await?.json().await.map_err(transport)
    }

    /// Exchange the shared secret for a token. The token is kept for later
    /// requests and returned so it can be saved.
    pub async fn login(&self, secret: &str) -> Result<String> {
        let response = self
            .http
            .post(self.url("/api/auth"))
            .json(&AuthRequest {
                secret: secret.to_string(),
            })
            .send()
            .await
            .map_err(transport)?;
        let response = check(response).await?;
        let token = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|h| h.to_str().ok())
            .find_map(token_from_set_cookie)
            .ok_or_else(|| CoreError::Http {
                status: response.status().as_u16(),
                message: "login response carried no token".to_string(),
            })?;
        self.set_token(token.clone());
        Ok(token)
    }

    /// Check that the current token is still accepted
    pub async fn verify(&self) -> Result<()> {
        self.send(self.http.post(self.url("/api/auth")).json(&AuthRequest::default()))
            .await
            .map(|_| ())
    }

    pub async fn repos(&self) -> Result<RepoConfig> {
        self.send_json(self.http.get(self.url("/api/config"))).await
    }

    pub async fn setting(&self) -> Result<SettingResponse> {
        self.send_json(self.http.get(self.url("/api/setting"))).await
    }

    pub async fn task_info(&self, key: &str) -> Result<TaskInfo> {
        self.send_json(self.http.get(self.url(&format!("/api/task/{}", key))))
            .await
    }

    fn file_query(&self, bucket: Bucket, path: &str) -> FileQuery {
        FileQuery {
            project_id: self.project_id,
            path: path.to_string(),
            bucket: Some(bucket),
        }
    }

    fn modify_request(&self, bucket: Bucket, path: &str, body: &str) -> FileModifyRequest {
        FileModifyRequest {
            project_id: self.project_id,
            bucket,
            path: path.to_string(),
            body: body.to_string(),
        }
    }
}

#[async_trait]
impl FileStore for Client {
    async fn tree(&self, bucket: Bucket, path: &str) -> Result<FileTree> {
        self.send_json(
            self.http
                .get(self.url("/api/file/tree"))
                .query(&self.file_query(bucket, path)),
        )
        .await
    }

    async fn read(&self, bucket: Bucket, path: &str) -> Result<FileNode> {
        self.send_json(
            self.http
                .get(self.url("/api/file"))
                .query(&self.file_query(bucket, path)),
        )
        .await
    }

    async fn write(&self, bucket: Bucket, path: &str, body: &str) -> Result<()> {
        debug!("PUT {} ({} bytes)", path, body.len());
        self.send(
            self.http
                .put(self.url("/api/file"))
                .json(&self.modify_request(bucket, path, body)),
        )
        .await
        .map(|_| ())
    }

    async fn create_file(&self, bucket: Bucket, path: &str) -> Result<()> {
        self.send(
            self.http
                .post(self.url("/api/file"))
                .json(&self.modify_request(bucket, path, "")),
        )
        .await
        .map(|_| ())
    }

    async fn create_dir(&self, bucket: Bucket, path: &str) -> Result<()> {
        self.send(
            self.http
                .put(self.url("/api/directory"))
                .json(&self.modify_request(bucket, path, "")),
        )
        .await
        .map(|_| ())
    }

    async fn delete(&self, bucket: Bucket, path: &str, is_dir: bool) -> Result<()> {
        let query = DeleteQuery {
            project_id: self.project_id,
            path: path.to_string(),
            is_dir,
            bucket,
        };
        self.send(self.http.delete(self.url("/api/file")).query(&query))
            .await
            .map(|_| ())
    }

    async fn upload(&self, bucket: Bucket, dir: &str, files: Vec<UploadFile>) -> Result<Vec<String>> {
        let mut form = Form::new()
            .text("project_id", self.project_id.to_string())
            .text("path", dir.to_string())
            .text("bucket", bucket.as_str());
        for file in files {
            form = form.part("file[]", Part::bytes(file.data.to_vec()).file_name(file.name));
        }
        self.send_json(self.http.put(self.url("/api/file/upload")).multipart(form))
            .await
    }
}

#[async_trait]
impl TaskClient for Client {
    async fn start(&self, kind: TaskKind, repo: Option<Repo>) -> Result<Task> {
        let request = self.http.post(self.url(&format!("/api/{}", kind)));
        let request = match kind {
            TaskKind::Publish => request.json(&PublishRequest {
                project_id: self.project_id,
            }),
            TaskKind::Pull | TaskKind::Push => request.json(&GitTaskRequest {
                project_id: self.project_id,
                repo,
            }),
        };
        let key: String = self.send_json(request).await?;
        Ok(Task { key, kind })
    }

    async fn attach(&self, key: &str) -> Result<Box<dyn TaskStream>> {
        let url = stream_url(&self.base_url, key);
        let stream = stream::connect(&url, self.token().as_deref()).await?;
        Ok(Box::new(stream))
    }

    async fn cancel(&self, key: &str) -> Result<()> {
        self.send(self.http.delete(self.url(&format!("/api/task/{}", key))))
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{header, HeaderMap};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use std::net::SocketAddr;

    async fn serve(app: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    #[test]
    fn test_token_from_set_cookie() {
        assert_eq!(
            token_from_set_cookie("token=abc.def; Max-Age=604800; Path=/").as_deref(),
            Some("abc.def")
        );
        assert_eq!(token_from_set_cookie("theme=dark; Path=/"), None);
        assert_eq!(token_from_set_cookie("token=; Path=/"), None);
    }

    #[test]
    fn test_stream_url() {
        assert_eq!(stream_url("http://localhost:9432/", "k1"), "ws://localhost:9432/ws/k1");
        assert_eq!(stream_url("https://blog.example.com", "k1"), "wss://blog.example.com/ws/k1");
    }

    #[tokio::test]
    async fn test_login_keeps_token_for_later_requests() {
        let app = Router::new()
            .route(
                "/api/auth",
                post(|| async {
                    (
                        [(header::SET_COOKIE, "token=t0k; Max-Age=604800; Path=/")],
                        Json("ok"),
                    )
                }),
            )
            .route(
                "/api/setting",
                get(|headers: HeaderMap| async move {
                    let auth = headers
                        .get(header::AUTHORIZATION)
                        .and_then(|h| h.to_str().ok())
                        .unwrap_or_default()
                        .to_string();
                    Json(SettingResponse {
                        preview_domain: auth,
                    })
                }),
            );
        let addr = serve(app).await;
        let client = Client::new(format!("http://{}", addr), 1, None);

        assert_eq!(client.login("pw").await.unwrap(), "t0k");
        let setting = client.setting().await.unwrap();
        assert_eq!(setting.preview_domain, "Bearer t0k");
    }

    #[tokio::test]
    async fn test_error_statuses_map_to_core_errors() {
        let app = Router::new()
            .route(
                "/api/config",
                get(|| async { (axum::http::StatusCode::UNAUTHORIZED, Json("need login")) }),
            )
            .route(
                "/api/publish",
                post(|| async {
                    (
                        axum::http::StatusCode::CONFLICT,
                        Json(ErrorBody {
                            code: 409,
                            msg: "task abc is already running for this project".to_string(),
                        }),
                    )
                }),
            );
        let addr = serve(app).await;
        let client = Client::new(format!("http://{}", addr), 1, Some("t".to_string()));

        assert!(client.repos().await.unwrap_err().is_auth());
        match client.start(TaskKind::Publish, None).await.unwrap_err() {
            CoreError::Http { status, message } => {
                assert_eq!(status, 409);
                assert!(message.contains("already running"));
            }
            other => panic!("unexpected error: {}", other),
        }
        assert!(matches!(
            client.task_info("missing").await.unwrap_err(),
            CoreError::NotFound(_)
        ));
    }
}
