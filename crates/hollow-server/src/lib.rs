//! Hollow Server
//!
//! Backend of the Hollow editor: serves the project file tree, runs pull,
//! push and publish as streamed tasks, and guards everything behind a shared
//! secret.

pub mod config;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod services;
pub mod storage;

use anyhow::{Context, Result};
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post, put};
use axum::Router;
use crate::config::ServerConfig;
use services::{AuthService, Orchestrator, ProcessBackend, TaskBackend, TaskHub};
use std::sync::Arc;
use storage::LocalFileStore;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

const UPLOAD_LIMIT: usize = 64 * 1024 * 1024;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub store: Arc<LocalFileStore>,
    pub hub: Arc<TaskHub>,
    pub orchestrator: Arc<Orchestrator>,
    pub auth_service: Arc<AuthService>,
}

impl AppState {
    /// Wire up services from configuration, running tasks with `backend`
    pub async fn new(config: ServerConfig, backend: Arc<dyn TaskBackend>) -> Result<Self> {
        let store = Arc::new(LocalFileStore::new(
            config.source_dir.clone(),
            config.theme_dir(),
            config.tree_depth,
        ));
        store
            .ensure_roots()
            .await
            .with_context(|| format!("Failed to create {}", config.source_dir.display()))?;

        let hub = Arc::new(TaskHub::new(config.tasks.buffer_bytes, config.retention()));
        hub.start_cleanup_task();
        let orchestrator = Arc::new(Orchestrator::new(
            hub.clone(),
            backend,
            config.tasks.serialize_per_project,
        ));
        let auth_service = Arc::new(AuthService::new(config.resolve_secret()));
        info!(
            "Serving {} (theme {})",
            config.source_dir.display(),
            config.theme_dir().display()
        );

        Ok(Self {
            config: Arc::new(config),
            store,
            hub,
            orchestrator,
            auth_service,
        })
    }

    /// State running tasks through `sh` and `git`
    pub async fn from_config(config: ServerConfig) -> Result<Self> {
        let backend = Arc::new(ProcessBackend::from_config(&config));
        Self::new(config, backend).await
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/ws/:key", get(handlers::ws::handler))
        .nest("/api", api_routes())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/auth", post(handlers::auth::login))
        .route("/file/tree", get(handlers::files::tree))
        .route(
            "/file",
            get(handlers::files::read)
                .put(handlers::files::save)
                .post(handlers::files::create)
                .delete(handlers::files::delete),
        )
        .route(
            "/file/upload",
            put(handlers::files::upload).layer(DefaultBodyLimit::max(UPLOAD_LIMIT)),
        )
        .route(
            "/directory",
            put(handlers::files::create_dir).post(handlers::files::create_dir),
        )
        .route("/publish", post(handlers::tasks::publish))
        .route("/pull", post(handlers::tasks::pull))
        .route("/push", post(handlers::tasks::push))
        .route(
            "/task/:key",
            get(handlers::tasks::status).delete(handlers::tasks::cancel),
        )
        .route("/config", get(handlers::config::repos))
        .route("/setting", get(handlers::config::setting))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Method, Request, StatusCode};
    use crate::config::{Overrides, PublishConfig};
    use tower::ServiceExt;

    async fn state(dir: &tempfile::TempDir) -> AppState {
        let path = dir.path().join("hollow.toml");
        std::fs::write(&path, "secret = \"pw\"\npreview_domain = \"preview.test\"\n").unwrap();
        let mut config = ServerConfig::load(
            Some(&path),
            Overrides {
                source_dir: Some(dir.path().join("src")),
                ..Default::default()
            },
        )
        .unwrap();
        config.publish = PublishConfig {
            command: Some("echo built".to_string()),
            output_dir: None,
        };
        AppState::from_config(config).await.unwrap()
    }

    fn bearer(state: &AppState) -> String {
        format!("Bearer {}", state.auth_service.issue_token().unwrap())
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_protected_routes_need_login() {
        let dir = tempfile::tempdir().unwrap();
        let app = build_router(state(&dir).await);

        let response = app
            .clone()
            .oneshot(
                Request::get("/api/file/tree?bucket=project")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = body_json(response).await;
        assert_eq!(body["code"], 401);
        assert_eq!(body["msg"], "need login");

        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_login_sets_cookie() {
        let dir = tempfile::tempdir().unwrap();
        let app = build_router(state(&dir).await);

        let wrong = app
            .clone()
            .oneshot(
                Request::post("/api/auth")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"secret":"nope"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);

        let ok = app
            .clone()
            .oneshot(
                Request::post("/api/auth")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"secret":"pw"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(ok.status(), StatusCode::OK);
        let cookie = ok.headers()[header::SET_COOKIE].to_str().unwrap().to_string();
        assert!(cookie.starts_with("token="));

        // An empty secret verifies the cookie just issued
        let token_pair = cookie.split(';').next().unwrap().to_string();
        let verify = app
            .oneshot(
                Request::post("/api/auth")
                    .header(header::CONTENT_TYPE, "application/json")
                    .header(header::COOKIE, token_pair)
                    .body(Body::from(r#"{"secret":""}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(verify.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(&dir).await;
        let auth = bearer(&state);
        let app = build_router(state);

        let save = app
            .clone()
            .oneshot(
                Request::builder()
                    .method(Method::PUT)
                    .uri("/api/file")
                    .header(header::AUTHORIZATION, &auth)
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(
                        r##"{"project_id":1,"bucket":"project","path":"/posts/a.md","body":"# A"}"##,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(save.status(), StatusCode::OK);

        let read = app
            .clone()
            .oneshot(
                Request::get("/api/file?project_id=1&path=/posts/a.md&bucket=project")
                    .header(header::AUTHORIZATION, &auth)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(read.status(), StatusCode::OK);
        assert_eq!(body_json(read).await["body"], "# A");

        let missing_bucket = app
            .clone()
            .oneshot(
                Request::get("/api/file/tree?project_id=1")
                    .header(header::AUTHORIZATION, &auth)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(missing_bucket.status(), StatusCode::BAD_REQUEST);

        let escape = app
            .oneshot(
                Request::get("/api/file?path=/../../etc/passwd&bucket=project")
                    .header(header::AUTHORIZATION, &auth)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(escape.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_git_tasks_start_without_body() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(&dir).await;
        let auth = bearer(&state);
        let app = build_router(state);

        let pull = app
            .clone()
            .oneshot(
                Request::post("/api/pull")
                    .header(header::AUTHORIZATION, &auth)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(pull.status(), StatusCode::OK);
        let key = body_json(pull).await;
        assert_eq!(key.as_str().map(str::len), Some(8));

        let garbage = app
            .oneshot(
                Request::post("/api/push")
                    .header(header::AUTHORIZATION, &auth)
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from("{not json"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(garbage.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_setting_and_unknown_task() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(&dir).await;
        let auth = bearer(&state);
        let app = build_router(state);

        let setting = app
            .clone()
            .oneshot(
                Request::get("/api/setting")
                    .header(header::AUTHORIZATION, &auth)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(body_json(setting).await["preview_domain"], "preview.test");

        let unknown = app
            .oneshot(
                Request::delete("/api/task/nothing")
                    .header(header::AUTHORIZATION, &auth)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(unknown.status(), StatusCode::NOT_FOUND);
    }
}
