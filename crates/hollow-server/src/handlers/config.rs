//! Read-only configuration endpoints

use crate::extractors::Authenticated;
use crate::AppState;
use axum::extract::State;
use axum::Json;
use hollow_types::{RepoConfig, SettingResponse};

pub async fn repos(_auth: Authenticated, State(state): State<AppState>) -> Json<RepoConfig> {
    Json(state.config.repos())
}

pub async fn setting(_auth: Authenticated, State(state): State<AppState>) -> Json<SettingResponse> {
    Json(SettingResponse {
        preview_domain: state.config.preview_domain.clone(),
    })
}
