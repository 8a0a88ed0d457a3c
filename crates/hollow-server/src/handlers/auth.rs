//! Authentication handler

use crate::error::{ApiError, ApiResult};
use crate::extractors::auth::request_token;
use crate::services::AuthService;
use crate::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::header::SET_COOKIE;
use axum::http::HeaderMap;
use axum::response::{AppendHeaders, IntoResponse, Response};
use axum::Json;
use hollow_types::AuthRequest;
use tracing::{info, warn};

/// `POST /api/auth`
///
/// With a secret: check it and issue a fresh token cookie. Without one:
/// verify the token the request already carries.
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<AuthRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let Json(req) = body?;

    if req.secret.is_empty() {
        let token = request_token(&headers).ok_or_else(ApiError::need_login)?;
        state
            .auth_service
            .validate_token(&token)
            .map_err(|_| ApiError::need_login())?;
        return Ok(Json("ok").into_response());
    }

    if !state.auth_service.check_secret(&req.secret) {
        warn!("Login rejected: wrong secret");
        return Err(ApiError::Unauthorized("wrong secret".to_string()));
    }
    let token = state
        .auth_service
        .issue_token()
        .map_err(|e| ApiError::Internal(format!("failed to issue token: {}", e)))?;
    info!("Login successful");

    Ok((
        AppendHeaders([(SET_COOKIE, AuthService::cookie(&token))]),
        Json("ok"),
    )
        .into_response())
}
