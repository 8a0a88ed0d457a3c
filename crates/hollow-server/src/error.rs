//! API error type and its JSON rendering

use axum::extract::multipart::MultipartError;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use hollow_core::CoreError;
use hollow_types::ErrorBody;
use thiserror::Error;
use tracing::error;

pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn need_login() -> Self {
        ApiError::Unauthorized("need login".to_string())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }
        let body = ErrorBody {
            code: status.as_u16(),
            msg: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<CoreError> for ApiError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::NotFound(path) => ApiError::NotFound(format!("not found: {}", path)),
            CoreError::InvalidPath(path) => ApiError::BadRequest(format!("invalid path: {}", path)),
            CoreError::Unauthorized => ApiError::need_login(),
            CoreError::Io(io) => match io.kind() {
                std::io::ErrorKind::NotFound => ApiError::NotFound(io.to_string()),
                std::io::ErrorKind::AlreadyExists => ApiError::Conflict(io.to_string()),
                std::io::ErrorKind::InvalidInput | std::io::ErrorKind::InvalidData => {
                    ApiError::BadRequest(io.to_string())
                }
                _ => ApiError::Internal(io.to_string()),
            },
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<QueryRejection> for ApiError {
    fn from(e: QueryRejection) -> Self {
        ApiError::BadRequest(e.body_text())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        ApiError::BadRequest(e.body_text())
    }
}

impl From<MultipartError> for ApiError {
    fn from(e: MultipartError) -> Self {
        ApiError::BadRequest(e.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_errors_map_to_status() {
        let cases = [
            (CoreError::NotFound("/a".into()), StatusCode::NOT_FOUND),
            (CoreError::InvalidPath("../x".into()), StatusCode::BAD_REQUEST),
            (
                CoreError::Io(std::io::Error::from(std::io::ErrorKind::AlreadyExists)),
                StatusCode::CONFLICT,
            ),
            (
                CoreError::Io(std::io::Error::from(std::io::ErrorKind::InvalidData)),
                StatusCode::BAD_REQUEST,
            ),
            (
                CoreError::Io(std::io::Error::from(std::io::ErrorKind::PermissionDenied)),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (core, status) in cases {
            assert_eq!(ApiError::from(core).status(), status);
        }
    }
}
