//! API 错误
//!
//! 处理器返回 `ApiError`，统一转换为 `{ "error", "message" }` JSON 响应

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::services::pipeline::PipelineError;

/// 错误响应体
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: &'static str,
    pub message: String,
}

/// 处理器错误
#[derive(Debug, Error)]
pub enum ApiError {
    /// 404 - 资源未找到
    #[error("{0} not found")]
    NotFound(String),
    /// 400 - 请求无效
    #[error("{0}")]
    BadRequest(String),
    /// 409 - 同一组件的流水线已在运行
    #[error("{0}")]
    Conflict(String),
    /// 500 - 流水线无法启动
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound(resource.into())
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    fn status(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            ApiError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = self.status();
        let body = ErrorResponse {
            error,
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::AlreadyRunning(_) => Self::Conflict(err.to_string()),
            _ => Self::Internal(err.to_string()),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ComponentKey, StageName};
    use crate::services::pipeline::GraphError;

    #[test]
    fn test_already_running_is_conflict() {
        let key = ComponentKey::new(1, "esxi-8.0", "");
        let err = ApiError::from(PipelineError::AlreadyRunning(key));
        assert!(matches!(err, ApiError::Conflict(ref m) if m.contains("1/esxi-8.0/")));
        assert_eq!(err.into_response().status(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_graph_error_is_internal() {
        let err = ApiError::from(PipelineError::Graph(GraphError::Duplicate(StageName::Prep)));
        assert_eq!(err.status(), (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"));
    }

    #[test]
    fn test_not_found_message() {
        let err = ApiError::not_found("Pipeline 'abc'");
        assert_eq!(err.to_string(), "Pipeline 'abc' not found");
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }
}
