//! API 错误到 HTTP 响应的映射

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use super::types::ErrorResponse;
use crate::ollama::{OllamaError, RuntimeError};

/// 非流式接口的错误
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    #[error(transparent)]
    Upstream(#[from] OllamaError),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Runtime(_) | Self::Upstream(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn into_body(self) -> ErrorResponse {
        ErrorResponse::new(self.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if !matches!(self, Self::BadRequest(_)) {
            tracing::error!("请求处理失败: {}", self);
        }
        (self.status_code(), Json(self.into_body())).into_response()
    }
}
