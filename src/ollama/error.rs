//! Ollama 相关错误类型

use thiserror::Error;

/// 调用 Ollama REST API 的错误
#[derive(Debug, Error)]
pub enum OllamaError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    /// 上游返回非 2xx，携带响应体文本
    #[error("{0}")]
    Api(String),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Ollama server not running at {0}")]
    ServerNotRunning(String),
}

/// Ollama 进程生命周期错误
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Ollama is not installed. Please install it first: https://ollama.ai")]
    NotInstalled,
    #[error("Ollama is not running and auto start is disabled")]
    AutoStartDisabled,
    #[error("Failed to spawn Ollama: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("Ollama failed to start within timeout")]
    StartTimeout,
    #[error("Ollama exited before becoming ready ({0})")]
    ExitedEarly(String),
}
