//! Ollama 集成模块
//!
//! - `client`: REST API 调用（tags / pull / generate / show）
//! - `runtime`: `ollama serve` 进程检测、拉起与停止

pub mod client;
pub mod error;
pub mod runtime;
pub mod types;

pub use client::OllamaClient;
pub use error::{OllamaError, RuntimeError};
pub use runtime::RuntimeManager;
