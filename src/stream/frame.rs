//! 流式响应的帧格式
//!
//! 每一帧是一个 JSON 对象，按 multipart/x-mixed-replace 或 SSE 封装后写给浏览器

use bytes::Bytes;
use serde::Serialize;

use super::progress::ProgressInfo;

/// multipart 分隔符
pub const BOUNDARY: &str = "PROGRESS_BOUNDARY";

/// 单帧负载
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Frame {
    /// 下载进度；status 为上游原始状态
    Progress {
        status: String,
        progress: ProgressInfo,
    },
    /// 模型就绪
    Ready { status: &'static str, message: String },
    /// Ollama generate 的原始输出行
    Chunk(serde_json::Value),
    /// 流结束
    Done { done: bool },
    Error { error: String },
}

impl Frame {
    pub fn progress(status: impl Into<String>, progress: ProgressInfo) -> Self {
        Self::Progress {
            status: status.into(),
            progress,
        }
    }

    pub fn ready(model: &str) -> Self {
        Self::Ready {
            status: "ready",
            message: format!("Model {} is ready", model),
        }
    }

    pub fn done() -> Self {
        Self::Done { done: true }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            error: message.into(),
        }
    }

    fn to_json(&self) -> String {
        // 所有变体都是可序列化的纯数据，失败只可能来自非有限浮点数
        serde_json::to_string(self).unwrap_or_else(|e| {
            serde_json::json!({ "error": format!("failed to encode frame: {}", e) }).to_string()
        })
    }
}

/// 封帧方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    Multipart,
    Sse,
}

impl Framing {
    /// 根据 Accept 头选择封帧方式
    pub fn negotiate(accept: Option<&str>) -> Self {
        match accept {
            Some(v) if v.to_ascii_lowercase().contains("text/event-stream") => Self::Sse,
            _ => Self::Multipart,
        }
    }

    pub fn content_type(&self) -> String {
        match self {
            Self::Multipart => format!("multipart/x-mixed-replace; boundary={}", BOUNDARY),
            Self::Sse => "text/event-stream".to_string(),
        }
    }

    /// 封装一帧
    pub fn encode(&self, frame: &Frame) -> Bytes {
        let json = frame.to_json();
        match self {
            Self::Multipart => Bytes::from(format!(
                "\r\n--{}\r\nContent-Type: application/json\r\n\r\n{}\r\n",
                BOUNDARY, json
            )),
            Self::Sse => Bytes::from(format!("data: {}\n\n", json)),
        }
    }

    /// 流结束标记
    pub fn close(&self) -> Option<Bytes> {
        match self {
            Self::Multipart => Some(Bytes::from(format!("\r\n--{}--\r\n", BOUNDARY))),
            Self::Sse => None,
        }
    }
}
