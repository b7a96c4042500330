//! 上游 NDJSON → 浏览器帧的转发
//!
//! 处理器创建 `FrameSink` 与响应体，在后台任务里调用 `relay_pull` / `relay_generate` 写帧。
//! 浏览器断开后 channel 关闭，写帧失败即停止读取上游。

use std::convert::Infallible;

use axum::body::Body;
use bytes::Bytes;
use futures::StreamExt;
use thiserror::Error;
use tokio::sync::mpsc;

use super::frame::{Frame, Framing};
use super::ndjson::LineBuffer;
use super::progress::ProgressTracker;
use crate::common::truncate_with_ellipsis;
use crate::ollama::OllamaClient;
use crate::ollama::OllamaError;
use crate::ollama::client::ByteStream;
use crate::ollama::types::{GenerateChunk, PullProgress};

/// 响应体缓冲的帧数
const CHANNEL_CAPACITY: usize = 64;

/// 日志中原始行的最大长度
const LOG_PREVIEW_BYTES: usize = 200;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("{0}")]
    Upstream(#[from] OllamaError),
    /// 上游流中出现 error 行
    #[error("{0}")]
    Runtime(String),
    #[error("client disconnected")]
    ClientGone,
}

impl RelayError {
    /// 写给浏览器的下载错误消息
    pub fn pull_message(&self) -> String {
        format!("Failed to download model: {}", self)
    }
}

/// 帧写入端
pub struct FrameSink {
    framing: Framing,
    tx: mpsc::Sender<Bytes>,
}

/// 创建写入端和对应的流式响应体
pub fn channel(framing: Framing) -> (FrameSink, Body) {
    let (tx, rx) = mpsc::channel::<Bytes>(CHANNEL_CAPACITY);
    let stream = futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|bytes| (Ok::<Bytes, Infallible>(bytes), rx))
    });
    (FrameSink { framing, tx }, Body::from_stream(stream))
}

impl FrameSink {
    /// 写一帧；浏览器已断开时返回 ClientGone
    pub async fn send(&self, frame: &Frame) -> Result<(), RelayError> {
        self.tx
            .send(self.framing.encode(frame))
            .await
            .map_err(|_| RelayError::ClientGone)
    }

    /// 写错误帧（忽略断开）
    pub async fn send_error(&self, message: impl Into<String>) {
        let _ = self.send(&Frame::error(message)).await;
    }

    /// 写结束标记并关闭
    pub async fn close(self) {
        if let Some(bytes) = self.framing.close() {
            let _ = self.tx.send(bytes).await;
        }
    }
}

/// 按行读取上游字节流
pub struct LineStream {
    upstream: ByteStream,
    buffer: LineBuffer,
    finished: bool,
}

impl LineStream {
    pub fn new(upstream: ByteStream) -> Self {
        Self {
            upstream,
            buffer: LineBuffer::new(),
            finished: false,
        }
    }

    /// 读取下一批完整行；流结束后返回 None
    pub async fn next_batch(&mut self) -> Result<Option<Vec<String>>, RelayError> {
        if self.finished {
            return Ok(None);
        }
        match self.upstream.next().await {
            Some(chunk) => {
                let chunk = chunk.map_err(OllamaError::from)?;
                Ok(Some(self.buffer.push(&chunk)))
            }
            None => {
                self.finished = true;
                Ok(Some(self.buffer.finish().into_iter().collect()))
            }
        }
    }
}

/// 换算一行 pull 输出；无法解析的行返回 None
pub fn pull_line_to_frame(tracker: &mut ProgressTracker, line: &str) -> Result<Option<Frame>, RelayError> {
    #[cfg(feature = "sensitive-logs")]
    tracing::debug!("Ollama 原始进度: {}", line);

    let raw: PullProgress = match serde_json::from_str(line) {
        Ok(raw) => raw,
        Err(e) => {
            tracing::warn!("无法解析下载进度: {} ({})", e, truncate_with_ellipsis(line, LOG_PREVIEW_BYTES));
            return Ok(None);
        }
    };
    if let Some(error) = raw.error {
        return Err(RelayError::Runtime(error));
    }
    let progress = tracker.translate(&raw);
    tracing::debug!("下载进度: {}% {}", progress.percent, progress.status);
    Ok(Some(Frame::progress(raw.status, progress)))
}

/// generate 的 token 统计（取自最后一行）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GenerateStats {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub chunks: u64,
}

/// 校验一行 generate 输出并原样封帧；无法解析的行返回 None
pub fn generate_line_to_frame(stats: &mut GenerateStats, line: &str) -> Result<Option<Frame>, RelayError> {
    #[cfg(feature = "sensitive-logs")]
    tracing::debug!("Ollama 原始输出: {}", line);

    let value: serde_json::Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!("无法解析生成输出: {} ({})", e, truncate_with_ellipsis(line, LOG_PREVIEW_BYTES));
            return Ok(None);
        }
    };
    let chunk = GenerateChunk::deserialize_lenient(&value);
    if let Some(error) = chunk.error {
        return Err(RelayError::Runtime(error));
    }
    if chunk.done {
        stats.input_tokens = chunk.prompt_eval_count.unwrap_or(0);
        stats.output_tokens = chunk.eval_count.unwrap_or(0);
    }
    stats.chunks += 1;
    Ok(Some(Frame::Chunk(value)))
}

/// 拉取模型并把进度写入 sink；成功时最后写出 ready 帧
pub async fn relay_pull(client: &OllamaClient, model: &str, sink: &FrameSink) -> Result<(), RelayError> {
    let mut tracker = ProgressTracker::new(model);
    sink.send(&Frame::progress("downloading", tracker.initial())).await?;

    let mut lines = LineStream::new(client.pull_stream(model).await?);
    while let Some(batch) = lines.next_batch().await? {
        for line in batch {
            if let Some(frame) = pull_line_to_frame(&mut tracker, &line)? {
                sink.send(&frame).await?;
            }
        }
    }

    tracing::info!("模型 {} 下载完成", model);
    sink.send(&Frame::ready(model)).await
}

/// 调用 generate 并原样转发每一行，返回 token 统计
///
/// 不写 done 帧，由调用方在整个流程结束后写出
pub async fn relay_generate(
    client: &OllamaClient,
    model: &str,
    prompt: &str,
    sink: &FrameSink,
) -> Result<GenerateStats, RelayError> {
    let mut stats = GenerateStats::default();
    let mut lines = LineStream::new(client.generate_stream(model, prompt).await?);
    while let Some(batch) = lines.next_batch().await? {
        for line in batch {
            if let Some(frame) = generate_line_to_frame(&mut stats, &line)? {
                sink.send(&frame).await?;
            }
        }
    }
    Ok(stats)
}
