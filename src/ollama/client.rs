//! Ollama REST API 客户端
//!
//! 只做请求转发与状态码检查，流式响应以原始字节流返回，由 `stream` 模块负责分行与重新封帧

use std::time::Duration;

use bytes::Bytes;
use futures::stream::{BoxStream, StreamExt};
use reqwest::{Client, Response};

use super::error::OllamaError;
use super::types::{GenerateRequest, PullRequest, ShowRequest, TagsResponse};

/// 上游字节流
pub type ByteStream = BoxStream<'static, Result<Bytes, reqwest::Error>>;

/// Ollama API 客户端
#[derive(Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
    /// 非流式请求（tags / show / 健康检查）超时
    health_timeout: Duration,
    /// 流式请求（pull / generate）超时
    request_timeout: Duration,
}

impl OllamaClient {
    pub fn new(
        client: Client,
        base_url: impl Into<String>,
        health_timeout: Duration,
        request_timeout: Duration,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            health_timeout,
            request_timeout,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    /// 健康检查：GET /api/tags 返回 2xx 即视为运行中
    pub async fn ping(&self) -> bool {
        match self
            .client
            .get(self.url("/api/tags"))
            .timeout(self.health_timeout)
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                tracing::debug!("Ollama 健康检查失败: {}", e);
                false
            }
        }
    }

    /// GET /api/tags，原样返回 JSON
    pub async fn tags_raw(&self) -> Result<serde_json::Value, OllamaError> {
        let resp = self
            .client
            .get(self.url("/api/tags"))
            .timeout(self.health_timeout)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;
        let resp = Self::check_status(resp).await?;
        Ok(resp.json().await?)
    }

    /// 判断本地是否已有该模型
    pub async fn has_model(&self, model: &str) -> Result<bool, OllamaError> {
        let raw = self.tags_raw().await?;
        let tags: TagsResponse = serde_json::from_value(raw)?;
        Ok(tags.contains(model))
    }

    /// POST /api/show，原样返回 JSON
    pub async fn show(&self, model: &str) -> Result<serde_json::Value, OllamaError> {
        let resp = self
            .client
            .post(self.url("/api/show"))
            .timeout(self.health_timeout)
            .json(&ShowRequest {
                name: model,
                model,
            })
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;
        let resp = Self::check_status(resp).await?;
        Ok(resp.json().await?)
    }

    /// POST /api/pull（stream: true）
    pub async fn pull_stream(&self, model: &str) -> Result<ByteStream, OllamaError> {
        tracing::debug!("请求 Ollama 拉取模型: {}", self.url("/api/pull"));
        let resp = self
            .client
            .post(self.url("/api/pull"))
            .timeout(self.request_timeout)
            .json(&PullRequest {
                name: model,
                model,
                stream: true,
            })
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;
        let resp = Self::check_status(resp).await?;
        Ok(resp.bytes_stream().boxed())
    }

    /// POST /api/generate（stream: true）
    pub async fn generate_stream(&self, model: &str, prompt: &str) -> Result<ByteStream, OllamaError> {
        let resp = self
            .client
            .post(self.url("/api/generate"))
            .timeout(self.request_timeout)
            .json(&GenerateRequest {
                model,
                prompt,
                stream: true,
            })
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;
        let resp = Self::check_status(resp).await?;
        Ok(resp.bytes_stream().boxed())
    }

    fn map_send_error(&self, e: reqwest::Error) -> OllamaError {
        if e.is_connect() {
            OllamaError::ServerNotRunning(self.base_url.clone())
        } else {
            OllamaError::Http(e)
        }
    }

    /// 非 2xx 时读取响应体作为错误信息
    async fn check_status(resp: Response) -> Result<Response, OllamaError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let text = resp.text().await.unwrap_or_default();
        // Ollama 的错误体通常是 {"error": "..."}
        let message = serde_json::from_str::<serde_json::Value>(&text)
            .ok()
            .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
            .unwrap_or_else(|| format!("{}: {}", status, text.trim()));
        Err(OllamaError::Api(message))
    }
}
