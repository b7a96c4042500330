//! Ollama REST API 类型定义

use serde::{Deserialize, Serialize};

// === 请求 ===

/// POST /api/pull 请求体
///
/// 新版 Ollama 读取 `model`，旧版读取 `name`，两者都发送
#[derive(Debug, Serialize)]
pub struct PullRequest<'a> {
    pub name: &'a str,
    pub model: &'a str,
    pub stream: bool,
}

/// POST /api/generate 请求体
#[derive(Debug, Serialize)]
pub struct GenerateRequest<'a> {
    pub model: &'a str,
    pub prompt: &'a str,
    pub stream: bool,
}

/// POST /api/show 请求体
#[derive(Debug, Serialize)]
pub struct ShowRequest<'a> {
    pub name: &'a str,
    pub model: &'a str,
}

// === 响应 ===

/// GET /api/tags 响应
#[derive(Debug, Default, Deserialize)]
pub struct TagsResponse {
    #[serde(default)]
    pub models: Vec<ModelTag>,
}

#[derive(Debug, Deserialize)]
pub struct ModelTag {
    pub name: String,
}

impl TagsResponse {
    /// 判断模型是否已存在
    ///
    /// 未指定 tag 的名称按 `:latest` 匹配（`llama3` 等价于 `llama3:latest`）
    pub fn contains(&self, model: &str) -> bool {
        let with_latest = if model.contains(':') {
            None
        } else {
            Some(format!("{}:latest", model))
        };
        self.models
            .iter()
            .any(|m| m.name == model || with_latest.as_deref() == Some(m.name.as_str()))
    }
}

/// /api/pull 流中的单行进度
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PullProgress {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub digest: Option<String>,
    #[serde(default)]
    pub total: Option<u64>,
    #[serde(default)]
    pub completed: Option<u64>,
    #[serde(default)]
    pub error: Option<String>,
}

/// /api/generate 流中的单行输出
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerateChunk {
    #[serde(default)]
    pub response: String,
    #[serde(default)]
    pub done: bool,
    /// 输入 token 数（仅最后一行）
    #[serde(default)]
    pub prompt_eval_count: Option<u64>,
    /// 输出 token 数（仅最后一行）
    #[serde(default)]
    pub eval_count: Option<u64>,
    #[serde(default)]
    pub error: Option<String>,
}

impl GenerateChunk {
    /// 从已解析的 JSON 提取关心的字段，字段类型不符时按缺省处理
    pub fn deserialize_lenient(value: &serde_json::Value) -> Self {
        Self::deserialize(value).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags_contains() {
        let tags: TagsResponse = serde_json::from_str(
            r#"{"models":[{"name":"llama3:latest","size":1},{"name":"qwen2.5-coder:7b"}]}"#,
        )
        .unwrap();
        assert!(tags.contains("llama3"));
        assert!(tags.contains("llama3:latest"));
        assert!(tags.contains("qwen2.5-coder:7b"));
        assert!(!tags.contains("qwen2.5-coder"));
        assert!(!tags.contains("llama3:8b"));
    }

    #[test]
    fn test_tags_without_models_field() {
        let tags: TagsResponse = serde_json::from_str("{}").unwrap();
        assert!(!tags.contains("llama3"));
    }

    #[test]
    fn test_generate_final_chunk() {
        let chunk: GenerateChunk = serde_json::from_str(
            r#"{"model":"llama3","response":"","done":true,"prompt_eval_count":26,"eval_count":290,"total_duration":5589157167}"#,
        )
        .unwrap();
        assert!(chunk.done);
        assert_eq!(chunk.prompt_eval_count, Some(26));
        assert_eq!(chunk.eval_count, Some(290));
    }

    #[test]
    fn test_pull_request_serializes_both_names() {
        let body = serde_json::to_value(PullRequest {
            name: "llama3",
            model: "llama3",
            stream: true,
        })
        .unwrap();
        assert_eq!(body, serde_json::json!({"name":"llama3","model":"llama3","stream":true}));
    }
}
