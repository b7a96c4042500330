//! API 请求/响应类型

use serde::{Deserialize, Serialize};

// ============ 请求 ============

/// POST /api/pull
#[derive(Debug, Default, Deserialize)]
pub struct PullRequest {
    #[serde(default)]
    pub model: Option<String>,
}

/// POST /api/generate
///
/// 始终以流式返回；请求中的 `stream` 字段被忽略
#[derive(Debug, Default, Deserialize)]
pub struct GenerateRequest {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub prompt: Option<String>,
}

/// 去掉首尾空白，空串视为缺失
pub fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

// ============ 响应 ============

/// 错误响应 `{"error": "..."}`
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}

/// GET /api/health
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub ollama: OllamaHealth,
}

#[derive(Debug, Serialize)]
pub struct OllamaHealth {
    pub installed: bool,
    pub running: bool,
}

/// GET /api/server-info
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerInfoResponse {
    /// 浏览器访问本服务使用的地址
    pub base_url: String,
    pub port: u16,
    pub ollama_url: String,
    pub ollama_version: Option<String>,
    /// 由本服务拉起的 Ollama 进程 PID
    pub ollama_pid: Option<u32>,
    /// RFC3339
    pub started_at: String,
    pub version: &'static str,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_blank() {
        assert_eq!(non_blank(Some("  llama3 ".to_string())).as_deref(), Some("llama3"));
        assert_eq!(non_blank(Some("   ".to_string())), None);
        assert_eq!(non_blank(None), None);
    }

    #[test]
    fn test_generate_request_ignores_extra_fields() {
        let req: GenerateRequest =
            serde_json::from_str(r#"{"model":"m","prompt":"p","stream":true,"options":{}}"#).unwrap();
        assert_eq!(req.model.as_deref(), Some("m"));
        assert_eq!(req.prompt.as_deref(), Some("p"));
    }

    #[test]
    fn test_health_shape() {
        let value = serde_json::to_value(HealthResponse {
            status: "ok",
            ollama: OllamaHealth {
                installed: true,
                running: false,
            },
        })
        .unwrap();
        assert_eq!(
            value,
            serde_json::json!({"status":"ok","ollama":{"installed":true,"running":false}})
        );
    }
}
