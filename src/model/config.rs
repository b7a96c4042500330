use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// ollama-web 应用配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Ollama 服务地址（不含端口）
    #[serde(default = "default_ollama_host")]
    pub ollama_host: String,

    #[serde(default = "default_ollama_port")]
    pub ollama_port: u16,

    /// ollama 可执行文件（名称或路径）
    #[serde(default = "default_ollama_binary")]
    pub ollama_binary: String,

    /// 未检测到 Ollama 运行时是否自动拉起 `ollama serve`
    #[serde(default = "default_true")]
    pub auto_start: bool,

    /// 等待 Ollama 就绪的超时时间（秒）
    #[serde(default = "default_ready_timeout_secs")]
    pub ready_timeout_secs: u64,

    /// 就绪轮询间隔（毫秒）
    #[serde(default = "default_ready_poll_interval_ms")]
    pub ready_poll_interval_ms: u64,

    /// 上游 pull / generate 请求超时（秒）
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// 健康检查请求超时（秒）
    #[serde(default = "default_health_timeout_secs")]
    pub health_timeout_secs: u64,

    /// 退出时是否停止由本进程拉起的 Ollama
    #[serde(default = "default_true")]
    pub stop_runtime_on_exit: bool,

    /// HTTP 代理地址（可选）
    /// 支持格式: http://host:port, https://host:port, socks5://host:port
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy_url: Option<String>,

    /// 配置文件路径（运行时元数据，不写入 JSON）
    #[serde(skip)]
    config_path: Option<PathBuf>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3001
}

fn default_ollama_host() -> String {
    "localhost".to_string()
}

fn default_ollama_port() -> u16 {
    11434
}

fn default_ollama_binary() -> String {
    "ollama".to_string()
}

fn default_true() -> bool {
    true
}

fn default_ready_timeout_secs() -> u64 {
    30
}

fn default_ready_poll_interval_ms() -> u64 {
    1000
}

fn default_request_timeout_secs() -> u64 {
    600
}

fn default_health_timeout_secs() -> u64 {
    2
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            ollama_host: default_ollama_host(),
            ollama_port: default_ollama_port(),
            ollama_binary: default_ollama_binary(),
            auto_start: true,
            ready_timeout_secs: default_ready_timeout_secs(),
            ready_poll_interval_ms: default_ready_poll_interval_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            health_timeout_secs: default_health_timeout_secs(),
            stop_runtime_on_exit: true,
            proxy_url: None,
            config_path: None,
        }
    }
}

impl Config {
    /// 获取默认配置文件路径
    pub fn default_config_path() -> &'static str {
        "config.json"
    }

    /// Ollama REST API 基础地址
    pub fn ollama_base_url(&self) -> String {
        format!("http://{}:{}", self.ollama_host, self.ollama_port)
    }

    /// 本服务对外地址（无法从请求推断时使用）
    pub fn public_base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_secs(self.ready_timeout_secs)
    }

    pub fn ready_poll_interval(&self) -> Duration {
        Duration::from_millis(self.ready_poll_interval_ms.max(1))
    }

    /// 从文件加载配置
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            // 配置文件不存在，返回默认配置
            let mut config = Self::default();
            config.config_path = Some(path.to_path_buf());
            return Ok(config);
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("读取配置文件失败: {}", path.display()))?;
        let mut config: Config = serde_json::from_str(&content)
            .with_context(|| format!("解析配置文件失败: {}", path.display()))?;
        config.config_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// 应用环境变量覆盖（PORT / OLLAMA_PORT）
    pub fn apply_env(&mut self) -> anyhow::Result<()> {
        self.apply_overrides(
            std::env::var("PORT").ok().as_deref(),
            std::env::var("OLLAMA_PORT").ok().as_deref(),
        )
    }

    fn apply_overrides(&mut self, port: Option<&str>, ollama_port: Option<&str>) -> anyhow::Result<()> {
        if let Some(v) = port {
            self.port = v
                .trim()
                .parse()
                .with_context(|| format!("PORT 不是合法端口: {}", v))?;
        }
        if let Some(v) = ollama_port {
            self.ollama_port = v
                .trim()
                .parse()
                .with_context(|| format!("OLLAMA_PORT 不是合法端口: {}", v))?;
        }
        Ok(())
    }

    /// 获取配置文件路径（如果有）
    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_json() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.port, 3001);
        assert_eq!(config.ollama_port, 11434);
        assert_eq!(config.ollama_binary, "ollama");
        assert!(config.auto_start);
        assert_eq!(config.ready_timeout(), Duration::from_secs(30));
        assert_eq!(config.ready_poll_interval(), Duration::from_millis(1000));
        assert_eq!(config.ollama_base_url(), "http://localhost:11434");
    }

    #[test]
    fn test_camel_case_fields() {
        let json = r#"{"ollamaHost":"10.0.0.2","ollamaPort":12000,"autoStart":false,"readyTimeoutSecs":5}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.ollama_base_url(), "http://10.0.0.2:12000");
        assert!(!config.auto_start);
        assert_eq!(config.ready_timeout_secs, 5);
    }

    #[test]
    fn test_load_missing_file_returns_default() {
        let path = std::env::temp_dir().join(format!("ollama-web-missing-{}.json", uuid::Uuid::new_v4()));
        let config = Config::load(&path).unwrap();
        assert_eq!(config.port, 3001);
        assert_eq!(config.config_path(), Some(path.as_path()));
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("ollama-web-{}.json", uuid::Uuid::new_v4()));
        fs::write(&path, r#"{"port":4000,"ollamaBinary":"/opt/ollama/bin/ollama"}"#).unwrap();
        let config = Config::load(&path).unwrap();
        let _ = fs::remove_file(&path);
        assert_eq!(config.port, 4000);
        assert_eq!(config.ollama_binary, "/opt/ollama/bin/ollama");
    }

    #[test]
    fn test_overrides() {
        let mut config = Config::default();
        config.apply_overrides(Some("8081"), Some(" 11500 ")).unwrap();
        assert_eq!(config.port, 8081);
        assert_eq!(config.ollama_port, 11500);

        assert!(config.apply_overrides(Some("abc"), None).is_err());
        assert_eq!(config.port, 8081);
    }
}
