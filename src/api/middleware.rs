//! API 共享状态与中间件

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::metrics::{MetricsCollector, SystemProbe};
use crate::model::config::Config;
use crate::ollama::{OllamaClient, RuntimeManager};

/// 应用共享状态
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// Ollama REST 客户端
    pub client: OllamaClient,
    /// Ollama 进程管理
    pub runtime: Arc<RuntimeManager>,
    /// 模型请求计数
    pub metrics: Arc<MetricsCollector>,
    pub system: Arc<SystemProbe>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(config: Config, client: OllamaClient) -> Self {
        let runtime = RuntimeManager::new(&config, client.clone());
        Self {
            config: Arc::new(config),
            client,
            runtime: Arc::new(runtime),
            metrics: Arc::new(MetricsCollector::new()),
            system: Arc::new(SystemProbe::new()),
            started_at: Utc::now(),
        }
    }
}

/// CORS 中间件层
///
/// 允许任意来源、方法与请求头（本地工具，前端可能由其他端口的开发服务器提供）
pub fn cors_layer() -> tower_http::cors::CorsLayer {
    use tower_http::cors::{Any, CorsLayer};

    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
}
