//! API 路由配置

use axum::{
    Router,
    routing::{get, post},
};

use super::handlers::{
    api_not_found, examples, generate, health, list_models, metrics, pull_model, server_info,
    show_model,
};
use super::middleware::{AppState, cors_layer};
use crate::ui::create_ui_router;

/// 创建 API 路由
///
/// # 端点
/// - `POST /pull` - 拉取模型（流式进度）
/// - `POST /generate` - 生成（流式输出，必要时先拉取）
/// - `GET /models` - 本地模型列表
/// - `GET /models/{name}` - 模型详情
/// - `GET /health` - Ollama 安装/运行状态
/// - `GET /metrics` - 系统与模型指标
/// - `GET /server-info` - 服务地址等信息
/// - `GET /examples` - 首页示例
pub fn create_api_router(state: AppState) -> Router {
    Router::new()
        .route("/pull", post(pull_model))
        .route("/generate", post(generate))
        .route("/models", get(list_models))
        .route("/models/{*name}", get(show_model))
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/server-info", get(server_info))
        .route("/examples", get(examples))
        .fallback(api_not_found)
        .with_state(state)
}

/// 创建完整应用：`/api` + 内嵌 UI
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .nest("/api", create_api_router(state))
        .merge(create_ui_router())
        .layer(cors_layer())
}
