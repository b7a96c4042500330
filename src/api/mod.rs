//! 浏览器调用的 HTTP API
//!
//! - 模型拉取与生成（流式）
//! - 模型列表 / 详情透传
//! - 健康检查、指标与服务信息

mod catalog;
mod error;
mod handlers;
mod middleware;
mod router;
pub mod types;

pub use middleware::AppState;
pub use router::create_app;
