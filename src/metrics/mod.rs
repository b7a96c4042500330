//! 运行指标模块
//!
//! 提供主机资源采集与模型请求计数，供 GET /api/metrics 使用

mod collector;
mod system;
pub mod types;

pub use collector::MetricsCollector;
pub use system::SystemProbe;
