//! /api/metrics 响应类型

use serde::Serialize;

/// 指标快照
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsResponse {
    pub cpu: CpuMetrics,
    pub memory: MemoryMetrics,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gpu: Option<GpuMetrics>,
    pub model: ModelMetrics,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CpuMetrics {
    /// 1 分钟平均负载
    pub load_average: String,
    pub cores: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryMetrics {
    /// 字节
    pub total: u64,
    pub used: u64,
    pub usage_percentage: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GpuMetrics {
    pub name: String,
    /// MiB
    pub memory_total: u64,
    pub memory_used: u64,
    /// 百分比
    pub utilization: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelMetrics {
    pub requests: RequestMetrics,
    pub tokens: TokenMetrics,
    pub performance: PerformanceMetrics,
    /// 秒
    pub uptime: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestMetrics {
    pub total: u64,
    pub successful: u64,
    pub failed: u64,
    /// Unix 毫秒时间戳
    pub last_request_time: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenMetrics {
    pub input: u64,
    pub output: u64,
    pub total: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceMetrics {
    pub input_tokens_per_second: String,
    pub output_tokens_per_second: String,
    pub total_tokens_per_second: String,
    pub requests_per_minute: String,
    pub average_tokens_per_request: String,
    /// 毫秒
    pub average_response_time: String,
}
