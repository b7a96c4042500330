//! 模型请求计数器
//!
//! 进程内存中累计，进程重启归零；所有计数在同一把锁下更新

use std::time::{Duration, Instant};

use parking_lot::Mutex;

use super::types::{ModelMetrics, PerformanceMetrics, RequestMetrics, TokenMetrics};
use crate::common::{fixed2, ratio};

#[derive(Debug, Default)]
struct Counters {
    total: u64,
    successful: u64,
    failed: u64,
    last_request_ms: Option<i64>,
    input_tokens: u64,
    output_tokens: u64,
    /// 已完成请求（成功 + 失败）的耗时之和
    response_time: Duration,
}

/// 单次请求的计时句柄
#[derive(Debug)]
pub struct RequestTimer {
    started: Instant,
}

impl RequestTimer {
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

/// 模型请求指标收集器
pub struct MetricsCollector {
    started: Instant,
    counters: Mutex<Counters>,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            counters: Mutex::new(Counters::default()),
        }
    }

    /// 请求开始：计入总数并记录时间
    pub fn begin(&self) -> RequestTimer {
        let mut c = self.counters.lock();
        c.total += 1;
        c.last_request_ms = Some(chrono::Utc::now().timestamp_millis());
        RequestTimer {
            started: Instant::now(),
        }
    }

    pub fn record_success(&self, timer: RequestTimer, input_tokens: u64, output_tokens: u64) {
        self.finish(timer.elapsed(), Some((input_tokens, output_tokens)));
    }

    pub fn record_failure(&self, timer: RequestTimer) {
        self.finish(timer.elapsed(), None);
    }

    fn finish(&self, elapsed: Duration, tokens: Option<(u64, u64)>) {
        let mut c = self.counters.lock();
        c.response_time += elapsed;
        match tokens {
            Some((input, output)) => {
                c.successful += 1;
                c.input_tokens += input;
                c.output_tokens += output;
            }
            None => c.failed += 1,
        }
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn snapshot(&self) -> ModelMetrics {
        self.snapshot_with_uptime(self.uptime())
    }

    fn snapshot_with_uptime(&self, uptime: Duration) -> ModelMetrics {
        let c = self.counters.lock();

        let total_tokens = c.input_tokens + c.output_tokens;
        let busy_secs = c.response_time.as_secs_f64();
        let completed = c.successful + c.failed;

        ModelMetrics {
            requests: RequestMetrics {
                total: c.total,
                successful: c.successful,
                failed: c.failed,
                last_request_time: c.last_request_ms,
            },
            tokens: TokenMetrics {
                input: c.input_tokens,
                output: c.output_tokens,
                total: total_tokens,
            },
            performance: PerformanceMetrics {
                input_tokens_per_second: fixed2(ratio(c.input_tokens as f64, busy_secs)),
                output_tokens_per_second: fixed2(ratio(c.output_tokens as f64, busy_secs)),
                total_tokens_per_second: fixed2(ratio(total_tokens as f64, busy_secs)),
                requests_per_minute: fixed2(ratio(c.total as f64, uptime.as_secs_f64() / 60.0)),
                average_tokens_per_request: fixed2(ratio(total_tokens as f64, c.successful as f64)),
                average_response_time: fixed2(ratio(
                    c.response_time.as_secs_f64() * 1000.0,
                    completed as f64,
                )),
            },
            uptime: uptime.as_secs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_snapshot_has_no_nan() {
        let m = MetricsCollector::new();
        let s = m.snapshot_with_uptime(Duration::ZERO);
        assert_eq!(s.requests.total, 0);
        assert_eq!(s.requests.last_request_time, None);
        assert_eq!(s.performance, PerformanceMetrics {
            input_tokens_per_second: "0.00".to_string(),
            output_tokens_per_second: "0.00".to_string(),
            total_tokens_per_second: "0.00".to_string(),
            requests_per_minute: "0.00".to_string(),
            average_tokens_per_request: "0.00".to_string(),
            average_response_time: "0.00".to_string(),
        });
    }

    #[test]
    fn test_counters_and_rates() {
        let m = MetricsCollector::new();

        let t = m.begin();
        m.finish(Duration::from_secs(2), Some((10, 30)));
        drop(t);
        let t = m.begin();
        m.finish(Duration::from_secs(2), Some((20, 40)));
        drop(t);
        let _t = m.begin();
        m.finish(Duration::from_secs(1), None);
        // 进行中的请求只计入 total
        let _pending = m.begin();

        let s = m.snapshot_with_uptime(Duration::from_secs(120));
        assert_eq!(s.requests.total, 4);
        assert_eq!(s.requests.successful, 2);
        assert_eq!(s.requests.failed, 1);
        assert!(s.requests.last_request_time.is_some());
        assert_eq!(s.tokens, TokenMetrics { input: 30, output: 70, total: 100 });
        assert_eq!(s.performance.input_tokens_per_second, "6.00");
        assert_eq!(s.performance.output_tokens_per_second, "14.00");
        assert_eq!(s.performance.total_tokens_per_second, "20.00");
        assert_eq!(s.performance.requests_per_minute, "2.00");
        assert_eq!(s.performance.average_tokens_per_request, "50.00");
        assert_eq!(s.performance.average_response_time, "1666.67");
        assert_eq!(s.uptime, 120);
    }

    #[test]
    fn test_record_via_timer() {
        let m = MetricsCollector::new();
        let t = m.begin();
        m.record_success(t, 3, 4);
        let t = m.begin();
        m.record_failure(t);
        let s = m.snapshot();
        assert_eq!(s.requests.successful, 1);
        assert_eq!(s.requests.failed, 1);
        assert_eq!(s.tokens.total, 7);
    }

    #[test]
    fn test_concurrent_updates_are_consistent() {
        let m = std::sync::Arc::new(MetricsCollector::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let m = m.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        let t = m.begin();
                        m.record_success(t, 1, 2);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let s = m.snapshot();
        assert_eq!(s.requests.total, 8000);
        assert_eq!(s.requests.successful, 8000);
        assert_eq!(s.tokens.total, 24000);
    }
}
