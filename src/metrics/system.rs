//! 主机资源采集：CPU 负载、内存、NVIDIA GPU

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use sysinfo::System;
use tokio::process::Command;

use super::types::{CpuMetrics, GpuMetrics, MemoryMetrics};
use crate::common::{fixed2, ratio};

const NVIDIA_SMI_TIMEOUT: Duration = Duration::from_secs(2);

/// 系统资源探测器
pub struct SystemProbe {
    sys: Mutex<System>,
    /// nvidia-smi 不存在时不再尝试
    gpu_unavailable: AtomicBool,
}

impl Default for SystemProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemProbe {
    pub fn new() -> Self {
        Self {
            sys: Mutex::new(System::new()),
            gpu_unavailable: AtomicBool::new(false),
        }
    }

    pub fn cpu(&self) -> CpuMetrics {
        let mut sys = self.sys.lock();
        sys.refresh_cpu();
        let cores = match sys.cpus().len() {
            0 => std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1),
            n => n,
        };
        CpuMetrics {
            load_average: fixed2(System::load_average().one),
            cores,
        }
    }

    pub fn memory(&self) -> MemoryMetrics {
        let mut sys = self.sys.lock();
        sys.refresh_memory();
        let total = sys.total_memory();
        let used = sys.used_memory();
        MemoryMetrics {
            total,
            used,
            usage_percentage: fixed2(ratio(used as f64, total as f64) * 100.0),
        }
    }

    /// 第一块 NVIDIA GPU 的信息；没有 nvidia-smi 时返回 None
    pub async fn gpu(&self) -> Option<GpuMetrics> {
        if self.gpu_unavailable.load(Ordering::Relaxed) {
            return None;
        }

        let child = Command::new("nvidia-smi")
            .args([
                "--query-gpu=name,memory.total,memory.used,utilization.gpu",
                "--format=csv,noheader,nounits",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .output();

        match tokio::time::timeout(NVIDIA_SMI_TIMEOUT, child).await {
            Ok(Ok(out)) if out.status.success() => parse_nvidia_smi(&String::from_utf8_lossy(&out.stdout)),
            Ok(Ok(out)) => {
                tracing::debug!("nvidia-smi 退出码异常: {}", out.status);
                None
            }
            Ok(Err(e)) => {
                if e.kind() == std::io::ErrorKind::NotFound {
                    tracing::debug!("未找到 nvidia-smi，跳过 GPU 指标");
                    self.gpu_unavailable.store(true, Ordering::Relaxed);
                } else {
                    tracing::debug!("执行 nvidia-smi 失败: {}", e);
                }
                None
            }
            Err(_) => {
                tracing::warn!("nvidia-smi 超时");
                None
            }
        }
    }
}

/// 解析 `name, memory.total, memory.used, utilization.gpu` 的第一行
fn parse_nvidia_smi(output: &str) -> Option<GpuMetrics> {
    let line = output.lines().map(str::trim).find(|l| !l.is_empty())?;
    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    if fields.len() < 4 {
        return None;
    }
    Some(GpuMetrics {
        name: fields[0].to_string(),
        memory_total: fields[1].parse().ok()?,
        memory_used: fields[2].parse().ok()?,
        utilization: fields[3].parse().unwrap_or(0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_nvidia_smi() {
        let gpu = parse_nvidia_smi("NVIDIA GeForce RTX 3090, 24576, 1024, 7\nNVIDIA A100, 40960, 0, 0\n");
        assert_eq!(gpu, Some(GpuMetrics {
            name: "NVIDIA GeForce RTX 3090".to_string(),
            memory_total: 24576,
            memory_used: 1024,
            utilization: 7,
        }));
    }

    #[test]
    fn test_parse_nvidia_smi_unsupported_utilization() {
        let gpu = parse_nvidia_smi("Tesla K80, 11441, 0, [N/A]").unwrap();
        assert_eq!(gpu.utilization, 0);
    }

    #[test]
    fn test_parse_nvidia_smi_garbage() {
        assert_eq!(parse_nvidia_smi(""), None);
        assert_eq!(parse_nvidia_smi("No devices were found"), None);
        assert_eq!(parse_nvidia_smi("a, b, c, d"), None);
    }

    #[test]
    fn test_cpu_and_memory() {
        let probe = SystemProbe::new();
        let cpu = probe.cpu();
        assert!(cpu.cores >= 1);
        assert!(cpu.load_average.parse::<f64>().is_ok());

        let mem = probe.memory();
        assert!(mem.used <= mem.total);
        let pct: f64 = mem.usage_percentage.parse().unwrap();
        assert!((0.0..=100.0).contains(&pct));
    }
}
