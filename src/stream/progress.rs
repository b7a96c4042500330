//! 下载进度换算
//!
//! 把 Ollama /api/pull 的原始进度行换算为浏览器展示用的 `{status, percent}`

use serde::Serialize;

use crate::ollama::types::PullProgress;

/// 浏览器端进度条数据，percent 恒在 0..=100
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressInfo {
    pub status: String,
    pub percent: u8,
}

/// 完成百分比（四舍五入并截断到 0..=100）
pub fn percent(completed: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    let value = (completed as f64 / total as f64 * 100.0).round();
    value.clamp(0.0, 100.0) as u8
}

fn megabytes(bytes: u64) -> u64 {
    (bytes as f64 / 1024.0 / 1024.0).round() as u64
}

/// 单次 pull 的进度状态
#[derive(Debug)]
pub struct ProgressTracker {
    model: String,
    /// 第一次出现的 total，分层行的百分比都以它为分母
    first_total: Option<u64>,
    /// 已输出的分层行数
    parts: usize,
}

impl ProgressTracker {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            first_total: None,
            parts: 0,
        }
    }

    /// 发起下载前的初始进度
    pub fn initial(&self) -> ProgressInfo {
        ProgressInfo {
            status: format!("Initializing download for {}...", self.model),
            percent: 0,
        }
    }

    /// 换算一行原始进度
    pub fn translate(&mut self, raw: &PullProgress) -> ProgressInfo {
        if self.first_total.is_none() {
            self.first_total = raw.total.filter(|&t| t > 0);
        }
        let completed = raw.completed.unwrap_or(0);

        if raw.status == "downloading" {
            if let Some(total) = raw.total.filter(|&t| t > 0) {
                return ProgressInfo {
                    status: format!(
                        "Downloading {} ({}MB/{}MB)",
                        self.model,
                        megabytes(completed),
                        megabytes(total)
                    ),
                    percent: percent(completed, total),
                };
            }
        }

        if raw.status.starts_with("verifying") {
            return ProgressInfo {
                status: "Verifying download...".to_string(),
                percent: 95,
            };
        }

        if raw.status == "extracting" {
            return ProgressInfo {
                status: "Extracting model...".to_string(),
                percent: 98,
            };
        }

        if raw.status == "success" {
            return ProgressInfo {
                status: "Download complete".to_string(),
                percent: 100,
            };
        }

        if raw.digest.is_some() {
            self.parts += 1;
            let percent = match (raw.completed, self.first_total) {
                (Some(c), Some(t)) => percent(c, t),
                _ => 0,
            };
            return ProgressInfo {
                status: format!("Processing part {}", self.parts),
                percent,
            };
        }

        ProgressInfo {
            status: "Processing...".to_string(),
            percent: 0,
        }
    }
}
