//! Ollama 进程生命周期管理
//!
//! 负责：检测是否已安装、检测是否运行、必要时拉起 `ollama serve` 并等待就绪、退出时停止

use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use super::client::OllamaClient;
use super::error::RuntimeError;
use crate::model::config::Config;

/// start() 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// 外部已有 Ollama 在运行
    AlreadyRunning,
    /// 由本进程拉起
    Started,
}

/// 由本进程拉起的子进程
struct ManagedChild {
    pid: Option<u32>,
    shutdown: Arc<Notify>,
    /// 进程自行退出时返回退出状态；被 shutdown 停止时为 None
    monitor: JoinHandle<Option<ExitStatus>>,
}

impl ManagedChild {
    fn is_alive(&self) -> bool {
        !self.monitor.is_finished()
    }
}

/// Ollama 进程管理器
pub struct RuntimeManager {
    binary: String,
    port: u16,
    auto_start: bool,
    stop_on_exit: bool,
    ready_timeout: Duration,
    poll_interval: Duration,
    client: OllamaClient,
    /// 串行化 start()，等待就绪期间一直持有
    start_lock: tokio::sync::Mutex<()>,
    /// 同一时刻至多一个存活子进程；只做短暂的同步访问，不跨 await 持有
    child: Mutex<Option<ManagedChild>>,
}

impl RuntimeManager {
    pub fn new(config: &Config, client: OllamaClient) -> Self {
        Self {
            binary: config.ollama_binary.clone(),
            port: config.ollama_port,
            auto_start: config.auto_start,
            stop_on_exit: config.stop_runtime_on_exit,
            ready_timeout: config.ready_timeout(),
            poll_interval: config.ready_poll_interval(),
            client,
            start_lock: tokio::sync::Mutex::new(()),
            child: Mutex::new(None),
        }
    }

    /// 执行 `ollama --version` 判断是否已安装
    pub async fn check_installed(&self) -> bool {
        self.version_output().await.is_some()
    }

    /// Ollama 版本号（未安装时为 None）
    pub async fn version(&self) -> Option<String> {
        self.version_output().await.and_then(|out| parse_version(&out))
    }

    async fn version_output(&self) -> Option<String> {
        let output = Command::new(&self.binary)
            .arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .output()
            .await;
        match output {
            Ok(out) if out.status.success() => Some(String::from_utf8_lossy(&out.stdout).into_owned()),
            Ok(out) => {
                tracing::debug!("{} --version 退出码异常: {}", self.binary, out.status);
                None
            }
            Err(e) => {
                tracing::debug!("无法执行 {} --version: {}", self.binary, e);
                None
            }
        }
    }

    /// 检测 Ollama 是否在运行
    pub async fn check_running(&self) -> bool {
        self.client.ping().await
    }

    /// 按固定间隔轮询直到就绪或超时；拉起的进程提前退出时立即返回
    pub async fn wait_ready(&self) -> Result<(), RuntimeError> {
        let deadline = Instant::now() + self.ready_timeout;
        loop {
            if self.check_running().await {
                return Ok(());
            }
            if let Some(exited) = self.take_exited_child() {
                let status = exited.monitor.await.ok().flatten();
                let status = status.map_or_else(|| "unknown".to_string(), |s| s.to_string());
                tracing::error!("Ollama 在就绪前退出: {}", status);
                return Err(RuntimeError::ExitedEarly(status));
            }
            if Instant::now() >= deadline {
                return Err(RuntimeError::StartTimeout);
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// 取出已退出的子进程（仍存活或没有子进程时返回 None）
    fn take_exited_child(&self) -> Option<ManagedChild> {
        let mut slot = self.child.lock();
        if slot.as_ref().is_some_and(|c| !c.is_alive()) {
            slot.take()
        } else {
            None
        }
    }

    /// 请求处理前调用：未运行时按配置拉起
    pub async fn ensure_running(&self) -> Result<StartOutcome, RuntimeError> {
        if self.check_running().await {
            return Ok(StartOutcome::AlreadyRunning);
        }
        if !self.auto_start {
            return Err(RuntimeError::AutoStartDisabled);
        }
        self.start().await
    }

    /// 启动 Ollama（已运行则直接返回）
    pub async fn start(&self) -> Result<StartOutcome, RuntimeError> {
        let _start = self.start_lock.lock().await;

        if self.check_running().await {
            tracing::info!("Ollama 已在运行");
            return Ok(StartOutcome::AlreadyRunning);
        }

        // 之前拉起的进程仍存活（尚未就绪），不重复拉起
        let spawned_alive = self.child.lock().as_ref().is_some_and(ManagedChild::is_alive);
        if !spawned_alive {
            if !self.check_installed().await {
                return Err(RuntimeError::NotInstalled);
            }
            let managed = self.spawn()?;
            *self.child.lock() = Some(managed);
        }

        match self.wait_ready().await {
            Ok(()) => {
                tracing::info!("Ollama 启动成功");
                Ok(StartOutcome::Started)
            }
            Err(RuntimeError::StartTimeout) => {
                tracing::error!("Ollama 在 {:?} 内未就绪", self.ready_timeout);
                Err(RuntimeError::StartTimeout)
            }
            Err(e) => Err(e),
        }
    }

    fn spawn(&self) -> Result<ManagedChild, RuntimeError> {
        let mut child = Command::new(&self.binary)
            .arg("serve")
            .env("OLLAMA_HOST", format!("0.0.0.0:{}", self.port))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let pid = child.id();
        tracing::info!("已拉起 ollama serve (PID: {:?}, 端口: {})", pid, self.port);

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(relay_lines(stdout, false));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(relay_lines(stderr, true));
        }

        let shutdown = Arc::new(Notify::new());
        let shutdown_signal = shutdown.clone();
        let monitor = tokio::spawn(async move {
            tokio::select! {
                status = child.wait() => match status {
                    Ok(status) => {
                        tracing::info!("Ollama 进程已退出: {}", status);
                        Some(status)
                    }
                    Err(e) => {
                        tracing::warn!("等待 Ollama 进程失败: {}", e);
                        None
                    }
                },
                _ = shutdown_signal.notified() => {
                    if let Err(e) = child.kill().await {
                        tracing::warn!("停止 Ollama 进程失败: {}", e);
                    } else {
                        tracing::info!("已停止 Ollama 进程");
                    }
                    None
                }
            }
        });

        Ok(ManagedChild {
            pid,
            shutdown,
            monitor,
        })
    }

    /// 由本进程拉起的 Ollama PID（如果仍存活）
    pub fn managed_pid(&self) -> Option<u32> {
        self.child
            .lock()
            .as_ref()
            .filter(|c| c.is_alive())
            .and_then(|c| c.pid)
    }

    /// 服务退出时调用
    pub async fn shutdown(&self) {
        if !self.stop_on_exit {
            return;
        }
        let managed = self.child.lock().take();
        if let Some(mut managed) = managed {
            if !managed.is_alive() {
                return;
            }
            managed.shutdown.notify_one();
            if tokio::time::timeout(Duration::from_secs(5), &mut managed.monitor)
                .await
                .is_err()
            {
                tracing::warn!("等待 Ollama 退出超时");
                managed.monitor.abort();
            }
        }
    }
}

/// 把子进程输出逐行写入日志
async fn relay_lines<R>(reader: R, is_stderr: bool)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if is_stderr {
                    tracing::warn!(target: "ollama", "{}", line);
                } else {
                    tracing::info!(target: "ollama", "{}", line);
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::debug!("读取 Ollama 输出失败: {}", e);
                break;
            }
        }
    }
}

/// 从 `ollama --version` 输出中提取版本号
///
/// 典型输出：`ollama version is 0.5.7`；未连上服务时会多一行 Warning
fn parse_version(output: &str) -> Option<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| line.to_ascii_lowercase().contains("version"))
        .filter(|line| !line.to_ascii_lowercase().starts_with("warning"))
        .filter_map(|line| line.split_whitespace().last())
        .map(|v| v.trim_start_matches('v').to_string())
        .next()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(binary: &str, auto_start: bool) -> RuntimeManager {
        manager_with_timeout(binary, auto_start, 0)
    }

    fn manager_with_timeout(binary: &str, auto_start: bool, ready_timeout_secs: u64) -> RuntimeManager {
        let mut config = Config::default();
        config.ollama_binary = binary.to_string();
        config.ollama_port = 9;
        config.auto_start = auto_start;
        config.ready_timeout_secs = ready_timeout_secs;
        config.ready_poll_interval_ms = 100;
        let client = OllamaClient::new(
            reqwest::Client::new(),
            "http://127.0.0.1:9",
            Duration::from_millis(200),
            Duration::from_secs(1),
        );
        RuntimeManager::new(&config, client)
    }

    #[test]
    fn test_parse_version() {
        assert_eq!(parse_version("ollama version is 0.5.7\n").as_deref(), Some("0.5.7"));
        assert_eq!(
            parse_version("Warning: could not connect to a running Ollama instance\nWarning: client version is 0.3.12\n")
                .as_deref(),
            None
        );
        assert_eq!(
            parse_version("Warning: could not connect to a running Ollama instance\nollama version is 0.3.12\n").as_deref(),
            Some("0.3.12")
        );
        assert_eq!(parse_version(""), None);
    }

    #[tokio::test]
    async fn test_missing_binary_is_not_installed() {
        let m = manager("/nonexistent/ollama-web-test-binary", true);
        assert!(!m.check_installed().await);
        assert_eq!(m.version().await, None);
    }

    #[tokio::test]
    async fn test_start_without_binary_fails() {
        let m = manager("/nonexistent/ollama-web-test-binary", true);
        let err = m.start().await.unwrap_err();
        assert!(matches!(err, RuntimeError::NotInstalled));
        assert_eq!(
            err.to_string(),
            "Ollama is not installed. Please install it first: https://ollama.ai"
        );
        assert_eq!(m.managed_pid(), None);
    }

    #[tokio::test]
    async fn test_ensure_running_respects_auto_start() {
        let m = manager("/nonexistent/ollama-web-test-binary", false);
        let err = m.ensure_running().await.unwrap_err();
        assert!(matches!(err, RuntimeError::AutoStartDisabled));
    }

    #[tokio::test]
    async fn test_wait_ready_times_out() {
        let m = manager("/nonexistent/ollama-web-test-binary", true);
        assert!(matches!(m.wait_ready().await, Err(RuntimeError::StartTimeout)));
    }

    #[tokio::test]
    async fn test_shutdown_without_child_is_noop() {
        let m = manager("/nonexistent/ollama-web-test-binary", true);
        m.shutdown().await;
        assert_eq!(m.managed_pid(), None);
    }

    /// 写一个假的 ollama 可执行脚本：`--version` 正常输出，`serve` 执行给定命令
    #[cfg(unix)]
    fn fake_ollama(dir: &tempfile::TempDir, serve: &str) -> String {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.path().join("ollama");
        let script = format!(
            "#!/bin/sh\ncase \"$1\" in\n  --version) echo \"ollama version is 0.0.1-test\" ;;\n  serve) {} ;;\nesac\n",
            serve
        );
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_managed_pid_available_while_starting() {
        let dir = tempfile::tempdir().unwrap();
        let m = Arc::new(manager_with_timeout(&fake_ollama(&dir, "exec sleep 30"), true, 3));
        assert_eq!(m.version().await.as_deref(), Some("0.0.1-test"));

        let starting = tokio::spawn({
            let m = m.clone();
            async move { m.start().await }
        });
        tokio::time::sleep(Duration::from_millis(300)).await;

        let begin = Instant::now();
        let pid = m.managed_pid();
        assert!(begin.elapsed() < Duration::from_millis(100));
        assert!(pid.is_some());
        assert!(!starting.is_finished());

        m.shutdown().await;
        assert_eq!(m.managed_pid(), None);
        assert!(starting.await.unwrap().is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_start_fails_fast_when_child_exits() {
        let dir = tempfile::tempdir().unwrap();
        let m = manager_with_timeout(&fake_ollama(&dir, "exit 3"), true, 10);

        let begin = Instant::now();
        let err = m.start().await.unwrap_err();
        assert!(begin.elapsed() < Duration::from_secs(5));
        match err {
            RuntimeError::ExitedEarly(status) => assert!(status.contains('3'), "{}", status),
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(m.managed_pid(), None);
    }
}
