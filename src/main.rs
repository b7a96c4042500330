mod api;
mod common;
mod http_client;
mod metrics;
mod model;
mod ollama;
mod stream;
mod ui;

use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use api::AppState;
use http_client::build_client;
use model::arg::Args;
use model::config::Config;
use ollama::OllamaClient;

#[tokio::main]
async fn main() {
    // 解析命令行参数
    let args = Args::parse();

    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run(args).await {
        tracing::error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    // 加载配置：文件 < 环境变量 < 命令行
    let config_path = args
        .config
        .unwrap_or_else(|| Config::default_config_path().to_string());
    let mut config = Config::load(&config_path)?;
    config.apply_env()?;
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(port) = args.ollama_port {
        config.ollama_port = port;
    }
    if args.no_auto_start {
        config.auto_start = false;
    }
    if let Some(path) = config.config_path() {
        tracing::debug!("配置文件: {}", path.display());
    }

    // 流式请求不设整体超时，由 OllamaClient 按请求设置
    let http = build_client(config.proxy_url.as_deref(), None)?;
    let client = OllamaClient::new(
        http,
        config.ollama_base_url(),
        Duration::from_secs(config.health_timeout_secs),
        Duration::from_secs(config.request_timeout_secs),
    );

    let addr = format!("{}:{}", config.host, config.port);
    let auto_start = config.auto_start;
    let state = AppState::new(config, client);

    if auto_start {
        tracing::info!("检查 Ollama 运行状态...");
        let outcome = state.runtime.start().await.context("启动 Ollama 失败")?;
        tracing::info!("Ollama 就绪: {:?}", outcome);
    } else {
        tracing::info!("已禁用自动启动 Ollama，请求时仅检测运行状态");
    }

    let runtime = state.runtime.clone();
    let app = api::create_app(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("监听 {} 失败", addr))?;
    tracing::info!("启动 HTTP 服务器: http://{}", addr);
    tracing::info!("  POST /api/pull");
    tracing::info!("  POST /api/generate");
    tracing::info!("  GET  /api/models");
    tracing::info!("  GET  /api/metrics");
    tracing::info!("  Web UI: http://{}/", addr);

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    runtime.shutdown().await;
    served.context("HTTP 服务器异常退出")
}

/// 等待 Ctrl+C 或 SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("无法监听 Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!("无法监听 SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("收到退出信号，正在关闭...");
}
