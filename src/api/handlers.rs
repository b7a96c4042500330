//! API HTTP 处理器

use axum::{
    Json,
    body::Body,
    extract::{Path, State, rejection::JsonRejection},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use tracing::Instrument;

use super::catalog::CODE_EXAMPLES;
use super::error::ApiError;
use super::middleware::AppState;
use super::types::{
    GenerateRequest, HealthResponse, OllamaHealth, PullRequest, ServerInfoResponse, non_blank,
};
use crate::metrics::types::MetricsResponse;
use crate::stream::relay;
use crate::stream::{Frame, FrameSink, Framing, GenerateStats, RelayError};

/// 短请求 ID，用于串联同一条流的日志
fn request_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}

fn framing_from(headers: &HeaderMap) -> Framing {
    Framing::negotiate(headers.get(header::ACCEPT).and_then(|v| v.to_str().ok()))
}

/// 构建流式响应
fn stream_response(framing: Framing, body: Body) -> Response {
    let mut response = Response::new(body);
    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&framing.content_type()) {
        headers.insert(header::CONTENT_TYPE, value);
    }
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    // 反向代理（nginx）不要缓冲
    headers.insert("x-accel-buffering", HeaderValue::from_static("no"));
    response
}

/// POST /api/pull
/// 拉取模型并以流式返回下载进度
pub async fn pull_model(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<PullRequest>, JsonRejection>,
) -> Response {
    let model = match payload {
        Ok(Json(req)) => non_blank(req.model),
        Err(_) => None,
    };
    let Some(model) = model else {
        return ApiError::BadRequest("Model name is required".to_string()).into_response();
    };

    let framing = framing_from(&headers);
    let (sink, body) = relay::channel(framing);
    let span = tracing::info_span!("pull", request_id = %request_id(), model = %model);

    tokio::spawn(
        async move {
            tracing::info!("开始拉取模型");
            if let Err(e) = state.runtime.ensure_running().await {
                tracing::error!("Ollama 不可用: {}", e);
                sink.send_error(e.to_string()).await;
                sink.close().await;
                return;
            }

            match relay::relay_pull(&state.client, &model, &sink).await {
                Ok(()) => {}
                Err(RelayError::ClientGone) => {
                    tracing::info!("浏览器已断开，停止拉取");
                    return;
                }
                Err(e) => {
                    tracing::error!("拉取模型失败: {}", e);
                    sink.send_error(e.pull_message()).await;
                }
            }
            sink.close().await;
        }
        .instrument(span),
    );

    stream_response(framing, body)
}

/// POST /api/generate
/// 模型不存在时先拉取，再流式转发生成结果
pub async fn generate(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<GenerateRequest>, JsonRejection>,
) -> Response {
    let (model, prompt) = match payload {
        Ok(Json(req)) => (non_blank(req.model), req.prompt.filter(|p| !p.trim().is_empty())),
        Err(_) => (None, None),
    };
    let (Some(model), Some(prompt)) = (model, prompt) else {
        return ApiError::BadRequest("Model and prompt are required".to_string()).into_response();
    };

    let framing = framing_from(&headers);
    let (sink, body) = relay::channel(framing);
    let span = tracing::info_span!("generate", request_id = %request_id(), model = %model);

    tokio::spawn(
        async move {
            let timer = state.metrics.begin();
            match run_generate(&state, &model, &prompt, &sink).await {
                Ok(stats) => {
                    tracing::info!(
                        input_tokens = stats.input_tokens,
                        output_tokens = stats.output_tokens,
                        chunks = stats.chunks,
                        "生成完成，耗时 {:?}",
                        timer.elapsed()
                    );
                    state
                        .metrics
                        .record_success(timer, stats.input_tokens, stats.output_tokens);
                    let _ = sink.send(&Frame::done()).await;
                }
                Err(RelayError::ClientGone) => {
                    tracing::info!("浏览器已断开，停止生成");
                    state.metrics.record_failure(timer);
                    return;
                }
                Err(e) => {
                    tracing::error!("生成失败: {}", e);
                    state.metrics.record_failure(timer);
                    sink.send_error(e.to_string()).await;
                }
            }
            sink.close().await;
        }
        .instrument(span),
    );

    stream_response(framing, body)
}

async fn run_generate(
    state: &AppState,
    model: &str,
    prompt: &str,
    sink: &FrameSink,
) -> Result<GenerateStats, RelayError> {
    state
        .runtime
        .ensure_running()
        .await
        .map_err(|e| RelayError::Runtime(e.to_string()))?;

    if !state.client.has_model(model).await? {
        tracing::info!("模型不存在，先拉取");
        relay::relay_pull(&state.client, model, sink)
            .await
            .map_err(|e| match e {
                RelayError::ClientGone => RelayError::ClientGone,
                other => RelayError::Runtime(other.pull_message()),
            })?;
    }

    relay::relay_generate(&state.client, model, prompt, sink).await
}

/// GET /api/models
/// 原样返回 Ollama /api/tags
pub async fn list_models(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    state.runtime.ensure_running().await?;
    Ok(Json(state.client.tags_raw().await?))
}

/// GET /api/models/{name}
/// 原样返回 Ollama /api/show
pub async fn show_model(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let name = non_blank(Some(name))
        .ok_or_else(|| ApiError::BadRequest("Model name is required".to_string()))?;
    state.runtime.ensure_running().await?;
    Ok(Json(state.client.show(&name).await?))
}

/// GET /api/health
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let (installed, running) = tokio::join!(
        state.runtime.check_installed(),
        state.runtime.check_running()
    );
    Json(HealthResponse {
        status: "ok",
        ollama: OllamaHealth { installed, running },
    })
}

/// GET /api/metrics
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let system = state.system.clone();
    let sampled = tokio::task::spawn_blocking(move || (system.cpu(), system.memory())).await;
    let (cpu, memory) = match sampled {
        Ok(v) => v,
        Err(e) => {
            return ApiError::Internal(format!("Failed to collect metrics: {}", e)).into_response();
        }
    };

    Json(MetricsResponse {
        cpu,
        memory,
        gpu: state.system.gpu().await,
        model: state.metrics.snapshot(),
    })
    .into_response()
}

/// GET /api/server-info
pub async fn server_info(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    let base_url = base_url_from(&headers).unwrap_or_else(|| state.config.public_base_url());
    let ollama_version = state.runtime.version().await;
    let ollama_pid = state.runtime.managed_pid();

    Json(ServerInfoResponse {
        base_url,
        port: state.config.port,
        ollama_url: state.client.base_url().to_string(),
        ollama_version,
        ollama_pid,
        started_at: state.started_at.to_rfc3339(),
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// 从 Host / X-Forwarded-* 推断浏览器使用的地址
fn base_url_from(headers: &HeaderMap) -> Option<String> {
    let get = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };
    let host = get("x-forwarded-host").or_else(|| get(header::HOST.as_str()))?;
    let scheme = get("x-forwarded-proto").unwrap_or("http");
    Some(format!("{}://{}", scheme, host))
}

/// GET /api/examples
pub async fn examples() -> impl IntoResponse {
    Json(CODE_EXAMPLES.iter().map(|e| e.view()).collect::<Vec<_>>())
}

/// 未匹配的 /api 路径
pub async fn api_not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(super::types::ErrorResponse::new("Not found")))
}
