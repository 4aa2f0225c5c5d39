//! OpenAI API Handler 函数

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Extension, Json,
    body::Body,
    extract::{Path, State, rejection::JsonRejection},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use futures::{Stream, StreamExt, stream};
use tokio::time::{Instant, interval_at};

use crate::common::auth::ApiKey;
use crate::gemini::client::{DEFAULT_BASE_URL, GeminiClient};

use super::adapter::{AdapterOptions, GeminiAdapter};
use super::error::AdapterError;
use super::models::{ModelMapper, list_models, model_info};
use super::stream::{ChunkStream, StreamFrame};
use super::types::{ChatCompletionRequest, EmbeddingRequest, ErrorResponse};

/// 应用状态
#[derive(Clone)]
pub struct AppState {
    pub mapper: Arc<ModelMapper>,
    pub options: Arc<AdapterOptions>,
    /// 进程共享的连接池，不携带凭据
    pub http: reqwest::Client,
    pub base_url: String,
}

impl AppState {
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            mapper: Arc::new(ModelMapper::new()),
            options: Arc::new(AdapterOptions::default()),
            http,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn with_mapper(mut self, mapper: ModelMapper) -> Self {
        self.mapper = Arc::new(mapper);
        self
    }

    pub fn with_options(mut self, options: AdapterOptions) -> Self {
        self.options = Arc::new(options);
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// 为单个请求创建上游客户端
    fn client(&self, api_key: String) -> GeminiClient {
        GeminiClient::new(self.http.clone(), self.base_url.as_str(), api_key)
    }
}

/// 错误类型 → HTTP 状态码
pub fn status_for(e: &AdapterError) -> StatusCode {
    match e {
        AdapterError::InvalidRequest(_) | AdapterError::UnsupportedContent { .. } => {
            StatusCode::BAD_REQUEST
        }
        AdapterError::UpstreamRejected { status, .. } => match *status {
            400 | 401 | 403 | 404 | 429 => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            _ => StatusCode::BAD_GATEWAY,
        },
        AdapterError::UpstreamTransport(_) | AdapterError::EmptyUpstreamResponse(_) => {
            StatusCode::BAD_GATEWAY
        }
    }
}

fn error_response(e: &AdapterError) -> Response {
    let status = status_for(e);
    if status.is_server_error() {
        tracing::error!("请求失败: {}", e);
    } else {
        tracing::warn!("请求失败: {}", e);
    }
    (status, Json(ErrorResponse::from(e))).into_response()
}

fn rejection_response(rejection: JsonRejection) -> Response {
    tracing::warn!("请求体解析失败: {}", rejection.body_text());
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse::new(
            "invalid_request_error",
            rejection.body_text(),
        )),
    )
        .into_response()
}

/// GET /
///
/// 提示客户端访问的是 OpenAI 兼容接口
pub async fn index() -> Response {
    (
        StatusCode::MISDIRECTED_REQUEST,
        Json(serde_json::json!({
            "message": "Welcome to the OpenAI API! Documentation is available at https://platform.openai.com/docs/api-reference"
        })),
    )
        .into_response()
}

/// GET /v1/models
pub async fn get_models() -> Response {
    tracing::info!("Received GET /v1/models request");
    Json(list_models()).into_response()
}

/// GET /v1/models/{model}
pub async fn get_model(Path(model): Path<String>) -> Response {
    Json(model_info(&model)).into_response()
}

/// POST /v1/chat/completions
///
/// OpenAI 兼容的聊天完成端点
pub async fn chat_completions(
    State(state): State<AppState>,
    Extension(ApiKey(api_key)): Extension<ApiKey>,
    payload: Result<Json<ChatCompletionRequest>, JsonRejection>,
) -> Response {
    let Json(payload) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return rejection_response(rejection),
    };

    tracing::info!(
        model = %payload.model,
        max_tokens = ?payload.effective_max_tokens(),
        stream = %payload.is_stream(),
        message_count = %payload.messages.len(),
        "Received POST /v1/chat/completions request"
    );

    let adapter = GeminiAdapter::new(state.client(api_key), &state.mapper, &state.options);

    if payload.is_stream() {
        match adapter.complete_stream(payload).await {
            Ok(frames) => sse_response(frames),
            Err(e) => error_response(&e),
        }
    } else {
        match adapter.complete(&payload).await {
            Ok(resp) => (StatusCode::OK, Json(resp)).into_response(),
            Err(e) => error_response(&e),
        }
    }
}

/// POST /v1/embeddings
pub async fn embeddings(
    State(state): State<AppState>,
    Extension(ApiKey(api_key)): Extension<ApiKey>,
    payload: Result<Json<EmbeddingRequest>, JsonRejection>,
) -> Response {
    let Json(payload) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return rejection_response(rejection),
    };

    tracing::info!(
        model = %payload.model,
        dimensions = ?payload.dimensions,
        "Received POST /v1/embeddings request"
    );

    let adapter = GeminiAdapter::new(state.client(api_key), &state.mapper, &state.options);
    match adapter.embed(&payload).await {
        Ok(resp) => (StatusCode::OK, Json(resp)).into_response(),
        Err(e) => error_response(&e),
    }
}

/// 构建 SSE 响应
fn sse_response(frames: ChunkStream) -> Response {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        .header(header::TRANSFER_ENCODING, "chunked")
        .header("X-Accel-Buffering", "no")
        .body(Body::from_stream(create_sse_stream(frames)))
        .unwrap_or_else(|e| {
            tracing::error!("构建 SSE 响应失败: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        })
}

/// Ping 事件间隔（25秒）
const PING_INTERVAL_SECS: u64 = 25;

/// 创建 ping 事件的 SSE 字符串
fn create_ping_sse() -> Bytes {
    Bytes::from(": ping\n\n")
}

/// 创建 SSE 事件流
///
/// 上游静默期间每 25 秒发送一次 ping；Done 或 Error 之后流结束。
fn create_sse_stream(frames: ChunkStream) -> impl Stream<Item = Result<Bytes, Infallible>> {
    let period = Duration::from_secs(PING_INTERVAL_SECS);
    let ping_interval = interval_at(Instant::now() + period, period);

    stream::unfold(
        (frames, false, ping_interval),
        |(mut frames, finished, mut ping_interval)| async move {
            if finished {
                return None;
            }

            tokio::select! {
                biased;

                frame = frames.next() => {
                    let frame = frame?;
                    let terminal = match &frame {
                        StreamFrame::Chunk(_) => false,
                        StreamFrame::Done => true,
                        StreamFrame::Error(e) => {
                            tracing::warn!("流式响应中断: {}", e);
                            true
                        }
                    };
                    ping_interval.reset();
                    Some((Ok(Bytes::from(frame.to_sse())), (frames, terminal, ping_interval)))
                }
                _ = ping_interval.tick() => {
                    tracing::trace!("发送 ping 保活事件");
                    Some((Ok(create_ping_sse()), (frames, false, ping_interval)))
                }
            }
        },
    )
}
