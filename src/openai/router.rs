//! OpenAI API 路由配置

use axum::{
    Json, Router,
    body::Body,
    http::{Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::common::auth::{self, ApiKey};

use super::handlers::{AppState, chat_completions, embeddings, get_model, get_models, index};
use super::types::ErrorResponse;

/// API Key 提取中间件
///
/// 调用方的 Bearer token 作为 Gemini API Key 放入请求扩展，缺失时返回 401。
async fn auth_middleware(mut request: Request<Body>, next: Next) -> Response {
    match auth::extract_api_key(request.headers()) {
        Some(key) => {
            request.extensions_mut().insert(ApiKey(key));
            next.run(request).await
        }
        None => {
            tracing::warn!("请求缺少 API Key: {}", request.uri().path());
            let error = ErrorResponse::authentication_error();
            (StatusCode::UNAUTHORIZED, Json(error)).into_response()
        }
    }
}

/// CORS 中间件层
fn cors_layer() -> tower_http::cors::CorsLayer {
    use tower_http::cors::{Any, CorsLayer};

    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// 创建 OpenAI 兼容路由
///
/// # 端点
/// - `GET /` - 421，提示访问 OpenAI 兼容接口
/// - `GET /v1/models` - 模型列表
/// - `GET /v1/models/{model}` - 模型信息
/// - `POST /v1/chat/completions` - 聊天完成（支持 SSE 流式）
/// - `POST /v1/embeddings` - 文本向量
///
/// # 认证
/// `/v1/chat/completions` 与 `/v1/embeddings` 需要携带 Gemini API Key：
/// - `Authorization: Bearer <key>` header
/// - `x-goog-api-key: <key>` header
pub fn create_router(state: AppState) -> Router {
    // 需要凭据的路由
    let protected = Router::new()
        .route("/chat/completions", post(chat_completions))
        .route("/embeddings", post(embeddings))
        .route_layer(middleware::from_fn(auth_middleware));

    let v1_routes = Router::new()
        .route("/models", get(get_models))
        .route("/models/{model}", get(get_model))
        .merge(protected);

    Router::new()
        .route("/", get(index))
        .nest("/v1", v1_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer())
        .with_state(state)
}
