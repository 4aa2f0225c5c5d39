//! Gemini 上游客户端
//!
//! `GenerativeClient` 是转换层与上游之间唯一的接缝；
//! `GeminiClient` 是基于 reqwest 的实现，每个请求按调用方凭据构建一次。

use std::fmt;

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::stream::{BoxStream, StreamExt};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};

use super::types::{
    BatchEmbedContentsRequest, BatchEmbedContentsResponse, GenerateContentRequest,
    GenerateContentResponse, GoogleApiError, GoogleErrorEnvelope,
};

/// 默认 API 地址
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// 上游调用错误
#[derive(Debug, Clone, thiserror::Error)]
pub enum UpstreamError {
    /// 传输层成功，但上游返回了逻辑错误（模型无效、配额等）
    #[error("upstream rejected the request (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    /// 网络、认证握手或响应体读取失败
    #[error("upstream transport failure: {0}")]
    Transport(String),
}

impl From<reqwest::Error> for UpstreamError {
    fn from(e: reqwest::Error) -> Self {
        UpstreamError::Transport(e.to_string())
    }
}

/// 上游流式响应
pub type ResponseStream = BoxStream<'static, Result<GenerateContentResponse, UpstreamError>>;

/// 上游生成式模型客户端
#[async_trait]
pub trait GenerativeClient: Send + Sync {
    async fn generate_content(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse, UpstreamError>;

    async fn stream_generate_content(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<ResponseStream, UpstreamError>;

    async fn batch_embed_contents(
        &self,
        model: &str,
        request: &BatchEmbedContentsRequest,
    ) -> Result<BatchEmbedContentsResponse, UpstreamError>;
}

/// 模型 ID 转资源名
///
/// 已是资源路径（含 `/`，如 `tunedModels/x`）时原样使用。
pub fn model_resource_name(model: &str) -> String {
    if model.contains('/') {
        model.to_string()
    } else {
        format!("models/{}", urlencoding::encode(model))
    }
}

/// Gemini REST 客户端
///
/// 持有调用方的 API Key，生命周期限定在单个请求内。
/// 底层 `reqwest::Client` 为进程共享的连接池，不携带任何凭据。
pub struct GeminiClient {
    http: Client,
    base_url: String,
    api_key: String,
}

impl fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiClient")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl GeminiClient {
    pub fn new(http: Client, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    fn endpoint(&self, model: &str, method: &str) -> String {
        format!("{}/{}:{}", self.base_url, model_resource_name(model), method)
    }

    /// 发送 POST 请求，非 2xx 响应转换为 `Rejected`
    async fn post<B: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &B,
        query: Option<&[(&str, &str)]>,
    ) -> Result<Response, UpstreamError> {
        let mut builder = self
            .http
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(body);
        if let Some(query) = query {
            builder = builder.query(query);
        }

        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() {
            tracing::debug!("上游请求成功: {} {}", status, url);
            return Ok(response);
        }

        let text = response
            .text()
            .await
            .unwrap_or_else(|_| format!("HTTP {}", status.as_u16()));
        let message = serde_json::from_str::<GoogleErrorEnvelope>(&text)
            .map(|envelope| describe_api_error(&envelope.error))
            .unwrap_or(text);
        tracing::warn!("上游返回错误: {} - {}", status, message);

        Err(UpstreamError::Rejected {
            status: status.as_u16(),
            message,
        })
    }
}

fn describe_api_error(error: &GoogleApiError) -> String {
    match &error.status {
        Some(status) => format!("{}: {}", status, error.message),
        None => error.message.clone(),
    }
}

/// SSE data 负载：错误包装或正常响应
#[derive(Deserialize)]
#[serde(untagged)]
enum StreamPayload {
    Error(GoogleErrorEnvelope),
    Response(GenerateContentResponse),
}

/// 解析单个 SSE data 负载
fn parse_stream_payload(data: &str) -> Result<GenerateContentResponse, UpstreamError> {
    match serde_json::from_str::<StreamPayload>(data) {
        Ok(StreamPayload::Response(resp)) => Ok(resp),
        Ok(StreamPayload::Error(envelope)) => Err(UpstreamError::Rejected {
            status: envelope.error.code.unwrap_or(500),
            message: describe_api_error(&envelope.error),
        }),
        Err(e) => Err(UpstreamError::Transport(format!(
            "malformed stream payload: {}",
            e
        ))),
    }
}

#[async_trait]
impl GenerativeClient for GeminiClient {
    async fn generate_content(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse, UpstreamError> {
        let url = self.endpoint(model, "generateContent");
        let response = self.post(&url, request, None).await?;
        let body = response.json::<GenerateContentResponse>().await?;
        Ok(body)
    }

    async fn stream_generate_content(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<ResponseStream, UpstreamError> {
        let url = self.endpoint(model, "streamGenerateContent");
        let response = self.post(&url, request, Some(&[("alt", "sse")])).await?;

        let stream = response
            .bytes_stream()
            .eventsource()
            .filter_map(|event| async move {
                match event {
                    Ok(event) if event.data.trim().is_empty() => None,
                    Ok(event) => Some(parse_stream_payload(&event.data)),
                    Err(e) => Some(Err(UpstreamError::Transport(e.to_string()))),
                }
            })
            .boxed();

        Ok(stream)
    }

    async fn batch_embed_contents(
        &self,
        model: &str,
        request: &BatchEmbedContentsRequest,
    ) -> Result<BatchEmbedContentsResponse, UpstreamError> {
        let url = self.endpoint(model, "batchEmbedContents");
        let response = self.post(&url, request, None).await?;
        let body = response.json::<BatchEmbedContentsResponse>().await?;
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gemini::types::{Content, EmbedContentRequest, Part, Role};
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn chat_request() -> GenerateContentRequest {
        GenerateContentRequest {
            contents: vec![Content::new(Role::User, vec![Part::text("hi")])],
            system_instruction: None,
            safety_settings: vec![],
            generation_config: None,
        }
    }

    #[test]
    fn test_model_resource_name() {
        assert_eq!(model_resource_name("gemini-2.5-pro"), "models/gemini-2.5-pro");
        assert_eq!(model_resource_name("tunedModels/abc"), "tunedModels/abc");
        assert_eq!(model_resource_name("bad model?"), "models/bad%20model%3F");
    }

    #[test]
    fn test_debug_redacts_key() {
        let client = GeminiClient::new(Client::new(), DEFAULT_BASE_URL, "secret-key");
        let debug = format!("{:?}", client);
        assert!(!debug.contains("secret-key"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_parse_stream_error_payload() {
        let err = parse_stream_payload(
            r#"{"error":{"code":429,"message":"quota","status":"RESOURCE_EXHAUSTED"}}"#,
        )
        .unwrap_err();
        match err {
            UpstreamError::Rejected { status, message } => {
                assert_eq!(status, 429);
                assert_eq!(message, "RESOURCE_EXHAUSTED: quota");
            }
            other => panic!("unexpected error: {:?}", other),
        }

        assert!(matches!(
            parse_stream_payload("not json"),
            Err(UpstreamError::Transport(_))
        ));
    }

    #[tokio::test]
    async fn test_generate_content_sends_key_header() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-2.5-flash:generateContent"))
            .and(header("x-goog-api-key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{
                    "content": {"role": "model", "parts": [{"text": "hello"}]},
                    "finishReason": "STOP"
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = GeminiClient::new(Client::new(), server.uri(), "test-key");
        let resp = client
            .generate_content("gemini-2.5-flash", &chat_request())
            .await
            .unwrap();
        assert_eq!(resp.candidates.len(), 1);
    }

    #[tokio::test]
    async fn test_generate_content_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/no-such-model:generateContent"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error": {
                    "code": 404,
                    "message": "models/no-such-model is not found",
                    "status": "NOT_FOUND"
                }
            })))
            .mount(&server)
            .await;

        let client = GeminiClient::new(Client::new(), server.uri(), "k");
        let err = client
            .generate_content("no-such-model", &chat_request())
            .await
            .unwrap_err();
        match err {
            UpstreamError::Rejected { status, message } => {
                assert_eq!(status, 404);
                assert!(message.starts_with("NOT_FOUND"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_transport_failure() {
        // 端口 9 (discard) 上通常没有 HTTP 服务
        let client = GeminiClient::new(Client::new(), "http://127.0.0.1:9", "k");
        let err = client
            .generate_content("gemini-2.5-flash", &chat_request())
            .await
            .unwrap_err();
        assert!(matches!(err, UpstreamError::Transport(_)));
    }

    #[tokio::test]
    async fn test_stream_generate_content_parses_sse() {
        let body = concat!(
            "data: {\"candidates\":[{\"content\":{\"role\":\"model\",\"parts\":[{\"text\":\"Hel\"}]}}]}\r\n\r\n",
            "data: {\"candidates\":[{\"content\":{\"role\":\"model\",\"parts\":[{\"text\":\"lo\"}]},\"finishReason\":\"STOP\"}]}\r\n\r\n",
        );

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-2.5-flash:streamGenerateContent"))
            .and(query_param("alt", "sse"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(body),
            )
            .mount(&server)
            .await;

        let client = GeminiClient::new(Client::new(), server.uri(), "k");
        let stream = client
            .stream_generate_content("gemini-2.5-flash", &chat_request())
            .await
            .unwrap();
        let items: Vec<_> = stream.collect().await;

        assert_eq!(items.len(), 2);
        let second = items[1].as_ref().unwrap();
        assert_eq!(
            second.candidates[0].content.as_ref().unwrap().parts[0],
            Part::text("lo")
        );
    }

    #[tokio::test]
    async fn test_batch_embed_contents() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/text-embedding-004:batchEmbedContents"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "embeddings": [{"values": [0.1, 0.2]}, {"values": [0.3]}]
            })))
            .mount(&server)
            .await;

        let request = BatchEmbedContentsRequest {
            requests: vec![
                EmbedContentRequest {
                    model: "models/text-embedding-004".to_string(),
                    content: Content::text("a"),
                    output_dimensionality: None,
                },
                EmbedContentRequest {
                    model: "models/text-embedding-004".to_string(),
                    content: Content::text("b"),
                    output_dimensionality: None,
                },
            ],
        };

        let client = GeminiClient::new(Client::new(), server.uri(), "k");
        let resp = client
            .batch_embed_contents("text-embedding-004", &request)
            .await
            .unwrap();
        assert_eq!(resp.embeddings.len(), 2);
        assert_eq!(resp.embeddings[1].values, vec![0.3]);
    }
}
