//! OpenAI API 类型定义

use serde::{Deserialize, Serialize};

use super::error::AdapterError;

// === 错误响应 ===

/// OpenAI API 错误响应
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

/// 错误详情
#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub message: String,
    #[serde(rename = "type")]
    pub error_type: String,
    pub param: Option<String>,
    pub code: Option<String>,
}

impl ErrorResponse {
    /// 创建新的错误响应
    pub fn new(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                message: message.into(),
                error_type: error_type.into(),
                param: None,
                code: None,
            },
        }
    }

    /// 创建认证错误响应
    pub fn authentication_error() -> Self {
        Self {
            error: ErrorDetail {
                message: "Missing API key: expected `Authorization: Bearer <key>`".to_string(),
                error_type: "invalid_request_error".to_string(),
                param: None,
                code: Some("invalid_api_key".to_string()),
            },
        }
    }
}

impl From<&AdapterError> for ErrorResponse {
    fn from(e: &AdapterError) -> Self {
        Self {
            error: ErrorDetail {
                message: e.to_string(),
                error_type: e.error_type().to_string(),
                param: None,
                code: Some(e.code().to_string()),
            },
        }
    }
}

// === Chat Completions 请求类型 ===

/// Chat Completions 请求体
#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub max_tokens: Option<i32>,
    #[serde(default)]
    pub max_completion_tokens: Option<i32>,
    #[serde(default)]
    pub stream: Option<bool>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub top_p: Option<f64>,
    /// 候选数量
    #[serde(default)]
    pub n: Option<u32>,
    #[serde(default)]
    pub stop: Option<StopSequences>,
    #[serde(default)]
    pub presence_penalty: Option<f64>,
    #[serde(default)]
    pub frequency_penalty: Option<f64>,
    #[serde(default)]
    pub seed: Option<i64>,
    #[serde(default)]
    pub response_format: Option<ResponseFormat>,
    /// 不支持工具调用，非空时拒绝请求
    #[serde(default)]
    pub tools: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    pub tool_choice: Option<serde_json::Value>,
    #[serde(default)]
    pub user: Option<String>,
    /// 流式响应选项
    #[serde(default)]
    pub stream_options: Option<StreamOptions>,
}

impl ChatCompletionRequest {
    /// 获取有效的 max_tokens 值
    /// 优先使用 max_completion_tokens，其次使用 max_tokens，均未设置时交由上游决定
    pub fn effective_max_tokens(&self) -> Option<i32> {
        self.max_completion_tokens.or(self.max_tokens)
    }

    /// 是否启用流式响应
    pub fn is_stream(&self) -> bool {
        self.stream.unwrap_or(false)
    }

    /// 是否在流式响应中包含 usage
    pub fn include_usage_in_stream(&self) -> bool {
        self.stream_options
            .as_ref()
            .map(|o| o.include_usage.unwrap_or(false))
            .unwrap_or(false)
    }
}

/// 停止序列（字符串或字符串数组）
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum StopSequences {
    One(String),
    Many(Vec<String>),
}

impl StopSequences {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            StopSequences::One(s) => vec![s],
            StopSequences::Many(v) => v,
        }
    }
}

/// 输出格式
#[derive(Debug, Clone, Deserialize)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub format_type: String,
}

/// 流式响应选项
#[derive(Debug, Clone, Deserialize)]
pub struct StreamOptions {
    #[serde(default)]
    pub include_usage: Option<bool>,
}

/// 聊天消息
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatMessage {
    pub role: String,
    /// 可以是 string 或 ContentPart 数组
    pub content: Option<MessageContent>,
    /// 工具调用（assistant 消息），不支持
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<serde_json::Value>>,
    /// 工具调用 ID（tool 消息），不支持
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// 消息名称（可选）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// 消息内容（可以是字符串或内容部分数组）
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

/// 内容部分
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum ContentPart {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image_url")]
    ImageUrl { image_url: ImageUrl },
    #[serde(rename = "input_audio")]
    InputAudio { input_audio: serde_json::Value },
    #[serde(rename = "file")]
    File { file: serde_json::Value },
    /// 未知类型
    #[serde(other)]
    Unknown,
}

impl ContentPart {
    /// 片段类型名（用于错误信息）
    pub fn kind(&self) -> &'static str {
        match self {
            ContentPart::Text { .. } => "text",
            ContentPart::ImageUrl { .. } => "image_url",
            ContentPart::InputAudio { .. } => "input_audio",
            ContentPart::File { .. } => "file",
            ContentPart::Unknown => "unknown content part type",
        }
    }
}

/// 图片 URL
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ImageUrl {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

// === Chat Completions 响应类型 ===

/// Chat Completions 响应
#[derive(Debug, Serialize)]
pub struct ChatCompletionResponse {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<Choice>,
    pub usage: Usage,
    pub system_fingerprint: Option<String>,
}

/// 选择
#[derive(Debug, Serialize)]
pub struct Choice {
    pub index: u32,
    pub message: ResponseMessage,
    pub finish_reason: Option<String>,
}

/// 响应消息
#[derive(Debug, Serialize)]
pub struct ResponseMessage {
    pub role: String,
    pub content: Option<String>,
}

/// Token 使用统计
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Usage {
    pub prompt_tokens: i32,
    pub completion_tokens: i32,
    pub total_tokens: i32,
}

// === 流式响应类型 ===

/// 流式响应 chunk
#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionChunk {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<ChunkChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    pub system_fingerprint: Option<String>,
}

/// 流式选择
#[derive(Debug, Clone, Serialize)]
pub struct ChunkChoice {
    pub index: u32,
    pub delta: Delta,
    pub finish_reason: Option<String>,
}

/// 增量内容
#[derive(Debug, Clone, Default, Serialize)]
pub struct Delta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

// === Embeddings ===

/// Embeddings 请求体
#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingRequest {
    pub model: String,
    pub input: EmbeddingInput,
    #[serde(default)]
    pub dimensions: Option<u32>,
    #[serde(default)]
    pub encoding_format: Option<EncodingFormat>,
    #[serde(default)]
    pub user: Option<String>,
}

/// Embedding 输入
///
/// token 数组形式可以被解析，但转换时会被拒绝。
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum EmbeddingInput {
    Single(String),
    Many(Vec<String>),
    Tokens(Vec<i64>),
    TokenBatches(Vec<Vec<i64>>),
}

/// 向量编码格式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncodingFormat {
    #[default]
    Float,
    Base64,
}

/// Embeddings 响应
#[derive(Debug, Serialize)]
pub struct EmbeddingResponse {
    pub object: String,
    pub data: Vec<EmbeddingData>,
    pub model: String,
    pub usage: EmbeddingUsage,
}

#[derive(Debug, Serialize)]
pub struct EmbeddingData {
    pub object: String,
    pub embedding: EmbeddingVector,
    pub index: u32,
}

/// 向量：浮点数组或 base64 字符串
#[derive(Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EmbeddingVector {
    Float(Vec<f32>),
    Base64(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EmbeddingUsage {
    pub prompt_tokens: i32,
    pub total_tokens: i32,
}

// === Models ===

/// 模型列表
#[derive(Debug, Serialize)]
pub struct ModelList {
    pub object: String,
    pub data: Vec<ModelInfo>,
}

/// 模型信息
#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub owned_by: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_content_parts() {
        let msg: ChatMessage = serde_json::from_value(json!({
            "role": "user",
            "content": [
                {"type": "text", "text": "describe"},
                {"type": "image_url", "image_url": {"url": "data:image/png;base64,AA=="}},
                {"type": "input_audio", "input_audio": {"data": "x", "format": "wav"}},
                {"type": "hologram"}
            ]
        }))
        .unwrap();

        let Some(MessageContent::Parts(parts)) = msg.content else {
            panic!("expected parts");
        };
        let kinds: Vec<_> = parts.iter().map(ContentPart::kind).collect();
        assert_eq!(
            kinds,
            vec!["text", "image_url", "input_audio", "unknown content part type"]
        );
    }

    #[test]
    fn test_stop_and_max_tokens() {
        let req: ChatCompletionRequest = serde_json::from_value(json!({
            "model": "gpt-4",
            "messages": [{"role": "user", "content": "hi"}],
            "max_tokens": 10,
            "max_completion_tokens": 20,
            "stop": "END"
        }))
        .unwrap();

        assert_eq!(req.effective_max_tokens(), Some(20));
        assert_eq!(req.stop.clone().unwrap().into_vec(), vec!["END".to_string()]);
        assert!(!req.is_stream());
        assert!(!req.include_usage_in_stream());
    }

    #[test]
    fn test_embedding_input_shapes() {
        let single: EmbeddingInput = serde_json::from_value(json!("a")).unwrap();
        assert!(matches!(single, EmbeddingInput::Single(_)));
        let many: EmbeddingInput = serde_json::from_value(json!(["a", "b"])).unwrap();
        assert!(matches!(many, EmbeddingInput::Many(ref v) if v.len() == 2));
        let tokens: EmbeddingInput = serde_json::from_value(json!([1, 2, 3])).unwrap();
        assert!(matches!(tokens, EmbeddingInput::Tokens(_)));
    }

    #[test]
    fn test_error_response_from_adapter_error() {
        let err = AdapterError::invalid_request("messages must not be empty");
        let body = serde_json::to_value(ErrorResponse::from(&err)).unwrap();
        assert_eq!(
            body,
            json!({
                "error": {
                    "message": "messages must not be empty",
                    "type": "invalid_request_error",
                    "param": null,
                    "code": "invalid_request"
                }
            })
        );
    }
}
