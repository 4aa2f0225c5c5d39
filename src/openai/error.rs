//! 转换层错误

use crate::gemini::client::UpstreamError;

/// 转换层错误
///
/// 只区分错误类型，不涉及 HTTP 状态码，由 handler 负责映射。
#[derive(Debug, Clone, thiserror::Error)]
pub enum AdapterError {
    /// 客户端输入非法，在调用上游前检出
    #[error("{0}")]
    InvalidRequest(String),

    /// 上游无法表示的内容片段
    #[error("message {index} contains unsupported content: {kind}")]
    UnsupportedContent { index: usize, kind: String },

    /// 上游返回逻辑错误
    #[error("upstream rejected the request (HTTP {status}): {message}")]
    UpstreamRejected { status: u16, message: String },

    /// 无法到达上游
    #[error("upstream transport failure: {0}")]
    UpstreamTransport(String),

    /// 上游未返回期望的结果
    #[error("empty upstream response: {0}")]
    EmptyUpstreamResponse(String),
}

impl AdapterError {
    pub fn invalid_request(message: impl Into<String>) -> Self {
        AdapterError::InvalidRequest(message.into())
    }

    pub fn unsupported_content(index: usize, kind: impl Into<String>) -> Self {
        AdapterError::UnsupportedContent {
            index,
            kind: kind.into(),
        }
    }

    /// 机器可读的错误代码
    pub fn code(&self) -> &'static str {
        match self {
            AdapterError::InvalidRequest(_) => "invalid_request",
            AdapterError::UnsupportedContent { .. } => "unsupported_content",
            AdapterError::UpstreamRejected { .. } => "upstream_rejected",
            AdapterError::UpstreamTransport(_) => "upstream_transport",
            AdapterError::EmptyUpstreamResponse(_) => "empty_upstream_response",
        }
    }

    /// OpenAI 错误响应中的 `type` 字段
    pub fn error_type(&self) -> &'static str {
        match self {
            AdapterError::InvalidRequest(_) | AdapterError::UnsupportedContent { .. } => {
                "invalid_request_error"
            }
            _ => "upstream_error",
        }
    }
}

impl From<UpstreamError> for AdapterError {
    fn from(e: UpstreamError) -> Self {
        match e {
            UpstreamError::Rejected { status, message } => {
                AdapterError::UpstreamRejected { status, message }
            }
            UpstreamError::Transport(message) => AdapterError::UpstreamTransport(message),
        }
    }
}
