//! Gemini → OpenAI 响应转换

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use uuid::Uuid;

use crate::gemini::types::{
    BatchEmbedContentsResponse, Candidate, FinishReason, GenerateContentResponse, Part,
    UsageMetadata,
};

use super::error::AdapterError;
use super::types::{
    ChatCompletionResponse, Choice, EmbeddingData, EmbeddingResponse, EmbeddingUsage,
    EmbeddingVector, EncodingFormat, ResponseMessage, Usage,
};

/// 生成 chat completion ID
pub fn completion_id() -> String {
    format!("chatcmpl-{}", Uuid::new_v4().simple())
}

/// 结束原因映射
///
/// | Gemini | OpenAI |
/// |---|---|
/// | STOP | stop |
/// | MAX_TOKENS | length |
/// | SAFETY / RECITATION | content_filter |
/// | 其它 / 缺失 | stop |
pub fn map_finish_reason(reason: Option<&FinishReason>) -> &'static str {
    match reason {
        Some(FinishReason::MaxTokens) => "length",
        Some(FinishReason::Safety) | Some(FinishReason::Recitation) => "content_filter",
        Some(FinishReason::Stop) | Some(FinishReason::Other(_)) | None => "stop",
    }
}

/// 拼接候选中的文本（跳过思考内容）
pub fn candidate_text(candidate: &Candidate) -> String {
    let Some(content) = &candidate.content else {
        return String::new();
    };

    content
        .parts
        .iter()
        .filter_map(|part| match part {
            Part::Text { text, thought } if *thought != Some(true) => Some(text.as_str()),
            _ => None,
        })
        .collect()
}

/// Token 统计逐字段复制，缺失为 0
pub fn usage_from(metadata: Option<&UsageMetadata>) -> Usage {
    let Some(metadata) = metadata else {
        return Usage::default();
    };

    Usage {
        prompt_tokens: metadata.prompt_token_count.unwrap_or(0),
        completion_tokens: metadata.candidates_token_count.unwrap_or(0),
        total_tokens: metadata.total_token_count.unwrap_or(0),
    }
}

/// 上游拦截 prompt 时给出的原因
pub fn prompt_block_reason(resp: &GenerateContentResponse) -> Option<&str> {
    resp.prompt_feedback
        .as_ref()
        .and_then(|feedback| feedback.block_reason.as_deref())
}

pub fn blocked_prompt(reason: &str) -> AdapterError {
    AdapterError::EmptyUpstreamResponse(format!("prompt was blocked by upstream ({})", reason))
}

/// 将 generateContent 响应转换为 OpenAI 响应
///
/// `model` 回显客户端请求的模型名，而不是上游模型 ID。
pub fn translate_completion(
    resp: GenerateContentResponse,
    model: &str,
) -> Result<ChatCompletionResponse, AdapterError> {
    if resp.candidates.is_empty() {
        return Err(match prompt_block_reason(&resp) {
            Some(reason) => blocked_prompt(reason),
            None => AdapterError::EmptyUpstreamResponse(
                "upstream returned no candidates".to_string(),
            ),
        });
    }

    let choices = resp
        .candidates
        .iter()
        .enumerate()
        .map(|(index, candidate)| Choice {
            index: index as u32,
            message: ResponseMessage {
                role: "assistant".to_string(),
                content: Some(candidate_text(candidate)),
            },
            finish_reason: Some(map_finish_reason(candidate.finish_reason.as_ref()).to_string()),
        })
        .collect();

    Ok(ChatCompletionResponse {
        id: completion_id(),
        object: "chat.completion".to_string(),
        created: chrono::Utc::now().timestamp(),
        model: model.to_string(),
        choices,
        usage: usage_from(resp.usage_metadata.as_ref()),
        system_fingerprint: None,
    })
}

/// 将 batchEmbedContents 响应转换为 OpenAI 响应
///
/// 向量数量必须与输入数量一致，顺序不变。
pub fn translate_embeddings(
    resp: BatchEmbedContentsResponse,
    model: &str,
    expected: usize,
    format: EncodingFormat,
) -> Result<EmbeddingResponse, AdapterError> {
    if resp.embeddings.len() != expected {
        return Err(AdapterError::EmptyUpstreamResponse(format!(
            "expected {} embeddings, upstream returned {}",
            expected,
            resp.embeddings.len()
        )));
    }

    let data = resp
        .embeddings
        .into_iter()
        .enumerate()
        .map(|(index, embedding)| EmbeddingData {
            object: "embedding".to_string(),
            embedding: encode_vector(embedding.values, format),
            index: index as u32,
        })
        .collect();

    Ok(EmbeddingResponse {
        object: "list".to_string(),
        data,
        model: model.to_string(),
        // Gemini 不返回 embedding 的 token 统计
        usage: EmbeddingUsage::default(),
    })
}

fn encode_vector(values: Vec<f32>, format: EncodingFormat) -> EmbeddingVector {
    match format {
        EncodingFormat::Float => EmbeddingVector::Float(values),
        EncodingFormat::Base64 => {
            let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
            EmbeddingVector::Base64(BASE64.encode(bytes))
        }
    }
}
