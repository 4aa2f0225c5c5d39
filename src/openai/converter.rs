//! OpenAI → Gemini 协议转换器
//!
//! 负责将 OpenAI Chat Completions / Embeddings 请求转换为 Gemini 请求结构。
//!
//! 角色映射：
//! - `system` / `developer` → `Role::System`，构建请求时提升为 `systemInstruction`
//! - `user` → `Role::User`
//! - `assistant` → `Role::Model`

use crate::gemini::client::model_resource_name;
use crate::gemini::types::{
    BatchEmbedContentsRequest, Content, EmbedContentRequest, GenerateContentRequest,
    GenerationConfig, HarmBlockThreshold, HarmCategory, Part, Role, SafetySetting,
};

use super::error::AdapterError;
use super::models::{Capability, ResolvedModel};
use super::types::{
    ChatCompletionRequest, ChatMessage, ContentPart, EmbeddingInput, EmbeddingRequest,
    MessageContent,
};

/// Gemini 支持的内联图片格式
const SUPPORTED_IMAGE_TYPES: [&str; 5] = [
    "image/png",
    "image/jpeg",
    "image/webp",
    "image/heic",
    "image/heif",
];

/// 将 OpenAI 消息列表逐条转换为 Gemini 内容
///
/// 每条消息对应一个 `Content`，顺序不变。
pub fn translate_chat(req: &ChatCompletionRequest) -> Result<Vec<Content>, AdapterError> {
    if req.messages.is_empty() {
        return Err(AdapterError::invalid_request("messages must not be empty"));
    }

    if req.tools.as_ref().is_some_and(|tools| !tools.is_empty()) {
        return Err(AdapterError::invalid_request(
            "tools are not supported by this gateway",
        ));
    }

    req.messages
        .iter()
        .enumerate()
        .map(|(index, msg)| convert_message(index, msg))
        .collect()
}

/// 转换单条消息
fn convert_message(index: usize, msg: &ChatMessage) -> Result<Content, AdapterError> {
    let role = map_role(index, &msg.role)?;

    if msg.tool_calls.as_ref().is_some_and(|calls| !calls.is_empty()) {
        return Err(AdapterError::invalid_request(format!(
            "message {}: tool_calls are not supported",
            index
        )));
    }

    let parts = match &msg.content {
        Some(MessageContent::Text(text)) => vec![Part::text(text.clone())],
        Some(MessageContent::Parts(parts)) => parts
            .iter()
            .map(|part| convert_part(index, role, part))
            .collect::<Result<Vec<_>, _>>()?,
        None => Vec::new(),
    };

    if parts.is_empty() {
        return Err(AdapterError::invalid_request(format!(
            "message {} has no content",
            index
        )));
    }

    Ok(Content::new(role, parts))
}

/// 角色映射
fn map_role(index: usize, role: &str) -> Result<Role, AdapterError> {
    match role {
        "system" | "developer" => Ok(Role::System),
        "user" => Ok(Role::User),
        "assistant" => Ok(Role::Model),
        "tool" | "function" => Err(AdapterError::invalid_request(format!(
            "message {}: role `{}` is not supported",
            index, role
        ))),
        other => Err(AdapterError::invalid_request(format!(
            "message {}: unknown role `{}`",
            index, other
        ))),
    }
}

/// 转换内容片段
fn convert_part(index: usize, role: Role, part: &ContentPart) -> Result<Part, AdapterError> {
    match part {
        ContentPart::Text { text } => Ok(Part::text(text.clone())),
        ContentPart::ImageUrl { image_url } => {
            // systemInstruction 只接受文本
            if role == Role::System {
                return Err(AdapterError::unsupported_content(
                    index,
                    "image_url in a system message",
                ));
            }
            parse_image_url(index, &image_url.url)
        }
        other => Err(AdapterError::unsupported_content(index, other.kind())),
    }
}

/// 解析图片 URL（仅支持 base64 data URL）
fn parse_image_url(index: usize, url: &str) -> Result<Part, AdapterError> {
    if url.starts_with("http://") || url.starts_with("https://") {
        // Gemini 无法直接拉取任意远程图片
        return Err(AdapterError::unsupported_content(index, "remote image URL"));
    }

    // data:image/png;base64,xxxxx
    let Some(rest) = url.strip_prefix("data:") else {
        return Err(AdapterError::invalid_request(format!(
            "message {}: invalid image URL",
            index
        )));
    };
    let Some((header, data)) = rest.split_once(',') else {
        return Err(AdapterError::invalid_request(format!(
            "message {}: malformed data URL",
            index
        )));
    };
    let Some(mime_type) = header.strip_suffix(";base64") else {
        return Err(AdapterError::invalid_request(format!(
            "message {}: data URL must be base64 encoded",
            index
        )));
    };

    let mime_type = match mime_type.to_ascii_lowercase().as_str() {
        "image/jpg" => "image/jpeg".to_string(),
        other => other.to_string(),
    };
    if !SUPPORTED_IMAGE_TYPES.contains(&mime_type.as_str()) {
        return Err(AdapterError::unsupported_content(
            index,
            format!("image type {}", mime_type),
        ));
    }

    Ok(Part::inline_data(mime_type, data))
}

/// 由转换后的内容构建 generateContent 请求
///
/// - 所有 `Role::System` 内容按顺序合并进 `systemInstruction`
/// - 相邻同角色的轮次合并，保证 user/model 交替
/// - 对话必须以 user 轮次开始
pub fn build_generate_request(
    contents: Vec<Content>,
    req: &ChatCompletionRequest,
    threshold: HarmBlockThreshold,
) -> Result<GenerateContentRequest, AdapterError> {
    let mut system_parts: Vec<Part> = Vec::new();
    let mut turns: Vec<Content> = Vec::new();

    for content in contents {
        if content.role == Some(Role::System) {
            system_parts.extend(content.parts);
            continue;
        }

        match turns.last_mut() {
            Some(last) if last.role == content.role => {
                tracing::debug!("合并相邻的 {:?} 消息", content.role);
                last.parts.extend(content.parts);
            }
            _ => turns.push(content),
        }
    }

    match turns.first() {
        None => {
            return Err(AdapterError::invalid_request(
                "at least one user or assistant message is required",
            ));
        }
        Some(first) if first.role == Some(Role::Model) => {
            return Err(AdapterError::invalid_request(
                "conversation must start with a user message",
            ));
        }
        _ => {}
    }

    let system_instruction = if system_parts.is_empty() {
        None
    } else {
        Some(Content {
            role: None,
            parts: system_parts,
        })
    };

    let generation_config = generation_config(req);

    Ok(GenerateContentRequest {
        contents: turns,
        system_instruction,
        safety_settings: safety_settings(threshold),
        generation_config: (!generation_config.is_empty()).then_some(generation_config),
    })
}

/// 采样参数映射，不做本地范围校验
pub fn generation_config(req: &ChatCompletionRequest) -> GenerationConfig {
    let response_mime_type = req
        .response_format
        .as_ref()
        .filter(|format| format.format_type == "json_object")
        .map(|_| "application/json".to_string());

    GenerationConfig {
        candidate_count: req.n,
        stop_sequences: req.stop.clone().map(|stop| stop.into_vec()),
        max_output_tokens: req.effective_max_tokens(),
        temperature: req.temperature,
        top_p: req.top_p,
        presence_penalty: req.presence_penalty,
        frequency_penalty: req.frequency_penalty,
        seed: req.seed,
        response_mime_type,
    }
}

/// 所有类别使用同一阈值
fn safety_settings(threshold: HarmBlockThreshold) -> Vec<SafetySetting> {
    HarmCategory::ALL
        .iter()
        .map(|&category| SafetySetting {
            category,
            threshold,
        })
        .collect()
}

/// 将 Embeddings 输入转换为 Gemini 内容（每个输入一个）
pub fn translate_embedding(req: &EmbeddingRequest) -> Result<Vec<Content>, AdapterError> {
    let inputs: Vec<&String> = match &req.input {
        EmbeddingInput::Single(text) => vec![text],
        EmbeddingInput::Many(texts) => texts.iter().collect(),
        EmbeddingInput::Tokens(_) | EmbeddingInput::TokenBatches(_) => {
            return Err(AdapterError::invalid_request(
                "token array inputs are not supported, send text instead",
            ));
        }
    };

    if inputs.is_empty() {
        return Err(AdapterError::invalid_request("input must not be empty"));
    }

    Ok(inputs.into_iter().map(|text| Content::text(text.clone())).collect())
}

/// 构建 batchEmbedContents 请求
///
/// 模型不支持时静默丢弃 `dimensions`。
pub fn build_embed_request(
    contents: Vec<Content>,
    model: &ResolvedModel,
    dimensions: Option<u32>,
) -> BatchEmbedContentsRequest {
    let output_dimensionality = match (dimensions, model.capability) {
        (
            Some(dim),
            Capability::Embedding {
                output_dimensionality: true,
            },
        ) => Some(dim),
        (Some(dim), _) => {
            tracing::debug!("模型 {} 不支持 dimensions={}，已忽略", model.upstream, dim);
            None
        }
        (None, _) => None,
    };

    let resource = model_resource_name(&model.upstream);
    BatchEmbedContentsRequest {
        requests: contents
            .into_iter()
            .map(|content| EmbedContentRequest {
                model: resource.clone(),
                content,
                output_dimensionality,
            })
            .collect(),
    }
}
