//! OpenAI ↔ Gemini 适配器
//!
//! 串联模型映射、请求转换、上游调用与响应转换。
//! 每个操作先完成本地校验，再发起恰好一次上游调用，不做重试。

use crate::gemini::client::GenerativeClient;
use crate::gemini::types::{GenerateContentRequest, HarmBlockThreshold};

use super::converter::{
    build_embed_request, build_generate_request, translate_chat, translate_embedding,
};
use super::error::AdapterError;
use super::models::{Capability, ModelMapper, ResolvedModel};
use super::response::{translate_completion, translate_embeddings};
use super::stream::{ChunkStream, StreamContext, bridge};
use super::types::{
    ChatCompletionRequest, ChatCompletionResponse, EmbeddingRequest, EmbeddingResponse,
};

/// 适配器选项（进程级只读）
#[derive(Debug, Clone, Default)]
pub struct AdapterOptions {
    /// 安全设置阈值，应用到所有类别
    pub safety_threshold: HarmBlockThreshold,
}

/// 单次请求的适配器
///
/// 持有当前请求的上游客户端，借用进程共享的映射表与选项。
pub struct GeminiAdapter<'a, C: GenerativeClient> {
    client: C,
    mapper: &'a ModelMapper,
    options: &'a AdapterOptions,
}

impl<'a, C: GenerativeClient> GeminiAdapter<'a, C> {
    pub fn new(client: C, mapper: &'a ModelMapper, options: &'a AdapterOptions) -> Self {
        Self {
            client,
            mapper,
            options,
        }
    }

    /// 非流式聊天
    pub async fn complete(
        &self,
        req: &ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse, AdapterError> {
        let (model, request) = self.prepare_chat(req)?;
        let resp = self.client.generate_content(&model.upstream, &request).await?;
        translate_completion(resp, &req.model)
    }

    /// 流式聊天
    ///
    /// 消费适配器：上游流建立后即释放本次请求的客户端。
    pub async fn complete_stream(
        self,
        req: ChatCompletionRequest,
    ) -> Result<ChunkStream, AdapterError> {
        let (model, request) = self.prepare_chat(&req)?;
        let upstream = self
            .client
            .stream_generate_content(&model.upstream, &request)
            .await?;

        let include_usage = req.include_usage_in_stream();
        let ctx = StreamContext::new(req.model, include_usage);
        Ok(bridge(upstream, ctx))
    }

    /// 文本向量
    pub async fn embed(&self, req: &EmbeddingRequest) -> Result<EmbeddingResponse, AdapterError> {
        let model = self.mapper.resolve(&req.model);
        ensure_capability(&req.model, &model, Capability::is_embedding, "embeddings")?;

        let contents = translate_embedding(req)?;
        let expected = contents.len();
        let request = build_embed_request(contents, &model, req.dimensions);

        tracing::debug!(
            upstream = %model.upstream,
            inputs = expected,
            "调用 batchEmbedContents"
        );
        let resp = self
            .client
            .batch_embed_contents(&model.upstream, &request)
            .await?;

        translate_embeddings(
            resp,
            &req.model,
            expected,
            req.encoding_format.unwrap_or_default(),
        )
    }

    fn prepare_chat(
        &self,
        req: &ChatCompletionRequest,
    ) -> Result<(ResolvedModel, GenerateContentRequest), AdapterError> {
        let model = self.mapper.resolve(&req.model);
        ensure_capability(&req.model, &model, Capability::is_chat, "chat completions")?;

        let contents = translate_chat(req)?;
        let request = build_generate_request(contents, req, self.options.safety_threshold)?;

        tracing::debug!(
            model = %req.model,
            upstream = %model.upstream,
            turns = request.contents.len(),
            "请求转换完成"
        );
        Ok((model, request))
    }
}

/// 已知模型的能力检查；未知模型交由上游判断
fn ensure_capability(
    requested: &str,
    model: &ResolvedModel,
    check: fn(&Capability) -> bool,
    operation: &str,
) -> Result<(), AdapterError> {
    if !model.known || check(&model.capability) {
        return Ok(());
    }
    Err(AdapterError::invalid_request(format!(
        "model `{}` does not support {}",
        requested, operation
    )))
}
