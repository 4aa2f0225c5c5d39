//! OpenAI 流式响应处理模块
//!
//! 实现 Gemini → OpenAI 流式响应转换。
//!
//! 上游流与客户端之间通过容量为 1 的 channel 交接：生产者先预留发送槽位，
//! 再读取下一个上游事件，因此最多只有一个已生成的 chunk 等待客户端消费。

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::gemini::client::ResponseStream;
use crate::gemini::types::{GenerateContentResponse, UsageMetadata};

use super::error::AdapterError;
use super::response::{
    blocked_prompt, candidate_text, completion_id, map_finish_reason, prompt_block_reason,
    usage_from,
};
use super::types::{ChatCompletionChunk, ChunkChoice, Delta, ErrorResponse};

/// 转换后的流：惰性、只进、不可重放
pub type ChunkStream = ReceiverStream<StreamFrame>;

/// 流中的一帧
#[derive(Debug)]
pub enum StreamFrame {
    /// 增量 chunk
    Chunk(ChatCompletionChunk),
    /// 正常结束，之后不会再有任何帧
    Done,
    /// 上游出错，之后流结束且不会发送 Done
    Error(AdapterError),
}

impl StreamFrame {
    /// 编码为 SSE 文本
    pub fn to_sse(&self) -> String {
        match self {
            StreamFrame::Chunk(chunk) => chunk_to_sse(chunk),
            StreamFrame::Done => done_sse(),
            StreamFrame::Error(e) => error_sse(e),
        }
    }
}

/// 流处理上下文
pub struct StreamContext {
    /// 请求的模型名称（回显给客户端）
    pub model: String,
    /// 响应 ID，所有 chunk 共用
    pub response_id: String,
    /// 创建时间戳
    pub created: i64,
    /// 是否在流式响应中包含 usage
    pub include_usage: bool,
    /// 是否已发送 role
    pub role_sent: bool,
    /// 上游最近一次报告的 usage
    pub usage: Option<UsageMetadata>,
}

impl StreamContext {
    /// 创建新的流处理上下文
    pub fn new(model: impl Into<String>, include_usage: bool) -> Self {
        Self {
            model: model.into(),
            response_id: completion_id(),
            created: chrono::Utc::now().timestamp(),
            include_usage,
            role_sent: false,
            usage: None,
        }
    }

    /// 处理一个上游事件，恰好生成一个 chunk
    pub fn process_response(&mut self, resp: &GenerateContentResponse) -> ChatCompletionChunk {
        if resp.usage_metadata.is_some() {
            self.usage = resp.usage_metadata.clone();
        }

        // 第一个 chunk 带上 role
        let role = if self.role_sent {
            None
        } else {
            self.role_sent = true;
            Some("assistant".to_string())
        };

        let choices = resp
            .candidates
            .iter()
            .enumerate()
            .map(|(position, candidate)| {
                let text = candidate_text(candidate);
                ChunkChoice {
                    index: candidate.index.unwrap_or(position as u32),
                    delta: Delta {
                        role: role.clone(),
                        content: (!text.is_empty()).then_some(text),
                    },
                    finish_reason: candidate
                        .finish_reason
                        .as_ref()
                        .map(|reason| map_finish_reason(Some(reason)).to_string()),
                }
            })
            .collect();

        self.chunk(choices)
    }

    /// 结束时的 usage chunk（仅在 include_usage 时生成）
    pub fn usage_chunk(&self) -> Option<ChatCompletionChunk> {
        if !self.include_usage {
            return None;
        }
        let mut chunk = self.chunk(Vec::new());
        chunk.usage = Some(usage_from(self.usage.as_ref()));
        Some(chunk)
    }

    fn chunk(&self, choices: Vec<ChunkChoice>) -> ChatCompletionChunk {
        ChatCompletionChunk {
            id: self.response_id.clone(),
            object: "chat.completion.chunk".to_string(),
            created: self.created,
            model: self.model.clone(),
            choices,
            usage: None,
            system_fingerprint: None,
        }
    }
}

/// 将上游流桥接为 OpenAI chunk 流
///
/// 客户端断开（接收端被 drop）时生产者立即停止，上游流随之被 drop，不会继续读取。
pub fn bridge(mut upstream: ResponseStream, mut ctx: StreamContext) -> ChunkStream {
    let (tx, rx) = mpsc::channel(1);

    tokio::spawn(async move {
        loop {
            // 先预留槽位，再读取上游
            let Ok(permit) = tx.reserve().await else {
                tracing::debug!("客户端已断开，停止读取上游流");
                return;
            };

            let item = tokio::select! {
                item = upstream.next() => item,
                _ = tx.closed() => {
                    tracing::debug!("等待上游时客户端断开");
                    return;
                }
            };

            match item {
                Some(Ok(resp)) => {
                    // prompt 被拦截：没有 candidate，以错误结束
                    if let Some(reason) = prompt_block_reason(&resp)
                        .filter(|_| resp.candidates.is_empty())
                    {
                        tracing::warn!("上游拦截了 prompt: {}", reason);
                        permit.send(StreamFrame::Error(blocked_prompt(reason)));
                        return;
                    }
                    let chunk = ctx.process_response(&resp);
                    tracing::trace!(choices = chunk.choices.len(), "转发 chunk");
                    permit.send(StreamFrame::Chunk(chunk));
                }
                Some(Err(e)) => {
                    tracing::warn!("上游流中断: {}", e);
                    permit.send(StreamFrame::Error(e.into()));
                    return;
                }
                None => {
                    match ctx.usage_chunk() {
                        Some(usage) => {
                            permit.send(StreamFrame::Chunk(usage));
                            if let Ok(permit) = tx.reserve().await {
                                permit.send(StreamFrame::Done);
                            }
                        }
                        None => permit.send(StreamFrame::Done),
                    }
                    return;
                }
            }
        }
    });

    ReceiverStream::new(rx)
}

/// 将 chunk 转换为 SSE 字符串
pub fn chunk_to_sse(chunk: &ChatCompletionChunk) -> String {
    format!(
        "data: {}\n\n",
        serde_json::to_string(chunk).unwrap_or_default()
    )
}

/// 生成 [DONE] SSE 字符串
pub fn done_sse() -> String {
    "data: [DONE]\n\n".to_string()
}

/// 生成错误事件 SSE 字符串
pub fn error_sse(e: &AdapterError) -> String {
    format!(
        "event: error\ndata: {}\n\n",
        serde_json::to_string(&ErrorResponse::from(e)).unwrap_or_default()
    )
}
