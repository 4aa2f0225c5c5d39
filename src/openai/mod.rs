//! OpenAI 兼容 API 模块
//!
//! 提供 OpenAI Chat Completions / Embeddings 兼容接口，
//! 将 OpenAI 格式请求转换为 Gemini API 格式。

mod adapter;
mod converter;
mod error;
mod handlers;
mod models;
mod response;
mod router;
mod stream;
mod types;

pub use adapter::AdapterOptions;
pub use handlers::AppState;
pub use models::ModelMapper;
pub use router::create_router;
