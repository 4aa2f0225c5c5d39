//! Gemini 上游模块
//!
//! 提供 Gemini API 的类型定义与 HTTP 客户端。

pub mod client;
pub mod types;
