//! 通用模块

pub mod auth;
