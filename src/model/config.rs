use std::collections::HashMap;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::gemini::client::DEFAULT_BASE_URL;
use crate::gemini::types::HarmBlockThreshold;

/// 网关配置（config.json）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Gemini API 基础地址
    #[serde(default = "default_gemini_base_url")]
    pub gemini_base_url: String,

    /// 上游代理（http/https/socks5）
    #[serde(default)]
    pub proxy_url: Option<String>,

    /// 上游请求超时（秒）
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// 安全设置阈值
    #[serde(default)]
    pub safety_threshold: HarmBlockThreshold,

    /// 自定义模型映射（OpenAI 名称 → Gemini 名称）
    #[serde(default)]
    pub model_aliases: HashMap<String, String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_gemini_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_request_timeout_secs() -> u64 {
    600
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            gemini_base_url: default_gemini_base_url(),
            proxy_url: None,
            request_timeout_secs: default_request_timeout_secs(),
            safety_threshold: HarmBlockThreshold::default(),
            model_aliases: HashMap::new(),
        }
    }
}

impl Config {
    /// 从文件加载配置，文件不存在时使用默认值
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::info!("配置文件 {} 不存在，使用默认配置", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("读取配置文件失败: {}", path.display()))?;
        let config: Config = serde_json::from_str(&content)
            .with_context(|| format!("解析配置文件失败: {}", path.display()))?;
        Ok(config)
    }
}
