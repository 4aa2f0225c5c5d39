//! 模型名称映射
//!
//! 将 OpenAI 风格的模型名（及家族别名）映射为 Gemini 模型 ID，并标注能力类型。
//! 映射表在启动时构建一次，之后只读，通过 `Arc` 共享。

use std::collections::HashMap;

use super::types::{ModelInfo, ModelList};

pub const GEMINI_2_5_PRO: &str = "gemini-2.5-pro";
pub const GEMINI_2_5_FLASH: &str = "gemini-2.5-flash";
pub const GEMINI_2_5_FLASH_LITE: &str = "gemini-2.5-flash-lite";
pub const TEXT_EMBEDDING_004: &str = "text-embedding-004";
pub const GEMINI_EMBEDDING_001: &str = "gemini-embedding-001";

/// 模型列表中的创建时间戳
const MODEL_CREATED_AT: i64 = 1686935002;

/// 模型能力
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Chat,
    Embedding {
        /// 是否支持 `outputDimensionality`
        output_dimensionality: bool,
    },
}

impl Capability {
    pub fn is_chat(&self) -> bool {
        matches!(self, Capability::Chat)
    }

    pub fn is_embedding(&self) -> bool {
        matches!(self, Capability::Embedding { .. })
    }
}

/// 映射目标
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelRoute {
    pub upstream: String,
    pub capability: Capability,
}

/// 解析结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedModel {
    /// Gemini 模型 ID
    pub upstream: String,
    pub capability: Capability,
    /// 是否命中映射表；未命中时原样透传
    pub known: bool,
}

/// 内置的 Gemini 模型及其能力
const NATIVE_MODELS: [(&str, Capability); 5] = [
    (GEMINI_2_5_PRO, Capability::Chat),
    (GEMINI_2_5_FLASH, Capability::Chat),
    (GEMINI_2_5_FLASH_LITE, Capability::Chat),
    (
        TEXT_EMBEDDING_004,
        Capability::Embedding {
            output_dimensionality: true,
        },
    ),
    (
        GEMINI_EMBEDDING_001,
        Capability::Embedding {
            output_dimensionality: true,
        },
    ),
];

/// OpenAI 别名 → Gemini 模型
const OPENAI_ALIASES: [(&str, &str); 11] = [
    // 轻量/快速
    ("gpt-3.5-turbo", GEMINI_2_5_FLASH),
    ("gpt-4o-mini", GEMINI_2_5_FLASH),
    ("gpt-4o", GEMINI_2_5_FLASH),
    // 大模型
    ("gpt-4", GEMINI_2_5_PRO),
    ("gpt-4-turbo", GEMINI_2_5_PRO),
    ("gpt-4-turbo-preview", GEMINI_2_5_PRO),
    ("gpt-4.1", GEMINI_2_5_PRO),
    // embedding
    ("text-embedding-ada-002", TEXT_EMBEDDING_004),
    ("text-embedding-3-small", TEXT_EMBEDDING_004),
    ("text-embedding-3-large", TEXT_EMBEDDING_004),
    ("embedding-001", "embedding-001"),
];

/// 模型名称映射器
#[derive(Debug, Clone)]
pub struct ModelMapper {
    routes: HashMap<String, ModelRoute>,
}

impl Default for ModelMapper {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelMapper {
    /// 使用内置映射表创建
    pub fn new() -> Self {
        let mut routes = HashMap::new();

        for (id, capability) in NATIVE_MODELS {
            routes.insert(
                id.to_string(),
                ModelRoute {
                    upstream: id.to_string(),
                    capability,
                },
            );
        }

        for (alias, target) in OPENAI_ALIASES {
            routes.insert(
                alias.to_string(),
                ModelRoute {
                    upstream: target.to_string(),
                    capability: infer_capability(target),
                },
            );
        }

        Self { routes }
    }

    /// 内置映射表 + 自定义别名（自定义优先）
    pub fn with_aliases(aliases: &HashMap<String, String>) -> Self {
        let mut mapper = Self::new();
        for (alias, target) in aliases {
            tracing::info!("自定义模型映射: {} -> {}", alias, target);
            let capability = mapper
                .routes
                .get(target.as_str())
                .map(|route| route.capability)
                .unwrap_or_else(|| infer_capability(target));
            mapper.routes.insert(
                alias.clone(),
                ModelRoute {
                    upstream: target.clone(),
                    capability,
                },
            );
        }
        mapper
    }

    /// 解析模型名
    ///
    /// 未知模型原样透传，由上游判断是否有效。
    pub fn resolve(&self, model: &str) -> ResolvedModel {
        match self.routes.get(model) {
            Some(route) => ResolvedModel {
                upstream: route.upstream.clone(),
                capability: route.capability,
                known: true,
            },
            None => ResolvedModel {
                upstream: model.to_string(),
                capability: infer_capability(model),
                known: false,
            },
        }
    }
}

/// 根据模型 ID 推断能力
///
/// 只有已知支持维度参数的 embedding 模型才会转发 `dimensions`。
fn infer_capability(model: &str) -> Capability {
    if !model.contains("embedding") {
        return Capability::Chat;
    }
    let id = model.rsplit('/').next().unwrap_or(model);
    Capability::Embedding {
        output_dimensionality: id == TEXT_EMBEDDING_004 || id.starts_with("gemini-embedding"),
    }
}

/// 静态模型列表
pub fn list_models() -> ModelList {
    ModelList {
        object: "list".to_string(),
        data: NATIVE_MODELS
            .iter()
            .map(|(id, _)| model_info(id))
            .collect(),
    }
}

/// 单个模型信息
pub fn model_info(id: &str) -> ModelInfo {
    ModelInfo {
        id: id.to_string(),
        object: "model".to_string(),
        created: MODEL_CREATED_AT,
        owned_by: "google".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fast_and_large_aliases_are_distinct() {
        let mapper = ModelMapper::new();
        let fast = mapper.resolve("gpt-3.5-turbo");
        let large = mapper.resolve("gpt-4");

        assert_eq!(fast.upstream, GEMINI_2_5_FLASH);
        assert_eq!(large.upstream, GEMINI_2_5_PRO);
        assert_ne!(fast.upstream, large.upstream);
        assert!(fast.known && large.known);
        assert!(fast.capability.is_chat());
    }

    #[test]
    fn test_unknown_model_passes_through() {
        let mapper = ModelMapper::new();
        let resolved = mapper.resolve("some-future-model");
        assert_eq!(resolved.upstream, "some-future-model");
        assert!(!resolved.known);
        assert_eq!(resolved.capability, Capability::Chat);
    }

    #[test]
    fn test_embedding_capability() {
        let mapper = ModelMapper::new();
        assert_eq!(
            mapper.resolve("text-embedding-3-small"),
            ResolvedModel {
                upstream: TEXT_EMBEDDING_004.to_string(),
                capability: Capability::Embedding {
                    output_dimensionality: true
                },
                known: true,
            }
        );
        assert_eq!(
            mapper.resolve("embedding-001").capability,
            Capability::Embedding {
                output_dimensionality: false
            }
        );
    }

    #[test]
    fn test_custom_aliases_override() {
        let mut aliases = HashMap::new();
        aliases.insert("gpt-4".to_string(), GEMINI_2_5_FLASH_LITE.to_string());
        aliases.insert("my-embed".to_string(), GEMINI_EMBEDDING_001.to_string());

        let mapper = ModelMapper::with_aliases(&aliases);
        assert_eq!(mapper.resolve("gpt-4").upstream, GEMINI_2_5_FLASH_LITE);
        assert!(mapper.resolve("my-embed").capability.is_embedding());
        // 其它内置映射不受影响
        assert_eq!(mapper.resolve("gpt-4o").upstream, GEMINI_2_5_FLASH);
    }

    #[test]
    fn test_list_models_is_static() {
        let list = list_models();
        assert_eq!(list.object, "list");
        let ids: Vec<_> = list.data.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                GEMINI_2_5_PRO,
                GEMINI_2_5_FLASH,
                GEMINI_2_5_FLASH_LITE,
                TEXT_EMBEDDING_004,
                GEMINI_EMBEDDING_001
            ]
        );
        assert!(list.data.iter().all(|m| m.owned_by == "google"));
    }
}
