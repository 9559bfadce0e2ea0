//! 后端提供方解析（OpenAI / HuggingFace Router，均为 OpenAI 兼容格式）
//!
//! - `LLM_PROVIDER`：openai（默认）/ hf / huggingface / huggingface_inference / huggingface-router
//! - Key：`OPENAI_API_KEY`、`HF_TOKEN`，优先级随 provider 变化
//! - Base URL：`OPENAI_BASE_URL` > `HF_BASE_URL` > huggingface 默认 Router > 官方默认

pub const HF_ROUTER_BASE_URL: &str = "https://router.huggingface.co/v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    OpenAi,
    HuggingFace,
}

/// 解析后的连接信息；api_key 为空表示后端禁用
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderSettings {
    pub provider: Provider,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
}

impl ProviderSettings {
    /// 从进程环境变量解析；`configured_provider`、`configured_base_url` 来自配置文件，环境变量优先
    pub fn from_env(configured_provider: &str, configured_base_url: Option<&str>) -> Self {
        Self::resolve(
            |key| std::env::var(key).ok(),
            configured_provider,
            configured_base_url,
        )
    }

    pub fn resolve<F>(lookup: F, configured_provider: &str, configured_base_url: Option<&str>) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let raw_provider = get("LLM_PROVIDER").unwrap_or_else(|| configured_provider.to_string());
        let provider = normalize_provider(&raw_provider);

        let openai_key = get("OPENAI_API_KEY");
        let hf_token = get("HF_TOKEN");
        let api_key = match provider {
            Provider::HuggingFace => hf_token.or(openai_key),
            Provider::OpenAi => openai_key.or(hf_token),
        };

        let base_url = get("OPENAI_BASE_URL")
            .or_else(|| get("HF_BASE_URL"))
            .or_else(|| configured_base_url.map(String::from).filter(|s| !s.is_empty()))
            .or_else(|| match provider {
                Provider::HuggingFace => Some(HF_ROUTER_BASE_URL.to_string()),
                Provider::OpenAi => None,
            });

        Self {
            provider,
            api_key,
            base_url,
        }
    }

    pub fn enabled(&self) -> bool {
        self.api_key.is_some()
    }
}

/// 未知名称按 OpenAI 兼容处理
pub fn normalize_provider(raw: &str) -> Provider {
    match raw.trim().to_lowercase().as_str() {
        "hf" | "huggingface" | "huggingface_inference" | "huggingface-router" => {
            Provider::HuggingFace
        }
        _ => Provider::OpenAi,
    }
}
