//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / Mock）实现 LlmClient：一次请求只有 system + user 两条消息，
//! 返回原始文本与 token 用量；JSON 提取、重试、追踪由 ModelBackend 负责。

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 后端错误分类
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LlmError {
    /// 未配置 API Key：调用方应走确定性策略，不视为失败
    #[error("backend disabled: no API key configured")]
    Disabled,

    /// 可重试错误（网络、超时、限流、5xx）
    #[error("transient backend error: {0}")]
    Transient(String),

    /// 不可重试的请求错误（4xx、参数不支持等）
    #[error("backend rejected request: {0}")]
    Rejected(String),

    /// 直接解析、代码块提取、花括号截取均失败
    #[error("model output is not valid JSON: {raw}")]
    MalformedOutput { raw: String },
}

impl LlmError {
    pub fn kind(&self) -> &'static str {
        match self {
            LlmError::Disabled => "BackendDisabled",
            LlmError::Transient(_) => "BackendTransient",
            LlmError::Rejected(_) => "BackendRejected",
            LlmError::MalformedOutput { .. } => "MalformedModelOutput",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, LlmError::Transient(_))
    }

    /// 后端明确拒绝 response_format（json_object）时，允许降级为普通文本请求
    pub fn is_response_format_unsupported(&self) -> bool {
        matches!(self, LlmError::Rejected(msg) if msg.contains("response_format"))
    }
}

/// 生成参数；None 表示不下发该字段
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_completion_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    /// 单次请求超时（秒），由客户端的 HTTP 层生效
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

/// 单次完成请求
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub system: String,
    pub user: String,
    pub params: GenerationParams,
    /// 是否请求 `response_format = json_object`
    pub json_mode: bool,
}

/// 单次调用的 token 用量
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// 累计 token 用量
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenTotals {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl TokenTotals {
    pub fn merge(&mut self, other: TokenTotals) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
    }
}

/// 客户端内部的累计计数器
#[derive(Debug, Default)]
pub struct TokenUsage {
    prompt_tokens: AtomicU64,
    completion_tokens: AtomicU64,
    total_tokens: AtomicU64,
}

impl TokenUsage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, usage: &Usage) {
        self.prompt_tokens.fetch_add(u64::from(usage.prompt_tokens), Ordering::Relaxed);
        self.completion_tokens
            .fetch_add(u64::from(usage.completion_tokens), Ordering::Relaxed);
        self.total_tokens.fetch_add(u64::from(usage.total_tokens), Ordering::Relaxed);
    }

    pub fn totals(&self) -> TokenTotals {
        TokenTotals {
            prompt_tokens: self.prompt_tokens.load(Ordering::Relaxed),
            completion_tokens: self.completion_tokens.load(Ordering::Relaxed),
            total_tokens: self.total_tokens.load(Ordering::Relaxed),
        }
    }
}

/// 完成结果：原始文本 + 可选用量
#[derive(Debug, Clone, Default)]
pub struct Completion {
    pub content: String,
    pub usage: Option<Usage>,
}

impl Completion {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            usage: None,
        }
    }
}

/// LLM 客户端 trait
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 是否具备凭据；false 时 ModelBackend 直接返回 Disabled
    fn is_configured(&self) -> bool;

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, LlmError>;

    /// 本客户端累计的 token 用量；不统计的后端返回零
    fn token_usage(&self) -> TokenTotals {
        TokenTotals::default()
    }
}
