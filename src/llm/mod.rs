//! LLM 层：客户端抽象与实现（OpenAI 兼容 / Mock），以及面向角色的 ModelBackend 适配层

pub mod backend;
pub mod json;
pub mod mock;
pub mod openai;
pub mod provider;
pub mod redact;
pub mod retry;
pub mod traits;

pub use backend::{CallContext, ModelBackend};
pub use json::extract_json_object;
pub use mock::MockLlmClient;
pub use openai::OpenAiClient;
pub use provider::{Provider, ProviderSettings};
pub use redact::redact_secrets;
pub use retry::RetryConfig;
pub use traits::{
    Completion, CompletionRequest, GenerationParams, LlmClient, LlmError, TokenTotals, TokenUsage,
    Usage,
};
