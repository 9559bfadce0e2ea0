//! OpenAI 兼容 API 客户端
//!
//! 通过 async_openai 调用任意 OpenAI 兼容端点（可配置 base_url）；支持 OpenAI、HuggingFace Router、自建代理等。
//! 请求超时由内部 reqwest Client 控制；错误按是否可重试映射为 LlmError。

use std::time::Duration;

use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::chat::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs, ResponseFormat,
};
use async_openai::Client;
use async_trait::async_trait;

use crate::llm::provider::ProviderSettings;
use crate::llm::{
    Completion, CompletionRequest, LlmClient, LlmError, TokenTotals, TokenUsage, Usage,
};

/// 未配置 timeout_secs 时的请求超时
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// OpenAI 兼容客户端：持有 Client；api_key 缺失时 is_configured() 为 false
pub struct OpenAiClient {
    client: Client<OpenAIConfig>,
    configured: bool,
    usage: TokenUsage,
}

impl OpenAiClient {
    pub fn new(settings: &ProviderSettings, timeout_secs: Option<u64>) -> Self {
        let mut config = OpenAIConfig::new();
        if let Some(url) = &settings.base_url {
            config = config.with_api_base(url);
        }
        if let Some(key) = &settings.api_key {
            config = config.with_api_key(key);
        }

        let timeout = Duration::from_secs(timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS));
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();

        Self {
            client: Client::with_config(config).with_http_client(http),
            configured: settings.enabled(),
            usage: TokenUsage::new(),
        }
    }

    fn to_openai_messages(
        &self,
        request: &CompletionRequest,
    ) -> Result<Vec<ChatCompletionRequestMessage>, LlmError> {
        let system = ChatCompletionRequestSystemMessageArgs::default()
            .content(request.system.clone())
            .build()
            .map_err(map_openai_error)?;
        let user = ChatCompletionRequestUserMessageArgs::default()
            .content(request.user.clone())
            .build()
            .map_err(map_openai_error)?;
        Ok(vec![
            ChatCompletionRequestMessage::System(system),
            ChatCompletionRequestMessage::User(user),
        ])
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    fn is_configured(&self) -> bool {
        self.configured
    }

    fn token_usage(&self) -> TokenTotals {
        self.usage.totals()
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, LlmError> {
        if !self.configured {
            return Err(LlmError::Disabled);
        }

        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(&request.model)
            .messages(self.to_openai_messages(request)?);

        let p = &request.params;
        if let Some(v) = p.temperature {
            args.temperature(v);
        }
        if let Some(v) = p.top_p {
            args.top_p(v);
        }
        if let Some(v) = p.max_completion_tokens {
            args.max_completion_tokens(v);
        }
        if let Some(v) = p.frequency_penalty {
            args.frequency_penalty(v);
        }
        if let Some(v) = p.presence_penalty {
            args.presence_penalty(v);
        }
        if let Some(v) = p.seed {
            args.seed(v);
        }
        if request.json_mode {
            args.response_format(ResponseFormat::JsonObject);
        }

        let body = args.build().map_err(map_openai_error)?;
        let response = self
            .client
            .chat()
            .create(body)
            .await
            .map_err(map_openai_error)?;

        let usage = response.usage.as_ref().map(|u| Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        });
        if let Some(u) = &usage {
            self.usage.record(u);
        }

        let content = response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_else(|| "{}".to_string());

        Ok(Completion { content, usage })
    }
}

/// 网络层错误与限流/服务端过载视为可重试，其余为请求被拒
fn map_openai_error(err: OpenAIError) -> LlmError {
    match err {
        OpenAIError::Reqwest(e) => LlmError::Transient(e.to_string()),
        OpenAIError::ApiError(api) => {
            let text = api.to_string();
            if is_transient_message(&text) {
                LlmError::Transient(text)
            } else {
                LlmError::Rejected(text)
            }
        }
        other => LlmError::Rejected(other.to_string()),
    }
}

fn is_transient_message(text: &str) -> bool {
    let lower = text.to_lowercase();
    ["rate limit", "rate_limit", "overloaded", "server_error", "timeout", "temporarily"]
        .iter()
        .any(|needle| lower.contains(needle))
}
