//! Mock LLM 客户端（用于测试，无需 API）
//!
//! 按顺序弹出预置的响应；队列耗尽后返回 `{}`。同时记录收到的请求，便于断言 prompt 与 json_mode。
//! 带 usage 的响应计入累计用量。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{Completion, CompletionRequest, LlmClient, LlmError, TokenTotals, TokenUsage, Usage};

/// 收到的请求快照
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub system: String,
    pub user: String,
    pub json_mode: bool,
}

#[derive(Debug)]
pub struct MockLlmClient {
    configured: bool,
    responses: Mutex<VecDeque<Result<Completion, LlmError>>>,
    requests: Mutex<Vec<RecordedRequest>>,
    usage: TokenUsage,
}

impl Default for MockLlmClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self {
            configured: true,
            responses: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            usage: TokenUsage::new(),
        }
    }

    /// 模拟未配置 API Key 的后端
    pub fn unconfigured() -> Self {
        Self {
            configured: false,
            ..Self::new()
        }
    }

    pub fn with_text(self, content: impl Into<String>) -> Self {
        self.push(Ok(Completion::text(content)));
        self
    }

    /// 带 token 用量的文本响应
    pub fn with_text_and_usage(self, content: impl Into<String>, usage: Usage) -> Self {
        self.push(Ok(Completion {
            content: content.into(),
            usage: Some(usage),
        }));
        self
    }

    pub fn with_error(self, err: LlmError) -> Self {
        self.push(Err(err));
        self
    }

    pub fn push(&self, response: Result<Completion, LlmError>) {
        if let Ok(mut q) = self.responses.lock() {
            q.push_back(response);
        }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    fn is_configured(&self) -> bool {
        self.configured
    }

    fn token_usage(&self) -> TokenTotals {
        self.usage.totals()
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, LlmError> {
        if let Ok(mut r) = self.requests.lock() {
            r.push(RecordedRequest {
                system: request.system.clone(),
                user: request.user.clone(),
                json_mode: request.json_mode,
            });
        }
        if !self.configured {
            return Err(LlmError::Disabled);
        }
        let response = self
            .responses
            .lock()
            .ok()
            .and_then(|mut q| q.pop_front())
            .unwrap_or_else(|| Ok(Completion::text("{}")));
        if let Ok(Completion { usage: Some(u), .. }) = &response {
            self.usage.record(u);
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::GenerationParams;

    fn request() -> CompletionRequest {
        CompletionRequest {
            model: "mock".to_string(),
            system: "s".to_string(),
            user: "u".to_string(),
            params: GenerationParams::default(),
            json_mode: true,
        }
    }

    #[tokio::test]
    async fn test_usage_accumulates_across_completions() {
        let usage = Usage {
            prompt_tokens: 10,
            completion_tokens: 4,
            total_tokens: 14,
        };
        let client = MockLlmClient::new()
            .with_text_and_usage("{}", usage)
            .with_text("{}")
            .with_text_and_usage("{}", usage);
        for _ in 0..3 {
            client.complete(&request()).await.unwrap();
        }
        assert_eq!(
            client.token_usage(),
            TokenTotals {
                prompt_tokens: 20,
                completion_tokens: 8,
                total_tokens: 28,
            }
        );
        assert_eq!(client.requests().len(), 3);
    }
}
