//! ModelBackend：角色与 LLM 之间的适配层
//!
//! system + user -> 结构化 JSON 对象。负责可重试错误的指数退避、json_object 不被支持时的一次降级、
//! 从文本中提取 JSON，并且每次调用（无论成败）恰好写一条 `llm_call` 追踪事件（prompt/response 已脱敏）。

use std::sync::Arc;
use std::time::Instant;

use serde_json::{json, Map, Value};

use crate::core::{AgentError, AgenticMode, Role};
use crate::llm::json::extract_json_object;
use crate::llm::redact::redact_secrets;
use crate::llm::{CompletionRequest, GenerationParams, LlmClient, LlmError, RetryConfig, Usage};
use crate::trace::{events, TraceCollector};

/// 写入追踪的调用上下文
#[derive(Debug, Clone, Copy)]
pub struct CallContext {
    pub agent: Role,
    pub step: u32,
    pub agentic_mode: AgenticMode,
}

/// 单次调用过程中累积的信息（用于追踪）
#[derive(Debug)]
struct CallRecord {
    attempts: u32,
    used_json_mode: bool,
    raw: String,
    usage: Option<Usage>,
}

impl Default for CallRecord {
    fn default() -> Self {
        Self {
            attempts: 0,
            used_json_mode: true,
            raw: String::new(),
            usage: None,
        }
    }
}

pub struct ModelBackend {
    client: Arc<dyn LlmClient>,
    model: String,
    params: GenerationParams,
    retry: RetryConfig,
    tracer: Arc<TraceCollector>,
}

impl ModelBackend {
    pub fn new(
        client: Arc<dyn LlmClient>,
        model: impl Into<String>,
        params: GenerationParams,
        retry: RetryConfig,
        tracer: Arc<TraceCollector>,
    ) -> Self {
        Self {
            client,
            model: model.into(),
            params,
            retry,
            tracer,
        }
    }

    /// 是否配置了凭据
    pub fn enabled(&self) -> bool {
        self.client.is_configured()
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn params(&self) -> &GenerationParams {
        &self.params
    }

    /// 请求一个 JSON 对象；LLM 层失败包装为 AgentError::Llm，追踪落盘失败为 AgentError::Trace/Io
    pub async fn chat_json(
        &self,
        system: &str,
        user: &str,
        ctx: &CallContext,
    ) -> Result<Map<String, Value>, AgentError> {
        let start = Instant::now();
        let mut record = CallRecord::default();
        let result = self.request(system, user, &mut record).await;
        let latency_ms = start.elapsed().as_secs_f64() * 1000.0;

        if let Err(e) = &result {
            tracing::warn!(agent = %ctx.agent, step = ctx.step, error = %e, "llm call failed");
        }

        let (status, error) = match &result {
            Ok(_) => ("success", String::new()),
            Err(e) => (status_of(e), redact_secrets(&format!("{}: {}", e.kind(), e))),
        };
        let payload = json!({
            "agent": ctx.agent.as_str(),
            "step": ctx.step,
            "agentic_mode": ctx.agentic_mode.as_str(),
            "status": status,
            "error": error,
            "model": self.model,
            "generation_config": serde_json::to_value(&self.params)?,
            "used_response_format_json_object": record.used_json_mode,
            "attempts": record.attempts,
            "latency_ms": (latency_ms * 1000.0).round() / 1000.0,
            "usage": record.usage.map(|u| serde_json::to_value(u)).transpose()?.unwrap_or_else(|| json!({})),
            "system_prompt": redact_secrets(system),
            "user_prompt": redact_secrets(user),
            "raw_response": redact_secrets(&record.raw),
            "parsed_output": result.as_ref().ok().cloned().map(Value::Object),
        });
        self.tracer.log_event(events::LLM_CALL, ctx.step, payload)?;

        result.map_err(AgentError::from)
    }

    async fn request(
        &self,
        system: &str,
        user: &str,
        record: &mut CallRecord,
    ) -> Result<Map<String, Value>, LlmError> {
        if !self.enabled() {
            return Err(LlmError::Disabled);
        }

        let mut attempt = 0;
        loop {
            attempt += 1;
            record.attempts = attempt;
            let request = CompletionRequest {
                model: self.model.clone(),
                system: system.to_string(),
                user: user.to_string(),
                params: self.params.clone(),
                json_mode: record.used_json_mode,
            };
            match self.client.complete(&request).await {
                Ok(completion) => {
                    record.raw = completion.content;
                    record.usage = completion.usage;
                    break;
                }
                Err(e) if record.used_json_mode && e.is_response_format_unsupported() => {
                    tracing::info!(model = %self.model, "response_format unsupported, retrying as plain text");
                    record.used_json_mode = false;
                    attempt -= 1;
                }
                Err(e) if e.is_retryable() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay_after(attempt);
                    tracing::warn!(attempt, ?delay, error = %e, "transient llm error, backing off");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }

        extract_json_object(&record.raw)
    }
}

fn status_of(err: &LlmError) -> &'static str {
    match err {
        LlmError::Disabled => "disabled",
        LlmError::Transient(_) => "transient_error",
        LlmError::Rejected(_) => "api_error",
        LlmError::MalformedOutput { .. } => "parse_error",
    }
}
