//! ModelBacked 策略：渲染角色模板 -> ModelBackend.chat_json -> 校验/转换为结构化输出

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::core::{AgentError, AgenticMode, Role};
use crate::llm::{CallContext, ModelBackend};
use crate::prompts::{PromptTemplates, TemplateVars};
use crate::roles::strategy::Decide;

/// 角色契约：上下文如何变成模板变量，模型 JSON 如何变成输出
pub trait RoleSpec: Send + Sync + 'static {
    type Context: Send + Sync;
    type Output: Send;

    const ROLE: Role;

    /// 本角色提供给模板的变量名（不含共享上下文），用于启动前检查
    const VARIABLES: &'static [&'static str];

    fn template_vars(ctx: &Self::Context) -> TemplateVars;

    fn output_schema() -> String;

    /// 追踪事件使用的步数
    fn trace_step(ctx: &Self::Context) -> u32;

    fn coerce(raw: Map<String, Value>) -> Result<Self::Output, AgentError>;
}

pub struct ModelBacked<S: RoleSpec> {
    backend: ModelBackend,
    prompts: Arc<PromptTemplates>,
    mode: AgenticMode,
    extra_vars: TemplateVars,
    _spec: PhantomData<fn() -> S>,
}

impl<S: RoleSpec> ModelBacked<S> {
    pub fn new(backend: ModelBackend, prompts: Arc<PromptTemplates>, mode: AgenticMode) -> Self {
        Self {
            backend,
            prompts,
            mode,
            extra_vars: TemplateVars::new(),
            _spec: PhantomData,
        }
    }

    /// 额外的固定变量（如 executor 的 available_tools）
    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_vars.insert(key.into(), value.into());
        self
    }

    pub fn render(&self, ctx: &S::Context) -> Result<(String, String), AgentError> {
        let mut vars = S::template_vars(ctx);
        vars.insert("output_schema".to_string(), S::output_schema());
        vars.extend(self.extra_vars.iter().map(|(k, v)| (k.clone(), v.clone())));
        self.prompts.render(S::ROLE.as_str(), &vars)
    }
}

#[async_trait]
impl<S: RoleSpec> Decide<S::Context, S::Output> for ModelBacked<S> {
    fn name(&self) -> &'static str {
        "model_backed"
    }

    async fn decide(&self, ctx: &S::Context) -> Result<S::Output, AgentError> {
        let (system, user) = self.render(ctx)?;
        let call = CallContext {
            agent: S::ROLE,
            step: S::trace_step(ctx),
            agentic_mode: self.mode,
        };
        let raw = self.backend.chat_json(&system, &user, &call).await?;
        S::coerce(raw)
    }
}

/// 模板变量中的布尔值
pub fn bool_var(v: bool) -> String {
    if v { "true" } else { "false" }.to_string()
}

/// 结构化值以 JSON 文本注入模板
pub fn json_var<T: serde::Serialize>(v: &T) -> String {
    serde_json::to_string(v).unwrap_or_default()
}

/// 字符串原样返回，其余 JSON 值转为文本；null 视为空
pub fn value_text(v: Option<&Value>) -> String {
    match v {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

pub fn cot_hint(use_cot: bool) -> String {
    if use_cot {
        "Think step by step internally before answering; output only the JSON object.".to_string()
    } else {
        String::new()
    }
}
