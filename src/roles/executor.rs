//! Executor：执行当前计划步骤，产出动作；动作中的工具请求在返回前同步解析
//!
//! 每个工具调用写一条 `tool_call` 追踪事件，结果以 ` Tool results: [...]` 追加到 output。

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::core::{Action, AgentError, AgenticMode, PlanStep, RecoveryEngine, Role, ToolRequest};
use crate::llm::ModelBackend;
use crate::prompts::{PromptTemplates, TemplateVars};
use crate::roles::model_backed::{bool_var, cot_hint, json_var, value_text, ModelBacked, RoleSpec};
use crate::roles::strategy::{Decide, RoleAgent};
use crate::tools::{output_schema_json, ToolRegistry};
use crate::trace::{events, TraceCollector};

#[derive(Debug, Clone, Serialize)]
pub struct ExecutorContext {
    pub goal: String,
    pub plan_step: PlanStep,
    pub observation: String,
    /// 当前步骤在计划中的下标（从 0 开始）
    pub step_index: usize,
    pub total_steps: usize,
    pub use_cot: bool,
    /// 本次执行完成后的步数（追踪事件使用）
    pub step: u32,
}

pub struct ExecutorSpec;

impl RoleSpec for ExecutorSpec {
    type Context = ExecutorContext;
    type Output = Action;

    const ROLE: Role = Role::Executor;
    const VARIABLES: &'static [&'static str] = &[
        "goal",
        "plan_step",
        "plan_step_title",
        "observation",
        "step_index",
        "total_steps",
        "use_cot",
        "cot_hint",
        "step",
        "output_schema",
        "available_tools",
    ];

    fn template_vars(ctx: &ExecutorContext) -> TemplateVars {
        let mut vars = TemplateVars::new();
        vars.insert("goal".into(), ctx.goal.clone());
        vars.insert("plan_step".into(), json_var(&ctx.plan_step));
        vars.insert("plan_step_title".into(), ctx.plan_step.title.clone());
        vars.insert("observation".into(), ctx.observation.clone());
        vars.insert("step_index".into(), ctx.step_index.to_string());
        vars.insert("total_steps".into(), ctx.total_steps.to_string());
        vars.insert("use_cot".into(), bool_var(ctx.use_cot));
        vars.insert("cot_hint".into(), cot_hint(ctx.use_cot));
        vars.insert("step".into(), ctx.step.to_string());
        vars
    }

    fn output_schema() -> String {
        output_schema_json::<Action>()
    }

    fn trace_step(ctx: &ExecutorContext) -> u32 {
        ctx.step
    }

    fn coerce(raw: Map<String, Value>) -> Result<Action, AgentError> {
        Ok(coerce_action(&raw))
    }
}

/// 缺失的 summary / output 取空串；没有 name 的工具请求丢弃
pub fn coerce_action(raw: &Map<String, Value>) -> Action {
    let tool_requests = raw
        .get("tool_requests")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    let obj = item.as_object()?;
                    let name = value_text(obj.get("name")).trim().to_string();
                    if name.is_empty() {
                        return None;
                    }
                    let arguments = obj
                        .get("arguments")
                        .and_then(Value::as_object)
                        .cloned()
                        .unwrap_or_default();
                    Some(ToolRequest { name, arguments })
                })
                .collect()
        })
        .unwrap_or_default();
    Action {
        summary: value_text(raw.get("summary")),
        output: value_text(raw.get("output")),
        is_final: raw.get("is_final").and_then(Value::as_bool).unwrap_or(false),
        final_answer: value_text(raw.get("final_answer")),
        tool_requests,
    }
}

/// 确定性执行：最后一步给出最终答案；CodeAct 模式下多步计划的第一步调用 calculator
pub struct DeterministicExecutor {
    mode: AgenticMode,
}

impl DeterministicExecutor {
    pub fn new(mode: AgenticMode) -> Self {
        Self { mode }
    }

    pub fn action_for(&self, ctx: &ExecutorContext) -> Action {
        let is_last = ctx.step_index + 1 >= ctx.total_steps;
        let mut tool_requests = Vec::new();
        if self.mode == AgenticMode::CodeAct && !is_last && ctx.step_index == 0 {
            let mut arguments = Map::new();
            arguments.insert("expression".to_string(), json!("42 + 8"));
            tool_requests.push(ToolRequest {
                name: "calculator".to_string(),
                arguments,
            });
        }
        let prefix = match self.mode {
            AgenticMode::React => "ReAct iteration",
            AgenticMode::CodeAct => "Executed",
        };
        Action {
            summary: format!("{prefix}: {}", ctx.plan_step.title),
            output: format!("Completed work item {}/{}.", ctx.step_index + 1, ctx.total_steps),
            is_final: is_last,
            final_answer: if is_last {
                "Delivered a compact final report.".to_string()
            } else {
                String::new()
            },
            tool_requests,
        }
    }
}

#[async_trait]
impl Decide<ExecutorContext, Action> for DeterministicExecutor {
    fn name(&self) -> &'static str {
        "deterministic"
    }

    async fn decide(&self, ctx: &ExecutorContext) -> Result<Action, AgentError> {
        Ok(self.action_for(ctx))
    }
}

pub struct Executor {
    agent: RoleAgent<ExecutorContext, Action>,
    tools: Arc<ToolRegistry>,
    tracer: Arc<TraceCollector>,
}

impl Executor {
    pub fn deterministic(
        mode: AgenticMode,
        tools: Arc<ToolRegistry>,
        tracer: Arc<TraceCollector>,
    ) -> Self {
        Self {
            agent: RoleAgent::deterministic(
                Role::Executor,
                Box::new(DeterministicExecutor::new(mode)),
            ),
            tools,
            tracer,
        }
    }

    pub fn model_backed(
        backend: ModelBackend,
        prompts: Arc<PromptTemplates>,
        mode: AgenticMode,
        recovery: RecoveryEngine,
        tools: Arc<ToolRegistry>,
        tracer: Arc<TraceCollector>,
    ) -> Self {
        let primary = ModelBacked::<ExecutorSpec>::new(backend, prompts, mode)
            .with_var("available_tools", tools.to_schema_json());
        Self::with_strategy(Box::new(primary), mode, recovery, tools, tracer)
    }

    pub fn with_strategy(
        primary: Box<dyn Decide<ExecutorContext, Action>>,
        mode: AgenticMode,
        recovery: RecoveryEngine,
        tools: Arc<ToolRegistry>,
        tracer: Arc<TraceCollector>,
    ) -> Self {
        Self {
            agent: RoleAgent::with_primary(
                Role::Executor,
                primary,
                Box::new(DeterministicExecutor::new(mode)),
                recovery,
            ),
            tools,
            tracer,
        }
    }

    pub fn strategy_name(&self) -> &'static str {
        self.agent.strategy_name()
    }

    pub async fn execute(&self, ctx: &ExecutorContext) -> Result<Action, AgentError> {
        let candidate = self.agent.decide(ctx).await?;
        self.run_tools(candidate, ctx.step).await
    }

    async fn run_tools(&self, action: Action, step: u32) -> Result<Action, AgentError> {
        if action.tool_requests.is_empty() {
            return Ok(action);
        }
        let mut results = Vec::with_capacity(action.tool_requests.len());
        for req in &action.tool_requests {
            let result = self.tools.call(&req.name, &req.arguments).await;
            self.tracer.log_event(
                events::TOOL_CALL,
                step,
                json!({
                    "name": req.name,
                    "arguments": req.arguments,
                    "result": result,
                }),
            )?;
            results.push(result);
        }
        let output = format!(
            "{} Tool results: {}",
            action.output,
            serde_json::to_string(&results)?
        );
        Ok(Action { output, ..action })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::build_default_tool_registry;
    use crate::trace::{SessionStart, TraceConfig, TraceEvent};
    use tempfile::TempDir;

    fn ctx(step_index: usize, total_steps: usize) -> ExecutorContext {
        ExecutorContext {
            goal: "Draft a checklist".to_string(),
            plan_step: PlanStep::new("Clarify objective and constraints", ""),
            observation: String::new(),
            step_index,
            total_steps,
            use_cot: false,
            step: step_index as u32 + 1,
        }
    }

    fn tools() -> Arc<ToolRegistry> {
        Arc::new(build_default_tool_registry(5, 200))
    }

    #[tokio::test]
    async fn test_codeact_first_step_calls_calculator() {
        let dir = TempDir::new().unwrap();
        let cfg = TraceConfig {
            enabled: true,
            base_dir: dir.path().to_string_lossy().into_owned(),
            ..Default::default()
        };
        let tracer = Arc::new(TraceCollector::new(&cfg, "exec").unwrap());
        tracer.start_session(SessionStart::default()).unwrap();
        let executor = Executor::deterministic(AgenticMode::CodeAct, tools(), tracer.clone());

        let action = executor.execute(&ctx(0, 3)).await.unwrap();
        assert_eq!(action.summary, "Executed: Clarify objective and constraints");
        assert!(action.output.starts_with("Completed work item 1/3. Tool results: ["));
        assert!(action.output.contains("\"value\":50"));
        assert!(!action.is_final);

        let text = std::fs::read_to_string(tracer.writer().unwrap().events_path()).unwrap();
        let events: Vec<TraceEvent> = text.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "tool_call");
        assert_eq!(events[0].step, 1);
        assert_eq!(events[0].payload["result"]["ok"], true);
    }

    #[tokio::test]
    async fn test_last_step_is_final() {
        let executor = Executor::deterministic(
            AgenticMode::React,
            tools(),
            Arc::new(TraceCollector::disabled()),
        );
        let action = executor.execute(&ctx(2, 3)).await.unwrap();
        assert!(action.is_final);
        assert_eq!(action.final_answer, "Delivered a compact final report.");
        assert_eq!(action.output, "Completed work item 3/3.");
        assert!(action.summary.starts_with("ReAct iteration"));
    }

    #[tokio::test]
    async fn test_single_step_plan_skips_tools() {
        let executor = Executor::deterministic(
            AgenticMode::CodeAct,
            tools(),
            Arc::new(TraceCollector::disabled()),
        );
        let action = executor.execute(&ctx(0, 1)).await.unwrap();
        assert!(action.is_final);
        assert!(action.tool_requests.is_empty());
    }

    #[test]
    fn test_coerce_action_drops_nameless_tool_requests() {
        let raw = serde_json::json!({
            "summary": "s",
            "is_final": true,
            "tool_requests": [
                {"name": "calculator", "arguments": {"expression": "1+1"}},
                {"arguments": {}},
                {"name": "fetch_url"}
            ]
        });
        let action = coerce_action(raw.as_object().unwrap());
        assert_eq!(action.output, "");
        assert!(action.is_final);
        assert_eq!(action.tool_requests.len(), 2);
        assert!(action.tool_requests[1].arguments.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_tool_is_reported_in_output() {
        struct AsksMissing;

        #[async_trait]
        impl Decide<ExecutorContext, Action> for AsksMissing {
            fn name(&self) -> &'static str {
                "asks_missing"
            }
            async fn decide(&self, _ctx: &ExecutorContext) -> Result<Action, AgentError> {
                Ok(Action {
                    output: "tried".to_string(),
                    tool_requests: vec![ToolRequest {
                        name: "nope".to_string(),
                        arguments: Map::new(),
                    }],
                    ..Default::default()
                })
            }
        }

        let executor = Executor::with_strategy(
            Box::new(AsksMissing),
            AgenticMode::CodeAct,
            RecoveryEngine::new(),
            tools(),
            Arc::new(TraceCollector::disabled()),
        );
        let action = executor.execute(&ctx(0, 2)).await.unwrap();
        assert!(action.output.contains("tool_not_found:nope"));
    }
}
