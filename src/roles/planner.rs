//! Planner：根据目标、当前观察与动作历史产出（或替换）执行计划

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::core::{Action, AgentError, AgenticMode, Plan, PlanStep, RecoveryEngine, Role};
use crate::llm::ModelBackend;
use crate::prompts::{PromptTemplates, TemplateVars};
use crate::roles::model_backed::{bool_var, cot_hint, json_var, value_text, ModelBacked, RoleSpec};
use crate::roles::strategy::{Decide, RoleAgent};
use crate::tools::output_schema_json;

#[derive(Debug, Clone, Serialize)]
pub struct PlannerContext {
    pub goal: String,
    pub observation: String,
    pub action_history: Vec<Action>,
    pub use_cot: bool,
    pub step: u32,
}

pub struct PlannerSpec;

impl RoleSpec for PlannerSpec {
    type Context = PlannerContext;
    type Output = Plan;

    const ROLE: Role = Role::Planner;
    const VARIABLES: &'static [&'static str] = &[
        "goal",
        "observation",
        "action_history",
        "use_cot",
        "cot_hint",
        "step",
        "output_schema",
    ];

    fn template_vars(ctx: &PlannerContext) -> TemplateVars {
        let mut vars = TemplateVars::new();
        vars.insert("goal".into(), ctx.goal.clone());
        vars.insert("observation".into(), ctx.observation.clone());
        vars.insert("action_history".into(), json_var(&ctx.action_history));
        vars.insert("use_cot".into(), bool_var(ctx.use_cot));
        vars.insert("cot_hint".into(), cot_hint(ctx.use_cot));
        vars.insert("step".into(), ctx.step.to_string());
        vars
    }

    fn output_schema() -> String {
        output_schema_json::<Plan>()
    }

    fn trace_step(ctx: &PlannerContext) -> u32 {
        ctx.step
    }

    fn coerce(raw: Map<String, Value>) -> Result<Plan, AgentError> {
        coerce_plan(&raw)
    }
}

/// `steps` 可以是对象数组或字符串数组；标题为空的条目丢弃；一个都不剩视为无效输出
pub fn coerce_plan(raw: &Map<String, Value>) -> Result<Plan, AgentError> {
    let items = raw.get("steps").and_then(Value::as_array).ok_or_else(|| {
        AgentError::InvalidOutput {
            role: Role::Planner,
            reason: "missing 'steps' array".to_string(),
        }
    })?;
    let steps: Vec<PlanStep> = items
        .iter()
        .filter_map(|item| match item {
            Value::String(title) => Some(PlanStep::new(title.trim(), "")),
            Value::Object(obj) => Some(PlanStep::new(
                value_text(obj.get("title")).trim(),
                value_text(obj.get("rationale")),
            )),
            _ => None,
        })
        .filter(|s| !s.title.is_empty())
        .collect();
    if steps.is_empty() {
        return Err(AgentError::InvalidOutput {
            role: Role::Planner,
            reason: "plan contained no usable steps".to_string(),
        });
    }
    Ok(Plan { steps })
}

/// 确定性计划：固定三步，措辞随模式变化
pub struct DeterministicPlanner {
    mode: AgenticMode,
}

impl DeterministicPlanner {
    pub fn new(mode: AgenticMode) -> Self {
        Self { mode }
    }

    pub fn plan_for(&self, goal: &str) -> Plan {
        let steps = match self.mode {
            AgenticMode::React => vec![
                PlanStep::new(
                    "Interpret goal and propose first hypothesis",
                    format!("Reason from goal: {goal}"),
                ),
                PlanStep::new(
                    "Iterate thought-action-observation loop",
                    "Refine based on latest observations",
                ),
                PlanStep::new(
                    "Consolidate final answer with evidence",
                    "Summarize conclusions and confidence",
                ),
            ],
            AgenticMode::CodeAct => vec![
                PlanStep::new("Clarify objective and constraints", format!("Interpret goal: {goal}")),
                PlanStep::new(
                    "Execute targeted information gathering",
                    "Collect facts and intermediate outputs",
                ),
                PlanStep::new("Synthesize final recommendation", "Return concise deliverable"),
            ],
        };
        Plan { steps }
    }
}

#[async_trait]
impl Decide<PlannerContext, Plan> for DeterministicPlanner {
    fn name(&self) -> &'static str {
        "deterministic"
    }

    async fn decide(&self, ctx: &PlannerContext) -> Result<Plan, AgentError> {
        Ok(self.plan_for(&ctx.goal))
    }
}

pub struct Planner {
    agent: RoleAgent<PlannerContext, Plan>,
}

impl Planner {
    pub fn deterministic(mode: AgenticMode) -> Self {
        Self {
            agent: RoleAgent::deterministic(Role::Planner, Box::new(DeterministicPlanner::new(mode))),
        }
    }

    pub fn model_backed(
        backend: ModelBackend,
        prompts: Arc<PromptTemplates>,
        mode: AgenticMode,
        recovery: RecoveryEngine,
    ) -> Self {
        let primary = ModelBacked::<PlannerSpec>::new(backend, prompts, mode);
        Self::with_strategy(Box::new(primary), mode, recovery)
    }

    /// 自定义主策略，确定性计划作为回退
    pub fn with_strategy(
        primary: Box<dyn Decide<PlannerContext, Plan>>,
        mode: AgenticMode,
        recovery: RecoveryEngine,
    ) -> Self {
        Self {
            agent: RoleAgent::with_primary(
                Role::Planner,
                primary,
                Box::new(DeterministicPlanner::new(mode)),
                recovery,
            ),
        }
    }

    pub fn strategy_name(&self) -> &'static str {
        self.agent.strategy_name()
    }

    pub async fn plan(&self, ctx: &PlannerContext) -> Result<Plan, AgentError> {
        self.agent.decide(ctx).await
    }
}
