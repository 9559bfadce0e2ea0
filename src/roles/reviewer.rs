//! Reviewer：检查最新结果，给出 continue / replan / end

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::core::{Action, AgentError, Decision, RecoveryEngine, Review, Role, AgenticMode};
use crate::llm::ModelBackend;
use crate::prompts::{PromptTemplates, TemplateVars};
use crate::roles::model_backed::{json_var, value_text, ModelBacked, RoleSpec};
use crate::roles::strategy::{Decide, RoleAgent};
use crate::tools::output_schema_json;

/// 观察中出现即视为失败信号（不区分大小写的子串匹配）
pub const FAILURE_KEYWORDS: [&str; 2] = ["error", "failed"];

#[derive(Debug, Clone, Serialize)]
pub struct ReviewerContext {
    pub goal: String,
    pub observation: String,
    pub action_history: Vec<Action>,
    pub current_step_idx: usize,
    pub plan_length: usize,
    pub step: u32,
}

pub struct ReviewerSpec;

impl RoleSpec for ReviewerSpec {
    type Context = ReviewerContext;
    type Output = Review;

    const ROLE: Role = Role::Reviewer;
    const VARIABLES: &'static [&'static str] = &[
        "goal",
        "observation",
        "action_history",
        "current_step_idx",
        "plan_length",
        "step",
        "output_schema",
    ];

    fn template_vars(ctx: &ReviewerContext) -> TemplateVars {
        let mut vars = TemplateVars::new();
        vars.insert("goal".into(), ctx.goal.clone());
        vars.insert("observation".into(), ctx.observation.clone());
        vars.insert("action_history".into(), json_var(&ctx.action_history));
        vars.insert("current_step_idx".into(), ctx.current_step_idx.to_string());
        vars.insert("plan_length".into(), ctx.plan_length.to_string());
        vars.insert("step".into(), ctx.step.to_string());
        vars
    }

    fn output_schema() -> String {
        output_schema_json::<Review>()
    }

    fn trace_step(ctx: &ReviewerContext) -> u32 {
        ctx.step
    }

    fn coerce(raw: Map<String, Value>) -> Result<Review, AgentError> {
        coerce_review(&raw)
    }
}

/// decision 缺失或无法识别视为无效输出
pub fn coerce_review(raw: &Map<String, Value>) -> Result<Review, AgentError> {
    let decision = raw
        .get("decision")
        .and_then(Value::as_str)
        .ok_or_else(|| AgentError::InvalidOutput {
            role: Role::Reviewer,
            reason: "missing 'decision'".to_string(),
        })?
        .parse::<Decision>()
        .map_err(|reason| AgentError::InvalidOutput {
            role: Role::Reviewer,
            reason,
        })?;
    Ok(Review {
        decision,
        feedback: value_text(raw.get("feedback")),
        should_succeed: raw
            .get("should_succeed")
            .and_then(Value::as_bool)
            .unwrap_or(false),
    })
}

pub fn has_failure_signal(observation: &str) -> bool {
    let obs = observation.to_lowercase();
    FAILURE_KEYWORDS.iter().any(|k| obs.contains(k))
}

/// 确定性评审：失败信号 -> replan；游标到达计划末尾 -> end；否则 continue
#[derive(Debug, Default)]
pub struct DeterministicReviewer;

impl DeterministicReviewer {
    pub fn review_for(&self, ctx: &ReviewerContext) -> Review {
        if has_failure_signal(&ctx.observation) {
            return Review::new(
                Decision::Replan,
                "Detected possible failure signal in observation.",
                false,
            );
        }
        if ctx.current_step_idx >= ctx.plan_length {
            return Review::new(
                Decision::End,
                "All planned steps completed.",
                !ctx.action_history.is_empty(),
            );
        }
        Review::new(Decision::Continue, "Proceed to next step.", false)
    }
}

#[async_trait]
impl Decide<ReviewerContext, Review> for DeterministicReviewer {
    fn name(&self) -> &'static str {
        "deterministic"
    }

    async fn decide(&self, ctx: &ReviewerContext) -> Result<Review, AgentError> {
        Ok(self.review_for(ctx))
    }
}

pub struct Reviewer {
    agent: RoleAgent<ReviewerContext, Review>,
}

impl Reviewer {
    pub fn deterministic() -> Self {
        Self {
            agent: RoleAgent::deterministic(Role::Reviewer, Box::new(DeterministicReviewer)),
        }
    }

    pub fn model_backed(
        backend: ModelBackend,
        prompts: Arc<PromptTemplates>,
        mode: AgenticMode,
        recovery: RecoveryEngine,
    ) -> Self {
        let primary = ModelBacked::<ReviewerSpec>::new(backend, prompts, mode);
        Self::with_strategy(Box::new(primary), recovery)
    }

    pub fn with_strategy(
        primary: Box<dyn Decide<ReviewerContext, Review>>,
        recovery: RecoveryEngine,
    ) -> Self {
        Self {
            agent: RoleAgent::with_primary(
                Role::Reviewer,
                primary,
                Box::new(DeterministicReviewer),
                recovery,
            ),
        }
    }

    pub fn strategy_name(&self) -> &'static str {
        self.agent.strategy_name()
    }

    pub async fn review(&self, ctx: &ReviewerContext) -> Result<Review, AgentError> {
        self.agent.decide(ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx(observation: &str, idx: usize, len: usize, actions: usize) -> ReviewerContext {
        ReviewerContext {
            goal: "g".to_string(),
            observation: observation.to_string(),
            action_history: vec![Action::default(); actions],
            current_step_idx: idx,
            plan_length: len,
            step: 1,
        }
    }

    #[tokio::test]
    async fn test_failure_keyword_triggers_replan_at_any_index() {
        let reviewer = Reviewer::deterministic();
        for idx in [0, 2, 3] {
            let review = reviewer
                .review(&ctx("Step 1 completed. ERROR: upstream timeout", idx, 3, 1))
                .await
                .unwrap();
            assert_eq!(review.decision, Decision::Replan);
            assert_eq!(review.feedback, "Detected possible failure signal in observation.");
        }
        let failed = reviewer.review(&ctx("request Failed", 0, 3, 1)).await.unwrap();
        assert_eq!(failed.decision, Decision::Replan);
    }

    #[tokio::test]
    async fn test_end_when_cursor_reaches_plan_length() {
        let reviewer = Reviewer::deterministic();
        let review = reviewer.review(&ctx("ok", 3, 3, 3)).await.unwrap();
        assert_eq!(review.decision, Decision::End);
        assert!(review.should_succeed);

        let empty = reviewer.review(&ctx("ok", 0, 0, 0)).await.unwrap();
        assert_eq!(empty.decision, Decision::End);
        assert!(!empty.should_succeed);
    }

    #[tokio::test]
    async fn test_continue_mid_plan() {
        let review = Reviewer::deterministic().review(&ctx("ok", 1, 3, 1)).await.unwrap();
        assert_eq!(review.decision, Decision::Continue);
        assert_eq!(review.feedback, "Proceed to next step.");
    }

    #[test]
    fn test_coerce_review() {
        let ok = json!({"decision": "END", "feedback": "done", "should_succeed": true});
        let review = coerce_review(ok.as_object().unwrap()).unwrap();
        assert_eq!(review, Review::new(Decision::End, "done", true));

        let bad = json!({"decision": "maybe"});
        assert!(matches!(
            coerce_review(bad.as_object().unwrap()),
            Err(AgentError::InvalidOutput { role: Role::Reviewer, .. })
        ));
        let missing = json!({"feedback": "?"});
        assert!(coerce_review(missing.as_object().unwrap()).is_err());
    }
}
