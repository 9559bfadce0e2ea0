//! Episode 状态机：Planner / Executor / Reviewer 三个节点 + 由 router 驱动的循环
//!
//! 每个节点接收当前状态的只读引用，返回新的状态；角色的每次转换同步写入追踪。
//! 节点内的角色调用失败（已穷尽角色自身的回退）直接返回错误，由 EpisodeRunner 负责记录与收尾。

use serde_json::json;

use crate::core::{AgentError, Decision, Review, Role};
use crate::environment::Environment;
use crate::episode::router::{next_phase, Phase};
use crate::episode::state::{first_non_empty, EpisodeState};
use crate::roles::{ExecutorContext, PlannerContext, ReviewerContext, Roles};
use crate::trace::{events, TraceCollector};

pub const MAX_STEPS_ANSWER: &str = "Stopped: max steps reached.";
pub const NO_PLAN_ANSWER: &str = "No plan available.";
pub const PLAN_COMPLETED_ANSWER: &str = "Plan completed.";
pub const REVIEWER_END_ANSWER: &str = "Reviewer decided to end run.";

pub struct EpisodeMachine<'a> {
    roles: &'a Roles,
    environment: &'a mut dyn Environment,
    tracer: &'a TraceCollector,
}

impl<'a> EpisodeMachine<'a> {
    pub fn new(
        roles: &'a Roles,
        environment: &'a mut dyn Environment,
        tracer: &'a TraceCollector,
    ) -> Self {
        Self {
            roles,
            environment,
            tracer,
        }
    }

    /// 从 Planning 开始运行到终止状态
    pub async fn run(&mut self, initial: EpisodeState) -> Result<EpisodeState, AgentError> {
        let mut phase = Phase::Planning;
        let mut state = initial;
        while phase != Phase::Terminal {
            tracing::debug!(?phase, step = state.step_count, decision = state.decision.as_str(), "transition");
            state = match phase {
                Phase::Planning => self.plan_node(&state).await?,
                Phase::Executing => self.execute_node(&state).await?,
                Phase::Reviewing => self.review_node(&state).await?,
                Phase::Terminal => break,
            };
            debug_assert!(state.current_step_idx <= state.plan.len());
            phase = next_phase(phase, &state);
        }
        Ok(state)
    }

    /// 整体替换计划，游标归零，decision 复位为 continue
    pub async fn plan_node(&self, state: &EpisodeState) -> Result<EpisodeState, AgentError> {
        let step = state.step_count;
        self.tracer.log_event(
            &events::role_input(Role::Planner),
            step,
            json!({
                "goal": state.goal,
                "observation": state.observation,
                "action_history": state.action_history,
            }),
        )?;

        let plan = self
            .roles
            .planner
            .plan(&PlannerContext {
                goal: state.goal.clone(),
                observation: state.observation.clone(),
                action_history: state.action_history.clone(),
                use_cot: state.use_cot,
                step,
            })
            .await?;

        self.tracer.log_event(
            &events::role_output(Role::Planner),
            step,
            json!({ "steps": plan.steps }),
        )?;
        tracing::info!(steps = plan.steps.len(), round = state.planning_rounds + 1, "plan created");

        Ok(EpisodeState {
            plan: plan.steps,
            current_step_idx: 0,
            decision: Decision::Continue,
            planning_rounds: state.planning_rounds + 1,
            notes: state.notes_with(["Planner created/replaced execution plan."]),
            ..state.clone()
        })
    }

    /// 三个前置检查（预算、空计划、计划耗尽）通过后执行当前步骤并推进环境
    pub async fn execute_node(&mut self, state: &EpisodeState) -> Result<EpisodeState, AgentError> {
        if state.done {
            return Ok(state.clone());
        }

        if state.budget_exhausted() {
            self.tracer.log_event(
                events::EPISODE_STOP,
                state.step_count,
                json!({ "reason": "max_steps_reached", "max_steps": state.max_steps }),
            )?;
            tracing::info!(max_steps = state.max_steps, "step budget exhausted");
            return Ok(EpisodeState {
                done: true,
                success: false,
                decision: Decision::End,
                final_answer: MAX_STEPS_ANSWER.to_string(),
                notes: state.notes_with(["Reached max steps budget."]),
                ..state.clone()
            });
        }

        if state.plan.is_empty() {
            let notes = state.notes_with(["Executor found empty plan."]);
            // 连续空计划的重规划次数受 max_steps 约束
            if state.dynamic_replanning && state.planning_rounds <= state.max_steps {
                return Ok(EpisodeState {
                    decision: Decision::Replan,
                    success: false,
                    notes,
                    ..state.clone()
                });
            }
            self.tracer.log_event(
                events::EPISODE_STOP,
                state.step_count,
                json!({
                    "reason": "empty_plan",
                    "dynamic_replanning": state.dynamic_replanning,
                    "planning_rounds": state.planning_rounds,
                }),
            )?;
            return Ok(EpisodeState {
                decision: Decision::End,
                done: true,
                success: false,
                final_answer: NO_PLAN_ANSWER.to_string(),
                notes,
                ..state.clone()
            });
        }

        if state.plan_exhausted() {
            return Ok(EpisodeState {
                done: true,
                success: !state.action_history.is_empty(),
                decision: Decision::End,
                final_answer: first_non_empty([state.final_answer.as_str(), PLAN_COMPLETED_ANSWER]),
                notes: state.notes_with(["Executor exhausted plan steps."]),
                ..state.clone()
            });
        }

        let step = state.step_count + 1;
        let idx = state.current_step_idx;
        let current = state.plan[idx].clone();
        self.tracer.log_event(
            &events::role_input(Role::Executor),
            step,
            json!({
                "current_step_idx": idx,
                "current_step": current,
                "observation": state.observation,
            }),
        )?;

        let action = self
            .roles
            .executor
            .execute(&ExecutorContext {
                goal: state.goal.clone(),
                plan_step: current,
                observation: state.observation.clone(),
                step_index: idx,
                total_steps: state.plan.len(),
                use_cot: state.use_cot,
                step,
            })
            .await?;

        self.tracer.log_event(
            &events::role_output(Role::Executor),
            step,
            json!({ "action": action }),
        )?;

        let env = self.environment.step(&action, step).await?;
        self.tracer
            .log_event(events::ENVIRONMENT_STEP, step, serde_json::to_value(&env)?)?;

        let done = action.is_final || env.done;
        let success = action.is_final || env.success;
        let final_answer = first_non_empty([
            action.final_answer.as_str(),
            env.final_answer.as_str(),
            state.final_answer.as_str(),
        ]);
        let mut action_history = state.action_history.clone();
        action_history.push(action.clone());

        Ok(EpisodeState {
            observation: env.observation,
            current_step_idx: idx + 1,
            action_history,
            latest_action: Some(action),
            step_count: step,
            done,
            success,
            final_answer,
            decision: if done { Decision::End } else { Decision::Continue },
            notes: state.notes_with(env.notes),
            ..state.clone()
        })
    }

    /// 已终止或 Executor 已要求重规划时不调用 Reviewer
    pub async fn review_node(&self, state: &EpisodeState) -> Result<EpisodeState, AgentError> {
        let step = state.step_count;
        self.tracer.log_event(
            &events::role_input(Role::Reviewer),
            step,
            json!({
                "goal": state.goal,
                "observation": state.observation,
                "current_step_idx": state.current_step_idx,
                "plan_length": state.plan.len(),
                "done": state.done,
            }),
        )?;

        let review = if state.done {
            Review::new(
                Decision::End,
                "Episode already marked done by executor/environment.",
                state.success,
            )
        } else if state.decision == Decision::Replan {
            Review::new(Decision::Replan, "Executor requested replanning.", false)
        } else {
            self.roles
                .reviewer
                .review(&ReviewerContext {
                    goal: state.goal.clone(),
                    observation: state.observation.clone(),
                    action_history: state.action_history.clone(),
                    current_step_idx: state.current_step_idx,
                    plan_length: state.plan.len(),
                    step,
                })
                .await?
        };

        self.tracer.log_event(
            &events::role_output(Role::Reviewer),
            step,
            serde_json::to_value(&review)?,
        )?;

        let mut review_history = state.review_history.clone();
        review_history.push(review.clone());
        let notes = state.notes_with([review.feedback.clone()]);

        if review.decision == Decision::End && !state.done {
            return Ok(EpisodeState {
                decision: Decision::End,
                done: true,
                success: review.should_succeed,
                final_answer: first_non_empty([state.final_answer.as_str(), REVIEWER_END_ANSWER]),
                review_history,
                notes,
                ..state.clone()
            });
        }

        Ok(EpisodeState {
            decision: review.decision,
            review_history,
            notes,
            ..state.clone()
        })
    }
}
