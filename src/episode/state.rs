//! Episode 状态：一个强类型记录，每次状态转移通过结构化更新生成新记录，不原地修改

use serde::{Deserialize, Serialize};

use crate::core::{Action, AgenticMode, Decision, PlanStep, Review};

/// 运行期配置（初始化后不变）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeSettings {
    pub max_steps: u32,
    pub dynamic_replanning: bool,
    pub use_cot: bool,
    pub agentic_mode: AgenticMode,
}

impl Default for EpisodeSettings {
    fn default() -> Self {
        Self {
            max_steps: 8,
            dynamic_replanning: true,
            use_cot: false,
            agentic_mode: AgenticMode::CodeAct,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeState {
    pub goal: String,
    /// 最近一次环境反馈
    pub observation: String,
    /// 只能被 Planner 整体替换
    pub plan: Vec<PlanStep>,
    /// 0 <= current_step_idx <= plan.len()
    pub current_step_idx: usize,
    pub action_history: Vec<Action>,
    pub review_history: Vec<Review>,
    pub latest_action: Option<Action>,
    pub step_count: u32,
    pub max_steps: u32,
    /// Planner 被调用的次数
    pub planning_rounds: u32,
    pub done: bool,
    pub success: bool,
    pub final_answer: String,
    pub decision: Decision,
    pub notes: Vec<String>,
    pub dynamic_replanning: bool,
    pub use_cot: bool,
    pub agentic_mode: AgenticMode,
}

impl EpisodeState {
    pub fn initial(goal: impl Into<String>, observation: impl Into<String>, settings: EpisodeSettings) -> Self {
        Self {
            goal: goal.into(),
            observation: observation.into(),
            plan: Vec::new(),
            current_step_idx: 0,
            action_history: Vec::new(),
            review_history: Vec::new(),
            latest_action: None,
            step_count: 0,
            max_steps: settings.max_steps,
            planning_rounds: 0,
            done: false,
            success: false,
            final_answer: String::new(),
            decision: Decision::Continue,
            notes: Vec::new(),
            dynamic_replanning: settings.dynamic_replanning,
            use_cot: settings.use_cot,
            agentic_mode: settings.agentic_mode,
        }
    }

    pub fn settings(&self) -> EpisodeSettings {
        EpisodeSettings {
            max_steps: self.max_steps,
            dynamic_replanning: self.dynamic_replanning,
            use_cot: self.use_cot,
            agentic_mode: self.agentic_mode,
        }
    }

    pub fn current_step(&self) -> Option<&PlanStep> {
        self.plan.get(self.current_step_idx)
    }

    pub fn plan_exhausted(&self) -> bool {
        self.current_step_idx >= self.plan.len()
    }

    pub fn budget_exhausted(&self) -> bool {
        self.step_count >= self.max_steps
    }

    /// notes 追加若干条（返回新的列表）
    pub fn notes_with<I, S>(&self, extra: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut notes = self.notes.clone();
        notes.extend(extra.into_iter().map(Into::into));
        notes
    }
}

/// 候选值按优先级排列，取第一个非空值；全部为空时返回空串
pub fn first_non_empty<'a>(candidates: impl IntoIterator<Item = &'a str>) -> String {
    candidates
        .into_iter()
        .find(|s| !s.is_empty())
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let s = EpisodeState::initial("goal", "ready", EpisodeSettings::default());
        assert!(s.plan.is_empty());
        assert_eq!(s.step_count, 0);
        assert_eq!(s.decision, Decision::Continue);
        assert!(!s.done);
        assert!(s.plan_exhausted());
        assert_eq!(s.settings(), EpisodeSettings::default());
    }

    #[test]
    fn test_first_non_empty_never_erases_prior_value() {
        assert_eq!(first_non_empty(["", "", "prior"]), "prior");
        assert_eq!(first_non_empty(["new", "env", "prior"]), "new");
        assert_eq!(first_non_empty(["", "env", "prior"]), "env");
        assert_eq!(first_non_empty(["", ""]), "");
    }

    #[test]
    fn test_notes_with_does_not_mutate() {
        let s = EpisodeState::initial("goal", "ready", EpisodeSettings::default());
        let notes = s.notes_with(["a", "b"]);
        assert_eq!(notes, vec!["a", "b"]);
        assert!(s.notes.is_empty());
    }
}
