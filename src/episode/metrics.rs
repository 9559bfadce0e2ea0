//! Episode 指标与结果产物

use serde::{Deserialize, Serialize};

use crate::core::{Action, Review};
use crate::episode::state::EpisodeState;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeMetrics {
    pub success: bool,
    pub step_count: u32,
    pub actions: usize,
    pub reviews: usize,
    /// success / stopped_or_failed
    pub termination_reason: String,
}

pub fn compute_metrics(state: &EpisodeState) -> EpisodeMetrics {
    EpisodeMetrics {
        success: state.success,
        step_count: state.step_count,
        actions: state.action_history.len(),
        reviews: state.review_history.len(),
        termination_reason: if state.success { "success" } else { "stopped_or_failed" }.to_string(),
    }
}

/// 单次 Episode 的精简结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeArtifact {
    pub run_id: String,
    pub goal: String,
    pub success: bool,
    pub step_count: u32,
    pub final_answer: String,
    pub action_history: Vec<Action>,
    pub review_history: Vec<Review>,
    pub notes: Vec<String>,
}

impl EpisodeArtifact {
    pub fn from_state(run_id: &str, state: &EpisodeState) -> Self {
        Self {
            run_id: run_id.to_string(),
            goal: state.goal.clone(),
            success: state.success,
            step_count: state.step_count,
            final_answer: state.final_answer.clone(),
            action_history: state.action_history.clone(),
            review_history: state.review_history.clone(),
            notes: state.notes.clone(),
        }
    }
}
