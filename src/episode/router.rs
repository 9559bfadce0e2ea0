//! 路由：唯一决定控制流的地方
//!
//! Planning -> Executing -> Reviewing -> {Executing | Planning | Terminal}

use serde::Serialize;

use crate::core::Decision;
use crate::episode::state::EpisodeState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Planning,
    Executing,
    Reviewing,
    Terminal,
}

/// Reviewing 之后的去向
pub fn route_after_review(state: &EpisodeState) -> Phase {
    if state.done {
        return Phase::Terminal;
    }
    match state.decision {
        Decision::End => Phase::Terminal,
        Decision::Replan if state.dynamic_replanning => Phase::Planning,
        _ => Phase::Executing,
    }
}

pub fn next_phase(current: Phase, state: &EpisodeState) -> Phase {
    match current {
        Phase::Planning => Phase::Executing,
        Phase::Executing => Phase::Reviewing,
        Phase::Reviewing => route_after_review(state),
        Phase::Terminal => Phase::Terminal,
    }
}
