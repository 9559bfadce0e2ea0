//! Episode：状态、路由、状态机与一次运行的外壳

pub mod machine;
pub mod metrics;
pub mod router;
pub mod runner;
pub mod state;

pub use machine::{EpisodeMachine, MAX_STEPS_ANSWER, NO_PLAN_ANSWER, PLAN_COMPLETED_ANSWER, REVIEWER_END_ANSWER};
pub use metrics::{compute_metrics, EpisodeArtifact, EpisodeMetrics};
pub use router::{next_phase, route_after_review, Phase};
pub use runner::{new_run_id, EpisodeOutcome, EpisodeRunner};
pub use state::{EpisodeSettings, EpisodeState};
