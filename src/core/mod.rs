//! 核心层：领域类型、错误与恢复策略

pub mod error;
pub mod recovery;
pub mod types;

pub use error::{AgentError, RecoveryAction};
pub use recovery::RecoveryEngine;
pub use types::{Action, AgenticMode, Decision, Plan, PlanStep, Review, Role, ToolRequest};
