//! 追踪层：会话与事件的持久化，供数据集构建离线回放

pub mod collector;
pub mod schema;
pub mod writer;

pub use collector::TraceCollector;
pub use schema::{SessionStart, SessionStatus, TraceConfig, TraceEvent, TraceSession};
pub use writer::{TraceWriter, EVENTS_FILE, SESSION_FILE};

/// 事件类型常量（role 事件为 `<role>_input` / `<role>_output`）
pub mod events {
    pub const LLM_CALL: &str = "llm_call";
    pub const TOOL_CALL: &str = "tool_call";
    pub const ENVIRONMENT_STEP: &str = "environment_step";
    pub const EPISODE_STOP: &str = "episode_stop";
    pub const EPISODE_ERROR: &str = "episode_error";
    pub const EPISODE_END: &str = "episode_end";

    pub fn role_input(role: crate::core::Role) -> String {
        format!("{}_input", role.as_str())
    }

    pub fn role_output(role: crate::core::Role) -> String {
        format!("{}_output", role.as_str())
    }
}
