//! 错误类型
//!
//! 与 RecoveryEngine 配合：根据 AgentError 决定角色是回退到确定性策略还是终止本次 Episode。

use thiserror::Error;

use crate::core::Role;
use crate::llm::LlmError;

/// Episode 运行过程中可能出现的错误（后端、输出校验、模板、环境、追踪落盘等）
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    /// 模型返回了合法 JSON，但无法转换为该角色的结构化输出（如 Planner 得到 0 个步骤）
    #[error("Invalid {role} output: {reason}")]
    InvalidOutput { role: Role, reason: String },

    #[error("Missing prompt variable '{variable}' for role '{role}'")]
    MissingPromptVariable { role: String, variable: String },

    #[error("Config error: {0}")]
    Config(String),

    #[error("Environment error: {0}")]
    Environment(String),

    #[error("Trace error: {0}")]
    Trace(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AgentError {
    /// 错误类别名（写入 episode_error 事件的 error_type）
    pub fn kind(&self) -> &'static str {
        match self {
            AgentError::Llm(e) => e.kind(),
            AgentError::InvalidOutput { .. } => "InvalidOutput",
            AgentError::MissingPromptVariable { .. } => "ConfigurationError",
            AgentError::Config(_) => "ConfigurationError",
            AgentError::Environment(_) => "EnvironmentError",
            AgentError::Trace(_) => "TraceError",
            AgentError::Io(_) => "IoError",
            AgentError::Json(_) => "JsonError",
        }
    }
}

/// 恢复引擎根据错误类型给出的建议动作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    /// 改用确定性（mock）策略产出结果，Episode 继续
    Fallback,
    /// 终止当前 Episode，错误向上传播
    Abort,
}
