//! 错误恢复引擎
//!
//! 根据 AgentError 类型返回 RecoveryAction，供 RoleAgent 决定回退到确定性策略还是终止 Episode。

use crate::core::{AgentError, RecoveryAction};
use crate::llm::LlmError;

/// 角色调用失败时的恢复策略
///
/// - 后端未配置、输出不可用：总是回退
/// - 重试耗尽 / 请求被拒 / 输出无法解析：默认回退；`strict` 时终止
/// - 配置、模板、追踪落盘等错误：总是终止
#[derive(Debug, Default, Clone, Copy)]
pub struct RecoveryEngine {
    strict: bool,
}

impl RecoveryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// strict=true 时后端错误不再回退，直接让 Episode 失败
    pub fn strict(strict: bool) -> Self {
        Self { strict }
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    pub fn handle(&self, err: &AgentError) -> RecoveryAction {
        match err {
            AgentError::Llm(LlmError::Disabled) => RecoveryAction::Fallback,
            AgentError::InvalidOutput { .. } => RecoveryAction::Fallback,
            AgentError::Llm(_) if self.strict => RecoveryAction::Abort,
            AgentError::Llm(_) => RecoveryAction::Fallback,
            _ => RecoveryAction::Abort,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Role;

    #[test]
    fn test_disabled_always_falls_back() {
        let err = AgentError::Llm(LlmError::Disabled);
        assert_eq!(RecoveryEngine::new().handle(&err), RecoveryAction::Fallback);
        assert_eq!(RecoveryEngine::strict(true).handle(&err), RecoveryAction::Fallback);
    }

    #[test]
    fn test_invalid_output_falls_back() {
        let err = AgentError::InvalidOutput {
            role: Role::Planner,
            reason: "no steps".to_string(),
        };
        assert_eq!(RecoveryEngine::strict(true).handle(&err), RecoveryAction::Fallback);
    }

    #[test]
    fn test_rejected_depends_on_strictness() {
        let err = AgentError::Llm(LlmError::Rejected("bad request".to_string()));
        assert_eq!(RecoveryEngine::new().handle(&err), RecoveryAction::Fallback);
        assert_eq!(RecoveryEngine::strict(true).handle(&err), RecoveryAction::Abort);
    }

    #[test]
    fn test_malformed_output_strict_aborts() {
        let err = AgentError::Llm(LlmError::MalformedOutput {
            raw: "not json".to_string(),
        });
        assert_eq!(RecoveryEngine::strict(true).handle(&err), RecoveryAction::Abort);
    }

    #[test]
    fn test_config_errors_abort() {
        let err = AgentError::MissingPromptVariable {
            role: "planner".to_string(),
            variable: "goal".to_string(),
        };
        assert_eq!(RecoveryEngine::new().handle(&err), RecoveryAction::Abort);
        let err = AgentError::Trace("disk full".to_string());
        assert_eq!(RecoveryEngine::new().handle(&err), RecoveryAction::Abort);
    }
}
