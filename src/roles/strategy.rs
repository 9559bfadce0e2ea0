//! 决策策略：同一个接口 `Decide(context) -> Result`，两类实现（ModelBacked / 确定性）
//!
//! RoleAgent 组合主策略与确定性回退策略：主策略失败时交给 RecoveryEngine 判断回退还是终止。

use async_trait::async_trait;

use crate::core::{AgentError, RecoveryAction, RecoveryEngine, Role};

#[async_trait]
pub trait Decide<C, O>: Send + Sync
where
    C: Sync,
    O: Send,
{
    /// 策略名（日志用）
    fn name(&self) -> &'static str;

    async fn decide(&self, ctx: &C) -> Result<O, AgentError>;
}

pub struct RoleAgent<C, O> {
    role: Role,
    primary: Option<Box<dyn Decide<C, O>>>,
    fallback: Box<dyn Decide<C, O>>,
    recovery: RecoveryEngine,
}

impl<C, O> RoleAgent<C, O>
where
    C: Sync,
    O: Send,
{
    /// 只使用确定性策略（force_mock 或后端未配置）
    pub fn deterministic(role: Role, fallback: Box<dyn Decide<C, O>>) -> Self {
        Self {
            role,
            primary: None,
            fallback,
            recovery: RecoveryEngine::new(),
        }
    }

    pub fn with_primary(
        role: Role,
        primary: Box<dyn Decide<C, O>>,
        fallback: Box<dyn Decide<C, O>>,
        recovery: RecoveryEngine,
    ) -> Self {
        Self {
            role,
            primary: Some(primary),
            fallback,
            recovery,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// 当前主策略名
    pub fn strategy_name(&self) -> &'static str {
        self.primary
            .as_ref()
            .map(|p| p.name())
            .unwrap_or_else(|| self.fallback.name())
    }

    pub async fn decide(&self, ctx: &C) -> Result<O, AgentError> {
        let Some(primary) = &self.primary else {
            return self.fallback.decide(ctx).await;
        };
        match primary.decide(ctx).await {
            Ok(out) => Ok(out),
            Err(e) => match self.recovery.handle(&e) {
                RecoveryAction::Fallback => {
                    tracing::warn!(
                        role = %self.role,
                        strategy = primary.name(),
                        error = %e,
                        "falling back to deterministic strategy"
                    );
                    self.fallback.decide(ctx).await
                }
                RecoveryAction::Abort => {
                    tracing::error!(role = %self.role, error = %e, "role call failed");
                    Err(e)
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmError;

    struct Fixed(Result<u32, fn() -> AgentError>);

    #[async_trait]
    impl Decide<(), u32> for Fixed {
        fn name(&self) -> &'static str {
            "fixed"
        }
        async fn decide(&self, _ctx: &()) -> Result<u32, AgentError> {
            match &self.0 {
                Ok(v) => Ok(*v),
                Err(make) => Err(make()),
            }
        }
    }

    fn rejected() -> AgentError {
        AgentError::Llm(LlmError::Rejected("bad request".into()))
    }

    fn config_error() -> AgentError {
        AgentError::Config("missing template".into())
    }

    #[tokio::test]
    async fn test_primary_result_is_used() {
        let agent = RoleAgent::with_primary(
            Role::Planner,
            Box::new(Fixed(Ok(1))),
            Box::new(Fixed(Ok(2))),
            RecoveryEngine::new(),
        );
        assert_eq!(agent.decide(&()).await.unwrap(), 1);
        assert_eq!(agent.strategy_name(), "fixed");
    }

    #[tokio::test]
    async fn test_backend_error_falls_back_unless_strict() {
        let lenient = RoleAgent::with_primary(
            Role::Reviewer,
            Box::new(Fixed(Err(rejected))),
            Box::new(Fixed(Ok(2))),
            RecoveryEngine::new(),
        );
        assert_eq!(lenient.decide(&()).await.unwrap(), 2);

        let strict = RoleAgent::with_primary(
            Role::Reviewer,
            Box::new(Fixed(Err(rejected))),
            Box::new(Fixed(Ok(2))),
            RecoveryEngine::strict(true),
        );
        assert!(matches!(
            strict.decide(&()).await,
            Err(AgentError::Llm(LlmError::Rejected(_)))
        ));
    }

    #[tokio::test]
    async fn test_config_error_aborts() {
        let agent = RoleAgent::with_primary(
            Role::Executor,
            Box::new(Fixed(Err(config_error))),
            Box::new(Fixed(Ok(2))),
            RecoveryEngine::new(),
        );
        assert!(matches!(agent.decide(&()).await, Err(AgentError::Config(_))));
    }
}
