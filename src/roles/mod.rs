//! 角色层：Planner / Executor / Reviewer
//!
//! 每个角色 = 主策略（ModelBacked）+ 确定性回退策略，暴露一个操作（plan / execute / review）。

pub mod executor;
pub mod model_backed;
pub mod planner;
pub mod reviewer;
pub mod strategy;

pub use executor::{DeterministicExecutor, Executor, ExecutorContext, ExecutorSpec};
pub use model_backed::{ModelBacked, RoleSpec};
pub use planner::{DeterministicPlanner, Planner, PlannerContext, PlannerSpec};
pub use reviewer::{DeterministicReviewer, Reviewer, ReviewerContext, ReviewerSpec};
pub use strategy::{Decide, RoleAgent};

use std::sync::Arc;

use crate::llm::{LlmClient, TokenTotals};

/// 三个角色，由 EpisodeRunner 构造后交给状态机
pub struct Roles {
    pub planner: Planner,
    pub executor: Executor,
    pub reviewer: Reviewer,
    clients: Vec<Arc<dyn LlmClient>>,
}

impl Roles {
    pub fn new(planner: Planner, executor: Executor, reviewer: Reviewer) -> Self {
        Self {
            planner,
            executor,
            reviewer,
            clients: Vec::new(),
        }
    }

    /// 登记角色背后的 LLM 客户端，用于汇总 token 用量；同一客户端只登记一次
    pub fn with_clients(mut self, clients: impl IntoIterator<Item = Arc<dyn LlmClient>>) -> Self {
        for client in clients {
            if !self.clients.iter().any(|c| Arc::ptr_eq(c, &client)) {
                self.clients.push(client);
            }
        }
        self
    }

    pub fn token_usage(&self) -> TokenTotals {
        let mut totals = TokenTotals::default();
        for client in &self.clients {
            totals.merge(client.token_usage());
        }
        totals
    }
}

/// 各角色模板需要的变量（不含共享上下文）
pub fn role_variables(role: crate::core::Role) -> &'static [&'static str] {
    match role {
        crate::core::Role::Planner => PlannerSpec::VARIABLES,
        crate::core::Role::Executor => ExecutorSpec::VARIABLES,
        crate::core::Role::Reviewer => ReviewerSpec::VARIABLES,
    }
}
