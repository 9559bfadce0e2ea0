//! 环境适配层：消费 Executor 的动作，返回新的观察与终止信号

pub mod simulator;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::{Action, AgentError};

pub use simulator::SimulatorEnvironment;

/// 单步环境反馈
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvStep {
    pub observation: String,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub final_answer: String,
    #[serde(default)]
    pub notes: Vec<String>,
}

#[async_trait]
pub trait Environment: Send {
    fn name(&self) -> &str;

    /// 开始新 Episode，返回初始观察
    async fn reset(&mut self, goal: &str) -> Result<String, AgentError>;

    /// step_count 为本次动作完成后的步数（从 1 开始）
    async fn step(&mut self, action: &Action, step_count: u32) -> Result<EnvStep, AgentError>;
}

/// 按名称构造环境：sim / simulator / generic
pub fn build_environment(kind: &str) -> Result<Box<dyn Environment>, AgentError> {
    match kind.trim().to_lowercase().as_str() {
        "sim" | "simulator" | "generic" => Ok(Box::new(SimulatorEnvironment::new())),
        _ => Err(AgentError::Config(format!("Unsupported environment: {kind}"))),
    }
}
