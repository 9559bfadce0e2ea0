//! 通用模拟环境：final 动作即完成，否则记录进度

use async_trait::async_trait;

use crate::core::{Action, AgentError};
use crate::environment::{EnvStep, Environment};

#[derive(Debug, Default)]
pub struct SimulatorEnvironment {
    goal: String,
}

impl SimulatorEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn goal(&self) -> &str {
        &self.goal
    }
}

#[async_trait]
impl Environment for SimulatorEnvironment {
    fn name(&self) -> &str {
        "generic_simulator"
    }

    async fn reset(&mut self, goal: &str) -> Result<String, AgentError> {
        self.goal = goal.to_string();
        Ok(format!("Environment ready. Goal: {goal}"))
    }

    async fn step(&mut self, action: &Action, step_count: u32) -> Result<EnvStep, AgentError> {
        if action.is_final {
            return Ok(EnvStep {
                observation: format!("Finalized at step {step_count}: {}", action.final_answer),
                done: true,
                success: true,
                final_answer: action.final_answer.clone(),
                notes: vec!["Executor marked final answer.".to_string()],
            });
        }
        Ok(EnvStep {
            observation: format!("Step {step_count} completed. Executor output: {}", action.output),
            done: false,
            success: false,
            final_answer: String::new(),
            notes: vec!["Progress recorded in simulator.".to_string()],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_progress_then_final() {
        let mut env = SimulatorEnvironment::new();
        assert_eq!(env.reset("ship it").await.unwrap(), "Environment ready. Goal: ship it");
        assert_eq!(env.goal(), "ship it");

        let progress = env
            .step(
                &Action {
                    output: "Completed work item 1/3.".to_string(),
                    ..Default::default()
                },
                1,
            )
            .await
            .unwrap();
        assert!(!progress.done);
        assert_eq!(progress.observation, "Step 1 completed. Executor output: Completed work item 1/3.");

        let done = env
            .step(
                &Action {
                    is_final: true,
                    final_answer: "report".to_string(),
                    ..Default::default()
                },
                3,
            )
            .await
            .unwrap();
        assert!(done.done && done.success);
        assert_eq!(done.final_answer, "report");
        assert_eq!(done.observation, "Finalized at step 3: report");
    }
}
