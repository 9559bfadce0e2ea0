//! 领域类型：角色、运行模式、计划步骤、执行动作、评审结论
//!
//! 这些类型同时作为 LLM 输出的目标结构（schemars 生成 Schema 注入 prompt）与追踪事件的 payload。

use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// 三个角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Planner,
    Executor,
    Reviewer,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Planner, Role::Executor, Role::Reviewer];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Planner => "planner",
            Role::Executor => "executor",
            Role::Reviewer => "reviewer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 运行模式：CodeAct（工具驱动、可执行动作）/ ReAct（思考-行动-观察循环）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgenticMode {
    #[default]
    CodeAct,
    React,
}

impl AgenticMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgenticMode::CodeAct => "codeact",
            AgenticMode::React => "react",
        }
    }
}

impl fmt::Display for AgenticMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgenticMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "codeact" => Ok(AgenticMode::CodeAct),
            "react" => Ok(AgenticMode::React),
            other => Err(format!(
                "Unsupported agentic_mode '{other}'. Use codeact or react."
            )),
        }
    }
}

/// Reviewer 的路由决策
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    #[default]
    Continue,
    Replan,
    End,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Continue => "continue",
            Decision::Replan => "replan",
            Decision::End => "end",
        }
    }
}

impl FromStr for Decision {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "continue" => Ok(Decision::Continue),
            "replan" => Ok(Decision::Replan),
            "end" => Ok(Decision::End),
            other => Err(format!("unknown decision '{other}'")),
        }
    }
}

/// 计划中的一步
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PlanStep {
    /// 步骤标题（必填）
    pub title: String,
    #[serde(default)]
    pub rationale: String,
}

impl PlanStep {
    pub fn new(title: impl Into<String>, rationale: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            rationale: rationale.into(),
        }
    }
}

/// Planner 输出
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Plan {
    #[serde(default)]
    pub steps: Vec<PlanStep>,
}

/// Executor 请求调用的工具
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ToolRequest {
    pub name: String,
    #[serde(default)]
    pub arguments: serde_json::Map<String, serde_json::Value>,
}

/// Executor 输出（执行一个计划步骤得到的动作）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Action {
    #[serde(default)]
    pub summary: String,
    /// 自由文本，工具结果会追加在末尾
    #[serde(default)]
    pub output: String,
    #[serde(default)]
    pub is_final: bool,
    #[serde(default)]
    pub final_answer: String,
    #[serde(default)]
    pub tool_requests: Vec<ToolRequest>,
}

/// Reviewer 输出
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Review {
    pub decision: Decision,
    #[serde(default)]
    pub feedback: String,
    #[serde(default)]
    pub should_succeed: bool,
}

impl Review {
    pub fn new(decision: Decision, feedback: impl Into<String>, should_succeed: bool) -> Self {
        Self {
            decision,
            feedback: feedback.into(),
            should_succeed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agentic_mode_parse() {
        assert_eq!("ReAct".parse::<AgenticMode>().unwrap(), AgenticMode::React);
        assert_eq!(" codeact ".parse::<AgenticMode>().unwrap(), AgenticMode::CodeAct);
        assert!("langgraph".parse::<AgenticMode>().is_err());
    }

    #[test]
    fn test_action_defaults_from_sparse_json() {
        let action: Action = serde_json::from_value(serde_json::json!({"summary": "s"})).unwrap();
        assert_eq!(action.summary, "s");
        assert!(!action.is_final);
        assert!(action.tool_requests.is_empty());
    }

    #[test]
    fn test_decision_serializes_lowercase() {
        let review = Review::new(Decision::Replan, "retry", false);
        let v = serde_json::to_value(&review).unwrap();
        assert_eq!(v["decision"], "replan");
    }
}
