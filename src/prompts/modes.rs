//! 运行模式档案：每个模式给出角色 system prompt 覆盖 + 共享模板变量（agentic_mode / mode_guideline）

use std::collections::HashMap;

use crate::core::{AgenticMode, Role};
use crate::prompts::templates::{RolePrompt, TemplateVars};

#[derive(Debug, Clone)]
pub struct ModeProfile {
    pub role_overrides: HashMap<String, RolePrompt>,
    pub shared: TemplateVars,
}

pub fn mode_guideline(mode: AgenticMode) -> &'static str {
    match mode {
        AgenticMode::CodeAct => "Prefer executable, tool-grounded, testable actions.",
        AgenticMode::React => "Prefer thought-action-observation loops with concise rationale.",
    }
}

fn mode_system_prompt(mode: AgenticMode, role: Role) -> &'static str {
    match (mode, role) {
        (AgenticMode::CodeAct, Role::Planner) => {
            "You are the Planner operating in CodeAct mode. \
             Produce implementation-oriented plan steps with clear execution intent. \
             Output strict JSON only."
        }
        (AgenticMode::CodeAct, Role::Executor) => {
            "You are the Executor operating in CodeAct mode. \
             Convert plan steps into concrete actions and tool calls when beneficial. \
             Output strict JSON only."
        }
        (AgenticMode::CodeAct, Role::Reviewer) => {
            "You are the Reviewer operating in CodeAct mode. \
             Validate executability, correctness, and stop/replan decisions. \
             Output strict JSON only."
        }
        (AgenticMode::React, Role::Planner) => {
            "You are the Planner operating in ReAct mode. \
             Design steps that support iterative reason-observe-act refinement. \
             Output strict JSON only."
        }
        (AgenticMode::React, Role::Executor) => {
            "You are the Executor operating in ReAct mode. \
             Act step-by-step using observation feedback and concise reasoning summaries. \
             Output strict JSON only."
        }
        (AgenticMode::React, Role::Reviewer) => {
            "You are the Reviewer operating in ReAct mode. \
             Review whether the reasoning-observation loop should continue, replan, or end. \
             Output strict JSON only."
        }
    }
}

pub fn mode_profile(mode: AgenticMode) -> ModeProfile {
    let role_overrides = Role::ALL
        .iter()
        .map(|role| {
            (
                role.as_str().to_string(),
                RolePrompt {
                    system: Some(mode_system_prompt(mode, *role).to_string()),
                    user_template: None,
                },
            )
        })
        .collect();
    let mut shared = TemplateVars::new();
    shared.insert("agentic_mode".to_string(), mode.as_str().to_string());
    shared.insert("mode_guideline".to_string(), mode_guideline(mode).to_string());
    ModeProfile {
        role_overrides,
        shared,
    }
}

impl ModeProfile {
    /// 叠加用户配置：用户覆盖项逐键优先，用户共享变量覆盖同名模式变量
    pub fn merge_user(
        mut self,
        user_overrides: &HashMap<String, RolePrompt>,
        user_shared: &TemplateVars,
    ) -> ModeProfile {
        for (role, prompt) in user_overrides {
            let merged = match self.role_overrides.get(role) {
                Some(base) => base.merged_with(prompt),
                None => prompt.clone(),
            };
            self.role_overrides.insert(role.clone(), merged);
        }
        self.shared
            .extend(user_shared.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_react_profile() {
        let p = mode_profile(AgenticMode::React);
        assert_eq!(p.shared["agentic_mode"], "react");
        let system = p.role_overrides["planner"].system.as_deref().unwrap();
        assert!(system.contains("ReAct mode"));
        assert!(p.role_overrides["planner"].user_template.is_none());
    }

    #[test]
    fn test_user_overrides_win() {
        let mut user = HashMap::new();
        user.insert(
            "reviewer".to_string(),
            RolePrompt {
                system: Some("custom reviewer".to_string()),
                user_template: None,
            },
        );
        let mut shared = TemplateVars::new();
        shared.insert("mode_guideline".to_string(), "be brief".to_string());
        let p = mode_profile(AgenticMode::CodeAct).merge_user(&user, &shared);
        assert_eq!(p.role_overrides["reviewer"].system.as_deref(), Some("custom reviewer"));
        assert!(p.role_overrides["executor"]
            .system
            .as_deref()
            .unwrap()
            .contains("CodeAct"));
        assert_eq!(p.shared["mode_guideline"], "be brief");
        assert_eq!(p.shared["agentic_mode"], "codeact");
    }
}
