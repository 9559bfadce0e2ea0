//! Prompt 模板：每个角色一个 `<dir>/<role>.toml`（system / user_template 两个键）
//!
//! 占位符语法为 `{name}`，`{{` 与 `}}` 转义为字面花括号；`{` 后不是合法变量名时原样保留（便于在模板中写 JSON 示例）。
//! 缺少变量时返回 MissingPromptVariable。

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::AgentError;

/// 模板变量
pub type TemplateVars = BTreeMap<String, String>;

/// 单个角色的模板（文件内容或覆盖项；覆盖时逐键生效）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolePrompt {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_template: Option<String>,
}

impl RolePrompt {
    /// other 中存在的键覆盖 self
    pub fn merged_with(&self, other: &RolePrompt) -> RolePrompt {
        RolePrompt {
            system: other.system.clone().or_else(|| self.system.clone()),
            user_template: other.user_template.clone().or_else(|| self.user_template.clone()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PromptTemplates {
    dir: PathBuf,
    role_overrides: HashMap<String, RolePrompt>,
    shared: TemplateVars,
}

impl PromptTemplates {
    pub fn new(
        dir: impl AsRef<Path>,
        role_overrides: HashMap<String, RolePrompt>,
        shared: TemplateVars,
    ) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            role_overrides,
            shared,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn shared(&self) -> &TemplateVars {
        &self.shared
    }

    pub fn roles_with_override(&self) -> Vec<String> {
        let mut roles: Vec<String> = self.role_overrides.keys().cloned().collect();
        roles.sort();
        roles
    }

    /// 读取角色模板并应用覆盖；结果为 (system, user_template)
    pub fn get(&self, role: &str) -> Result<(String, String), AgentError> {
        let path = self.dir.join(format!("{role}.toml"));
        let from_file = if path.exists() {
            let text = std::fs::read_to_string(&path)?;
            toml::from_str::<RolePrompt>(&text).map_err(|e| {
                AgentError::Config(format!("invalid prompt file {}: {e}", path.display()))
            })?
        } else {
            RolePrompt::default()
        };
        let merged = match self.role_overrides.get(role) {
            Some(o) => from_file.merged_with(o),
            None => from_file,
        };
        match (merged.system, merged.user_template) {
            (Some(system), Some(user)) => Ok((system, user)),
            _ => Err(AgentError::Config(format!(
                "prompt template for role '{role}' not found (expected {})",
                path.display()
            ))),
        }
    }

    /// 渲染 (system, user)；调用方变量覆盖共享上下文中的同名键
    pub fn render(&self, role: &str, vars: &TemplateVars) -> Result<(String, String), AgentError> {
        let (system, user) = self.get(role)?;
        let mut all = self.shared.clone();
        all.extend(vars.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok((
            render_template(&system, &all, role)?,
            render_template(&user, &all, role)?,
        ))
    }

    /// 启动前检查：模板中的每个占位符都必须由 `provided` 或共享上下文提供
    pub fn preflight(&self, role: &str, provided: &[&str]) -> Result<(), AgentError> {
        let (system, user) = self.get(role)?;
        let available: BTreeSet<&str> = provided
            .iter()
            .copied()
            .chain(self.shared.keys().map(String::as_str))
            .collect();
        for name in placeholders(&system).into_iter().chain(placeholders(&user)) {
            if !available.contains(name.as_str()) {
                return Err(AgentError::MissingPromptVariable {
                    role: role.to_string(),
                    variable: name,
                });
            }
        }
        Ok(())
    }
}

enum Token<'a> {
    Text(&'a str),
    Var(&'a str),
}

fn tokenize(template: &str) -> Vec<Token<'_>> {
    let bytes = template.as_bytes();
    let mut tokens = Vec::new();
    let mut text_start = 0;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'{' | b'}' if bytes.get(i + 1) == Some(&bytes[i]) => {
                tokens.push(Token::Text(&template[text_start..=i]));
                i += 2;
                text_start = i;
            }
            b'{' => {
                let rest = &template[i + 1..];
                let name_len = rest
                    .bytes()
                    .take_while(|b| b.is_ascii_alphanumeric() || *b == b'_')
                    .count();
                if name_len > 0 && rest.as_bytes().get(name_len) == Some(&b'}') {
                    tokens.push(Token::Text(&template[text_start..i]));
                    tokens.push(Token::Var(&rest[..name_len]));
                    i += name_len + 2;
                    text_start = i;
                } else {
                    i += 1;
                }
            }
            _ => i += 1,
        }
    }
    tokens.push(Token::Text(&template[text_start..]));
    tokens
}

/// 模板中出现的变量名（按出现顺序，可能重复）
pub fn placeholders(template: &str) -> Vec<String> {
    tokenize(template)
        .into_iter()
        .filter_map(|t| match t {
            Token::Var(name) => Some(name.to_string()),
            Token::Text(_) => None,
        })
        .collect()
}

pub fn render_template(template: &str, vars: &TemplateVars, role: &str) -> Result<String, AgentError> {
    let mut out = String::with_capacity(template.len());
    for token in tokenize(template) {
        match token {
            Token::Text(t) => out.push_str(t),
            Token::Var(name) => {
                let value = vars.get(name).ok_or_else(|| AgentError::MissingPromptVariable {
                    role: role.to_string(),
                    variable: name.to_string(),
                })?;
                out.push_str(value);
            }
        }
    }
    Ok(out)
}
