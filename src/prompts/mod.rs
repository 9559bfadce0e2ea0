//! Prompt 层：外部 TOML 模板 + 运行模式档案

pub mod modes;
pub mod templates;

pub use modes::{mode_guideline, mode_profile, ModeProfile};
pub use templates::{render_template, PromptTemplates, RolePrompt, TemplateVars};
