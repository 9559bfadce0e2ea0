//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `TRIAD__*` 覆盖（双下划线表示嵌套，如 `TRIAD__RUNTIME__MAX_STEPS=4`）。

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::core::{AgentError, AgenticMode, Role};
use crate::llm::{GenerationParams, RetryConfig};
use crate::prompts::RolePrompt;
use crate::trace::TraceConfig;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub runtime: RuntimeSection,
    pub llm: LlmSection,
    pub models: ModelsSection,
    pub tracing: TraceConfig,
    pub prompts: PromptsSection,
    pub tools: ToolsSection,
}

/// [runtime] 段：步数预算、重规划、运行模式、产物输出
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeSection {
    #[serde(default = "default_seed")]
    pub seed: i64,
    /// 执行步数上限（>= 1）
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,
    #[serde(default = "default_true")]
    pub dynamic_replanning: bool,
    #[serde(default)]
    pub use_cot: bool,
    /// codeact / react
    #[serde(default = "default_agentic_mode")]
    pub agentic_mode: String,
    /// 跳过模型调用，全部使用确定性策略
    #[serde(default)]
    pub force_mock: bool,
    /// 后端错误（重试耗尽 / 被拒 / 输出无法解析）直接让 Episode 失败，而不是回退
    #[serde(default)]
    pub strict_backend_errors: bool,
    #[serde(default = "default_true")]
    pub save_artifacts: bool,
    #[serde(default = "default_artifact_dir")]
    pub artifact_dir: String,
    #[serde(default = "default_environment")]
    pub environment: String,
}

fn default_seed() -> i64 {
    7
}

fn default_max_steps() -> u32 {
    8
}

fn default_true() -> bool {
    true
}

fn default_agentic_mode() -> String {
    "codeact".to_string()
}

fn default_artifact_dir() -> String {
    "artifacts/reports".to_string()
}

fn default_environment() -> String {
    "simulator".to_string()
}

impl Default for RuntimeSection {
    fn default() -> Self {
        Self {
            seed: default_seed(),
            max_steps: default_max_steps(),
            dynamic_replanning: true,
            use_cot: false,
            agentic_mode: default_agentic_mode(),
            force_mock: false,
            strict_backend_errors: false,
            save_artifacts: true,
            artifact_dir: default_artifact_dir(),
            environment: default_environment(),
        }
    }
}

impl RuntimeSection {
    pub fn mode(&self) -> Result<AgenticMode, AgentError> {
        self.agentic_mode.parse().map_err(AgentError::Config)
    }
}

/// [llm] 段：后端提供方与重试
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSection {
    /// openai / huggingface；环境变量 LLM_PROVIDER 优先
    #[serde(default = "default_provider")]
    pub provider: String,
    pub base_url: Option<String>,
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_provider() -> String {
    "openai".to_string()
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            base_url: None,
            retry: RetryConfig::default(),
        }
    }
}

/// [models.<role>] 段：模型与生成参数；未设置的可选参数不下发
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSection {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub max_completion_tokens: Option<u32>,
    pub frequency_penalty: Option<f32>,
    pub presence_penalty: Option<f32>,
    pub timeout_secs: Option<u64>,
}

fn default_model() -> String {
    "gpt-4.1-mini".to_string()
}

fn default_temperature() -> Option<f32> {
    Some(0.2)
}

impl Default for ModelSection {
    fn default() -> Self {
        Self {
            model: default_model(),
            temperature: default_temperature(),
            top_p: None,
            max_completion_tokens: None,
            frequency_penalty: None,
            presence_penalty: None,
            timeout_secs: None,
        }
    }
}

impl ModelSection {
    pub fn to_params(&self, seed: Option<i64>) -> GenerationParams {
        GenerationParams {
            temperature: self.temperature,
            top_p: self.top_p,
            max_completion_tokens: self.max_completion_tokens,
            frequency_penalty: self.frequency_penalty,
            presence_penalty: self.presence_penalty,
            seed,
            timeout_secs: self.timeout_secs,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelsSection {
    pub planner: ModelSection,
    pub executor: ModelSection,
    pub reviewer: ModelSection,
}

impl ModelsSection {
    pub fn for_role(&self, role: Role) -> &ModelSection {
        match role {
            Role::Planner => &self.planner,
            Role::Executor => &self.executor,
            Role::Reviewer => &self.reviewer,
        }
    }

    pub fn for_role_mut(&mut self, role: Role) -> &mut ModelSection {
        match role {
            Role::Planner => &mut self.planner,
            Role::Executor => &mut self.executor,
            Role::Reviewer => &mut self.reviewer,
        }
    }
}

/// [prompts] 段：模板目录、共享变量、角色覆盖
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptsSection {
    #[serde(default = "default_prompts_dir")]
    pub dir: PathBuf,
    #[serde(default)]
    pub shared: BTreeMap<String, String>,
    /// 键为角色名（planner / executor / reviewer）
    #[serde(default)]
    pub roles: HashMap<String, RolePrompt>,
}

fn default_prompts_dir() -> PathBuf {
    PathBuf::from("config/prompts")
}

impl Default for PromptsSection {
    fn default() -> Self {
        Self {
            dir: default_prompts_dir(),
            shared: BTreeMap::new(),
            roles: HashMap::new(),
        }
    }
}

/// [tools] 段：工具超时与抓取字数
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒）
    #[serde(default = "default_tool_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_fetch_max_chars")]
    pub fetch_max_chars: usize,
}

fn default_tool_timeout_secs() -> u64 {
    30
}

fn default_fetch_max_chars() -> usize {
    1200
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            timeout_secs: default_tool_timeout_secs(),
            fetch_max_chars: default_fetch_max_chars(),
        }
    }
}

/// 命令行覆盖项；None / false 表示不覆盖
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub force_mock: bool,
    pub trace: bool,
    pub seed: Option<i64>,
    pub max_steps: Option<u32>,
    pub agentic_mode: Option<String>,
    pub dynamic_replanning: Option<bool>,
    pub use_cot: bool,
    pub environment: Option<String>,
    pub prompts_dir: Option<PathBuf>,
    pub planner_model: Option<String>,
    pub executor_model: Option<String>,
    pub reviewer_model: Option<String>,
}

impl AppConfig {
    /// 在任何 Episode 状态创建之前拒绝无效配置
    pub fn validate(&self) -> Result<(), AgentError> {
        if self.runtime.max_steps == 0 {
            return Err(AgentError::Config("runtime.max_steps must be >= 1".to_string()));
        }
        self.runtime.mode()?;
        for role in self.prompts.roles.keys() {
            if !Role::ALL.iter().any(|r| r.as_str() == role) {
                return Err(AgentError::Config(format!(
                    "prompts.roles.{role}: unknown role (expected planner, executor or reviewer)"
                )));
            }
        }
        Ok(())
    }

    pub fn apply_overrides(mut self, o: &Overrides) -> Self {
        if o.force_mock {
            self.runtime.force_mock = true;
        }
        if o.trace {
            self.tracing.enabled = true;
        }
        if o.use_cot {
            self.runtime.use_cot = true;
        }
        if let Some(seed) = o.seed {
            self.runtime.seed = seed;
        }
        if let Some(n) = o.max_steps {
            self.runtime.max_steps = n;
        }
        if let Some(mode) = o.agentic_mode.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            self.runtime.agentic_mode = mode.to_lowercase();
        }
        if let Some(v) = o.dynamic_replanning {
            self.runtime.dynamic_replanning = v;
        }
        if let Some(env) = &o.environment {
            self.runtime.environment = env.clone();
        }
        if let Some(dir) = &o.prompts_dir {
            self.prompts.dir = dir.clone();
        }
        let models = [
            (Role::Planner, &o.planner_model),
            (Role::Executor, &o.executor_model),
            (Role::Reviewer, &o.reviewer_model),
        ];
        for (role, model) in models {
            if let Some(m) = model.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
                self.models.for_role_mut(role).model = m.to_string();
            }
        }
        self
    }
}

/// 从 config 目录加载配置，环境变量 TRIAD__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path，则追加该文件（必须存在，可覆盖前面的键）
/// 3. 最后叠加环境变量 TRIAD__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(path) = config_path {
        builder = builder.add_source(config::File::from(path).required(true));
    }

    builder = builder.add_source(
        config::Environment::with_prefix("TRIAD")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.runtime.max_steps, 8);
        assert_eq!(cfg.runtime.seed, 7);
        assert!(cfg.runtime.dynamic_replanning);
        assert_eq!(cfg.runtime.mode().unwrap(), AgenticMode::CodeAct);
        assert!(!cfg.tracing.enabled);
        assert_eq!(cfg.models.planner.model, "gpt-4.1-mini");
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_steps_and_unknown_mode() {
        let mut cfg = AppConfig::default();
        cfg.runtime.max_steps = 0;
        assert!(matches!(cfg.validate(), Err(AgentError::Config(_))));

        let mut cfg = AppConfig::default();
        cfg.runtime.agentic_mode = "langchain".to_string();
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("Unsupported agentic_mode"));
    }

    #[test]
    fn test_unset_params_are_not_sent() {
        let params = ModelSection::default().to_params(Some(7));
        let v = serde_json::to_value(&params).unwrap();
        assert_eq!(v["seed"], 7);
        assert!(v.get("top_p").is_none());
        assert!(v.get("max_completion_tokens").is_none());
    }

    #[test]
    fn test_overrides() {
        let cfg = AppConfig::default().apply_overrides(&Overrides {
            force_mock: true,
            trace: true,
            max_steps: Some(3),
            agentic_mode: Some(" ReAct ".to_string()),
            dynamic_replanning: Some(false),
            executor_model: Some("gpt-4.1".to_string()),
            reviewer_model: Some("  ".to_string()),
            ..Default::default()
        });
        assert!(cfg.runtime.force_mock);
        assert!(cfg.tracing.enabled);
        assert_eq!(cfg.runtime.max_steps, 3);
        assert_eq!(cfg.runtime.mode().unwrap(), AgenticMode::React);
        assert!(!cfg.runtime.dynamic_replanning);
        assert_eq!(cfg.models.executor.model, "gpt-4.1");
        assert_eq!(cfg.models.reviewer.model, "gpt-4.1-mini");
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("run.toml");
        std::fs::write(
            &path,
            r#"
[runtime]
max_steps = 4
agentic_mode = "react"

[models.reviewer]
model = "reviewer-model"
top_p = 0.9

[prompts.shared]
company = "ACME"

[prompts.roles.planner]
system = "custom planner"
"#,
        )
        .unwrap();
        let cfg = load_config(Some(path)).unwrap();
        assert_eq!(cfg.runtime.max_steps, 4);
        assert_eq!(cfg.runtime.agentic_mode, "react");
        assert_eq!(cfg.models.reviewer.model, "reviewer-model");
        assert_eq!(cfg.models.reviewer.top_p, Some(0.9));
        assert_eq!(cfg.prompts.shared["company"], "ACME");
        assert_eq!(cfg.prompts.roles["planner"].system.as_deref(), Some("custom planner"));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        assert!(load_config(Some(PathBuf::from("/nonexistent/triad.toml"))).is_err());
    }
}
