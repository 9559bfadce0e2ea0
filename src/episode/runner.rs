//! EpisodeRunner：一次完整运行的外壳
//!
//! 解析客户端、检查模板、构造环境 -> 生成 run_id 并创建追踪目录 -> 构造角色
//! -> 写入会话起始记录 -> 重置环境 -> 运行状态机 -> `episode_end` -> 可选写出 `episode_<run_id>.json`
//! -> 关闭会话（completed）。
//! 会话开始后的任何错误（含收尾阶段）：`episode_error` 事件（step 为最后一条事件的 step）+ 关闭会话（failed），
//! 错误原样返回。会话开始前的错误不留下追踪目录。

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::config::AppConfig;
use crate::core::{AgentError, AgenticMode, RecoveryEngine, Role};
use crate::environment::{build_environment, Environment};
use crate::episode::machine::EpisodeMachine;
use crate::episode::metrics::{compute_metrics, EpisodeArtifact, EpisodeMetrics};
use crate::episode::state::{EpisodeSettings, EpisodeState};
use crate::llm::{LlmClient, ModelBackend, OpenAiClient, ProviderSettings, TokenTotals};
use crate::prompts::{mode_profile, PromptTemplates};
use crate::roles::{role_variables, Executor, Planner, Reviewer, Roles};
use crate::tools::build_default_tool_registry;
use crate::trace::{events, SessionStart, SessionStatus, TraceCollector};

/// `YYYYMMDDTHHMMSSZ-<8 位十六进制>`，同一秒内启动的运行也不会冲突
pub fn new_run_id() -> String {
    let simple = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}", Utc::now().format("%Y%m%dT%H%M%SZ"), &simple[..8])
}

/// 一次运行的结果
#[derive(Debug, Clone, Serialize)]
pub struct EpisodeOutcome {
    pub run_id: String,
    pub final_state: EpisodeState,
    pub metrics: EpisodeMetrics,
    pub environment: String,
    pub trace_dir: Option<PathBuf>,
    pub artifact_path: Option<PathBuf>,
    pub token_usage: TokenTotals,
}

/// 每个角色及其客户端
type RoleClients = [(Role, Arc<dyn LlmClient>); 3];

impl EpisodeOutcome {
    /// 命令行输出的摘要
    pub fn summary(&self, mock_mode: bool) -> Value {
        let trace_run_id = if self.trace_dir.is_some() { self.run_id.as_str() } else { "" };
        json!({
            "success": self.final_state.success,
            "step_count": self.final_state.step_count,
            "final_answer": self.final_state.final_answer,
            "metrics": self.metrics,
            "environment": self.environment,
            "trace_enabled": self.trace_dir.is_some(),
            "trace_run_id": trace_run_id,
            "artifact_path": self.artifact_path,
            "token_usage": self.token_usage,
            "mock_mode": mock_mode,
            "agentic_mode": self.final_state.agentic_mode.as_str(),
        })
    }
}

pub struct EpisodeRunner {
    config: AppConfig,
    llm_client: Option<Arc<dyn LlmClient>>,
}

impl EpisodeRunner {
    /// 配置在构造时校验
    pub fn new(config: AppConfig) -> Result<Self, AgentError> {
        config.validate()?;
        Ok(Self {
            config,
            llm_client: None,
        })
    }

    /// 所有角色共用给定客户端（测试中用 MockLlmClient）
    pub fn with_llm_client(mut self, client: Arc<dyn LlmClient>) -> Self {
        self.llm_client = Some(client);
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn settings(&self) -> Result<EpisodeSettings, AgentError> {
        Ok(EpisodeSettings {
            max_steps: self.config.runtime.max_steps,
            dynamic_replanning: self.config.runtime.dynamic_replanning,
            use_cot: self.config.runtime.use_cot,
            agentic_mode: self.config.runtime.mode()?,
        })
    }

    /// 模式档案 + 用户覆盖后的模板
    pub fn prompt_templates(&self) -> Result<PromptTemplates, AgentError> {
        let mode = self.config.runtime.mode()?;
        let profile = mode_profile(mode).merge_user(&self.config.prompts.roles, &self.config.prompts.shared);
        Ok(PromptTemplates::new(
            &self.config.prompts.dir,
            profile.role_overrides,
            profile.shared,
        ))
    }

    fn client_for(&self, role: Role) -> Arc<dyn LlmClient> {
        if let Some(c) = &self.llm_client {
            return c.clone();
        }
        let settings = ProviderSettings::from_env(
            &self.config.llm.provider,
            self.config.llm.base_url.as_deref(),
        );
        Arc::new(OpenAiClient::new(
            &settings,
            self.config.models.for_role(role).timeout_secs,
        ))
    }

    fn backend_for(&self, role: Role, client: Arc<dyn LlmClient>, tracer: &Arc<TraceCollector>) -> ModelBackend {
        let model = self.config.models.for_role(role);
        ModelBackend::new(
            client,
            model.model.clone(),
            model.to_params(Some(self.config.runtime.seed)),
            self.config.llm.retry.clone(),
            tracer.clone(),
        )
    }

    /// force_mock 或所有后端都未配置时返回 None（只用确定性策略）
    fn model_clients(&self) -> Option<RoleClients> {
        if self.config.runtime.force_mock {
            return None;
        }
        let clients = Role::ALL.map(|r| (r, self.client_for(r)));
        clients.iter().any(|(_, c)| c.is_configured()).then_some(clients)
    }

    /// 加载模板并检查每个角色的变量
    fn prepared_prompts(&self) -> Result<Arc<PromptTemplates>, AgentError> {
        let prompts = self.prompt_templates()?;
        for role in Role::ALL {
            prompts.preflight(role.as_str(), role_variables(role))?;
        }
        Ok(Arc::new(prompts))
    }

    fn build_roles(
        &self,
        mode: AgenticMode,
        tracer: Arc<TraceCollector>,
        backing: Option<(RoleClients, Arc<PromptTemplates>)>,
    ) -> Roles {
        let tools = Arc::new(build_default_tool_registry(
            self.config.tools.timeout_secs,
            self.config.tools.fetch_max_chars,
        ));
        let Some((clients, prompts)) = backing else {
            return Roles::new(
                Planner::deterministic(mode),
                Executor::deterministic(mode, tools, tracer),
                Reviewer::deterministic(),
            );
        };

        let recovery = RecoveryEngine::strict(self.config.runtime.strict_backend_errors);
        let [planner, executor, reviewer] = clients
            .clone()
            .map(|(role, client)| self.backend_for(role, client, &tracer));
        Roles::new(
            Planner::model_backed(planner, prompts.clone(), mode, recovery),
            Executor::model_backed(executor, prompts.clone(), mode, recovery, tools, tracer),
            Reviewer::model_backed(reviewer, prompts, mode, recovery),
        )
        .with_clients(clients.map(|(_, client)| client))
    }

    /// 用配置构造角色与环境并运行；模板与环境的错误在创建追踪目录之前返回
    pub async fn run(&self, goal: &str) -> Result<EpisodeOutcome, AgentError> {
        let mode = self.config.runtime.mode()?;
        let backing = match self.model_clients() {
            Some(clients) => Some((clients, self.prepared_prompts()?)),
            None => {
                tracing::info!(force_mock = self.config.runtime.force_mock, "using deterministic strategies");
                None
            }
        };
        let environment = build_environment(&self.config.runtime.environment)?;

        let run_id = new_run_id();
        let tracer = Arc::new(TraceCollector::new(&self.config.tracing, &run_id)?);
        let roles = self.build_roles(mode, tracer.clone(), backing);
        self.run_with(goal, &run_id, &roles, environment, tracer).await
    }

    /// 使用调用方给定的角色、环境与追踪器运行（run_id 必须与 tracer 一致）
    pub async fn run_with(
        &self,
        goal: &str,
        run_id: &str,
        roles: &Roles,
        mut environment: Box<dyn Environment>,
        tracer: Arc<TraceCollector>,
    ) -> Result<EpisodeOutcome, AgentError> {
        let settings = self.settings()?;
        let env_name = environment.name().to_string();
        tracer.start_session(self.session_start(goal, &env_name, roles, settings.agentic_mode)?)?;
        tracing::info!(run_id, goal, environment = %env_name, "episode started");

        let result = match run_machine(goal, settings, roles, environment.as_mut(), &tracer).await {
            Ok(state) => self.finish(run_id, goal, env_name, state, roles, &tracer),
            Err(e) => Err(e),
        };
        if let Err(e) = &result {
            record_failure(&tracer, e);
            tracing::error!(run_id, error = %e, "episode failed");
        }
        result
    }

    /// `episode_end` -> 产物 -> 关闭会话；任一步出错都由调用方记为失败
    fn finish(
        &self,
        run_id: &str,
        goal: &str,
        env_name: String,
        final_state: EpisodeState,
        roles: &Roles,
        tracer: &TraceCollector,
    ) -> Result<EpisodeOutcome, AgentError> {
        let metrics = compute_metrics(&final_state);
        let token_usage = roles.token_usage();
        tracer.log_event(
            events::EPISODE_END,
            final_state.step_count,
            json!({
                "success": final_state.success,
                "final_answer": final_state.final_answer,
                "metrics": metrics,
                "token_usage": token_usage,
            }),
        )?;

        let artifact_path = if self.config.runtime.save_artifacts {
            Some(self.write_artifact(run_id, goal, &env_name, &final_state, &metrics)?)
        } else {
            None
        };

        let mut summary = Map::new();
        summary.insert("success".to_string(), json!(final_state.success));
        summary.insert("step_count".to_string(), json!(final_state.step_count));
        summary.insert("metrics".to_string(), serde_json::to_value(&metrics)?);
        summary.insert("token_usage".to_string(), serde_json::to_value(token_usage)?);
        tracer.close(SessionStatus::Completed, summary)?;
        tracing::info!(
            run_id,
            success = final_state.success,
            steps = final_state.step_count,
            total_tokens = token_usage.total_tokens,
            "episode finished"
        );

        Ok(EpisodeOutcome {
            run_id: run_id.to_string(),
            final_state,
            metrics,
            environment: env_name,
            trace_dir: tracer.writer().map(|w| w.run_dir().to_path_buf()),
            artifact_path,
            token_usage,
        })
    }

    fn model_stack(&self) -> Result<Value, AgentError> {
        let mut stack = Map::new();
        for role in Role::ALL {
            stack.insert(
                role.as_str().to_string(),
                serde_json::to_value(self.config.models.for_role(role))?,
            );
        }
        Ok(Value::Object(stack))
    }

    fn session_start(
        &self,
        goal: &str,
        env_name: &str,
        roles: &Roles,
        mode: AgenticMode,
    ) -> Result<SessionStart, AgentError> {
        Ok(SessionStart {
            goal: goal.to_string(),
            environment: json!({ "kind": self.config.runtime.environment, "name": env_name }),
            model_stack: self.model_stack()?,
            runtime_config: serde_json::to_value(&self.config.runtime)?,
            metadata: json!({
                "mock": self.config.runtime.force_mock,
                "agentic_mode": mode.as_str(),
                "architecture": "3-role-planner-executor-reviewer",
                "strategies": {
                    "planner": roles.planner.strategy_name(),
                    "executor": roles.executor.strategy_name(),
                    "reviewer": roles.reviewer.strategy_name(),
                },
                "prompts_dir": self.config.prompts.dir,
                "prompt_roles_with_override": self.config.prompts.roles.keys().collect::<Vec<_>>(),
            }),
        })
    }

    fn write_artifact(
        &self,
        run_id: &str,
        goal: &str,
        env_name: &str,
        state: &EpisodeState,
        metrics: &EpisodeMetrics,
    ) -> Result<PathBuf, AgentError> {
        let dir = Path::new(&self.config.runtime.artifact_dir);
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!("episode_{run_id}.json"));
        let report = json!({
            "goal": goal,
            "config": self.config.runtime,
            "models": self.model_stack()?,
            "environment": { "name": env_name, "kind": self.config.runtime.environment },
            "prompts": {
                "agentic_mode": state.agentic_mode.as_str(),
                "prompts_dir": self.config.prompts.dir,
            },
            "metrics": metrics,
            "final_state": state,
            "artifact": EpisodeArtifact::from_state(run_id, state),
        });
        std::fs::write(&path, serde_json::to_vec_pretty(&report)?)?;
        tracing::info!(path = %path.display(), "episode artifact written");
        Ok(path)
    }
}

async fn run_machine(
    goal: &str,
    settings: EpisodeSettings,
    roles: &Roles,
    environment: &mut dyn Environment,
    tracer: &TraceCollector,
) -> Result<EpisodeState, AgentError> {
    let observation = environment.reset(goal).await?;
    let initial = EpisodeState::initial(goal, observation, settings);
    EpisodeMachine::new(roles, environment, tracer).run(initial).await
}

/// 失败记录本身出错时只打日志，保留原始错误
fn record_failure(tracer: &TraceCollector, err: &AgentError) {
    let message = err.to_string();
    let payload = json!({ "error_type": err.kind(), "error_message": message });
    if let Err(e) = tracer.log_event(events::EPISODE_ERROR, tracer.last_step(), payload) {
        tracing::warn!(error = %e, "failed to record episode_error");
    }
    let mut summary = Map::new();
    summary.insert("error_type".to_string(), json!(err.kind()));
    summary.insert("error_message".to_string(), json!(message));
    if let Err(e) = tracer.close(SessionStatus::Failed, summary) {
        tracing::warn!(error = %e, "failed to close trace session");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_id_format() {
        let id = new_run_id();
        let (ts, suffix) = id.split_once('-').unwrap();
        assert_eq!(ts.len(), 16);
        assert!(ts.ends_with('Z'));
        assert_eq!(&ts[8..9], "T");
        assert_eq!(suffix.len(), 8);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(new_run_id(), new_run_id());
    }

    #[test]
    fn test_invalid_config_is_rejected_up_front() {
        let mut cfg = AppConfig::default();
        cfg.runtime.max_steps = 0;
        assert!(matches!(EpisodeRunner::new(cfg), Err(AgentError::Config(_))));
    }
}
