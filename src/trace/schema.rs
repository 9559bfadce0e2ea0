//! 追踪数据结构：配置、会话记录（session.json）、事件记录（events.jsonl 每行一条）

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// [tracing] 段
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_base_dir")]
    pub base_dir: String,
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
}

fn default_base_dir() -> String {
    "artifacts/traces".to_string()
}

fn default_schema_version() -> String {
    "1.0.0".to_string()
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_dir: default_base_dir(),
            schema_version: default_schema_version(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Running,
    Completed,
    Failed,
}

/// start_session 的调用方输入
#[derive(Debug, Clone, Default)]
pub struct SessionStart {
    pub goal: String,
    pub environment: Value,
    pub model_stack: Value,
    pub runtime_config: Value,
    pub metadata: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceSession {
    pub schema_version: String,
    pub run_id: String,
    pub goal: String,
    pub environment: Value,
    pub model_stack: Value,
    pub runtime_config: Value,
    #[serde(default)]
    pub metadata: Value,
    pub started_at: String,
    #[serde(default)]
    pub finished_at: String,
    pub status: SessionStatus,
    /// 仅在 close 时填充
    #[serde(default)]
    pub summary: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEvent {
    pub schema_version: String,
    pub run_id: String,
    pub step: u32,
    pub event_type: String,
    pub payload: Value,
    #[serde(default)]
    pub meta: Map<String, Value>,
    pub timestamp: String,
}

pub fn utc_now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}
