//! TraceCollector：会话生命周期 + 追加式事件日志
//!
//! 是否启用在构造时确定；禁用实例实现完整接口但不做任何事，调用方无需分支。
//! 状态机只写不读（单向依赖）。

use std::sync::Mutex;

use serde_json::{Map, Value};

use crate::core::AgentError;
use crate::trace::schema::{
    utc_now_iso, SessionStart, SessionStatus, TraceConfig, TraceEvent, TraceSession,
};
use crate::trace::writer::TraceWriter;

#[derive(Debug, Default)]
struct CollectorState {
    session: Option<TraceSession>,
    event_count: u64,
    last_step: u32,
}

#[derive(Debug)]
pub struct TraceCollector {
    run_id: String,
    schema_version: String,
    writer: Option<TraceWriter>,
    state: Mutex<CollectorState>,
}

impl TraceCollector {
    /// config.enabled=false 时等同于 disabled()，不创建目录
    pub fn new(config: &TraceConfig, run_id: impl Into<String>) -> Result<Self, AgentError> {
        let run_id = run_id.into();
        let writer = if config.enabled {
            Some(TraceWriter::create(&config.base_dir, &run_id)?)
        } else {
            None
        };
        Ok(Self {
            run_id,
            schema_version: config.schema_version.clone(),
            writer,
            state: Mutex::new(CollectorState::default()),
        })
    }

    pub fn disabled() -> Self {
        Self {
            run_id: String::new(),
            schema_version: TraceConfig::default().schema_version,
            writer: None,
            state: Mutex::new(CollectorState::default()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.writer.is_some()
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn writer(&self) -> Option<&TraceWriter> {
        self.writer.as_ref()
    }

    /// 已记录的事件数
    pub fn event_count(&self) -> u64 {
        self.state.lock().map(|s| s.event_count).unwrap_or(0)
    }

    /// 最近一条事件的 step；尚无事件时为 0
    pub fn last_step(&self) -> u32 {
        self.state.lock().map(|s| s.last_step).unwrap_or(0)
    }

    pub fn start_session(&self, start: SessionStart) -> Result<(), AgentError> {
        let Some(writer) = &self.writer else {
            return Ok(());
        };
        let session = TraceSession {
            schema_version: self.schema_version.clone(),
            run_id: self.run_id.clone(),
            goal: start.goal,
            environment: start.environment,
            model_stack: start.model_stack,
            runtime_config: start.runtime_config,
            metadata: start.metadata,
            started_at: utc_now_iso(),
            finished_at: String::new(),
            status: SessionStatus::Running,
            summary: Map::new(),
        };
        writer.write_session(&session)?;
        self.lock()?.session = Some(session);
        Ok(())
    }

    /// 追加一条事件；锁在写盘期间一直持有，使计数与落盘顺序一致
    pub fn log_event(
        &self,
        event_type: &str,
        step: u32,
        payload: Value,
    ) -> Result<(), AgentError> {
        let Some(writer) = &self.writer else {
            return Ok(());
        };
        let event = TraceEvent {
            schema_version: self.schema_version.clone(),
            run_id: self.run_id.clone(),
            step,
            event_type: event_type.to_string(),
            payload,
            meta: Map::new(),
            timestamp: utc_now_iso(),
        };
        let mut state = self.lock()?;
        writer.append_event(&event)?;
        state.event_count += 1;
        state.last_step = step;
        Ok(())
    }

    /// 结束会话：写入状态与 summary（调用方字段 + event_count）
    pub fn close(
        &self,
        status: SessionStatus,
        summary: Map<String, Value>,
    ) -> Result<(), AgentError> {
        let Some(writer) = &self.writer else {
            return Ok(());
        };
        let mut state = self.lock()?;
        let event_count = state.event_count;
        let session = state
            .session
            .as_mut()
            .ok_or_else(|| AgentError::Trace("close() called before start_session()".into()))?;
        let mut merged = summary;
        merged.insert("event_count".to_string(), Value::from(event_count));
        session.status = status;
        session.finished_at = utc_now_iso();
        session.summary = merged;
        writer.write_session(&*session)?;
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, CollectorState>, AgentError> {
        self.state
            .lock()
            .map_err(|_| AgentError::Trace("trace collector lock poisoned".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn enabled_config(dir: &TempDir) -> TraceConfig {
        TraceConfig {
            enabled: true,
            base_dir: dir.path().to_string_lossy().into_owned(),
            schema_version: "1.0.0".to_string(),
        }
    }

    #[test]
    fn test_writes_session_and_events() {
        let dir = TempDir::new().unwrap();
        let tracer = TraceCollector::new(&enabled_config(&dir), "run123").unwrap();
        tracer
            .start_session(SessionStart {
                goal: "test".to_string(),
                environment: json!({"kind": "simulator"}),
                model_stack: json!({"planner": {"model": "mock"}}),
                runtime_config: json!({"max_steps": 3}),
                metadata: json!({"unit_test": true}),
            })
            .unwrap();
        tracer.log_event("unit", 0, json!({"ok": true})).unwrap();
        let mut summary = Map::new();
        summary.insert("ok".to_string(), json!(true));
        tracer.close(SessionStatus::Completed, summary).unwrap();

        let session_path = dir.path().join("run123").join("session.json");
        let events_path = dir.path().join("run123").join("events.jsonl");
        let session: TraceSession =
            serde_json::from_slice(&std::fs::read(&session_path).unwrap()).unwrap();
        assert_eq!(session.status, SessionStatus::Completed);
        assert_eq!(session.summary["event_count"], 1);
        assert_eq!(session.summary["ok"], true);
        assert!(!session.finished_at.is_empty());

        let events = std::fs::read_to_string(&events_path).unwrap();
        assert_eq!(events.lines().count(), 1);
    }

    #[test]
    fn test_event_order_matches_call_order() {
        let dir = TempDir::new().unwrap();
        let tracer = TraceCollector::new(&enabled_config(&dir), "ordered").unwrap();
        tracer.start_session(SessionStart::default()).unwrap();
        for (i, kind) in ["planner_input", "planner_output", "executor_input"].iter().enumerate() {
            tracer.log_event(kind, i as u32, json!({})).unwrap();
        }
        let text = std::fs::read_to_string(tracer.writer().unwrap().events_path()).unwrap();
        let kinds: Vec<String> = text
            .lines()
            .map(|l| serde_json::from_str::<TraceEvent>(l).unwrap().event_type)
            .collect();
        assert_eq!(kinds, vec!["planner_input", "planner_output", "executor_input"]);
        assert_eq!(tracer.event_count(), 3);
    }

    #[test]
    fn test_last_step_follows_logged_events() {
        let dir = TempDir::new().unwrap();
        let tracer = TraceCollector::new(&enabled_config(&dir), "steps").unwrap();
        tracer.start_session(SessionStart::default()).unwrap();
        assert_eq!(tracer.last_step(), 0);
        tracer.log_event("planner_output", 1, json!({})).unwrap();
        tracer.log_event("executor_output", 3, json!({})).unwrap();
        assert_eq!(tracer.last_step(), 3);
    }

    #[test]
    fn test_disabled_is_noop() {
        let tracer = TraceCollector::disabled();
        assert!(!tracer.is_enabled());
        tracer.start_session(SessionStart::default()).unwrap();
        tracer.log_event("unit", 0, json!({})).unwrap();
        tracer.close(SessionStatus::Failed, Map::new()).unwrap();
        assert_eq!(tracer.event_count(), 0);
    }

    #[test]
    fn test_disabled_config_creates_nothing() {
        let dir = TempDir::new().unwrap();
        let mut cfg = enabled_config(&dir);
        cfg.enabled = false;
        let tracer = TraceCollector::new(&cfg, "quiet").unwrap();
        tracer.log_event("unit", 0, json!({})).unwrap();
        assert!(!dir.path().join("quiet").exists());
    }

    #[test]
    fn test_run_id_cannot_be_reused() {
        let dir = TempDir::new().unwrap();
        let cfg = enabled_config(&dir);
        let first = TraceCollector::new(&cfg, "dup").unwrap();
        first.start_session(SessionStart::default()).unwrap();
        assert!(matches!(
            TraceCollector::new(&cfg, "dup"),
            Err(AgentError::Trace(_))
        ));
    }
}
