//! 微调数据导出：回放 `<trace_dir>/<run_id>/events.jsonl`，生成 `{system, user, assistant}` 三元组
//!
//! 两类记录：
//! - 每个字段齐全的 `llm_call` 事件一条（assistant = parsed_output 的 JSON）
//! - 每个 `<role>_output` 事件一条，与同一 step、同一角色的 `<role>_input` 配对（缺失时用 `{}`）

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use walkdir::WalkDir;

use crate::trace::{events, EVENTS_FILE};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    fn new(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SftRecord {
    pub run_id: String,
    pub step: u64,
    pub role: String,
    pub source_event: String,
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DatasetSummary {
    pub trace_dir: PathBuf,
    pub output_path: PathBuf,
    pub num_records: usize,
}

/// 读取事件文件；空行跳过，损坏的行告警后跳过（崩溃的运行可能留下截断的末行）
fn load_events(path: &Path) -> anyhow::Result<Vec<Map<String, Value>>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut rows = Vec::new();
    for (lineno, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("read {}", path.display()))?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<Map<String, Value>>(line) {
            Ok(row) => rows.push(row),
            Err(e) => tracing::warn!(
                path = %path.display(),
                line = lineno + 1,
                error = %e,
                "skipping malformed trace line"
            ),
        }
    }
    Ok(rows)
}

/// `trace_dir` 下的运行目录（按名称排序）
fn run_dirs(trace_dir: &Path) -> Vec<PathBuf> {
    if !trace_dir.is_dir() {
        return Vec::new();
    }
    WalkDir::new(trace_dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_dir())
        .map(|e| e.into_path())
        .collect()
}

fn non_empty_str<'a>(payload: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    payload
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn llm_call_record(run_id: &str, step: u64, payload: &Map<String, Value>) -> Option<SftRecord> {
    let system = non_empty_str(payload, "system_prompt")?;
    let user = non_empty_str(payload, "user_prompt")?;
    let parsed = payload.get("parsed_output").filter(|v| !v.is_null())?;
    let role = payload
        .get("agent")
        .and_then(Value::as_str)
        .unwrap_or("unknown");
    Some(SftRecord {
        run_id: run_id.to_string(),
        step,
        role: role.to_string(),
        source_event: events::LLM_CALL.to_string(),
        messages: vec![
            ChatMessage::new("system", system),
            ChatMessage::new("user", user),
            ChatMessage::new("assistant", parsed.to_string()),
        ],
    })
}

/// 单次运行的事件 -> 记录
pub fn records_from_events(events_in_run: &[Map<String, Value>]) -> Vec<SftRecord> {
    let mut records = Vec::new();
    let mut role_inputs: HashMap<(String, u64), Value> = HashMap::new();

    for event in events_in_run {
        let event_type = event.get("event_type").and_then(Value::as_str).unwrap_or("");
        let run_id = event.get("run_id").and_then(Value::as_str).unwrap_or("");
        let step = event.get("step").and_then(Value::as_u64).unwrap_or(0);
        let empty = Map::new();
        let payload = event.get("payload").and_then(Value::as_object).unwrap_or(&empty);

        if event_type == events::LLM_CALL {
            if let Some(record) = llm_call_record(run_id, step, payload) {
                records.push(record);
            }
        } else if let Some(role) = event_type.strip_suffix("_input") {
            role_inputs.insert((role.to_string(), step), Value::Object(payload.clone()));
        } else if let Some(role) = event_type.strip_suffix("_output") {
            let input = role_inputs
                .get(&(role.to_string(), step))
                .cloned()
                .unwrap_or_else(|| json!({}));
            records.push(SftRecord {
                run_id: run_id.to_string(),
                step,
                role: role.to_string(),
                source_event: event_type.to_string(),
                messages: vec![
                    ChatMessage::new("system", format!("{role} role boundary trace")),
                    ChatMessage::new("user", input.to_string()),
                    ChatMessage::new("assistant", Value::Object(payload.clone()).to_string()),
                ],
            });
        }
    }
    records
}

pub fn build_sft_records(trace_dir: &Path) -> anyhow::Result<Vec<SftRecord>> {
    let mut records = Vec::new();
    for run_dir in run_dirs(trace_dir) {
        let rows = load_events(&run_dir.join(EVENTS_FILE))?;
        records.extend(records_from_events(&rows));
    }
    Ok(records)
}

fn write_jsonl(path: &Path, rows: &[SftRecord]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    let mut out = BufWriter::new(File::create(path).with_context(|| format!("create {}", path.display()))?);
    for row in rows {
        serde_json::to_writer(&mut out, row)?;
        out.write_all(b"\n")?;
    }
    out.flush()?;
    Ok(())
}

/// 导出整个追踪目录
pub fn build_trajectory_dataset(
    trace_dir: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
) -> anyhow::Result<DatasetSummary> {
    let trace_dir = trace_dir.as_ref();
    let output_path = output_path.as_ref();
    let records = build_sft_records(trace_dir)?;
    write_jsonl(output_path, &records)?;
    tracing::info!(
        trace_dir = %trace_dir.display(),
        output = %output_path.display(),
        records = records.len(),
        "trajectory dataset written"
    );
    Ok(DatasetSummary {
        trace_dir: trace_dir.to_path_buf(),
        output_path: output_path.to_path_buf(),
        num_records: records.len(),
    })
}
