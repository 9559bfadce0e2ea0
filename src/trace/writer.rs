//! 追踪落盘：`<base_dir>/<run_id>/session.json` 与 `<base_dir>/<run_id>/events.jsonl`

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::core::AgentError;

pub const SESSION_FILE: &str = "session.json";
pub const EVENTS_FILE: &str = "events.jsonl";

#[derive(Debug)]
pub struct TraceWriter {
    run_dir: PathBuf,
    session_path: PathBuf,
    events_path: PathBuf,
}

impl TraceWriter {
    /// 创建运行目录；若该 run_id 已有 session.json 则拒绝（两个 Episode 不得共用 run_id）
    pub fn create(base_dir: impl AsRef<Path>, run_id: &str) -> Result<Self, AgentError> {
        let run_dir = base_dir.as_ref().join(run_id);
        let session_path = run_dir.join(SESSION_FILE);
        if session_path.exists() {
            return Err(AgentError::Trace(format!(
                "run id already in use: {}",
                run_dir.display()
            )));
        }
        fs::create_dir_all(&run_dir)?;
        Ok(Self {
            events_path: run_dir.join(EVENTS_FILE),
            session_path,
            run_dir,
        })
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    pub fn session_path(&self) -> &Path {
        &self.session_path
    }

    pub fn events_path(&self) -> &Path {
        &self.events_path
    }

    /// 整体覆盖写 session.json
    pub fn write_session<T: Serialize>(&self, session: &T) -> Result<(), AgentError> {
        let data = serde_json::to_vec_pretty(session)?;
        fs::write(&self.session_path, data)?;
        Ok(())
    }

    /// 追加一行事件并立即 flush，保证落盘顺序与调用顺序一致
    pub fn append_event<T: Serialize>(&self, event: &T) -> Result<(), AgentError> {
        let mut line = serde_json::to_vec(event)?;
        line.push(b'\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.events_path)?;
        file.write_all(&line)?;
        file.flush()?;
        Ok(())
    }
}
