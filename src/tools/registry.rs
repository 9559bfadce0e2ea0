//! 工具注册表
//!
//! 所有工具实现 Tool trait（name / description / parameters_schema / call），由 ToolRegistry 按名注册。
//! `call` 永不返回错误：未知工具、工具报错、超时、panic 都包装为统一信封
//! `{ok, name, arguments, output | error}`，调用方对成功与失败一视同仁地记录。

use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::FutureExt;
use serde_json::{json, Map, Value};
use thiserror::Error;
use tokio::time::timeout;

/// 工具执行错误（只在注册表边界内出现，对外表现为信封中的 `error` 字段）
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    #[error("{0}")]
    InvalidArguments(String),

    #[error("{0}")]
    Execution(String),

    #[error("{0}")]
    Http(String),

    #[error("tool timed out after {0}ms")]
    Timeout(u64),

    #[error("{0}")]
    Panicked(String),
}

impl ToolError {
    pub fn kind(&self) -> &'static str {
        match self {
            ToolError::InvalidArguments(_) => "InvalidArguments",
            ToolError::Execution(_) => "ExecutionError",
            ToolError::Http(_) => "HttpError",
            ToolError::Timeout(_) => "Timeout",
            ToolError::Panicked(_) => "Panic",
        }
    }
}

/// 工具 trait：名称、描述（供 LLM 理解）、参数 schema、异步执行（args 为 JSON 对象）
#[async_trait]
pub trait Tool: Send + Sync {
    /// 工具名称（ToolRequest.name）
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// 参数 JSON Schema；默认表示参数不限
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    async fn call(&self, args: &Map<String, Value>) -> Result<Value, ToolError>;
}

/// 工具注册表：按名称存储 Arc<dyn Tool>；BTreeMap 保证 schema 输出顺序稳定
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
    timeout: Duration,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new(30)
    }
}

impl ToolRegistry {
    pub fn new(timeout_secs: u64) -> Self {
        Self {
            tools: BTreeMap::new(),
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// 同名工具后注册者覆盖
    pub fn register(&mut self, tool: impl Tool + 'static) {
        let name = tool.name().to_string();
        self.tools.insert(name, Arc::new(tool));
    }

    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    /// 调用工具并返回信封；输出一条 JSON 审计日志
    pub async fn call(&self, name: &str, arguments: &Map<String, Value>) -> Value {
        let Some(tool) = self.get(name) else {
            audit(name, false, "not_found", 0, arguments);
            return json!({
                "ok": false,
                "error": format!("tool_not_found:{name}"),
                "name": name,
                "arguments": arguments,
            });
        };

        let start = Instant::now();
        let fut = AssertUnwindSafe(tool.call(arguments)).catch_unwind();
        let result = match timeout(self.timeout, fut).await {
            Ok(Ok(r)) => r,
            Ok(Err(panic)) => Err(ToolError::Panicked(panic_message(panic.as_ref()))),
            Err(_) => Err(ToolError::Timeout(self.timeout.as_millis() as u64)),
        };
        let duration_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(output) => {
                audit(name, true, "ok", duration_ms, arguments);
                json!({
                    "ok": true,
                    "name": name,
                    "arguments": arguments,
                    "output": output,
                })
            }
            Err(e) => {
                let outcome = if matches!(e, ToolError::Timeout(_)) { "timeout" } else { "error" };
                audit(name, false, outcome, duration_ms, arguments);
                json!({
                    "ok": false,
                    "error": format!("{}: {}", e.kind(), e),
                    "name": name,
                    "arguments": arguments,
                })
            }
        }
    }

    /// 工具清单 JSON（注入 executor prompt 的 available_tools）
    pub fn to_schema_json(&self) -> String {
        let tools: Vec<Value> = self
            .tools
            .iter()
            .map(|(name, tool)| {
                json!({
                    "name": name,
                    "description": tool.description(),
                    "parameters": tool.parameters_schema()
                })
            })
            .collect();
        serde_json::to_string_pretty(&tools).unwrap_or_else(|_| "[]".to_string())
    }
}

fn audit(tool: &str, ok: bool, outcome: &str, duration_ms: u64, args: &Map<String, Value>) {
    let audit = json!({
        "event": "tool_audit",
        "tool": tool,
        "ok": ok,
        "outcome": outcome,
        "duration_ms": duration_ms,
        "args_preview": args_preview(args),
    });
    tracing::info!(audit = %audit, "tool");
}

fn args_preview(args: &Map<String, Value>) -> String {
    let s = Value::Object(args.clone()).to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "tool panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl Tool for Echo {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echo arguments back"
        }
        async fn call(&self, args: &Map<String, Value>) -> Result<Value, ToolError> {
            Ok(Value::Object(args.clone()))
        }
    }

    struct Broken;

    #[async_trait]
    impl Tool for Broken {
        fn name(&self) -> &str {
            "broken"
        }
        fn description(&self) -> &str {
            "Always fails"
        }
        async fn call(&self, _args: &Map<String, Value>) -> Result<Value, ToolError> {
            Err(ToolError::Execution("boom".to_string()))
        }
    }

    struct Panics;

    #[async_trait]
    impl Tool for Panics {
        fn name(&self) -> &str {
            "panics"
        }
        fn description(&self) -> &str {
            "Panics"
        }
        async fn call(&self, _args: &Map<String, Value>) -> Result<Value, ToolError> {
            panic!("unexpected state");
        }
    }

    struct Slow;

    #[async_trait]
    impl Tool for Slow {
        fn name(&self) -> &str {
            "slow"
        }
        fn description(&self) -> &str {
            "Sleeps"
        }
        async fn call(&self, _args: &Map<String, Value>) -> Result<Value, ToolError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Value::Null)
        }
    }

    fn args() -> Map<String, Value> {
        let mut m = Map::new();
        m.insert("x".to_string(), json!(1));
        m
    }

    #[tokio::test]
    async fn test_success_envelope_echoes_name_and_arguments() {
        let mut reg = ToolRegistry::default();
        reg.register(Echo);
        let out = reg.call("echo", &args()).await;
        assert_eq!(out["ok"], true);
        assert_eq!(out["name"], "echo");
        assert_eq!(out["arguments"]["x"], 1);
        assert_eq!(out["output"]["x"], 1);
        assert!(out.get("error").is_none());
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let reg = ToolRegistry::default();
        let out = reg.call("missing", &Map::new()).await;
        assert_eq!(out["ok"], false);
        assert_eq!(out["error"], "tool_not_found:missing");
    }

    #[tokio::test]
    async fn test_tool_error_carries_kind_and_message() {
        let mut reg = ToolRegistry::default();
        reg.register(Broken);
        let out = reg.call("broken", &Map::new()).await;
        assert_eq!(out["ok"], false);
        assert_eq!(out["error"], "ExecutionError: boom");
    }

    #[tokio::test]
    async fn test_panic_is_contained() {
        let mut reg = ToolRegistry::default();
        reg.register(Panics);
        let out = reg.call("panics", &Map::new()).await;
        assert_eq!(out["ok"], false);
        assert_eq!(out["error"], "Panic: unexpected state");
    }

    #[tokio::test]
    async fn test_timeout() {
        let mut reg = ToolRegistry::default().with_timeout(Duration::from_millis(50));
        reg.register(Slow);
        let out = reg.call("slow", &Map::new()).await;
        assert_eq!(out["ok"], false);
        assert!(out["error"].as_str().unwrap().starts_with("Timeout"));
    }

    #[test]
    fn test_schema_lists_registered_tools() {
        let mut reg = ToolRegistry::default();
        reg.register(Echo);
        reg.register(Broken);
        let schema: Value = serde_json::from_str(&reg.to_schema_json()).unwrap();
        let names: Vec<&str> = schema
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["broken", "echo"]);
    }
}
