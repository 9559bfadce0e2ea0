//! 工具层：Tool trait、注册表与内置工具（calculator / fetch_url）

pub mod calculator;
pub mod fetch_url;
pub mod registry;
pub mod schema;

pub use calculator::CalculatorTool;
pub use fetch_url::FetchUrlTool;
pub use registry::{Tool, ToolError, ToolRegistry};
pub use schema::output_schema_json;

/// 内置工具注册表
pub fn build_default_tool_registry(timeout_secs: u64, fetch_max_chars: usize) -> ToolRegistry {
    let mut registry = ToolRegistry::new(timeout_secs);
    registry.register(CalculatorTool);
    registry.register(FetchUrlTool::new(timeout_secs, fetch_max_chars));
    registry
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Map, Value};

    use super::*;

    fn args(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[tokio::test]
    async fn test_deeply_nested_expression_returns_error_envelope() {
        let reg = build_default_tool_registry(5, 1200);
        let deep = format!("{}1{}", "(".repeat(100_000), ")".repeat(100_000));
        let out = reg.call("calculator", &args(&[("expression", json!(deep))])).await;
        assert_eq!(out["ok"], false);
        assert_eq!(out["error"], "InvalidArguments: expression too deeply nested");

        let out = reg
            .call("calculator", &args(&[("expression", json!("-".repeat(100_000) + "2"))]))
            .await;
        assert_eq!(out["ok"], false);
    }

    #[tokio::test]
    async fn test_invalid_max_chars_returns_error_envelope() {
        let reg = build_default_tool_registry(5, 1200);
        let out = reg
            .call(
                "fetch_url",
                &args(&[("url", json!("https://example.com")), ("max_chars", json!(0))]),
            )
            .await;
        assert_eq!(out["ok"], false);
        assert!(out["error"].as_str().unwrap().starts_with("InvalidArguments"));
    }
}
