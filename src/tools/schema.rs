//! JSON Schema 生成（schemars）
//!
//! 角色输出结构的 Schema 注入 prompt（`output_schema` 变量），减少 LLM 输出格式错误。
//! 工具调用格式随 Action 的 `tool_requests` 一并给出。

use schemars::{schema_for, JsonSchema};

/// 任意输出类型的 Schema（pretty JSON）
pub fn output_schema_json<T: JsonSchema>() -> String {
    let schema = schema_for!(T);
    serde_json::to_string_pretty(&schema).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Action, Plan, Review};

    #[test]
    fn test_role_schemas_name_their_fields() {
        let plan = output_schema_json::<Plan>();
        assert!(plan.contains("\"steps\""));
        assert!(plan.contains("\"title\""));

        let action = output_schema_json::<Action>();
        assert!(action.contains("\"tool_requests\""));
        assert!(action.contains("\"is_final\""));
        assert!(action.contains("\"arguments\""));

        let review = output_schema_json::<Review>();
        assert!(review.contains("\"decision\""));
        assert!(review.contains("\"replan\""));
    }
}
