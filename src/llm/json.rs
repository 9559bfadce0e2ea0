//! 从模型输出中提取 JSON 对象
//!
//! 优先级：整段直接解析 -> ```json 代码块 -> 首个 `{` 到最后一个 `}`。结果必须是 JSON 对象。

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};

use crate::llm::LlmError;

fn fenced_block() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)```(?:json)?\s*(\{.*\})\s*```").expect("fenced json regex")
    })
}

fn as_object(text: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

pub fn extract_json_object(content: &str) -> Result<Map<String, Value>, LlmError> {
    let trimmed = content.trim();

    if let Some(map) = as_object(trimmed) {
        return Ok(map);
    }

    if let Some(map) = fenced_block()
        .captures(trimmed)
        .and_then(|c| c.get(1))
        .and_then(|m| as_object(m.as_str()))
    {
        return Ok(map);
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if end > start {
            if let Some(map) = as_object(&trimmed[start..=end]) {
                return Ok(map);
            }
        }
    }

    Err(LlmError::MalformedOutput {
        raw: content.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direct_object() {
        let map = extract_json_object(r#"{"decision": "end"}"#).unwrap();
        assert_eq!(map["decision"], "end");
    }

    #[test]
    fn test_fenced_block_with_prose() {
        let text = "Here is the plan:\n```json\n{\"steps\": [{\"title\": \"A\"}]}\n```\nThanks";
        let map = extract_json_object(text).unwrap();
        assert_eq!(map["steps"][0]["title"], "A");
    }

    #[test]
    fn test_fence_without_language_tag() {
        let map = extract_json_object("```\n{\"a\": 1}\n```").unwrap();
        assert_eq!(map["a"], 1);
    }

    #[test]
    fn test_brace_span() {
        let map = extract_json_object("Sure! {\"summary\": \"x\", \"output\": \"y\"} done").unwrap();
        assert_eq!(map["output"], "y");
    }

    #[test]
    fn test_non_object_is_malformed() {
        assert!(matches!(
            extract_json_object("[1, 2, 3]"),
            Err(LlmError::MalformedOutput { .. })
        ));
    }

    #[test]
    fn test_plain_text_is_malformed_and_keeps_raw() {
        match extract_json_object("I cannot answer that") {
            Err(LlmError::MalformedOutput { raw }) => assert_eq!(raw, "I cannot answer that"),
            other => panic!("expected MalformedOutput, got {other:?}"),
        }
    }
}
