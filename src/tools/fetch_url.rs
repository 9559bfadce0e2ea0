//! fetch_url 工具：GET 抓取网页，返回状态、标题与可读文本预览
//!
//! 请求带超时与 User-Agent；HTML 响应经 html2text 提取文本；预览按 max_chars 截断（参数可覆盖默认值）。

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use html2text::from_read;
use regex::Regex;
use reqwest::Client;
use serde_json::{json, Map, Value};

use crate::tools::{Tool, ToolError};

/// max_chars 上限，超出按上限截断
pub const MAX_PREVIEW_CHARS: usize = 100_000;

const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

pub struct FetchUrlTool {
    client: Client,
    default_max_chars: usize,
}

fn title_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("static regex"))
}

/// 合并连续空白
fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn extract_title(html: &str) -> String {
    title_regex()
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| collapse_whitespace(m.as_str()))
        .unwrap_or_default()
}

/// 判断内容是否像 HTML（需提取可读文本）
fn looks_like_html(content_type: &str, body: &str) -> bool {
    if content_type.contains("html") {
        return true;
    }
    let s = body.trim_start();
    s.starts_with("<!") || s.starts_with("<html") || s.starts_with("<HTML")
}

fn readable_text(body: &str) -> String {
    match from_read(body.as_bytes(), 120) {
        Ok(text) if !text.trim().is_empty() => text,
        _ => body.to_string(),
    }
}

pub fn truncate_chars(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

/// 解析 max_chars：缺省用默认值，非正整数拒绝，过大截到 MAX_PREVIEW_CHARS
pub fn resolve_max_chars(args: &Map<String, Value>, default: usize) -> Result<usize, ToolError> {
    let requested = match args.get("max_chars") {
        None | Some(Value::Null) => default as u64,
        Some(v) => v
            .as_u64()
            .filter(|n| *n >= 1)
            .ok_or_else(|| ToolError::InvalidArguments("max_chars must be an integer >= 1".to_string()))?,
    };
    Ok(requested.min(MAX_PREVIEW_CHARS as u64).max(1) as usize)
}

impl FetchUrlTool {
    pub fn new(timeout_secs: u64, default_max_chars: usize) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            default_max_chars,
        }
    }

    async fn fetch(&self, url: &str, max_chars: usize) -> Result<Value, ToolError> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ToolError::Http(format!("request failed: {e}")))?;
        let status = resp.status();
        let final_url = resp.url().to_string();
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        let body = resp
            .text()
            .await
            .map_err(|e| ToolError::Http(format!("read body: {e}")))?;
        let body = body.trim_start_matches('\u{FEFF}');

        let (title, text) = if looks_like_html(&content_type, body) {
            (extract_title(body), readable_text(body))
        } else {
            (String::new(), body.to_string())
        };

        Ok(json!({
            "ok": status.is_success(),
            "status": status.as_u16(),
            "url": final_url,
            "content_type": content_type,
            "title": title,
            "content_preview": collapse_whitespace(&truncate_chars(&text, max_chars)),
        }))
    }
}

#[async_trait]
impl Tool for FetchUrlTool {
    fn name(&self) -> &str {
        "fetch_url"
    }

    fn description(&self) -> &str {
        "Fetch a web page and return status, title and a readable text preview. Args: {\"url\": \"https://...\", \"max_chars\": 1200}."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": { "type": "string" },
                "max_chars": { "type": "integer", "minimum": 1, "maximum": MAX_PREVIEW_CHARS }
            },
            "required": ["url"]
        })
    }

    async fn call(&self, args: &Map<String, Value>) -> Result<Value, ToolError> {
        let url = args.get("url").and_then(|v| v.as_str()).unwrap_or("").trim();
        if url.is_empty() {
            return Err(ToolError::InvalidArguments("empty_url".to_string()));
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ToolError::InvalidArguments(format!("unsupported url scheme: {url}")));
        }
        let max_chars = resolve_max_chars(args, self.default_max_chars)?;
        tracing::info!(url = %url, max_chars, "fetch_url");
        self.fetch(url, max_chars).await
    }
}
