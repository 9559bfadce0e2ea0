//! 密钥脱敏：在写入追踪前替换形似 API Key 的子串

use std::sync::OnceLock;

use regex::Regex;

pub const REDACTED: &str = "[REDACTED_API_KEY]";

fn patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"sk-proj-[A-Za-z0-9_-]+",
            r"sk-[A-Za-z0-9_-]+",
            r"hf_[A-Za-z0-9]{20,}",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("secret pattern"))
        .collect()
    })
}

pub fn redact_secrets(text: &str) -> String {
    let mut out = text.to_string();
    for re in patterns() {
        out = re.replace_all(&out, REDACTED).into_owned();
    }
    out
}
