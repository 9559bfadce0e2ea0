//! 重试配置：固定次数 + 指数退避

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// [llm.retry] 段
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// 总尝试次数（含首次）
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    6000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl RetryConfig {
    /// 测试用：不等待
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay_ms: 0,
            max_delay_ms: 0,
        }
    }

    /// 第 attempt 次失败后的等待时间：base * 2^(attempt-1)，不超过 max
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let ms = self
            .base_delay_ms
            .saturating_mul(1u64 << exp)
            .min(self.max_delay_ms);
        Duration::from_millis(ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_backoff_is_clamped() {
        let cfg = RetryConfig::default();
        assert_eq!(cfg.delay_after(1), Duration::from_millis(1000));
        assert_eq!(cfg.delay_after(2), Duration::from_millis(2000));
        assert_eq!(cfg.delay_after(3), Duration::from_millis(4000));
        assert_eq!(cfg.delay_after(4), Duration::from_millis(6000));
        assert_eq!(cfg.delay_after(40), Duration::from_millis(6000));
    }
}
