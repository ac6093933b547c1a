//! Per-task policies: retry, resource limits and thinking budgets.

use serde::{Deserialize, Serialize};

/// Retry policy for a task. Absent config means a single attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts including the first. Must be at least 1.
    pub max_attempts: u32,
    /// Base delay; doubled per attempt, capped at 60 s.
    #[serde(default)]
    pub backoff_ms: u64,
    /// Case-insensitive substrings that make an error retryable. Empty or
    /// absent means any error is retryable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_on: Option<Vec<String>>,
    /// Case-insensitive substrings that suppress retries. Dominates
    /// `retry_on`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_on: Option<Vec<String>>,
}

impl RetryConfig {
    pub fn attempts(max_attempts: u32, backoff_ms: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff_ms,
            retry_on: None,
            skip_on: None,
        }
    }
}

/// Resource limits applied to one task.
///
/// With `enforce_limits` false, the memory and tool-concurrency limits are
/// advisory only; `max_duration_ms` is always enforced when present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceLimits {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_memory_mb: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrent_tool_calls: Option<u32>,
    #[serde(default = "default_enforce")]
    pub enforce_limits: bool,
}

fn default_enforce() -> bool {
    true
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_memory_mb: None,
            max_duration_ms: None,
            max_concurrent_tool_calls: None,
            enforce_limits: true,
        }
    }
}

/// Extended-thinking budget: an explicit token count or a named level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ThinkingBudget {
    Tokens(u32),
    Level(ThinkingLevel),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThinkingLevel {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for ThinkingBudget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tokens(n) => write!(f, "{}", n),
            Self::Level(ThinkingLevel::Low) => f.write_str("low"),
            Self::Level(ThinkingLevel::Medium) => f.write_str("medium"),
            Self::Level(ThinkingLevel::High) => f.write_str("high"),
        }
    }
}
