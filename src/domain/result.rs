use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::usage::UsageStats;

/// Immutable outcome of a single agent task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub task: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub exit_code: i32,
    /// Final assistant text, tail-truncated (see executor output rules).
    pub output: String,
    pub stderr: String,
    pub truncated: bool,
    pub duration_ms: u64,
    pub usage: UsageStats,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Position within a chain, when run as a chain step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<u32>,
    pub aborted: bool,
    /// Tool name to invocation count.
    #[serde(default)]
    pub tool_usage: HashMap<String, u32>,
}

impl TaskResult {
    pub fn is_success(&self) -> bool {
        self.exit_code == 0 && self.error.is_none()
    }

    /// A result standing in for work that failed before the agent could
    /// start (temp file creation, spawn failure).
    pub fn failed_to_start(id: impl Into<String>, task: impl Into<String>, error: String) -> Self {
        Self {
            id: id.into(),
            name: None,
            task: task.into(),
            model: None,
            exit_code: 1,
            output: String::new(),
            stderr: String::new(),
            truncated: false,
            duration_ms: 0,
            usage: UsageStats::default(),
            error: Some(error),
            step: None,
            aborted: false,
            tool_usage: HashMap::new(),
        }
    }
}
