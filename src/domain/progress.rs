//! Live task progress as streamed back to the caller.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use super::usage::UsageStats;
use crate::utils::truncate_chars;

/// Most recent tool invocations retained per task.
pub const RECENT_TOOLS_CAP: usize = 10;
/// Most recent assistant text previews retained per task.
pub const RECENT_OUTPUT_CAP: usize = 5;
/// Character budget for a single assistant text preview.
pub const OUTPUT_PREVIEW_CHARS: usize = 100;

/// Callback receiving an owned [`TaskProgress`] snapshot after each
/// recognized agent event. Snapshots may be retained by the caller.
pub type ProgressSink = Arc<dyn Fn(TaskProgress) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Aborted,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Aborted)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Aborted => "aborted",
        };
        f.write_str(s)
    }
}

/// One completed tool call, kept for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    pub tool: String,
    pub args_preview: String,
}

/// Mutable progress for one running task. The executor owns the live value
/// and hands shallow clones to the progress sink.
#[derive(Debug, Clone)]
pub struct TaskProgress {
    pub id: String,
    pub name: Option<String>,
    pub status: TaskStatus,
    pub task: String,
    pub model: Option<String>,
    pub recent_tools: VecDeque<ToolInvocation>,
    pub recent_output: VecDeque<String>,
    pub tool_count: u32,
    pub current_tool: Option<String>,
    pub current_tool_args: Option<String>,
    pub usage: UsageStats,
    pub duration_ms: u64,
    started_at: Instant,
}

impl TaskProgress {
    pub fn new(id: impl Into<String>, task: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            status: TaskStatus::Pending,
            task: task.into(),
            model: None,
            recent_tools: VecDeque::with_capacity(RECENT_TOOLS_CAP),
            recent_output: VecDeque::with_capacity(RECENT_OUTPUT_CAP),
            tool_count: 0,
            current_tool: None,
            current_tool_args: None,
            usage: UsageStats::default(),
            duration_ms: 0,
            started_at: Instant::now(),
        }
    }

    /// Record a finished tool call, dropping the oldest beyond capacity.
    pub fn push_tool(&mut self, invocation: ToolInvocation) {
        if self.recent_tools.len() == RECENT_TOOLS_CAP {
            self.recent_tools.pop_front();
        }
        self.recent_tools.push_back(invocation);
        self.tool_count += 1;
    }

    /// Record an assistant text preview, truncated to the display budget.
    pub fn push_output(&mut self, text: &str) {
        if self.recent_output.len() == RECENT_OUTPUT_CAP {
            self.recent_output.pop_front();
        }
        self.recent_output
            .push_back(truncate_chars(text, OUTPUT_PREVIEW_CHARS));
    }

    /// Owned snapshot with `duration_ms` refreshed.
    pub fn snapshot(&mut self) -> TaskProgress {
        self.duration_ms = self.started_at.elapsed().as_millis() as u64;
        self.clone()
    }
}
