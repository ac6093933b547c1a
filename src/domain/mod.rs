//! Shared vocabulary of the orchestration core: usage accounting, live task
//! progress, immutable task results and per-task policies.

pub mod config;
pub mod progress;
pub mod result;
pub mod usage;

pub use config::{ResourceLimits, RetryConfig, ThinkingBudget, ThinkingLevel};
pub use progress::{ProgressSink, TaskProgress, TaskStatus, ToolInvocation};
pub use result::TaskResult;
pub use usage::{UsageDelta, UsageStats};
