//! Team mode: a dependency graph of tasks assigned to members, scheduled
//! against a shared concurrency budget.

pub mod dag;
pub mod engine;
pub mod workspace;

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::cancel::CancelToken;
use crate::domain::{ProgressSink, ResourceLimits, RetryConfig, ThinkingBudget};

pub use dag::{build_dag, Dag, DagNode, NodeStatus};
pub use engine::{execute_team, DagExecutionResult, SkippedNode, TeamReport};
pub use workspace::{sanitize_name, TeamWorkspace};

/// Default node concurrency when the caller does not specify one.
pub const DEFAULT_TEAM_CONCURRENCY: usize = 4;
/// Hard ceiling on node concurrency.
pub const MAX_TEAM_CONCURRENCY: usize = 8;
/// Re-run cap for human approval loops when the task has no review block.
pub const DEFAULT_APPROVAL_ITERATIONS: u32 = 5;

/// A participant in a team, providing defaults for tasks assigned to it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TeamMember {
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<ThinkingBudget>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_limits: Option<ResourceLimits>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryConfig>,
}

/// Review loop attached to a task: a reviewer re-reads the output and either
/// approves it or sends the task back with feedback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewSpec {
    pub assignee: String,
    pub max_iterations: u32,
    pub task: String,
}

/// One task in a team's dependency graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamTask {
    pub id: String,
    pub task: String,
    pub assignee: String,
    #[serde(default)]
    pub depends: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review: Option<ReviewSpec>,
    #[serde(default)]
    pub requires_approval: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_limits: Option<ResourceLimits>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryConfig>,
}

impl TeamTask {
    pub fn new(id: impl Into<String>, task: impl Into<String>, assignee: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            task: task.into(),
            assignee: assignee.into(),
            depends: Vec::new(),
            review: None,
            requires_approval: false,
            model: None,
            tools: None,
            resource_limits: None,
            retry: None,
        }
    }

    pub fn depends_on(mut self, deps: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.depends = deps.into_iter().map(Into::into).collect();
        self
    }
}

/// Human approval decision for a plan node.
#[derive(Debug, Clone)]
pub struct Approval {
    pub approved: bool,
    pub feedback: Option<String>,
}

/// Callback soliciting human approval for a node's output.
#[async_trait]
pub trait ApprovalGate: Send + Sync {
    async fn approve(&self, task_id: &str, plan: &str) -> Approval;
}

/// Predicate deciding whether a reviewer's output constitutes approval.
pub type ReviewPredicate = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// The default review approval convention: the reviewer says "APPROVED".
pub fn default_review_predicate() -> ReviewPredicate {
    Arc::new(|output: &str| output.contains("APPROVED"))
}

/// Full input for one team-mode run.
#[derive(Clone)]
pub struct TeamConfig {
    pub name: String,
    pub objective: String,
    pub members: Vec<TeamMember>,
    pub tasks: Vec<TeamTask>,
    pub max_concurrency: usize,
    pub cwd: PathBuf,
    pub workspace: Option<Arc<TeamWorkspace>>,
    pub approval: Option<Arc<dyn ApprovalGate>>,
    pub review_predicate: Option<ReviewPredicate>,
    pub cancel: CancelToken,
    pub on_progress: Option<ProgressSink>,
}

impl TeamConfig {
    pub fn new(name: impl Into<String>, objective: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            objective: objective.into(),
            members: Vec::new(),
            tasks: Vec::new(),
            max_concurrency: DEFAULT_TEAM_CONCURRENCY,
            cwd: cwd.into(),
            workspace: None,
            approval: None,
            review_predicate: None,
            cancel: CancelToken::new(),
            on_progress: None,
        }
    }

    /// Concurrency clamped to `1..=MAX_TEAM_CONCURRENCY`.
    pub fn effective_concurrency(&self) -> usize {
        self.max_concurrency.clamp(1, MAX_TEAM_CONCURRENCY)
    }
}
