//! Scheduler for team execution: launches ready nodes against the
//! concurrency budget, runs review and approval loops, and reports per-node
//! outcomes.
//!
//! After graph validation this function never fails; a node failure skips
//! its dependents while independent branches continue.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::dag::{build_dag, Dag, NodeStatus};
use super::{
    default_review_predicate, ApprovalGate, ReviewPredicate, ReviewSpec, TeamConfig, TeamMember,
    TeamTask, DEFAULT_APPROVAL_ITERATIONS,
};
use crate::cancel::CancelToken;
use crate::domain::{ProgressSink, TaskResult, UsageStats};
use crate::error::Result;
use crate::executor::{AgentInvocation, RunnerRef};

/// Final record for one node.
#[derive(Debug, Clone)]
pub struct DagExecutionResult {
    pub id: String,
    pub status: NodeStatus,
    pub output: String,
    pub exit_code: i32,
    pub error: Option<String>,
    pub iteration: u32,
    pub usage: UsageStats,
}

/// A node that never ran, with the failure that blocked it.
#[derive(Debug, Clone)]
pub struct SkippedNode {
    pub id: String,
    pub caused_by: Option<String>,
}

/// Aggregate outcome of one team run.
#[derive(Debug)]
pub struct TeamReport {
    pub results: HashMap<String, DagExecutionResult>,
    pub skipped: Vec<SkippedNode>,
    pub aborted: bool,
    pub usage: UsageStats,
}

impl TeamReport {
    pub fn completed_count(&self) -> usize {
        self.count(NodeStatus::Completed)
    }

    pub fn failed_count(&self) -> usize {
        self.count(NodeStatus::Failed)
    }

    fn count(&self, status: NodeStatus) -> usize {
        self.results.values().filter(|r| r.status == status).count()
    }

    /// 0 on success or an abort honored as requested; 1 when at least one
    /// task failed without recovery.
    pub fn exit_code(&self) -> i32 {
        if !self.aborted && self.failed_count() > 0 {
            1
        } else {
            0
        }
    }
}

/// Validate the team's graph and run it to completion.
pub async fn execute_team(runner: RunnerRef, config: TeamConfig) -> Result<TeamReport> {
    let mut dag = build_dag(&config.members, &config.tasks)?;
    let max_concurrency = config.effective_concurrency();
    let review_predicate = config
        .review_predicate
        .clone()
        .unwrap_or_else(default_review_predicate);
    let cancel = config.cancel.clone();

    info!(
        team = %config.name,
        tasks = dag.len(),
        max_concurrency,
        "Starting team execution"
    );

    let mut running: JoinSet<NodeOutcome> = JoinSet::new();

    loop {
        if cancel.is_cancelled() {
            break;
        }
        dag.promote();

        while running.len() < max_concurrency {
            let Some(id) = dag.take_ready() else { break };
            let node = dag.get(&id).expect("claimed node exists");
            let context = assemble_context(&dag, &node.depends);
            let run = NodeRun::prepare(&config, &id, node.task.clone(), node.member.clone(), context, review_predicate.clone());
            let runner = Arc::clone(&runner);
            debug!(node = %id, "Scheduling node");
            running.spawn(async move { run_node(runner, run).await });
        }

        if running.is_empty() {
            break;
        }

        tokio::select! {
            joined = running.join_next() => {
                if let Some(Ok(outcome)) = joined {
                    apply_outcome(&mut dag, outcome, &config).await;
                }
            }
            _ = cancel.cancelled() => break,
        }
    }

    // Drain in-flight nodes; their tokens observe the cancel.
    while let Some(joined) = running.join_next().await {
        if let Ok(outcome) = joined {
            apply_outcome(&mut dag, outcome, &config).await;
        }
    }

    let aborted = cancel.is_cancelled();
    if aborted {
        info!(team = %config.name, "Team execution cancelled");
        dag.skip_unfinished("cancelled");
    }

    Ok(build_report(&dag, aborted))
}

/// Concatenated outputs of direct dependencies, in `depends` order, each
/// under a header naming the producing task.
fn assemble_context(dag: &Dag, depends: &[String]) -> Option<String> {
    if depends.is_empty() {
        return None;
    }
    let sections: Vec<String> = depends
        .iter()
        .map(|dep| {
            let output = dag.get(dep).and_then(|n| n.output.as_deref()).unwrap_or("");
            format!("## Output from task {}\n\n{}", dep, output)
        })
        .collect();
    Some(sections.join("\n\n"))
}

async fn apply_outcome(dag: &mut Dag, outcome: NodeOutcome, config: &TeamConfig) {
    let externally_cancelled = config.cancel.is_cancelled();
    let status = if outcome.result.aborted && externally_cancelled {
        NodeStatus::Skipped
    } else if outcome.result.is_success() {
        NodeStatus::Completed
    } else {
        NodeStatus::Failed
    };

    match status {
        NodeStatus::Completed => {
            info!(node = %outcome.id, iterations = outcome.iteration, "Node completed")
        }
        NodeStatus::Failed => {
            warn!(node = %outcome.id, error = ?outcome.result.error, "Node failed")
        }
        _ => debug!(node = %outcome.id, "Node cancelled before finishing"),
    }

    if let Some(node) = dag.get_mut(&outcome.id) {
        node.status = status;
        node.output = Some(outcome.result.output.clone());
        node.error = outcome.result.error.clone();
        node.exit_code = outcome.result.exit_code;
        node.iteration = outcome.iteration;
        node.usage = outcome.usage;
        if status == NodeStatus::Skipped {
            node.skip_cause = Some("cancelled".to_string());
        }
    }

    if matches!(status, NodeStatus::Completed | NodeStatus::Failed) {
        if let Some(workspace) = &config.workspace {
            if let Err(e) = workspace
                .write_task_result(&outcome.id, &outcome.result.output, status)
                .await
            {
                warn!(node = %outcome.id, error = %e, "Failed to persist task result");
            }
        }
    }
}

fn build_report(dag: &Dag, aborted: bool) -> TeamReport {
    let mut results = HashMap::new();
    let mut skipped = Vec::new();
    let mut usage = UsageStats::default();

    for id in dag.ids() {
        let node = dag.get(id).expect("node indexed");
        usage.merge(&node.usage);
        if node.status == NodeStatus::Skipped {
            skipped.push(SkippedNode {
                id: id.clone(),
                caused_by: dag.root_cause(id),
            });
        }
        results.insert(
            id.clone(),
            DagExecutionResult {
                id: id.clone(),
                status: node.status,
                output: node.output.clone().unwrap_or_default(),
                exit_code: node.exit_code,
                error: node.error.clone(),
                iteration: node.iteration,
                usage: node.usage,
            },
        );
    }

    TeamReport {
        results,
        skipped,
        aborted,
        usage,
    }
}

/// Everything a node task needs, detached from the scheduler's borrow of
/// the graph.
struct NodeRun {
    id: String,
    task: TeamTask,
    member: TeamMember,
    reviewer: Option<TeamMember>,
    context: Option<String>,
    cwd: PathBuf,
    cancel: CancelToken,
    on_progress: Option<ProgressSink>,
    approval: Option<Arc<dyn ApprovalGate>>,
    review_predicate: ReviewPredicate,
}

struct NodeOutcome {
    id: String,
    result: TaskResult,
    iteration: u32,
    usage: UsageStats,
}

impl NodeRun {
    fn prepare(
        config: &TeamConfig,
        id: &str,
        task: TeamTask,
        member: TeamMember,
        context: Option<String>,
        review_predicate: ReviewPredicate,
    ) -> Self {
        let reviewer = task.review.as_ref().and_then(|review| {
            config
                .members
                .iter()
                .find(|m| m.role == review.assignee)
                .cloned()
        });
        Self {
            id: id.to_string(),
            task,
            member,
            reviewer,
            context,
            cwd: config.cwd.clone(),
            cancel: config.cancel.child(),
            on_progress: config.on_progress.clone(),
            approval: config.approval.clone(),
            review_predicate,
        }
    }

    fn primary_invocation(&self, task_text: &str) -> AgentInvocation {
        AgentInvocation {
            id: self.id.clone(),
            name: Some(self.task.assignee.clone()),
            task: task_text.to_string(),
            cwd: self.cwd.clone(),
            step: None,
            provider: None,
            model: self.task.model.clone().or_else(|| self.member.model.clone()),
            tools: self.task.tools.clone().or_else(|| self.member.tools.clone()),
            system_prompt: self.member.system_prompt.clone(),
            context: self.context.clone(),
            thinking: self.member.thinking,
            retry: self.task.retry.clone().or_else(|| self.member.retry.clone()),
            resource_limits: self
                .task
                .resource_limits
                .clone()
                .or_else(|| self.member.resource_limits.clone()),
            cancel: self.cancel.clone(),
            on_progress: self.on_progress.clone(),
        }
    }

    fn review_invocation(&self, review: &ReviewSpec, output: &str) -> AgentInvocation {
        let reviewer = self.reviewer.clone().unwrap_or_default();
        let task_text = format!(
            "{}\n\n## Original task\n\n{}\n\n## Produced output\n\n{}",
            review.task, self.task.task, output
        );
        AgentInvocation {
            id: format!("{}-review", self.id),
            name: Some(review.assignee.clone()),
            task: task_text,
            cwd: self.cwd.clone(),
            step: None,
            provider: None,
            model: reviewer.model,
            tools: reviewer.tools,
            system_prompt: reviewer.system_prompt,
            context: None,
            thinking: reviewer.thinking,
            retry: None,
            resource_limits: reviewer.resource_limits,
            cancel: self.cancel.clone(),
            on_progress: self.on_progress.clone(),
        }
    }
}

/// Run one node: the approval loop encloses the review loop, and both
/// append reviewer feedback to the task text on re-runs.
async fn run_node(runner: RunnerRef, run: NodeRun) -> NodeOutcome {
    let base_task = run.task.task.clone();
    let mut usage = UsageStats::default();
    let mut iteration = 0u32;
    let mut current_task = base_task.clone();

    let approval_cap = run
        .task
        .review
        .as_ref()
        .map(|r| r.max_iterations)
        .unwrap_or(DEFAULT_APPROVAL_ITERATIONS);
    let mut approval_rounds = 0u32;

    loop {
        let result =
            run_review_loop(&runner, &run, &mut usage, &mut iteration, current_task.clone()).await;

        if !result.is_success() || !run.task.requires_approval {
            return NodeOutcome {
                id: run.id.clone(),
                result,
                iteration,
                usage,
            };
        }
        let Some(gate) = &run.approval else {
            return NodeOutcome {
                id: run.id.clone(),
                result,
                iteration,
                usage,
            };
        };

        let approval = gate.approve(&run.id, &result.output).await;
        if approval.approved {
            debug!(node = %run.id, "Plan approved");
            return NodeOutcome {
                id: run.id.clone(),
                result,
                iteration,
                usage,
            };
        }

        approval_rounds += 1;
        if approval_rounds >= approval_cap {
            warn!(node = %run.id, rounds = approval_rounds, "Approval rounds exhausted, keeping last output");
            return NodeOutcome {
                id: run.id.clone(),
                result,
                iteration,
                usage,
            };
        }
        let feedback = approval.feedback.unwrap_or_default();
        info!(node = %run.id, round = approval_rounds, "Plan rejected, re-running with feedback");
        current_task = format!("{}\n\nReviewer feedback:\n{}", base_task, feedback);
    }
}

async fn run_review_loop(
    runner: &RunnerRef,
    run: &NodeRun,
    usage: &mut UsageStats,
    total_iterations: &mut u32,
    mut current_task: String,
) -> TaskResult {
    let mut review_iteration = 0u32;

    loop {
        let result = runner.run(run.primary_invocation(&current_task)).await;
        *total_iterations += 1;
        review_iteration += 1;
        usage.merge(&result.usage);

        if !result.is_success() {
            return result;
        }
        let Some(review) = &run.task.review else {
            return result;
        };

        let review_result = runner.run(run.review_invocation(review, &result.output)).await;
        usage.merge(&review_result.usage);
        if !review_result.is_success() {
            warn!(node = %run.id, error = ?review_result.error, "Reviewer run failed, accepting output");
            return result;
        }

        if (run.review_predicate)(&review_result.output) {
            debug!(node = %run.id, iterations = review_iteration, "Review approved");
            return result;
        }
        if review_iteration >= review.max_iterations.max(1) {
            info!(node = %run.id, "Review iterations exhausted, keeping last output");
            return result;
        }

        info!(node = %run.id, iteration = review_iteration, "Review feedback received, revising");
        current_task = format!(
            "{}\n\nReviewer feedback:\n{}",
            run.task.task, review_result.output
        );
    }
}
