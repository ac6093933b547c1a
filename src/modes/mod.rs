//! The five execution modes, dispatched once over a tagged union.
//!
//! Each driver resolves agent configuration through the resolver, then runs
//! the executor directly (single), through the bounded map (parallel),
//! sequentially with `{previous}` substitution (chain), through the race
//! primitive (race), or through the DAG engine (team).

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info};

use crate::agent::{resolve_settings, AgentConfig, SettingsOverrides};
use crate::cancel::CancelToken;
use crate::concurrency::{map_bounded, race, RaceOutcome};
use crate::domain::{ProgressSink, TaskResult};
use crate::error::{Result, SwarmError};
use crate::executor::{AgentInvocation, RunnerRef};
use crate::team::{execute_team, TeamConfig, TeamReport};

/// Placeholder replaced with the previous step's output in chain tasks.
pub const PREVIOUS_PLACEHOLDER: &str = "{previous}";

/// One task to run outside team mode.
#[derive(Clone, Default)]
pub struct TaskSpec {
    pub id: String,
    pub name: Option<String>,
    pub task: String,
    pub context: Option<String>,
    pub provider: Option<String>,
    /// Named agent definition supplying resolved defaults.
    pub agent: Option<String>,
    pub overrides: SettingsOverrides,
}

impl TaskSpec {
    pub fn new(id: impl Into<String>, task: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            task: task.into(),
            ..Default::default()
        }
    }

    pub fn with_agent(mut self, agent: impl Into<String>) -> Self {
        self.agent = Some(agent.into());
        self
    }
}

/// A configuration variant competing in race mode.
#[derive(Clone, Default)]
pub struct RaceVariant {
    pub id: String,
    pub agent: Option<String>,
    pub provider: Option<String>,
    pub overrides: SettingsOverrides,
}

/// Mode input as a tagged union; dispatch happens exactly once.
pub enum ModeRequest {
    Single {
        spec: TaskSpec,
    },
    Parallel {
        tasks: Vec<TaskSpec>,
        concurrency: usize,
    },
    Chain {
        steps: Vec<TaskSpec>,
    },
    Race {
        task: String,
        variants: Vec<RaceVariant>,
    },
    Team(Box<TeamConfig>),
}

/// Mode-specific aggregate result.
pub enum ModeOutcome {
    Single {
        result: TaskResult,
    },
    Parallel {
        results: Vec<Option<TaskResult>>,
        aborted: bool,
    },
    Chain {
        results: Vec<TaskResult>,
        aborted: bool,
    },
    Race {
        winner: Option<String>,
        result: Option<TaskResult>,
        aborted: bool,
    },
    Team(TeamReport),
}

/// Per-task success/failure counts for the mode-level summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModeSummary {
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub aborted: bool,
}

impl ModeOutcome {
    pub fn summary(&self) -> ModeSummary {
        fn tally(summary: &mut ModeSummary, result: &TaskResult) {
            if result.is_success() {
                summary.completed += 1;
            } else {
                summary.failed += 1;
            }
        }

        let mut summary = ModeSummary::default();
        match self {
            Self::Single { result } => {
                summary.aborted = result.aborted;
                tally(&mut summary, result);
            }
            Self::Parallel { results, aborted } => {
                summary.aborted = *aborted;
                for result in results {
                    match result {
                        Some(result) => tally(&mut summary, result),
                        None => summary.skipped += 1,
                    }
                }
            }
            Self::Chain { results, aborted } => {
                summary.aborted = *aborted;
                for result in results {
                    tally(&mut summary, result);
                }
            }
            Self::Race {
                winner, aborted, ..
            } => {
                summary.aborted = *aborted;
                if winner.is_some() {
                    summary.completed = 1;
                }
            }
            Self::Team(report) => {
                summary.aborted = report.aborted;
                summary.completed = report.completed_count();
                summary.failed = report.failed_count();
                summary.skipped = report.skipped.len();
            }
        }
        summary
    }

    /// 0 on success or an abort honored as requested; 1 when at least one
    /// task failed without recovery.
    pub fn exit_code(&self) -> i32 {
        let summary = self.summary();
        if !summary.aborted && summary.failed > 0 {
            1
        } else {
            0
        }
    }
}

/// Entry point shared by all modes: holds the runner, the resolved agent
/// set, and the working directory for spawned agents.
pub struct Orchestrator {
    runner: RunnerRef,
    agents: Vec<AgentConfig>,
    cwd: PathBuf,
    cancel: CancelToken,
    on_progress: Option<ProgressSink>,
}

impl Orchestrator {
    pub fn new(runner: RunnerRef, agents: Vec<AgentConfig>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            agents,
            cwd: cwd.into(),
            cancel: CancelToken::new(),
            on_progress: None,
        }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_progress(mut self, sink: ProgressSink) -> Self {
        self.on_progress = Some(sink);
        self
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub async fn dispatch(&self, request: ModeRequest) -> Result<ModeOutcome> {
        match request {
            ModeRequest::Single { spec } => self.run_single(spec).await,
            ModeRequest::Parallel { tasks, concurrency } => {
                self.run_parallel(tasks, concurrency).await
            }
            ModeRequest::Chain { steps } => self.run_chain(steps).await,
            ModeRequest::Race { task, variants } => self.run_race(task, variants).await,
            ModeRequest::Team(config) => {
                let report = execute_team(Arc::clone(&self.runner), *config).await?;
                Ok(ModeOutcome::Team(report))
            }
        }
    }

    fn build_invocation(&self, spec: &TaskSpec, step: Option<u32>) -> Result<AgentInvocation> {
        let settings = resolve_settings(&self.agents, spec.agent.as_deref(), spec.overrides.clone())?;
        Ok(AgentInvocation {
            id: spec.id.clone(),
            name: spec.name.clone(),
            task: spec.task.clone(),
            cwd: self.cwd.clone(),
            step,
            provider: spec.provider.clone(),
            model: settings.model,
            tools: settings.tools,
            system_prompt: settings.system_prompt,
            context: spec.context.clone(),
            thinking: settings.thinking,
            retry: settings.retry,
            resource_limits: settings.resource_limits,
            cancel: self.cancel.child(),
            on_progress: self.on_progress.clone(),
        })
    }

    async fn run_single(&self, spec: TaskSpec) -> Result<ModeOutcome> {
        info!(task_id = %spec.id, "Running single task");
        let invocation = self.build_invocation(&spec, None)?;
        let result = self.runner.run(invocation).await;
        Ok(ModeOutcome::Single { result })
    }

    async fn run_parallel(&self, tasks: Vec<TaskSpec>, concurrency: usize) -> Result<ModeOutcome> {
        info!(tasks = tasks.len(), concurrency, "Running parallel tasks");

        // Invocations are assembled up front so resolver errors surface
        // before anything spawns.
        let mut invocations = Vec::with_capacity(tasks.len());
        for spec in &tasks {
            invocations.push(self.build_invocation(spec, None)?);
        }

        let runner = Arc::clone(&self.runner);
        let outcome = map_bounded(
            invocations,
            concurrency,
            move |invocation, _| {
                let runner = Arc::clone(&runner);
                async move { Ok(runner.run(invocation).await) }
            },
            &self.cancel,
        )
        .await?;

        Ok(ModeOutcome::Parallel {
            results: outcome.results,
            aborted: outcome.aborted,
        })
    }

    async fn run_chain(&self, steps: Vec<TaskSpec>) -> Result<ModeOutcome> {
        info!(steps = steps.len(), "Running chain");
        let mut results: Vec<TaskResult> = Vec::with_capacity(steps.len());
        let mut aborted = false;

        for (index, mut spec) in steps.into_iter().enumerate() {
            if self.cancel.is_cancelled() {
                aborted = true;
                break;
            }

            if let Some(previous) = results.last() {
                if spec.task.contains(PREVIOUS_PLACEHOLDER) {
                    spec.task = spec.task.replace(PREVIOUS_PLACEHOLDER, &previous.output);
                } else {
                    spec.context = Some(previous.output.clone());
                }
            }

            let invocation = self.build_invocation(&spec, Some(index as u32 + 1))?;
            let result = self.runner.run(invocation).await;
            let failed = !result.is_success();
            aborted = result.aborted;
            results.push(result);

            if failed {
                debug!(step = index + 1, "Chain step failed, stopping chain");
                break;
            }
        }

        Ok(ModeOutcome::Chain { results, aborted })
    }

    async fn run_race(&self, task: String, variants: Vec<RaceVariant>) -> Result<ModeOutcome> {
        info!(variants = variants.len(), "Running race");

        let mut entries = Vec::with_capacity(variants.len());
        for variant in &variants {
            let spec = TaskSpec {
                id: variant.id.clone(),
                name: Some(variant.id.clone()),
                task: task.clone(),
                context: None,
                provider: variant.provider.clone(),
                agent: variant.agent.clone(),
                overrides: variant.overrides.clone(),
            };
            entries.push((variant.id.clone(), self.build_invocation(&spec, None)?));
        }

        let runner = Arc::clone(&self.runner);
        let tasks: Vec<(String, _)> = entries
            .into_iter()
            .map(|(id, mut invocation)| {
                let runner = Arc::clone(&runner);
                let closure = move |token: CancelToken| {
                    invocation.cancel = token;
                    async move {
                        let result = runner.run(invocation).await;
                        if result.is_success() {
                            Ok(result)
                        } else {
                            Err(SwarmError::TaskFailed(
                                result
                                    .error
                                    .unwrap_or_else(|| format!("Exit code: {}", result.exit_code)),
                            ))
                        }
                    }
                };
                (id, closure)
            })
            .collect();

        match race(tasks, &self.cancel).await? {
            RaceOutcome::Won { winner, result } => Ok(ModeOutcome::Race {
                winner: Some(winner),
                result: Some(result),
                aborted: false,
            }),
            RaceOutcome::Aborted => Ok(ModeOutcome::Race {
                winner: None,
                result: None,
                aborted: true,
            }),
        }
    }
}
