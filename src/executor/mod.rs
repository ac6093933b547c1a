//! Subprocess executor: spawns a `pi` agent process, multiplexes its JSON
//! event stream into typed progress, and enforces retry and resource
//! policies.

pub mod events;
pub mod limits;
pub mod output;
pub mod preview;
pub mod retry;

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::time::{timeout, Duration};
use tracing::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::domain::{
    ProgressSink, ResourceLimits, RetryConfig, TaskProgress, TaskResult, TaskStatus,
    ThinkingBudget, ToolInvocation, UsageDelta,
};
use events::{parse_event, AgentEvent};
use limits::{GuardSet, ToolCallTracker};
use output::truncate_output_default;
use preview::preview_args;

/// Grace period between SIGTERM and SIGKILL.
const KILL_GRACE: Duration = Duration::from_secs(5);

/// Everything needed to run one agent task.
#[derive(Clone)]
pub struct AgentInvocation {
    pub id: String,
    pub name: Option<String>,
    pub task: String,
    pub cwd: PathBuf,
    pub step: Option<u32>,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub tools: Option<Vec<String>>,
    pub system_prompt: Option<String>,
    pub context: Option<String>,
    pub thinking: Option<ThinkingBudget>,
    pub retry: Option<RetryConfig>,
    pub resource_limits: Option<ResourceLimits>,
    pub cancel: CancelToken,
    pub on_progress: Option<ProgressSink>,
}

impl AgentInvocation {
    pub fn new(id: impl Into<String>, task: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            name: None,
            task: task.into(),
            cwd: cwd.into(),
            step: None,
            provider: None,
            model: None,
            tools: None,
            system_prompt: None,
            context: None,
            thinking: None,
            retry: None,
            resource_limits: None,
            cancel: CancelToken::new(),
            on_progress: None,
        }
    }
}

/// The seam between the orchestration layers and the agent subprocess.
/// Production uses [`PiRunner`]; tests substitute stubs.
#[async_trait]
pub trait AgentRunner: Send + Sync {
    /// Run one task to completion. Never fails out of the call; every
    /// outcome is encoded in the returned [`TaskResult`].
    async fn run(&self, invocation: AgentInvocation) -> TaskResult;
}

pub type RunnerRef = Arc<dyn AgentRunner>;

/// Runs tasks by spawning the `pi` binary in JSON streaming mode.
pub struct PiRunner {
    binary: String,
}

impl PiRunner {
    pub fn new() -> Self {
        Self {
            binary: "pi".to_string(),
        }
    }

    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    async fn run_once(&self, inv: AgentInvocation) -> TaskResult {
        let start = Instant::now();
        let guards = GuardSet::new(&inv.cancel, inv.resource_limits.as_ref());
        let token = guards.token().clone();

        let mut state = StreamState::new(&inv);
        state.progress.status = TaskStatus::Running;
        emit(&inv.on_progress, &mut state.progress);

        // The TempDir handle keeps the prompt directory alive for the run
        // and removes it on every exit path.
        let mut _prompt_dir: Option<TempDir> = None;
        let mut prompt_path: Option<PathBuf> = None;
        if let Some(system_prompt) = inv.system_prompt.as_deref() {
            if !system_prompt.trim().is_empty() {
                match write_prompt_file(system_prompt) {
                    Ok((dir, path)) => {
                        prompt_path = Some(path);
                        _prompt_dir = Some(dir);
                    }
                    Err(e) => {
                        let error = format!("Failed to write system prompt file: {}", e);
                        return state.fail_to_start(&inv, error, start);
                    }
                }
            }
        }

        let prompt = match inv.context.as_deref() {
            Some(context) if !context.is_empty() => format!("{}\n\nTask: {}", context, inv.task),
            _ => format!("Task: {}", inv.task),
        };

        let mut cmd = Command::new(&self.binary);
        cmd.args(["--mode", "json", "-p", "--no-session"]);
        if let Some(provider) = &inv.provider {
            cmd.arg("--provider").arg(provider);
        }
        if let Some(model) = &inv.model {
            cmd.arg("--model").arg(model);
        }
        if let Some(tools) = &inv.tools {
            cmd.arg("--tools").arg(tools.join(","));
        }
        if let Some(thinking) = &inv.thinking {
            cmd.arg("--thinking").arg(thinking.to_string());
        }
        if let Some(path) = &prompt_path {
            cmd.arg("--append-system-prompt").arg(path);
        }
        cmd.arg(&prompt)
            .current_dir(&inv.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(task_id = %inv.id, model = ?inv.model, "Spawning agent process");
        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                let error = format!("Failed to spawn {}: {}", self.binary, e);
                return state.fail_to_start(&inv, error, start);
            }
        };

        let stderr_task = child.stderr.take().map(|mut stderr| {
            tokio::spawn(async move {
                let mut buf = String::new();
                let _ = stderr.read_to_string(&mut buf).await;
                buf
            })
        });

        let stdout = child.stdout.take().expect("stdout piped");
        let mut lines = BufReader::new(stdout).lines();
        let tracker = guards.tool_tracker();

        loop {
            tokio::select! {
                maybe_line = lines.next_line() => {
                    match maybe_line {
                        Ok(Some(line)) => {
                            if let Some(event) = parse_event(&line) {
                                state.apply(event, tracker);
                                emit(&inv.on_progress, &mut state.progress);
                            }
                        }
                        // EOF flushes the reader's final buffered line before
                        // yielding None, so nothing is lost here.
                        Ok(None) | Err(_) => break,
                    }
                }
                _ = token.cancelled() => break,
            }
        }

        let aborted = token.is_cancelled();
        let status = if aborted {
            info!(task_id = %inv.id, reason = ?token.reason(), "Cancelling agent process");
            terminate_child(&mut child).await
        } else {
            child.wait().await.ok()
        };

        let stderr_text = match stderr_task {
            Some(handle) => handle.await.unwrap_or_default(),
            None => String::new(),
        };

        state.finish(&inv, status, stderr_text, aborted, &token, start)
    }
}

impl Default for PiRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AgentRunner for PiRunner {
    async fn run(&self, invocation: AgentInvocation) -> TaskResult {
        let retry = invocation.retry.clone();
        retry::run_with_retry(retry.as_ref(), || self.run_once(invocation.clone())).await
    }
}

/// Accumulated state for one streaming run.
struct StreamState {
    progress: TaskProgress,
    tool_usage: HashMap<String, u32>,
    last_assistant_text: Option<String>,
    api_error: Option<String>,
}

impl StreamState {
    fn new(inv: &AgentInvocation) -> Self {
        let mut progress = TaskProgress::new(&inv.id, &inv.task);
        progress.name = inv.name.clone();
        progress.model = inv.model.clone();
        Self {
            progress,
            tool_usage: HashMap::new(),
            last_assistant_text: None,
            api_error: None,
        }
    }

    fn apply(&mut self, event: AgentEvent, tracker: Option<&ToolCallTracker>) {
        match event {
            AgentEvent::MessageEnd { message } => {
                if message.role != "assistant" {
                    return;
                }
                self.progress.usage.add(&UsageDelta {
                    turns: Some(1),
                    ..Default::default()
                });
                if let Some(usage) = &message.usage {
                    self.progress.usage.add(&usage.to_delta());
                }
                for text in message.text_parts() {
                    self.progress.push_output(text);
                }
                self.last_assistant_text =
                    Some(message.last_text().unwrap_or_default().to_string());
                if message.stop_reason.as_deref() == Some("error") {
                    if let Some(error) = &message.error_message {
                        self.api_error = Some(error.clone());
                    }
                }
            }
            AgentEvent::ToolExecutionStart { tool_name, args } => {
                self.progress.current_tool_args = Some(preview_args(&tool_name, &args));
                self.progress.current_tool = Some(tool_name);
                if let Some(tracker) = tracker {
                    tracker.on_start();
                }
            }
            AgentEvent::ToolExecutionEnd {} => {
                if let Some(tool) = self.progress.current_tool.take() {
                    let args_preview = self.progress.current_tool_args.take().unwrap_or_default();
                    *self.tool_usage.entry(tool.clone()).or_insert(0) += 1;
                    self.progress.push_tool(ToolInvocation { tool, args_preview });
                } else {
                    self.progress.current_tool_args = None;
                }
                if let Some(tracker) = tracker {
                    tracker.on_end();
                }
            }
            AgentEvent::ToolResultEnd { .. } => {}
        }
    }

    fn fail_to_start(
        mut self,
        inv: &AgentInvocation,
        error: String,
        start: Instant,
    ) -> TaskResult {
        warn!(task_id = %inv.id, error = %error, "Task failed before agent start");
        self.progress.status = TaskStatus::Failed;
        emit(&inv.on_progress, &mut self.progress);

        let mut result = TaskResult::failed_to_start(&inv.id, &inv.task, error);
        result.name = inv.name.clone();
        result.model = inv.model.clone();
        result.step = inv.step;
        result.duration_ms = start.elapsed().as_millis() as u64;
        result
    }

    fn finish(
        mut self,
        inv: &AgentInvocation,
        status: Option<std::process::ExitStatus>,
        stderr: String,
        aborted: bool,
        token: &CancelToken,
        start: Instant,
    ) -> TaskResult {
        let mut exit_code = status.and_then(|s| s.code()).unwrap_or(0);

        let truncated_output =
            truncate_output_default(self.last_assistant_text.as_deref().unwrap_or(""));

        let mut error = None;
        if exit_code != 0 && !aborted {
            error = Some(if stderr.trim().is_empty() {
                format!("Exit code: {}", exit_code)
            } else {
                stderr.clone()
            });
        }
        // The agent process may exit 0 on auth/API failures.
        if let Some(api_error) = self.api_error.take() {
            if error.is_none() {
                error = Some(api_error);
                exit_code = 1;
            }
        }
        if aborted && error.is_none() {
            error = token.reason();
        }

        self.progress.status = if aborted {
            TaskStatus::Aborted
        } else if exit_code == 0 {
            TaskStatus::Completed
        } else {
            TaskStatus::Failed
        };
        emit(&inv.on_progress, &mut self.progress);

        debug!(
            task_id = %inv.id,
            exit_code,
            aborted,
            turns = self.progress.usage.turns,
            tools = self.progress.tool_count,
            "Agent task finished"
        );

        TaskResult {
            id: inv.id.clone(),
            name: inv.name.clone(),
            task: inv.task.clone(),
            model: inv.model.clone(),
            exit_code,
            output: truncated_output.output,
            stderr,
            truncated: truncated_output.truncated,
            duration_ms: start.elapsed().as_millis() as u64,
            usage: self.progress.usage,
            error,
            step: inv.step,
            aborted,
            tool_usage: self.tool_usage,
        }
    }
}

fn emit(sink: &Option<ProgressSink>, progress: &mut TaskProgress) {
    if let Some(sink) = sink {
        sink(progress.snapshot());
    }
}

/// Write the system prompt 0600 into a fresh private directory. The caller
/// holds the [`TempDir`] for the lifetime of the child.
fn write_prompt_file(system_prompt: &str) -> std::io::Result<(TempDir, PathBuf)> {
    let dir = tempfile::Builder::new().prefix("pi-swarm-").tempdir()?;
    let path = dir.path().join("system-prompt.md");

    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(0o600)
            .open(&path)?;
        file.write_all(system_prompt.as_bytes())?;
    }
    #[cfg(not(unix))]
    std::fs::write(&path, system_prompt)?;

    Ok((dir, path))
}

/// SIGTERM, then SIGKILL if the child is still alive after the grace period.
async fn terminate_child(child: &mut Child) -> Option<std::process::ExitStatus> {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;
        let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
    }
    #[cfg(not(unix))]
    let _ = child.start_kill();

    match timeout(KILL_GRACE, child.wait()).await {
        Ok(status) => status.ok(),
        Err(_) => {
            let _ = child.start_kill();
            child.wait().await.ok()
        }
    }
}
