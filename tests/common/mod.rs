#![allow(dead_code)]

//! Shared test fixtures: a scripted agent runner and result builders.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use pi_swarm::executor::{AgentInvocation, AgentRunner};
use pi_swarm::{TaskResult, UsageStats};

/// Opt-in log output for debugging test runs: `RUST_LOG=debug cargo test`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// Build a successful result for an invocation.
pub fn ok_result(invocation: &AgentInvocation, output: impl Into<String>) -> TaskResult {
    TaskResult {
        id: invocation.id.clone(),
        name: invocation.name.clone(),
        task: invocation.task.clone(),
        model: invocation.model.clone(),
        exit_code: 0,
        output: output.into(),
        stderr: String::new(),
        truncated: false,
        duration_ms: 1,
        usage: UsageStats {
            input: 10,
            output: 5,
            turns: 1,
            ..Default::default()
        },
        error: None,
        step: invocation.step,
        aborted: false,
        tool_usage: HashMap::new(),
    }
}

/// Build a failed result for an invocation.
pub fn err_result(invocation: &AgentInvocation, error: impl Into<String>) -> TaskResult {
    let mut result = ok_result(invocation, "");
    result.exit_code = 1;
    result.error = Some(error.into());
    result
}

/// Build an aborted result for an invocation.
pub fn aborted_result(invocation: &AgentInvocation) -> TaskResult {
    let mut result = ok_result(invocation, "");
    result.aborted = true;
    result.error = Some("cancelled".into());
    result
}

type Handler =
    dyn Fn(AgentInvocation, u32) -> futures::future::BoxFuture<'static, TaskResult> + Send + Sync;

/// Scripted [`AgentRunner`]: the handler receives each invocation plus the
/// 1-based call count for that invocation id, and every invocation is
/// recorded for later inspection.
pub struct StubRunner {
    handler: Box<Handler>,
    counts: Mutex<HashMap<String, u32>>,
    invocations: Mutex<Vec<AgentInvocation>>,
}

impl StubRunner {
    pub fn new(
        handler: impl Fn(&AgentInvocation, u32) -> TaskResult + Send + Sync + 'static,
    ) -> Arc<Self> {
        Self::new_async(move |invocation, nth| {
            let result = handler(&invocation, nth);
            Box::pin(async move { result })
        })
    }

    /// Variant for stubs that need to await (e.g. watch their cancel token).
    pub fn new_async(
        handler: impl Fn(AgentInvocation, u32) -> futures::future::BoxFuture<'static, TaskResult>
            + Send
            + Sync
            + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            handler: Box::new(handler),
            counts: Mutex::new(HashMap::new()),
            invocations: Mutex::new(Vec::new()),
        })
    }

    /// A runner that succeeds every task, echoing a canned output.
    pub fn always_ok() -> Arc<Self> {
        Self::new(|invocation, _| ok_result(invocation, format!("done: {}", invocation.id)))
    }

    pub fn call_count(&self, id: &str) -> u32 {
        self.counts.lock().get(id).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.invocations.lock().len()
    }

    pub fn invocations_for(&self, id: &str) -> Vec<AgentInvocation> {
        self.invocations
            .lock()
            .iter()
            .filter(|inv| inv.id == id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl AgentRunner for StubRunner {
    async fn run(&self, invocation: AgentInvocation) -> TaskResult {
        let nth = {
            let mut counts = self.counts.lock();
            let count = counts.entry(invocation.id.clone()).or_insert(0);
            *count += 1;
            *count
        };
        self.invocations.lock().push(invocation.clone());
        (self.handler)(invocation, nth).await
    }
}
