//! Resource guards expressed as cancellation sources.
//!
//! Each guard watches one limit and cancels the task's composite token with
//! a reason string when breached. The duration timer is always armed when a
//! limit is present; the memory poller and tool-call tracker only run when
//! `enforce_limits` is set.

use std::sync::atomic::{AtomicU32, Ordering};

use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, Duration};
use tracing::warn;

use crate::cancel::CancelToken;
use crate::domain::ResourceLimits;

const MEMORY_POLL_INTERVAL: Duration = Duration::from_secs(5);

pub const DURATION_LIMIT_REASON: &str = "duration limit exceeded";
pub const MEMORY_LIMIT_REASON: &str = "memory limit exceeded";
pub const TOOL_LIMIT_REASON: &str = "concurrent tool call limit exceeded";

/// Composite cancellation for one task: the caller's token plus any armed
/// resource guards. Guard tasks are torn down when the set drops.
pub struct GuardSet {
    token: CancelToken,
    tracker: Option<ToolCallTracker>,
    handles: Vec<JoinHandle<()>>,
}

impl GuardSet {
    pub fn new(caller: &CancelToken, limits: Option<&ResourceLimits>) -> Self {
        let token = caller.child();
        let mut handles = Vec::new();
        let mut tracker = None;

        if let Some(limits) = limits {
            if let Some(max_ms) = limits.max_duration_ms {
                let guard_token = token.clone();
                handles.push(tokio::spawn(async move {
                    sleep(Duration::from_millis(max_ms)).await;
                    warn!(max_ms, "Duration limit hit, cancelling task");
                    guard_token.cancel(DURATION_LIMIT_REASON);
                }));
            }

            if limits.enforce_limits {
                if let Some(max_mb) = limits.max_memory_mb {
                    let guard_token = token.clone();
                    handles.push(tokio::spawn(async move {
                        let mut ticker = interval(MEMORY_POLL_INTERVAL);
                        ticker.tick().await;
                        loop {
                            ticker.tick().await;
                            if let Some(used_mb) = process_rss_mb() {
                                if used_mb > max_mb {
                                    warn!(used_mb, max_mb, "Memory limit hit, cancelling task");
                                    guard_token.cancel(MEMORY_LIMIT_REASON);
                                    return;
                                }
                            }
                        }
                    }));
                }

                if let Some(max_calls) = limits.max_concurrent_tool_calls {
                    tracker = Some(ToolCallTracker::new(max_calls, token.clone()));
                }
            }
        }

        Self {
            token,
            tracker,
            handles,
        }
    }

    pub fn token(&self) -> &CancelToken {
        &self.token
    }

    pub fn tool_tracker(&self) -> Option<&ToolCallTracker> {
        self.tracker.as_ref()
    }
}

impl Drop for GuardSet {
    fn drop(&mut self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}

/// Tracks tool executions in flight; trips when the live count exceeds the
/// configured maximum.
pub struct ToolCallTracker {
    live: AtomicU32,
    max: u32,
    token: CancelToken,
}

impl ToolCallTracker {
    fn new(max: u32, token: CancelToken) -> Self {
        Self {
            live: AtomicU32::new(0),
            max,
            token,
        }
    }

    pub fn on_start(&self) {
        let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        if live > self.max {
            warn!(live, max = self.max, "Tool concurrency limit hit");
            self.token.cancel(TOOL_LIMIT_REASON);
        }
    }

    pub fn on_end(&self) {
        let _ = self
            .live
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| {
                Some(v.saturating_sub(1))
            });
    }
}

/// Resident set size of this process in MB. The poller watches the
/// orchestrator's own footprint, not the child's.
#[cfg(target_os = "linux")]
fn process_rss_mb() -> Option<u64> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    for line in status.lines() {
        if let Some(rest) = line.strip_prefix("VmRSS:") {
            let kb: u64 = rest.split_whitespace().next()?.parse().ok()?;
            return Some(kb / 1024);
        }
    }
    None
}

#[cfg(not(target_os = "linux"))]
fn process_rss_mb() -> Option<u64> {
    None
}
