pub mod agent;
pub mod cancel;
pub mod concurrency;
pub mod domain;
pub mod error;
pub mod executor;
pub mod modes;
pub mod team;
pub mod utils;

pub use agent::{
    discover_agents, resolve_inheritance, resolve_settings, AgentConfig, AgentSettings,
    AgentSource, DiscoveryScope, SettingsOverrides,
};
pub use cancel::CancelToken;
pub use concurrency::{map_bounded, race, BoundedMapOutcome, RaceOutcome};
pub use domain::{
    ProgressSink, ResourceLimits, RetryConfig, TaskProgress, TaskResult, TaskStatus,
    ThinkingBudget, ThinkingLevel, UsageStats,
};
pub use error::{Result, SwarmError};
pub use executor::{AgentInvocation, AgentRunner, PiRunner, RunnerRef};
pub use modes::{ModeOutcome, ModeRequest, ModeSummary, Orchestrator, RaceVariant, TaskSpec};
pub use team::{
    execute_team, Approval, ApprovalGate, DagExecutionResult, NodeStatus, ReviewSpec, TeamConfig,
    TeamMember, TeamReport, TeamTask, TeamWorkspace,
};
