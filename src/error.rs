use thiserror::Error;

#[derive(Error, Debug)]
pub enum SwarmError {
    #[error("Unknown member role: {role} (task {task_id})")]
    UnknownMember { role: String, task_id: String },

    #[error("Duplicate task id: {0}")]
    DuplicateTask(String),

    #[error("Unknown dependency: {dep} (task {task_id})")]
    UnknownDependency { dep: String, task_id: String },

    #[error("Dependency cycle detected: {}", path.join(" -> "))]
    DependencyCycle { path: Vec<String> },

    #[error("Base agent not found: {base} (extended by {agent})")]
    BaseAgentNotFound { base: String, agent: String },

    #[error("Circular inheritance detected: {}", path.join(" -> "))]
    CircularInheritance { path: Vec<String> },

    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    #[error("No tasks to race")]
    EmptyRace,

    #[error("All raced tasks failed: {}", format_failures(failures))]
    RaceFailed { failures: Vec<(String, String)> },

    #[error("Task execution failed: {0}")]
    TaskFailed(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml_bw::Error),

    #[error("{0}")]
    Other(String),
}

fn format_failures(failures: &[(String, String)]) -> String {
    failures
        .iter()
        .map(|(id, error)| format!("{}: {}", id, error))
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T> = std::result::Result<T, SwarmError>;
