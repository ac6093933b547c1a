//! Shared filesystem region for a team's task outputs and artifacts.
//!
//! Layout: `<root>/<sanitized-team>-<unique>/` holding `tasks/` (one JSON
//! record per finished task) and `artifacts/`. Filenames are keyed by
//! sanitized task id, so concurrent writers never contend.

use std::path::{Path, PathBuf};

use serde_json::json;
use tokio::fs;
use tracing::debug;
use uuid::Uuid;

use crate::error::Result;

const MAX_NAME_CHARS: usize = 64;

/// Replace anything outside `[A-Za-z0-9._-]` with `_` and cap the length.
pub fn sanitize_name(name: &str) -> String {
    let mut sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    sanitized.truncate(MAX_NAME_CHARS);
    if sanitized.is_empty() {
        "unnamed".to_string()
    } else {
        sanitized
    }
}

#[derive(Debug)]
pub struct TeamWorkspace {
    root: PathBuf,
}

impl TeamWorkspace {
    /// Create `<base>/<sanitized-team>-<unique>/{tasks,artifacts}`.
    pub async fn create(base: &Path, team_name: &str) -> Result<Self> {
        let unique: String = Uuid::new_v4().simple().to_string().chars().take(8).collect();
        let root = base.join(format!("{}-{}", sanitize_name(team_name), unique));

        fs::create_dir_all(root.join("tasks")).await?;
        fs::create_dir_all(root.join("artifacts")).await?;
        debug!(root = %root.display(), "Created team workspace");

        Ok(Self { root })
    }

    /// Open an existing workspace directory as-is.
    pub fn open(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn tasks_dir(&self) -> PathBuf {
        self.root.join("tasks")
    }

    pub fn artifacts_dir(&self) -> PathBuf {
        self.root.join("artifacts")
    }

    /// Persist one task's result as `tasks/<sanitized-id>.json`.
    pub async fn write_task_result(
        &self,
        id: &str,
        output: &str,
        status: impl std::fmt::Display,
    ) -> Result<PathBuf> {
        let path = self.tasks_dir().join(format!("{}.json", sanitize_name(id)));
        let record = json!({
            "id": id,
            "status": status.to_string(),
            "output": output,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });
        fs::write(&path, serde_json::to_vec_pretty(&record)?).await?;
        Ok(path)
    }
}
