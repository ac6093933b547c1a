//! Loads agent definitions from markdown files with YAML frontmatter.
//!
//! A definition file starts with a `---` line, carries frontmatter up to the
//! next `---` line, and everything after is the system prompt body. Files
//! missing `name` or `description` are skipped, as are files that are not
//! `*.md`.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use tokio::fs;
use tracing::{debug, warn};

use super::{AgentConfig, AgentSource};
use crate::domain::ThinkingBudget;
use crate::error::Result;

/// Which definition directories to consider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryScope {
    User,
    Project,
    Both,
}

#[derive(Debug, Deserialize)]
struct Frontmatter {
    name: Option<String>,
    description: Option<String>,
    tools: Option<String>,
    model: Option<String>,
    thinking: Option<ThinkingBudget>,
    extends: Option<String>,
}

/// Parse one definition file's content. Returns `None` when the file is not
/// a valid definition (no frontmatter, unparseable YAML, missing required
/// keys).
pub fn parse_agent_file(content: &str, source: AgentSource, path: &Path) -> Option<AgentConfig> {
    let rest = content.strip_prefix("---")?;
    let (frontmatter_text, body) = rest.split_once("\n---")?;

    let frontmatter: Frontmatter = match serde_yaml_bw::from_str(frontmatter_text) {
        Ok(fm) => fm,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "Skipping agent file with bad frontmatter");
            return None;
        }
    };

    let name = frontmatter.name?;
    let description = frontmatter.description?;

    let tools = frontmatter.tools.map(|csv| {
        csv.split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(String::from)
            .collect::<Vec<_>>()
    });

    let system_prompt = body
        .strip_prefix('\n')
        .unwrap_or(body)
        .trim_start_matches('\n')
        .to_string();

    Some(AgentConfig {
        name,
        description,
        tools,
        model: frontmatter.model,
        system_prompt,
        thinking: frontmatter.thinking,
        source,
        file_path: path.to_path_buf(),
        extends: frontmatter.extends,
        resolved_tools: None,
        resolved_model: None,
        resolved_thinking: None,
    })
}

async fn load_dir(dir: &Path, source: AgentSource) -> Vec<AgentConfig> {
    let mut agents = Vec::new();
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(_) => return agents,
    };

    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("md") {
            continue;
        }
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read agent file");
                continue;
            }
        };
        if let Some(agent) = parse_agent_file(&content, source, &path) {
            agents.push(agent);
        }
    }

    agents.sort_by(|a, b| a.name.cmp(&b.name));
    agents
}

/// Discover agent definitions from the user directory and, when present,
/// the project directory. With scope `Both`, a project definition shadows a
/// user definition of the same name.
pub async fn discover_agents(
    user_dir: Option<&Path>,
    project_dir: Option<&Path>,
    scope: DiscoveryScope,
) -> Result<Vec<AgentConfig>> {
    let mut by_name: HashMap<String, AgentConfig> = HashMap::new();

    if matches!(scope, DiscoveryScope::User | DiscoveryScope::Both) {
        if let Some(dir) = user_dir {
            for agent in load_dir(dir, AgentSource::User).await {
                by_name.insert(agent.name.clone(), agent);
            }
        }
    }
    if matches!(scope, DiscoveryScope::Project | DiscoveryScope::Both) {
        if let Some(dir) = project_dir {
            for agent in load_dir(dir, AgentSource::Project).await {
                by_name.insert(agent.name.clone(), agent);
            }
        }
    }

    let mut agents: Vec<AgentConfig> = by_name.into_values().collect();
    agents.sort_by(|a, b| a.name.cmp(&b.name));
    debug!(count = agents.len(), "Discovered agent definitions");
    Ok(agents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ThinkingLevel;
    use std::path::PathBuf;

    fn parse(content: &str) -> Option<AgentConfig> {
        parse_agent_file(content, AgentSource::User, &PathBuf::from("reviewer.md"))
    }

    #[test]
    fn parses_full_definition() {
        let content = "---\nname: reviewer\ndescription: Reviews code\ntools: read, grep,bash\nmodel: sonnet\nthinking: high\nextends: base\n---\nYou are a careful reviewer.\n";
        let agent = parse(content).unwrap();

        assert_eq!(agent.name, "reviewer");
        assert_eq!(agent.description, "Reviews code");
        assert_eq!(
            agent.tools.as_deref().unwrap(),
            ["read", "grep", "bash"]
        );
        assert_eq!(agent.model.as_deref(), Some("sonnet"));
        assert_eq!(
            agent.thinking,
            Some(ThinkingBudget::Level(ThinkingLevel::High))
        );
        assert_eq!(agent.extends.as_deref(), Some("base"));
        assert_eq!(agent.system_prompt, "You are a careful reviewer.\n");
    }

    #[test]
    fn integer_thinking_budget() {
        let content = "---\nname: planner\ndescription: Plans\nthinking: 8192\n---\nPlan well.";
        let agent = parse(content).unwrap();
        assert_eq!(agent.thinking, Some(ThinkingBudget::Tokens(8192)));
    }

    #[test]
    fn missing_required_keys_skips_file() {
        assert!(parse("---\nname: x\n---\nbody").is_none());
        assert!(parse("---\ndescription: y\n---\nbody").is_none());
        assert!(parse("no frontmatter here").is_none());
    }

    #[tokio::test]
    async fn project_shadows_user() {
        let user = tempfile::tempdir().unwrap();
        let project = tempfile::tempdir().unwrap();

        std::fs::write(
            user.path().join("helper.md"),
            "---\nname: helper\ndescription: user version\n---\nuser prompt",
        )
        .unwrap();
        std::fs::write(
            user.path().join("solo.md"),
            "---\nname: solo\ndescription: only in user\n---\nsolo prompt",
        )
        .unwrap();
        std::fs::write(
            project.path().join("helper.md"),
            "---\nname: helper\ndescription: project version\n---\nproject prompt",
        )
        .unwrap();
        std::fs::write(project.path().join("notes.txt"), "not an agent").unwrap();

        let agents = discover_agents(
            Some(user.path()),
            Some(project.path()),
            DiscoveryScope::Both,
        )
        .await
        .unwrap();

        assert_eq!(agents.len(), 2);
        let helper = agents.iter().find(|a| a.name == "helper").unwrap();
        assert_eq!(helper.description, "project version");
        assert_eq!(helper.source, AgentSource::Project);
        assert!(agents.iter().any(|a| a.name == "solo"));
    }

    #[tokio::test]
    async fn missing_directories_are_empty() {
        let agents = discover_agents(
            Some(Path::new("/nonexistent/agents")),
            None,
            DiscoveryScope::Both,
        )
        .await
        .unwrap();
        assert!(agents.is_empty());
    }
}
