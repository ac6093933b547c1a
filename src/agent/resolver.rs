//! Inheritance chain resolution and settings merging.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use super::AgentConfig;
use crate::domain::{ResourceLimits, RetryConfig, ThinkingBudget};
use crate::error::{Result, SwarmError};

/// Resolve every agent's `extends` chain, filling the `resolved_*` fields.
///
/// Consumes the input so that a failed resolution leaves no partially
/// resolved set behind. Tools are the union of the chain, first-seen order,
/// deduplicated; model and thinking fall back to the base; the system
/// prompt is never inherited.
pub fn resolve_inheritance(agents: Vec<AgentConfig>) -> Result<Vec<AgentConfig>> {
    let mut by_name: HashMap<String, AgentConfig> = HashMap::with_capacity(agents.len());
    for agent in agents {
        by_name.insert(agent.name.clone(), agent);
    }

    let mut done: HashSet<String> = HashSet::new();
    let names: Vec<String> = by_name.keys().cloned().collect();
    for name in &names {
        resolve_agent(name, &mut by_name, &mut done, &mut Vec::new())?;
    }

    let mut resolved: Vec<AgentConfig> = by_name.into_values().collect();
    resolved.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(resolved)
}

fn resolve_agent(
    name: &str,
    by_name: &mut HashMap<String, AgentConfig>,
    done: &mut HashSet<String>,
    visiting: &mut Vec<String>,
) -> Result<()> {
    if done.contains(name) {
        return Ok(());
    }
    if visiting.iter().any(|n| n == name) {
        let mut path = visiting.clone();
        path.push(name.to_string());
        return Err(SwarmError::CircularInheritance { path });
    }

    let extends = by_name
        .get(name)
        .map(|a| a.extends.clone())
        .unwrap_or_default();

    match extends {
        None => {
            let agent = by_name.get_mut(name).expect("agent indexed");
            agent.resolved_tools = agent.tools.clone();
            agent.resolved_model = agent.model.clone();
            agent.resolved_thinking = agent.thinking;
        }
        Some(base) => {
            if !by_name.contains_key(&base) {
                return Err(SwarmError::BaseAgentNotFound {
                    base,
                    agent: name.to_string(),
                });
            }
            visiting.push(name.to_string());
            resolve_agent(&base, by_name, done, visiting)?;
            visiting.pop();

            let base_cfg = by_name.get(&base).expect("base indexed").clone();
            let base_tools = base_cfg.resolved_tools.or(base_cfg.tools);
            let agent = by_name.get_mut(name).expect("agent indexed");

            agent.resolved_tools = merge_tools(base_tools, agent.tools.clone());
            agent.resolved_model = agent
                .model
                .clone()
                .or(base_cfg.resolved_model)
                .or(base_cfg.model);
            agent.resolved_thinking = agent
                .thinking
                .or(base_cfg.resolved_thinking)
                .or(base_cfg.thinking);
            debug!(agent = %name, base = %base, "Resolved agent inheritance");
        }
    }

    done.insert(name.to_string());
    Ok(())
}

fn merge_tools(base: Option<Vec<String>>, own: Option<Vec<String>>) -> Option<Vec<String>> {
    if base.is_none() && own.is_none() {
        return None;
    }
    let mut seen = HashSet::new();
    let mut merged = Vec::new();
    for tool in base.into_iter().flatten().chain(own.into_iter().flatten()) {
        if seen.insert(tool.clone()) {
            merged.push(tool);
        }
    }
    Some(merged)
}

/// Caller-provided overrides, applied over the named agent's resolved
/// defaults.
#[derive(Debug, Clone, Default)]
pub struct SettingsOverrides {
    pub model: Option<String>,
    pub tools: Option<Vec<String>>,
    pub system_prompt: Option<String>,
    pub thinking: Option<ThinkingBudget>,
    pub resource_limits: Option<ResourceLimits>,
    pub retry: Option<RetryConfig>,
}

/// Effective settings for one executor invocation.
#[derive(Debug, Clone, Default)]
pub struct AgentSettings {
    pub model: Option<String>,
    pub tools: Option<Vec<String>>,
    pub system_prompt: Option<String>,
    pub thinking: Option<ThinkingBudget>,
    pub resource_limits: Option<ResourceLimits>,
    pub retry: Option<RetryConfig>,
}

/// Start from the named agent's resolved fields (if a name is given),
/// then apply each override the caller provided. Resource limits and retry
/// pass through from the overrides unchanged.
pub fn resolve_settings(
    agents: &[AgentConfig],
    agent_name: Option<&str>,
    overrides: SettingsOverrides,
) -> Result<AgentSettings> {
    let mut settings = AgentSettings::default();

    if let Some(name) = agent_name {
        let agent = agents
            .iter()
            .find(|a| a.name == name)
            .ok_or_else(|| SwarmError::AgentNotFound(name.to_string()))?;
        settings.model = agent.resolved_model.clone();
        settings.tools = agent.resolved_tools.clone();
        settings.thinking = agent.resolved_thinking;
        if !agent.system_prompt.trim().is_empty() {
            settings.system_prompt = Some(agent.system_prompt.clone());
        }
    }

    if let Some(model) = overrides.model {
        settings.model = Some(model);
    }
    if let Some(tools) = overrides.tools {
        settings.tools = Some(tools);
    }
    if let Some(system_prompt) = overrides.system_prompt {
        settings.system_prompt = Some(system_prompt);
    }
    if let Some(thinking) = overrides.thinking {
        settings.thinking = Some(thinking);
    }
    settings.resource_limits = overrides.resource_limits;
    settings.retry = overrides.retry;

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentSource;
    use crate::domain::ThinkingLevel;
    use std::path::PathBuf;

    fn agent(name: &str, extends: Option<&str>) -> AgentConfig {
        AgentConfig {
            name: name.to_string(),
            description: format!("{} agent", name),
            tools: None,
            model: None,
            system_prompt: format!("{} prompt", name),
            thinking: None,
            source: AgentSource::User,
            file_path: PathBuf::from(format!("{}.md", name)),
            extends: extends.map(String::from),
            resolved_tools: None,
            resolved_model: None,
            resolved_thinking: None,
        }
    }

    fn find<'a>(agents: &'a [AgentConfig], name: &str) -> &'a AgentConfig {
        agents.iter().find(|a| a.name == name).unwrap()
    }

    #[test]
    fn roots_copy_fields_verbatim() {
        let mut root = agent("base", None);
        root.tools = Some(vec!["read".into(), "grep".into()]);
        root.model = Some("sonnet".into());

        let resolved = resolve_inheritance(vec![root]).unwrap();
        let base = find(&resolved, "base");
        assert_eq!(base.resolved_tools.as_deref().unwrap(), ["read", "grep"]);
        assert_eq!(base.resolved_model.as_deref(), Some("sonnet"));
    }

    #[test]
    fn chain_unions_tools_in_first_seen_order() {
        let mut base = agent("base", None);
        base.tools = Some(vec!["read".into(), "grep".into()]);
        let mut mid = agent("mid", Some("base"));
        mid.tools = Some(vec!["bash".into(), "read".into()]);
        let leaf = agent("leaf", Some("mid"));

        let resolved = resolve_inheritance(vec![leaf, base, mid]).unwrap();
        assert_eq!(
            find(&resolved, "mid").resolved_tools.as_deref().unwrap(),
            ["read", "grep", "bash"]
        );
        assert_eq!(
            find(&resolved, "leaf").resolved_tools.as_deref().unwrap(),
            ["read", "grep", "bash"]
        );
    }

    #[test]
    fn model_and_thinking_fall_back_to_base() {
        let mut base = agent("base", None);
        base.model = Some("opus".into());
        base.thinking = Some(ThinkingBudget::Level(ThinkingLevel::Medium));
        let mut child = agent("child", Some("base"));
        child.thinking = Some(ThinkingBudget::Tokens(2048));

        let resolved = resolve_inheritance(vec![base, child]).unwrap();
        let child = find(&resolved, "child");
        assert_eq!(child.resolved_model.as_deref(), Some("opus"));
        assert_eq!(child.resolved_thinking, Some(ThinkingBudget::Tokens(2048)));
    }

    #[test]
    fn system_prompt_is_not_inherited() {
        let base = agent("base", None);
        let child = agent("child", Some("base"));

        let resolved = resolve_inheritance(vec![base, child]).unwrap();
        assert_eq!(find(&resolved, "child").system_prompt, "child prompt");
    }

    #[test]
    fn cycle_is_detected() {
        let a = agent("a", Some("b"));
        let b = agent("b", Some("c"));
        let c = agent("c", Some("a"));

        let err = resolve_inheritance(vec![a, b, c]).unwrap_err();
        assert!(matches!(err, SwarmError::CircularInheritance { .. }));
        assert!(err.to_string().contains("Circular inheritance"));
    }

    #[test]
    fn missing_base_is_reported() {
        let child = agent("child", Some("ghost"));
        let err = resolve_inheritance(vec![child]).unwrap_err();
        assert!(err.to_string().contains("Base agent not found"));
    }

    #[test]
    fn settings_overrides_win() {
        let mut base = agent("base", None);
        base.tools = Some(vec!["read".into()]);
        base.model = Some("sonnet".into());
        let resolved = resolve_inheritance(vec![base]).unwrap();

        let settings = resolve_settings(
            &resolved,
            Some("base"),
            SettingsOverrides {
                model: Some("opus".into()),
                retry: Some(RetryConfig::attempts(3, 100)),
                ..Default::default()
            },
        )
        .unwrap();

        assert_eq!(settings.model.as_deref(), Some("opus"));
        assert_eq!(settings.tools.as_deref().unwrap(), ["read"]);
        assert_eq!(settings.system_prompt.as_deref(), Some("base prompt"));
        assert_eq!(settings.retry.unwrap().max_attempts, 3);
    }

    #[test]
    fn unknown_agent_name_errors() {
        let err = resolve_settings(&[], Some("ghost"), SettingsOverrides::default()).unwrap_err();
        assert!(matches!(err, SwarmError::AgentNotFound(_)));
    }

    #[test]
    fn no_agent_name_uses_overrides_only() {
        let settings = resolve_settings(
            &[],
            None,
            SettingsOverrides {
                model: Some("haiku".into()),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(settings.model.as_deref(), Some("haiku"));
        assert!(settings.tools.is_none());
    }
}
