//! Agent definitions: discovery from markdown files, inheritance resolution
//! and settings merging.

pub mod discovery;
pub mod resolver;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::domain::ThinkingBudget;

pub use discovery::{discover_agents, parse_agent_file, DiscoveryScope};
pub use resolver::{resolve_inheritance, resolve_settings, AgentSettings, SettingsOverrides};

/// Where an agent definition was found. Project definitions shadow user
/// definitions of the same name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentSource {
    User,
    Project,
}

/// One agent definition, as parsed from its markdown file. The `resolved_*`
/// fields are populated by [`resolve_inheritance`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub name: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub system_prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<ThinkingBudget>,
    pub source: AgentSource,
    pub file_path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extends: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_tools: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_thinking: Option<ThinkingBudget>,
}
