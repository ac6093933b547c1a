//! Typed view of the agent's newline-delimited JSON event stream.
//!
//! The child writes one JSON object per line. Lines that fail to parse, and
//! events with an unrecognized `type`, are discarded silently.

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::domain::UsageDelta;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum AgentEvent {
    #[serde(rename = "message_end")]
    MessageEnd { message: Message },

    #[serde(rename = "tool_execution_start")]
    ToolExecutionStart {
        #[serde(rename = "toolName")]
        tool_name: String,
        #[serde(default)]
        args: Map<String, Value>,
    },

    #[serde(rename = "tool_execution_end")]
    ToolExecutionEnd {},

    #[serde(rename = "tool_result_end")]
    ToolResultEnd {
        #[serde(default)]
        message: Option<Message>,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub role: String,
    #[serde(default)]
    pub content: Vec<ContentPart>,
    #[serde(default)]
    pub usage: Option<MessageUsage>,
    #[serde(rename = "stopReason", default)]
    pub stop_reason: Option<String>,
    #[serde(rename = "errorMessage", default)]
    pub error_message: Option<String>,
}

impl Message {
    /// Text of the final text part, if any.
    pub fn last_text(&self) -> Option<&str> {
        self.content.iter().rev().find_map(|part| match part {
            ContentPart::Text { text } => Some(text.as_str()),
            ContentPart::Other => None,
        })
    }

    pub fn text_parts(&self) -> impl Iterator<Item = &str> {
        self.content.iter().filter_map(|part| match part {
            ContentPart::Text { text } => Some(text.as_str()),
            ContentPart::Other => None,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ContentPart {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

/// Usage block attached to a message. Missing sub-fields default to zero.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessageUsage {
    #[serde(default)]
    pub input: u64,
    #[serde(default)]
    pub output: u64,
    #[serde(rename = "cacheRead", default)]
    pub cache_read: u64,
    #[serde(rename = "cacheWrite", default)]
    pub cache_write: u64,
    #[serde(default)]
    pub cost: CostBlock,
    #[serde(rename = "totalTokens", default)]
    pub total_tokens: u64,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct CostBlock {
    #[serde(default)]
    pub total: f64,
}

impl MessageUsage {
    pub fn to_delta(&self) -> UsageDelta {
        UsageDelta {
            input: Some(self.input),
            output: Some(self.output),
            cache_read: Some(self.cache_read),
            cache_write: Some(self.cache_write),
            cost: Some(self.cost.total),
            context_tokens: Some(self.total_tokens),
            turns: None,
        }
    }
}

/// Parse one stream line. Returns `None` for blanks, malformed JSON and
/// unknown event types.
pub fn parse_event(line: &str) -> Option<AgentEvent> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    serde_json::from_str(line).ok()
}
