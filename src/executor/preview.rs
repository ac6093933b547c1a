//! Compact display previews for tool invocations.

use serde_json::{Map, Value};

use crate::utils::{head_chars, tail_chars, truncate_chars};

/// Hard cap on any preview string.
pub const PREVIEW_MAX_CHARS: usize = 60;

fn str_arg<'a>(args: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    args.get(key).and_then(Value::as_str)
}

fn int_arg(args: &Map<String, Value>, key: &str) -> Option<i64> {
    args.get(key).and_then(Value::as_i64)
}

/// Build a display preview (≤ 60 chars) for a tool call's arguments.
pub fn preview_args(tool: &str, args: &Map<String, Value>) -> String {
    let preview = match tool {
        "read" => {
            let path = tail_chars(str_arg(args, "path").unwrap_or(""), 50);
            if args.contains_key("offset") || args.contains_key("limit") {
                let offset = int_arg(args, "offset").unwrap_or(1);
                let limit = int_arg(args, "limit").unwrap_or(100);
                format!("{} [{}-{}]", path, offset, offset + limit)
            } else {
                path
            }
        }
        "write" => {
            let path = tail_chars(str_arg(args, "path").unwrap_or(""), 40);
            match str_arg(args, "content") {
                Some(content) => format!("{} ({} chars)", path, content.chars().count()),
                None => path,
            }
        }
        "edit" => tail_chars(str_arg(args, "path").unwrap_or(""), 50),
        "bash" => str_arg(args, "command").unwrap_or("").to_string(),
        "grep" | "rg" => {
            let pattern = str_arg(args, "pattern").unwrap_or("");
            match str_arg(args, "path") {
                Some(path) => format!("{} in {}", pattern, path),
                None => pattern.to_string(),
            }
        }
        "find" => {
            let path = str_arg(args, "path").unwrap_or("");
            match str_arg(args, "name") {
                Some(name) => format!("{} -name \"{}\"", path, name),
                None => path.to_string(),
            }
        }
        "mcp" => ["tool", "search", "server"]
            .iter()
            .find_map(|key| str_arg(args, key).map(|v| format!("{}: {}", key, v)))
            .unwrap_or_default(),
        "subagent" => match str_arg(args, "task") {
            Some(task) => head_chars(task, 50),
            None => match str_arg(args, "agent") {
                Some(agent) => format!("agent: {}", agent),
                None => fallback_preview(args),
            },
        },
        "todo" => {
            let action = str_arg(args, "action").unwrap_or("");
            if let Some(title) = str_arg(args, "title") {
                format!("{}: {}", action, truncate_chars(title, 40))
            } else if let Some(id) = str_arg(args, "id") {
                format!("{}: {}", action, id)
            } else {
                action.to_string()
            }
        }
        _ => fallback_preview(args),
    };

    head_chars(&preview, PREVIEW_MAX_CHARS)
}

fn fallback_preview(args: &Map<String, Value>) -> String {
    const PREFERRED: [&str; 10] = [
        "command", "path", "file", "pattern", "query", "url", "task", "prompt", "name", "action",
    ];
    for key in PREFERRED {
        if let Some(value) = str_arg(args, key) {
            return value.to_string();
        }
    }
    args.iter()
        .find_map(|(key, value)| value.as_str().map(|v| format!("{}: {}", key, v)))
        .unwrap_or_default()
}
