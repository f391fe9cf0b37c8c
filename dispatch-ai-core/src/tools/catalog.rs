use serde_json::json;

use crate::config::schema::ToolPolicy;
use crate::providers::types::ToolDefinition;

pub const READ_ONLY_TOOLS: [&str; 6] = ["list", "search", "read", "status", "log", "web_lookup"];

pub const TOOL_NAMES: [&str; 12] = [
    "list",
    "search",
    "read",
    "status",
    "log",
    "web_lookup",
    "write",
    "edit",
    "delete",
    "move",
    "commit",
    "switch_model",
];

pub fn is_known_tool(name: &str) -> bool {
    TOOL_NAMES.contains(&name)
}

pub fn definition(name: &str) -> Option<ToolDefinition> {
    let (name, description, parameters) = match name {
        "list" => (
            "list",
            "List files and directories directly under a workspace path.",
            json!({
                "type": "object",
                "properties": { "path": { "type": "string", "description": "Directory relative to the workspace root; defaults to the root." } }
            }),
        ),
        "search" => (
            "search",
            "Search file contents with a regular expression.",
            json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string" },
                    "path": { "type": "string" },
                    "glob": { "type": "string", "description": "Optional file filter such as *.js" }
                },
                "required": ["query"]
            }),
        ),
        "read" => (
            "read",
            "Read a text file.",
            json!({
                "type": "object",
                "properties": { "path": { "type": "string" } },
                "required": ["path"]
            }),
        ),
        "status" => (
            "status",
            "Show version-control status of the workspace.",
            json!({ "type": "object", "properties": {} }),
        ),
        "log" => (
            "log",
            "Show recent commits.",
            json!({
                "type": "object",
                "properties": { "limit": { "type": "integer", "minimum": 1 } }
            }),
        ),
        "web_lookup" => (
            "web_lookup",
            "Look up a topic on the web and return a short summary.",
            json!({
                "type": "object",
                "properties": { "query": { "type": "string" } },
                "required": ["query"]
            }),
        ),
        "write" => (
            "write",
            "Create or overwrite a file with the given content.",
            json!({
                "type": "object",
                "properties": { "path": { "type": "string" }, "content": { "type": "string" } },
                "required": ["path", "content"]
            }),
        ),
        "edit" => (
            "edit",
            "Replace exact text in a file. `find` must occur in the file.",
            json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string" },
                    "find": { "type": "string" },
                    "replace": { "type": "string" }
                },
                "required": ["path", "find", "replace"]
            }),
        ),
        "delete" => (
            "delete",
            "Delete a file.",
            json!({
                "type": "object",
                "properties": { "path": { "type": "string" } },
                "required": ["path"]
            }),
        ),
        "move" => (
            "move",
            "Move or rename a file.",
            json!({
                "type": "object",
                "properties": { "from": { "type": "string" }, "to": { "type": "string" } },
                "required": ["from", "to"]
            }),
        ),
        "commit" => (
            "commit",
            "Commit changes. Without paths every change is staged.",
            json!({
                "type": "object",
                "properties": {
                    "message": { "type": "string" },
                    "paths": { "type": "array", "items": { "type": "string" } }
                },
                "required": ["message"]
            }),
        ),
        "switch_model" => (
            "switch_model",
            "Continue this request with a different model.",
            json!({
                "type": "object",
                "properties": { "model": { "type": "string" } },
                "required": ["model"]
            }),
        ),
        _ => return None,
    };

    Some(ToolDefinition {
        name,
        description,
        parameters,
    })
}

/// Tool names offered under `policy`.
pub fn names_for(policy: ToolPolicy, allow_model_switch: bool) -> Vec<&'static str> {
    match policy {
        ToolPolicy::None => Vec::new(),
        ToolPolicy::ReadOnly => READ_ONLY_TOOLS.to_vec(),
        ToolPolicy::EditOnly => READ_ONLY_TOOLS
            .iter()
            .copied()
            .chain(["write", "edit"])
            .collect(),
        ToolPolicy::All => TOOL_NAMES
            .iter()
            .copied()
            .filter(|name| allow_model_switch || *name != "switch_model")
            .collect(),
    }
}

pub fn tools_for(policy: ToolPolicy, allow_model_switch: bool) -> Vec<ToolDefinition> {
    names_for(policy, allow_model_switch)
        .into_iter()
        .filter_map(definition)
        .collect()
}
