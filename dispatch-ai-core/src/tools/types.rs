use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::conversation::actions::ActionKind;
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListArgs {
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchArgs {
    pub query: String,
    #[serde(default)]
    pub path: Option<String>,
    /// Glob over paths relative to the search root, e.g. `*.js`.
    #[serde(default)]
    pub glob: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathArgs {
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogArgs {
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryArgs {
    pub query: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteArgs {
    pub path: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditArgs {
    pub path: String,
    pub find: String,
    pub replace: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveArgs {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitArgs {
    pub message: String,
    /// Empty stages every change.
    #[serde(default)]
    pub paths: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchModelArgs {
    pub model: String,
}

/// Every operation the agent can request, with typed arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "tool", content = "args", rename_all = "snake_case")]
pub enum ToolInvocation {
    List(ListArgs),
    Search(SearchArgs),
    Read(PathArgs),
    Status,
    Log(LogArgs),
    WebLookup(QueryArgs),
    Write(WriteArgs),
    Edit(EditArgs),
    Delete(PathArgs),
    Move(MoveArgs),
    Commit(CommitArgs),
    SwitchModel(SwitchModelArgs),
}

fn parse_args<T: DeserializeOwned>(tool: &str, value: Value) -> std::result::Result<T, String> {
    serde_json::from_value(value).map_err(|err| format!("invalid arguments for '{tool}': {err}"))
}

fn require_non_empty(tool: &str, field: &str, value: &str) -> std::result::Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("invalid arguments for '{tool}': '{field}' must be non-empty"));
    }
    Ok(())
}

impl ToolInvocation {
    /// Builds an invocation from a model tool call. Errors are meant to be shown to the model.
    pub fn parse(name: &str, raw_arguments: &str) -> std::result::Result<Self, String> {
        let value: Value = if raw_arguments.trim().is_empty() {
            Value::Object(serde_json::Map::new())
        } else {
            serde_json::from_str(raw_arguments)
                .map_err(|err| format!("arguments for '{name}' are not valid JSON: {err}"))?
        };

        let invocation = match name {
            "list" => Self::List(parse_args(name, value)?),
            "search" => {
                let args: SearchArgs = parse_args(name, value)?;
                require_non_empty(name, "query", &args.query)?;
                Self::Search(args)
            }
            "read" => Self::Read(parse_args(name, value)?),
            "status" => Self::Status,
            "log" => Self::Log(parse_args(name, value)?),
            "web_lookup" => {
                let args: QueryArgs = parse_args(name, value)?;
                require_non_empty(name, "query", &args.query)?;
                Self::WebLookup(args)
            }
            "write" => Self::Write(parse_args(name, value)?),
            "edit" => {
                let args: EditArgs = parse_args(name, value)?;
                require_non_empty(name, "find", &args.find)?;
                Self::Edit(args)
            }
            "delete" => Self::Delete(parse_args(name, value)?),
            "move" => {
                let args: MoveArgs = parse_args(name, value)?;
                require_non_empty(name, "from", &args.from)?;
                require_non_empty(name, "to", &args.to)?;
                Self::Move(args)
            }
            "commit" => {
                let args: CommitArgs = parse_args(name, value)?;
                require_non_empty(name, "message", &args.message)?;
                Self::Commit(args)
            }
            "switch_model" => {
                let args: SwitchModelArgs = parse_args(name, value)?;
                require_non_empty(name, "model", &args.model)?;
                Self::SwitchModel(args)
            }
            other => return Err(format!("unknown tool '{other}'")),
        };

        if let Some(path) = invocation.single_path() {
            require_non_empty(name, "path", path)?;
        }
        Ok(invocation)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::List(_) => "list",
            Self::Search(_) => "search",
            Self::Read(_) => "read",
            Self::Status => "status",
            Self::Log(_) => "log",
            Self::WebLookup(_) => "web_lookup",
            Self::Write(_) => "write",
            Self::Edit(_) => "edit",
            Self::Delete(_) => "delete",
            Self::Move(_) => "move",
            Self::Commit(_) => "commit",
            Self::SwitchModel(_) => "switch_model",
        }
    }

    pub fn is_read_only(&self) -> bool {
        matches!(
            self,
            Self::List(_)
                | Self::Search(_)
                | Self::Read(_)
                | Self::Status
                | Self::Log(_)
                | Self::WebLookup(_)
        )
    }

    /// Kind recorded in the action cache; `None` for read-only calls and model switches.
    pub fn action_kind(&self) -> Option<ActionKind> {
        match self {
            Self::Write(_) => Some(ActionKind::Write),
            Self::Edit(_) => Some(ActionKind::Edit),
            Self::Delete(_) => Some(ActionKind::Delete),
            Self::Move(_) => Some(ActionKind::Move),
            Self::Commit(_) => Some(ActionKind::Commit),
            _ => None,
        }
    }

    /// Paths the call touches.
    pub fn targets(&self) -> Vec<String> {
        match self {
            Self::Read(args) | Self::Delete(args) => vec![args.path.clone()],
            Self::Write(args) => vec![args.path.clone()],
            Self::Edit(args) => vec![args.path.clone()],
            Self::Move(args) => vec![args.from.clone(), args.to.clone()],
            Self::Commit(args) => args.paths.clone(),
            Self::List(args) => args.path.iter().cloned().collect(),
            Self::Search(args) => args.path.iter().cloned().collect(),
            Self::Status | Self::Log(_) | Self::WebLookup(_) | Self::SwitchModel(_) => Vec::new(),
        }
    }

    /// Path a write-style call modifies in place, used for the redundant-edit check.
    pub fn edited_path(&self) -> Option<&str> {
        match self {
            Self::Write(args) => Some(&args.path),
            Self::Edit(args) => Some(&args.path),
            _ => None,
        }
    }

    fn single_path(&self) -> Option<&str> {
        match self {
            Self::Read(args) | Self::Delete(args) => Some(&args.path),
            Self::Write(args) => Some(&args.path),
            Self::Edit(args) => Some(&args.path),
            _ => None,
        }
    }

    /// Arguments as JSON, for events and audit records.
    pub fn arguments_json(&self) -> Value {
        serde_json::to_value(self)
            .ok()
            .and_then(|mut value| value.get_mut("args").map(Value::take))
            .unwrap_or(Value::Null)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub success: bool,
    pub text: String,
}

impl ToolOutput {
    pub fn ok(text: impl Into<String>) -> Self {
        Self {
            success: true,
            text: text.into(),
        }
    }

    pub fn failed(text: impl Into<String>) -> Self {
        Self {
            success: false,
            text: text.into(),
        }
    }
}

/// Executes tool invocations against some workspace.
#[async_trait]
pub trait ToolBackend: Send + Sync {
    async fn execute(&self, invocation: &ToolInvocation) -> Result<ToolOutput>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_typed_arguments() {
        let invocation =
            ToolInvocation::parse("edit", r#"{"path":"game.js","find":"1000","replace":"500"}"#)
                .expect("valid edit");

        assert_eq!(invocation.name(), "edit");
        assert!(!invocation.is_read_only());
        assert_eq!(invocation.action_kind(), Some(ActionKind::Edit));
        assert_eq!(invocation.edited_path(), Some("game.js"));
    }

    #[test]
    fn empty_arguments_are_accepted_for_optional_fields() {
        assert_eq!(
            ToolInvocation::parse("list", ""),
            Ok(ToolInvocation::List(ListArgs { path: None }))
        );
        assert_eq!(ToolInvocation::parse("status", "{}"), Ok(ToolInvocation::Status));
    }

    #[test]
    fn invalid_arguments_become_readable_errors() {
        let err = ToolInvocation::parse("read", r#"{"file":"x"}"#).expect_err("missing path");
        assert!(err.contains("invalid arguments for 'read'"));

        let err = ToolInvocation::parse("read", r#"{"path":"  "}"#).expect_err("blank path");
        assert!(err.contains("'path' must be non-empty"));

        let err = ToolInvocation::parse("read", "{not json").expect_err("bad json");
        assert!(err.contains("not valid JSON"));

        let err = ToolInvocation::parse("teleport", "{}").expect_err("unknown");
        assert_eq!(err, "unknown tool 'teleport'");
    }

    #[test]
    fn move_targets_both_paths_and_switch_model_is_not_an_action() {
        let moved = ToolInvocation::parse("move", r#"{"from":"a.txt","to":"b.txt"}"#)
            .expect("valid move");
        assert_eq!(moved.targets(), vec!["a.txt", "b.txt"]);

        let switch = ToolInvocation::parse("switch_model", r#"{"model":"fast/model"}"#)
            .expect("valid switch");
        assert!(!switch.is_read_only());
        assert!(switch.action_kind().is_none());
    }

    #[test]
    fn arguments_json_exposes_only_args() {
        let read = ToolInvocation::parse("read", r#"{"path":"src/main.rs"}"#).expect("valid");
        assert_eq!(read.arguments_json(), serde_json::json!({"path": "src/main.rs"}));
    }
}
