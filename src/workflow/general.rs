//! The general workflow's action set (spec §4.3's "analogous sets"): READ_FILE, WRITE_FILE,
//! LIST_DIRECTORY, RUN_COMMAND, COMPLETE. Also the only domain the greeting bypass applies
//! to (spec §4.2, §4.3).

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::tool_gateway::{ToolGateway, ToolResult};

use super::action::{param_str, ActionParseError, ActionSet, RawAction};
use super::coding::Dispatch;

#[derive(Debug, Clone)]
pub enum GeneralAction {
    ReadFile { path: String },
    WriteFile { path: String, content: String },
    ListDirectory { path: String },
    RunCommand { command: String },
    Complete { summary: Option<String> },
}

impl ActionSet for GeneralAction {
    fn action_names() -> &'static [&'static str] {
        &["READ_FILE", "WRITE_FILE", "LIST_DIRECTORY", "RUN_COMMAND", "COMPLETE"]
    }

    fn prompt_schema() -> &'static str {
        "READ_FILE {path}\n\
         WRITE_FILE {path, content}\n\
         LIST_DIRECTORY {path}\n\
         RUN_COMMAND {command}\n\
         COMPLETE {summary}"
    }

    fn from_raw(raw: RawAction) -> Result<Self, ActionParseError> {
        match raw.action.as_str() {
            "READ_FILE" => Ok(GeneralAction::ReadFile {
                path: param_str(&raw.parameters, "READ_FILE", "path")?.to_string(),
            }),
            "WRITE_FILE" => Ok(GeneralAction::WriteFile {
                path: param_str(&raw.parameters, "WRITE_FILE", "path")?.to_string(),
                content: param_str(&raw.parameters, "WRITE_FILE", "content")?.to_string(),
            }),
            "LIST_DIRECTORY" => Ok(GeneralAction::ListDirectory {
                path: param_str(&raw.parameters, "LIST_DIRECTORY", "path").unwrap_or(".").to_string(),
            }),
            "RUN_COMMAND" => Ok(GeneralAction::RunCommand {
                command: param_str(&raw.parameters, "RUN_COMMAND", "command")?.to_string(),
            }),
            "COMPLETE" => Ok(GeneralAction::Complete { summary: raw.summary }),
            other => Err(ActionParseError::new(format!(
                "'{}' is not a recognized general action",
                other
            ))),
        }
    }

    fn is_complete(&self) -> bool {
        matches!(self, GeneralAction::Complete { .. })
    }

    fn complete_summary(&self) -> Option<&str> {
        match self {
            GeneralAction::Complete { summary } => summary.as_deref(),
            _ => None,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            GeneralAction::ReadFile { .. } => "READ_FILE",
            GeneralAction::WriteFile { .. } => "WRITE_FILE",
            GeneralAction::ListDirectory { .. } => "LIST_DIRECTORY",
            GeneralAction::RunCommand { .. } => "RUN_COMMAND",
            GeneralAction::Complete { .. } => "COMPLETE",
        }
    }

    fn to_parameters(&self) -> Map<String, Value> {
        let value = match self {
            GeneralAction::ReadFile { path } => json!({"path": path}),
            GeneralAction::WriteFile { path, content } => json!({"path": path, "content": content}),
            GeneralAction::ListDirectory { path } => json!({"path": path}),
            GeneralAction::RunCommand { command } => json!({"command": command}),
            GeneralAction::Complete { summary } => json!({"summary": summary}),
        };
        value.as_object().cloned().unwrap_or_default()
    }
}

#[async_trait]
impl Dispatch for GeneralAction {
    async fn dispatch(&self, gateway: &dyn ToolGateway) -> ToolResult {
        match self {
            GeneralAction::ReadFile { path } => gateway.read_file(path).await,
            GeneralAction::WriteFile { path, content } => gateway.write_file(path, content).await,
            GeneralAction::ListDirectory { path } => gateway.list_directory(path, false).await,
            GeneralAction::RunCommand { command } => gateway.run_command(command, None, Some(30)).await,
            GeneralAction::Complete { .. } => {
                unreachable!("COMPLETE is handled by the execute node before dispatch")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_action_rejected() {
        let raw = RawAction { action: "SEND_EMAIL".to_string(), parameters: Default::default(), summary: None };
        assert!(GeneralAction::from_raw(raw).is_err());
    }
}
