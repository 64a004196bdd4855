//! The coding workflow's action set (spec §4.3): READ_FILE, WRITE_FILE, LIST_DIRECTORY,
//! SEARCH_CODE, RUN_TESTS, GIT_STATUS, COMPLETE.

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::tool_gateway::{ToolGateway, ToolResult};

use super::action::{param_str, ActionParseError, ActionSet, RawAction};

#[derive(Debug, Clone)]
pub enum CodingAction {
    ReadFile { path: String },
    WriteFile { path: String, content: String },
    ListDirectory { path: String, recursive: bool },
    SearchCode { pattern: String, glob: Option<String> },
    RunTests { cwd: Option<String> },
    GitStatus { repo: String },
    Complete { summary: Option<String> },
}

impl ActionSet for CodingAction {
    fn action_names() -> &'static [&'static str] {
        &[
            "READ_FILE",
            "WRITE_FILE",
            "LIST_DIRECTORY",
            "SEARCH_CODE",
            "RUN_TESTS",
            "GIT_STATUS",
            "COMPLETE",
        ]
    }

    fn prompt_schema() -> &'static str {
        "READ_FILE {path}\n\
         WRITE_FILE {path, content}\n\
         LIST_DIRECTORY {path, recursive?}\n\
         SEARCH_CODE {pattern, glob?}\n\
         RUN_TESTS {cwd?}\n\
         GIT_STATUS {repo}\n\
         COMPLETE {summary}"
    }

    fn from_raw(raw: RawAction) -> Result<Self, ActionParseError> {
        match raw.action.as_str() {
            "READ_FILE" => Ok(CodingAction::ReadFile {
                path: param_str(&raw.parameters, "READ_FILE", "path")?.to_string(),
            }),
            "WRITE_FILE" => Ok(CodingAction::WriteFile {
                path: param_str(&raw.parameters, "WRITE_FILE", "path")
                    .or_else(|_| param_str(&raw.parameters, "WRITE_FILE", "file_path"))?
                    .to_string(),
                content: param_str(&raw.parameters, "WRITE_FILE", "content")?.to_string(),
            }),
            "LIST_DIRECTORY" => Ok(CodingAction::ListDirectory {
                path: param_str(&raw.parameters, "LIST_DIRECTORY", "path").unwrap_or(".").to_string(),
                recursive: raw.parameters.get("recursive").and_then(|v| v.as_bool()).unwrap_or(false),
            }),
            "SEARCH_CODE" => Ok(CodingAction::SearchCode {
                pattern: param_str(&raw.parameters, "SEARCH_CODE", "pattern")?.to_string(),
                glob: raw.parameters.get("glob").and_then(|v| v.as_str()).map(str::to_string),
            }),
            "RUN_TESTS" => Ok(CodingAction::RunTests {
                cwd: raw.parameters.get("cwd").and_then(|v| v.as_str()).map(str::to_string),
            }),
            "GIT_STATUS" => Ok(CodingAction::GitStatus {
                repo: param_str(&raw.parameters, "GIT_STATUS", "repo").unwrap_or(".").to_string(),
            }),
            "COMPLETE" => Ok(CodingAction::Complete { summary: raw.summary }),
            other => Err(ActionParseError::new(format!(
                "'{}' is not a recognized coding action",
                other
            ))),
        }
    }

    fn is_complete(&self) -> bool {
        matches!(self, CodingAction::Complete { .. })
    }

    fn complete_summary(&self) -> Option<&str> {
        match self {
            CodingAction::Complete { summary } => summary.as_deref(),
            _ => None,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            CodingAction::ReadFile { .. } => "READ_FILE",
            CodingAction::WriteFile { .. } => "WRITE_FILE",
            CodingAction::ListDirectory { .. } => "LIST_DIRECTORY",
            CodingAction::SearchCode { .. } => "SEARCH_CODE",
            CodingAction::RunTests { .. } => "RUN_TESTS",
            CodingAction::GitStatus { .. } => "GIT_STATUS",
            CodingAction::Complete { .. } => "COMPLETE",
        }
    }

    fn to_parameters(&self) -> Map<String, Value> {
        let value = match self {
            CodingAction::ReadFile { path } => json!({"path": path}),
            CodingAction::WriteFile { path, content } => json!({"path": path, "content": content}),
            CodingAction::ListDirectory { path, recursive } => json!({"path": path, "recursive": recursive}),
            CodingAction::SearchCode { pattern, glob } => json!({"pattern": pattern, "glob": glob}),
            CodingAction::RunTests { cwd } => json!({"cwd": cwd}),
            CodingAction::GitStatus { repo } => json!({"repo": repo}),
            CodingAction::Complete { summary } => json!({"summary": summary}),
        };
        value.as_object().cloned().unwrap_or_default()
    }
}

#[async_trait]
pub trait Dispatch {
    async fn dispatch(&self, gateway: &dyn ToolGateway) -> ToolResult;
}

#[async_trait]
impl Dispatch for CodingAction {
    async fn dispatch(&self, gateway: &dyn ToolGateway) -> ToolResult {
        match self {
            CodingAction::ReadFile { path } => gateway.read_file(path).await,
            CodingAction::WriteFile { path, content } => gateway.write_file(path, content).await,
            CodingAction::ListDirectory { path, recursive } => {
                gateway.list_directory(path, *recursive).await
            }
            CodingAction::SearchCode { pattern, glob } => {
                gateway.search(pattern, glob.as_deref()).await
            }
            CodingAction::RunTests { cwd } => {
                gateway.run_command("cargo test", cwd.as_deref(), Some(120)).await
            }
            CodingAction::GitStatus { repo } => gateway.git_status(repo).await,
            CodingAction::Complete { .. } => {
                unreachable!("COMPLETE is handled by the execute node before dispatch")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_write_file_action() {
        let raw = RawAction {
            action: "WRITE_FILE".to_string(),
            parameters: json!({"path": "a.rs", "content": "fn main() {}"}).as_object().unwrap().clone(),
            summary: None,
        };
        let action = CodingAction::from_raw(raw).unwrap();
        assert!(matches!(action, CodingAction::WriteFile { .. }));
        assert_eq!(action.name(), "WRITE_FILE");
    }

    #[test]
    fn unknown_action_is_rejected() {
        let raw = RawAction { action: "DELETE_EVERYTHING".to_string(), parameters: Default::default(), summary: None };
        assert!(CodingAction::from_raw(raw).is_err());
    }

    #[test]
    fn complete_carries_summary() {
        let raw = RawAction { action: "COMPLETE".to_string(), parameters: Default::default(), summary: Some("done".into()) };
        let action = CodingAction::from_raw(raw).unwrap();
        assert!(action.is_complete());
        assert_eq!(action.complete_summary(), Some("done"));
    }
}
