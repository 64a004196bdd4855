//! The data-analysis workflow's action set (spec §4.3's "analogous sets"): LOAD_DATA,
//! ANALYZE_DATA, LIST_DIRECTORY, WRITE_FILE, COMPLETE.

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::tool_gateway::{ToolGateway, ToolResult};

use super::action::{param_str, ActionParseError, ActionSet, RawAction};
use super::coding::Dispatch;

#[derive(Debug, Clone)]
pub enum DataAction {
    LoadData { path: String },
    AnalyzeData { path: String, method: Option<String> },
    ListDirectory { path: String },
    WriteFile { path: String, content: String },
    Complete { summary: Option<String> },
}

impl ActionSet for DataAction {
    fn action_names() -> &'static [&'static str] {
        &["LOAD_DATA", "ANALYZE_DATA", "LIST_DIRECTORY", "WRITE_FILE", "COMPLETE"]
    }

    fn prompt_schema() -> &'static str {
        "LOAD_DATA {path}\n\
         ANALYZE_DATA {path, method?}\n\
         LIST_DIRECTORY {path}\n\
         WRITE_FILE {path, content}\n\
         COMPLETE {summary}"
    }

    fn from_raw(raw: RawAction) -> Result<Self, ActionParseError> {
        match raw.action.as_str() {
            "LOAD_DATA" => Ok(DataAction::LoadData {
                path: param_str(&raw.parameters, "LOAD_DATA", "path")?.to_string(),
            }),
            "ANALYZE_DATA" => Ok(DataAction::AnalyzeData {
                path: param_str(&raw.parameters, "ANALYZE_DATA", "path")?.to_string(),
                method: raw.parameters.get("method").and_then(|v| v.as_str()).map(str::to_string),
            }),
            "LIST_DIRECTORY" => Ok(DataAction::ListDirectory {
                path: param_str(&raw.parameters, "LIST_DIRECTORY", "path").unwrap_or(".").to_string(),
            }),
            "WRITE_FILE" => Ok(DataAction::WriteFile {
                path: param_str(&raw.parameters, "WRITE_FILE", "path")?.to_string(),
                content: param_str(&raw.parameters, "WRITE_FILE", "content")?.to_string(),
            }),
            "COMPLETE" => Ok(DataAction::Complete { summary: raw.summary }),
            other => Err(ActionParseError::new(format!(
                "'{}' is not a recognized data action",
                other
            ))),
        }
    }

    fn is_complete(&self) -> bool {
        matches!(self, DataAction::Complete { .. })
    }

    fn complete_summary(&self) -> Option<&str> {
        match self {
            DataAction::Complete { summary } => summary.as_deref(),
            _ => None,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            DataAction::LoadData { .. } => "LOAD_DATA",
            DataAction::AnalyzeData { .. } => "ANALYZE_DATA",
            DataAction::ListDirectory { .. } => "LIST_DIRECTORY",
            DataAction::WriteFile { .. } => "WRITE_FILE",
            DataAction::Complete { .. } => "COMPLETE",
        }
    }

    fn to_parameters(&self) -> Map<String, Value> {
        let value = match self {
            DataAction::LoadData { path } => json!({"path": path}),
            DataAction::AnalyzeData { path, method } => json!({"path": path, "method": method}),
            DataAction::ListDirectory { path } => json!({"path": path}),
            DataAction::WriteFile { path, content } => json!({"path": path, "content": content}),
            DataAction::Complete { summary } => json!({"summary": summary}),
        };
        value.as_object().cloned().unwrap_or_default()
    }
}

#[async_trait]
impl Dispatch for DataAction {
    async fn dispatch(&self, gateway: &dyn ToolGateway) -> ToolResult {
        match self {
            DataAction::LoadData { path } => gateway.read_file(path).await,
            DataAction::AnalyzeData { path, method } => {
                let cmd = match method {
                    Some(m) => format!("wc -l {} # method={}", path, m),
                    None => format!("wc -l {}", path),
                };
                gateway.run_command(&cmd, None, Some(30)).await
            }
            DataAction::ListDirectory { path } => gateway.list_directory(path, false).await,
            DataAction::WriteFile { path, content } => gateway.write_file(path, content).await,
            DataAction::Complete { .. } => {
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
        let raw = RawAction { action: "PLOT_CHART".to_string(), parameters: Default::default(), summary: None };
        assert!(DataAction::from_raw(raw).is_err());
    }
}
