//! The research workflow's action set (spec §4.3's "analogous sets" for non-coding
//! domains): SEARCH_DOCUMENTS, READ_FILE, GATHER_INFORMATION, WRITE_FILE, COMPLETE.

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::tool_gateway::{ToolGateway, ToolResult};

use super::action::{param_str, ActionParseError, ActionSet, RawAction};
use super::coding::Dispatch;

#[derive(Debug, Clone)]
pub enum ResearchAction {
    SearchDocuments { pattern: String, glob: Option<String> },
    ReadFile { path: String },
    GatherInformation { topic: String },
    WriteFile { path: String, content: String },
    Complete { summary: Option<String> },
}

impl ActionSet for ResearchAction {
    fn action_names() -> &'static [&'static str] {
        &["SEARCH_DOCUMENTS", "READ_FILE", "GATHER_INFORMATION", "WRITE_FILE", "COMPLETE"]
    }

    fn prompt_schema() -> &'static str {
        "SEARCH_DOCUMENTS {pattern, glob?}\n\
         READ_FILE {path}\n\
         GATHER_INFORMATION {topic}\n\
         WRITE_FILE {path, content}\n\
         COMPLETE {summary}"
    }

    fn from_raw(raw: RawAction) -> Result<Self, ActionParseError> {
        match raw.action.as_str() {
            "SEARCH_DOCUMENTS" => Ok(ResearchAction::SearchDocuments {
                pattern: param_str(&raw.parameters, "SEARCH_DOCUMENTS", "pattern")?.to_string(),
                glob: raw.parameters.get("glob").and_then(|v| v.as_str()).map(str::to_string),
            }),
            "READ_FILE" => Ok(ResearchAction::ReadFile {
                path: param_str(&raw.parameters, "READ_FILE", "path")?.to_string(),
            }),
            "GATHER_INFORMATION" => Ok(ResearchAction::GatherInformation {
                topic: param_str(&raw.parameters, "GATHER_INFORMATION", "topic")?.to_string(),
            }),
            "WRITE_FILE" => Ok(ResearchAction::WriteFile {
                path: param_str(&raw.parameters, "WRITE_FILE", "path")?.to_string(),
                content: param_str(&raw.parameters, "WRITE_FILE", "content")?.to_string(),
            }),
            "COMPLETE" => Ok(ResearchAction::Complete { summary: raw.summary }),
            other => Err(ActionParseError::new(format!(
                "'{}' is not a recognized research action",
                other
            ))),
        }
    }

    fn is_complete(&self) -> bool {
        matches!(self, ResearchAction::Complete { .. })
    }

    fn complete_summary(&self) -> Option<&str> {
        match self {
            ResearchAction::Complete { summary } => summary.as_deref(),
            _ => None,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            ResearchAction::SearchDocuments { .. } => "SEARCH_DOCUMENTS",
            ResearchAction::ReadFile { .. } => "READ_FILE",
            ResearchAction::GatherInformation { .. } => "GATHER_INFORMATION",
            ResearchAction::WriteFile { .. } => "WRITE_FILE",
            ResearchAction::Complete { .. } => "COMPLETE",
        }
    }

    fn to_parameters(&self) -> Map<String, Value> {
        let value = match self {
            ResearchAction::SearchDocuments { pattern, glob } => json!({"pattern": pattern, "glob": glob}),
            ResearchAction::ReadFile { path } => json!({"path": path}),
            ResearchAction::GatherInformation { topic } => json!({"topic": topic}),
            ResearchAction::WriteFile { path, content } => json!({"path": path, "content": content}),
            ResearchAction::Complete { summary } => json!({"summary": summary}),
        };
        value.as_object().cloned().unwrap_or_default()
    }
}

#[async_trait]
impl Dispatch for ResearchAction {
    async fn dispatch(&self, gateway: &dyn ToolGateway) -> ToolResult {
        match self {
            ResearchAction::SearchDocuments { pattern, glob } => {
                gateway.search(pattern, glob.as_deref()).await
            }
            ResearchAction::ReadFile { path } => gateway.read_file(path).await,
            ResearchAction::GatherInformation { topic } => {
                // No external web access is in scope (spec §1 non-goals); this action
                // searches the workspace for material on `topic` instead.
                gateway.search(topic, None).await
            }
            ResearchAction::WriteFile { path, content } => gateway.write_file(path, content).await,
            ResearchAction::Complete { .. } => {
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
        let raw = RawAction { action: "BROWSE_WEB".to_string(), parameters: Default::default(), summary: None };
        assert!(ResearchAction::from_raw(raw).is_err());
    }
}
