//! Sub-Agent (spec §4.5): a single-purpose, tool-restricted executor. Twelve specializations
//! across four families (code, research, data, general), each with a curated tool allowlist
//! and its own `max_iterations`/`timeout_seconds`.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::decomposer::Subtask;
use crate::error::AgenticError;
use crate::llm::{ChatOptions, LlmClient, Message};
use crate::tool_gateway::{SafetyChecker, ToolGateway, ToolResult};
use crate::workflow::action::{ActionSet, RawAction};
use crate::workflow::coding::Dispatch;
use crate::workflow::general::GeneralAction;

/// The 12 sub-agent specializations named in spec §4.5, grouped by family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentType {
    // code family
    CodeReader,
    CodeWriter,
    CodeTester,
    // research family
    DocumentSearcher,
    InformationGatherer,
    ReportWriter,
    // data family
    DataLoader,
    DataAnalyzer,
    DataVisualizer,
    // general family
    FileOrganizer,
    GeneralTaskExecutor,
    CommandRunner,
}

impl AgentType {
    pub fn from_keyword_str(s: &str) -> Option<Self> {
        match s.to_lowercase().replace(['-', ' '], "_").as_str() {
            "code_reader" => Some(Self::CodeReader),
            "code_writer" => Some(Self::CodeWriter),
            "code_tester" => Some(Self::CodeTester),
            "document_searcher" => Some(Self::DocumentSearcher),
            "information_gatherer" => Some(Self::InformationGatherer),
            "report_writer" => Some(Self::ReportWriter),
            "data_loader" => Some(Self::DataLoader),
            "data_analyzer" => Some(Self::DataAnalyzer),
            "data_visualizer" => Some(Self::DataVisualizer),
            "file_organizer" => Some(Self::FileOrganizer),
            "general_task_executor" => Some(Self::GeneralTaskExecutor),
            "command_runner" => Some(Self::CommandRunner),
            _ => None,
        }
    }

    /// The actions (from the general action set, spec §4.3's "analogous sets") this
    /// specialization may invoke. E.g. `code_reader` cannot write files (spec §4.5).
    pub fn tool_allowlist(&self) -> &'static [&'static str] {
        match self {
            Self::CodeReader | Self::DocumentSearcher | Self::InformationGatherer | Self::DataLoader => {
                &["READ_FILE", "LIST_DIRECTORY", "COMPLETE"]
            }
            Self::CodeWriter | Self::ReportWriter | Self::FileOrganizer => {
                &["READ_FILE", "WRITE_FILE", "LIST_DIRECTORY", "COMPLETE"]
            }
            Self::CodeTester | Self::CommandRunner => {
                &["READ_FILE", "RUN_COMMAND", "COMPLETE"]
            }
            Self::DataAnalyzer | Self::DataVisualizer => {
                &["READ_FILE", "WRITE_FILE", "RUN_COMMAND", "COMPLETE"]
            }
            Self::GeneralTaskExecutor => {
                &["READ_FILE", "WRITE_FILE", "LIST_DIRECTORY", "RUN_COMMAND", "COMPLETE"]
            }
        }
    }

    fn system_prompt(&self) -> &'static str {
        match self {
            Self::CodeReader => "You read and summarize source code. You cannot write files.",
            Self::CodeWriter => "You write and edit source code files to satisfy a subtask.",
            Self::CodeTester => "You run test commands and report pass/fail results.",
            Self::DocumentSearcher => "You search the workspace for documents relevant to a topic.",
            Self::InformationGatherer => "You gather information from the workspace on a topic.",
            Self::ReportWriter => "You write a written report summarizing findings to a file.",
            Self::DataLoader => "You load and inspect a dataset file.",
            Self::DataAnalyzer => "You analyze a dataset and report statistics.",
            Self::DataVisualizer => "You describe how a dataset should be visualized and save notes.",
            Self::FileOrganizer => "You organize files into directories.",
            Self::GeneralTaskExecutor => "You execute a generic subtask using the tools available.",
            Self::CommandRunner => "You run shell commands needed to complete a subtask.",
        }
    }
}

/// Outcome of running one sub-agent against one subtask.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubAgentResult {
    pub subtask_id: String,
    pub agent_type: AgentType,
    pub success: bool,
    pub output: String,
    pub error: Option<String>,
    pub iterations: u32,
    pub duration_seconds: f64,
}

/// A scoped executor configured with one agent type, system prompt, tool allowlist, and
/// independent `max_iterations`/`timeout_seconds` (spec §4.5).
pub struct SubAgent<'a> {
    pub agent_type: AgentType,
    pub max_iterations: u32,
    pub timeout_seconds: u64,
    llm: &'a dyn LlmClient,
    gateway: &'a dyn ToolGateway,
    safety: &'a dyn SafetyChecker,
}

impl<'a> SubAgent<'a> {
    pub fn new(
        agent_type: AgentType,
        max_iterations: u32,
        timeout_seconds: u64,
        llm: &'a dyn LlmClient,
        gateway: &'a dyn ToolGateway,
        safety: &'a dyn SafetyChecker,
    ) -> Self {
        Self { agent_type, max_iterations, timeout_seconds, llm, gateway, safety }
    }

    /// Runs a bounded execute/reflect loop against `subtask`, restricted to this agent
    /// type's tool allowlist, and returns its result. Cancellation-safe: the caller wraps
    /// this future in `tokio::time::timeout` for the per-sub-agent timeout (spec §5).
    pub async fn run(&self, subtask: &Subtask) -> SubAgentResult {
        let started = std::time::Instant::now();
        let outcome = tokio::time::timeout(
            Duration::from_secs(self.timeout_seconds),
            self.run_inner(subtask),
        )
        .await;

        let (success, output, error, iterations) = match outcome {
            Ok(Ok((output, iterations))) => (true, output, None, iterations),
            Ok(Err(e)) => (false, String::new(), Some(e.to_string()), 0),
            Err(_) => (
                false,
                String::new(),
                Some(format!("sub-agent timed out after {}s", self.timeout_seconds)),
                0,
            ),
        };

        SubAgentResult {
            subtask_id: subtask.id.clone(),
            agent_type: self.agent_type,
            success,
            output,
            error,
            iterations,
            duration_seconds: started.elapsed().as_secs_f64(),
        }
    }

    async fn run_inner(&self, subtask: &Subtask) -> Result<(String, u32), AgenticError> {
        let allowlist = self.agent_type.tool_allowlist();
        let mut history = vec![Message::system(format!(
            "{} Only these actions are available to you: {}. Respond with only a JSON \
             object: {{\"action\": one of the above, \"parameters\": {{...}}, \"summary\": \
             string (for COMPLETE)}}.",
            self.agent_type.system_prompt(),
            allowlist.join(", "),
        ))];
        history.push(Message::user(format!("Subtask: {}", subtask.description)));

        for iteration in 0..self.max_iterations.max(1) {
            let reply = self.llm.chat(&history, &ChatOptions::default()).await?;
            history.push(Message::assistant(reply.message.content.clone()));

            let raw: RawAction = match extract_and_parse(&reply.message.content) {
                Some(raw) => raw,
                None => {
                    history.push(Message::user(
                        "That was not valid JSON. Respond with only the JSON object.",
                    ));
                    continue;
                }
            };

            if !allowlist.contains(&raw.action.as_str()) {
                history.push(Message::user(format!(
                    "'{}' is not in your allowed action set. Choose one of: {}",
                    raw.action,
                    allowlist.join(", ")
                )));
                continue;
            }

            if raw.action == "COMPLETE" {
                let summary = raw.summary.unwrap_or_default();
                return Ok((summary, iteration + 1));
            }

            let verdict = self.safety.validate(&raw.action, &json!(raw.parameters.clone()));
            if !verdict.allowed {
                history.push(Message::user(format!(
                    "That action was denied by safety policy: {}",
                    verdict.reason.unwrap_or_default()
                )));
                continue;
            }

            let action = GeneralAction::from_raw(raw).map_err(|e| AgenticError::LLMInvalidResponse {
                detail: e.detail,
            })?;
            let result: ToolResult = action.dispatch(self.gateway).await;
            history.push(Message::user(format!(
                "Tool result: success={} output={}",
                result.success, result.output
            )));
        }

        Err(AgenticError::TimeoutError {
            scope: format!("sub-agent({:?})", self.agent_type),
            seconds: self.timeout_seconds,
        })
    }
}

fn extract_and_parse(text: &str) -> Option<RawAction> {
    let start = text.find('{')?;
    let mut depth = 0i32;
    for (i, ch) in text[start..].char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    let candidate = &text[start..start + i + 1];
                    return serde_json::from_str(candidate).ok();
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_reader_cannot_write_files() {
        let allowlist = AgentType::CodeReader.tool_allowlist();
        assert!(!allowlist.contains(&"WRITE_FILE"));
        assert!(allowlist.contains(&"READ_FILE"));
    }

    #[test]
    fn keyword_parsing_is_case_and_separator_insensitive() {
        assert_eq!(AgentType::from_keyword_str("Code-Writer"), Some(AgentType::CodeWriter));
        assert_eq!(AgentType::from_keyword_str("data analyzer"), Some(AgentType::DataAnalyzer));
        assert_eq!(AgentType::from_keyword_str("not_a_type"), None);
    }
}
