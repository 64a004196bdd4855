//! The record passed through every node of one workflow run (spec §3).
//!
//! The source kept `context` as an open string-keyed map, which produced a `KeyError` on
//! early-return paths that never actually needed the key. `TaskContext` below replaces that
//! map with concrete fields defaulted once in `TaskState::new`, not in any individual node
//! (spec §9, "State as an open mapping").

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::intent_router::Domain;
use crate::tool_gateway::ToolResult;

/// Where a task currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

/// A plan produced by the `plan` node and stored on `TaskContext::plan`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub approach: String,
    pub steps: Vec<String>,
    pub estimated_iterations: Option<u32>,
    pub rationale: Option<String>,
}

/// Mirrors the last successful tool invocation, for prompts that reference "what just
/// happened" without re-scanning the whole `tool_calls` log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LastToolExecution {
    pub action: String,
    pub action_details: ActionDetails,
    pub result: ToolResult,
    pub success: bool,
}

/// Spec invariant 3: every `tool_calls` entry has a matching `action_details` with a
/// `parameters` sub-map; a missing one is treated as empty, which this type makes
/// structurally impossible rather than a runtime check.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ActionDetails {
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

/// One entry in the append-only `tool_calls` log, covering both real tool invocations and
/// the synthetic `JSON_PARSE_ERROR` / `COMPLETE` bookkeeping entries the execute node
/// records (spec §4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub action: String,
    pub action_details: ActionDetails,
    pub result: ToolResult,
    pub success: bool,
    pub iteration: u32,
}

/// One entry in the append-only `errors` log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub iteration: u32,
}

/// Per-task configuration for the sub-agent subsystem, carried on `TaskContext` so a
/// sub-agent's own child `TaskState` can read the same bounds its parent was configured
/// with (spec §4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubAgentRuntimeConfig {
    pub max_concurrent: usize,
    pub max_iterations: u32,
    pub timeout_seconds: u64,
}

/// Replaces the source's open `context` mapping (spec §9).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TaskContext {
    pub plan: Option<Plan>,
    pub completed_steps: Vec<String>,
    pub last_tool_execution: Option<LastToolExecution>,
    pub sub_agent_config: Option<SubAgentRuntimeConfig>,
    /// Cached by `check_complexity`'s complexity probe so `spawn_sub_agents` never calls
    /// the decomposer twice for one task (DESIGN.md's resolution of how §4.3 and §4.5
    /// interact).
    pub cached_decomposition: Option<crate::decomposer::Decomposition>,
}

/// The single growing record passed through the plan/execute/reflect loop (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskState {
    pub task_description: String,
    pub task_id: Uuid,
    pub domain: Domain,
    pub workspace: PathBuf,
    pub iteration: u32,
    pub max_iterations: u32,
    pub recursion_limit: u32,
    pub status: TaskStatus,
    pub should_continue: bool,
    pub context: TaskContext,
    pub tool_calls: Vec<ToolCallRecord>,
    pub errors: Vec<ErrorRecord>,
    pub messages: Option<crate::llm::ConversationHistory>,
    pub result: Option<String>,
    pub use_sub_agents: bool,
    /// Number of consecutive `JSON_PARSE_ERROR` entries since the last successful parse;
    /// the third one fails the task (spec §4.3, §7 `LLMInvalidResponse`).
    pub consecutive_parse_failures: u32,
    /// Node-transition counter backing `recursion_limit` (spec §9's recursion-vs-iteration
    /// distinction); incremented once per node visit, independent of `iteration`.
    pub node_transitions: u32,
}

impl TaskState {
    pub fn new(
        task_description: impl Into<String>,
        domain: Domain,
        workspace: PathBuf,
        max_iterations: u32,
        recursion_limit: u32,
    ) -> Self {
        Self {
            task_description: task_description.into(),
            task_id: Uuid::new_v4(),
            domain,
            workspace,
            iteration: 0,
            max_iterations,
            recursion_limit,
            status: TaskStatus::Pending,
            should_continue: true,
            context: TaskContext::default(),
            tool_calls: Vec::new(),
            errors: Vec::new(),
            messages: None,
            result: None,
            use_sub_agents: false,
            consecutive_parse_failures: 0,
            node_transitions: 0,
        }
    }

    /// Invariant 2: once terminal, no further plan/execute/reflect runs.
    pub fn is_terminal(&self) -> bool {
        matches!(self.status, TaskStatus::Completed | TaskStatus::Failed)
    }

    pub fn push_error(&mut self, message: impl Into<String>) {
        self.errors.push(ErrorRecord {
            message: message.into(),
            timestamp: Utc::now(),
            iteration: self.iteration,
        });
    }

    /// First ~80 characters of the task description, used by the Backend Bridge's
    /// `node_executed` → `status` translation (spec §4.8).
    pub fn description_preview(&self) -> String {
        let collapsed = self.task_description.replace('\n', " ");
        if collapsed.chars().count() <= 80 {
            collapsed
        } else {
            collapsed.chars().take(80).collect::<String>() + "…"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_task_state_starts_pending_with_empty_completed_steps() {
        let state = TaskState::new("do a thing", Domain::General, PathBuf::from("."), 10, 60);
        assert_eq!(state.status, TaskStatus::Pending);
        assert!(state.context.completed_steps.is_empty());
        assert_eq!(state.iteration, 0);
        assert!(state.should_continue);
    }

    #[test]
    fn is_terminal_only_for_completed_or_failed() {
        let mut state = TaskState::new("x", Domain::General, PathBuf::from("."), 10, 60);
        assert!(!state.is_terminal());
        state.status = TaskStatus::Completed;
        assert!(state.is_terminal());
    }

    #[test]
    fn serialize_round_trip_preserves_messages() {
        let mut state = TaskState::new("x", Domain::General, PathBuf::from("."), 10, 60);
        let mut history = crate::llm::ConversationHistory::new("be helpful", 3072);
        history.add_message(crate::llm::Message::user("hello"));
        state.messages = Some(history);

        let json = serde_json::to_string(&state).unwrap();
        let restored: TaskState = serde_json::from_str(&json).unwrap();

        let restored_messages = restored.messages.expect("messages should survive the round-trip");
        assert_eq!(restored_messages.len(), 2);
        assert_eq!(restored_messages.messages()[1].content.as_ref(), "hello");
    }
}
