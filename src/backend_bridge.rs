//! Backend Bridge (spec §4.8): translates engine events into UI-facing `ProgressUpdate`
//! records. The workflow engine and orchestrator know nothing about this module — it
//! consumes their event types from the outside, the same separation of concerns spec §1
//! draws around "web UI... out of scope" while still specifying the one seam (event →
//! progress update) a UI would attach to.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::orchestrator::OrchestratorEvent;
use crate::workflow::{NodeExecuted, ToolExecuted, WorkflowCompleted, WorkflowEvent};

/// One UI-facing update, per spec §4.8's four-variant shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressUpdate {
    #[serde(rename = "type")]
    pub kind: ProgressKind,
    pub message: String,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressKind {
    Status,
    Log,
    ToolExecuted,
    Result,
    Cot,
}

impl ProgressUpdate {
    fn new(kind: ProgressKind, message: impl Into<String>, data: Value) -> Self {
        Self { kind, message: message.into(), data, timestamp: Utc::now() }
    }
}

/// A human-readable label for a node, used by the `node_executed` → `status` mapping.
fn node_label(node: &str) -> &'static str {
    match node {
        "plan" => "Planning task execution strategy",
        "check_complexity" => "Assessing task complexity",
        "spawn_sub_agents" => "Delegating to specialized sub-agents",
        "execute" => "Executing next action",
        "reflect" => "Reflecting on progress",
        _ => "Running workflow step",
    }
}

/// Translates one `NodeExecuted` event into its `status` update.
fn node_executed_update(event: &NodeExecuted) -> ProgressUpdate {
    let mut message = format!(
        "{} [Iteration {}/{}]",
        node_label(event.node),
        event.iteration,
        event.max_iterations
    );
    if event.node == "reflect" {
        message.push_str(if event.should_continue {
            " → will continue"
        } else {
            " → will complete"
        });
    }
    ProgressUpdate::new(
        ProgressKind::Status,
        message,
        json!({
            "node": event.node,
            "iteration": event.iteration,
            "max_iterations": event.max_iterations,
            "status": event.status,
            "should_continue": event.should_continue,
            "task_description_preview": event.task_description_preview,
        }),
    )
}

/// Translates one `ToolExecuted` event into its `tool_executed` + `log` pair (spec §4.8:
/// "one `tool_executed` and one `log` update including the resolved absolute path and
/// byte count, read from the tool result's `metadata`").
fn tool_executed_updates(event: &ToolExecuted) -> Vec<ProgressUpdate> {
    let tool_update = ProgressUpdate::new(
        ProgressKind::ToolExecuted,
        format!("{} {}", event.tool, if event.success { "succeeded" } else { "failed" }),
        json!({
            "tool": event.tool,
            "params": event.params,
            "result": event.result,
            "success": event.success,
        }),
    );

    let path = event.result.metadata.get("path").and_then(Value::as_str);
    let bytes = event.result.metadata.get("bytes").and_then(Value::as_u64);
    let log_message = match (path, bytes) {
        (Some(path), Some(bytes)) => format!("{}: {} ({} bytes)", event.tool, path, bytes),
        (Some(path), None) => format!("{}: {}", event.tool, path),
        _ => format!("{}: {:?}", event.tool, event.result.output),
    };
    let log_update = ProgressUpdate::new(
        ProgressKind::Log,
        log_message,
        json!({"tool": event.tool, "metadata": event.result.metadata}),
    );

    vec![tool_update, log_update]
}

/// Translates the terminal `WorkflowCompleted` event into its `result` update.
fn workflow_completed_update(event: &WorkflowCompleted) -> ProgressUpdate {
    ProgressUpdate::new(
        ProgressKind::Result,
        format!(
            "Finished after {} iteration(s) and {} tool call(s) in {:.1}s: {:?}",
            event.iterations, event.tool_call_count, event.duration_seconds, event.status
        ),
        json!({
            "status": event.status,
            "iterations": event.iterations,
            "tool_call_count": event.tool_call_count,
            "duration_seconds": event.duration_seconds,
            "result": event.result,
        }),
    )
}

/// Translates one `WorkflowEvent` into zero or more `ProgressUpdate`s. `node_executed` and
/// `workflow_completed` each produce exactly one; `tool_executed` produces two; a non-fatal
/// `Error` event becomes a single `log` update so it isn't silently dropped.
pub fn translate_workflow_event(event: &WorkflowEvent) -> Vec<ProgressUpdate> {
    match event {
        WorkflowEvent::NodeExecuted(e) => vec![node_executed_update(e)],
        WorkflowEvent::ToolExecuted(e) => tool_executed_updates(e),
        WorkflowEvent::WorkflowCompleted(e) => vec![workflow_completed_update(e)],
        WorkflowEvent::Error { message } => {
            vec![ProgressUpdate::new(ProgressKind::Log, message.clone(), json!({"error": true}))]
        }
        WorkflowEvent::Thought { text } => {
            vec![ProgressUpdate::new(ProgressKind::Cot, text.clone(), json!({}))]
        }
    }
}

/// Translates an `OrchestratorEvent`, which additionally wraps the one-time `classified`
/// event ahead of the workflow's own stream.
pub fn translate_orchestrator_event(event: &OrchestratorEvent) -> Vec<ProgressUpdate> {
    match event {
        OrchestratorEvent::Classified { domain, confidence, reasoning, requires_sub_agents } => {
            vec![ProgressUpdate::new(
                ProgressKind::Status,
                format!("Classified as {:?} (confidence {:.2}): {}", domain, confidence, reasoning),
                json!({
                    "domain": domain,
                    "confidence": confidence,
                    "requires_sub_agents": requires_sub_agents,
                }),
            )]
        }
        OrchestratorEvent::Workflow(inner) => translate_workflow_event(inner),
    }
}

/// One extracted chain-of-thought block plus where it was cut from the source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CotExtraction {
    pub cot_blocks: Vec<String>,
    pub remainder: String,
}

const THINK_OPEN: &str = "<think>";
const THINK_CLOSE: &str = "</think>";

/// Extracts `<think>...</think>` blocks from an LLM response (spec §4.8, §9's "Open
/// Questions" #1). Per DESIGN.md's resolution of that open question, this is a **greedy,
/// non-nested** left-to-right scan: each `<think>` is paired with the *next* `</think>`,
/// so a `<think>` nested inside an outer block is swallowed as part of the outer block's
/// content rather than recursively parsed. This is implementation-defined behavior, not a
/// guarantee about well-formedness of the LLM's output.
pub fn extract_cot(text: &str) -> CotExtraction {
    let mut cot_blocks = Vec::new();
    let mut remainder = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(open_at) = rest.find(THINK_OPEN) {
        remainder.push_str(&rest[..open_at]);
        let after_open = &rest[open_at + THINK_OPEN.len()..];
        match after_open.find(THINK_CLOSE) {
            Some(close_at) => {
                cot_blocks.push(after_open[..close_at].to_string());
                rest = &after_open[close_at + THINK_CLOSE.len()..];
            }
            None => {
                // Unterminated block: the rest of the text is all "thinking" content.
                cot_blocks.push(after_open.to_string());
                rest = "";
                break;
            }
        }
    }
    remainder.push_str(rest);

    CotExtraction { cot_blocks, remainder }
}

/// Builds the `cot` update(s) plus the answer text a caller should continue processing,
/// given a raw LLM response that may contain `<think>` blocks.
pub fn split_cot_updates(text: &str) -> (Vec<ProgressUpdate>, String) {
    let extraction = extract_cot(text);
    let updates = extraction
        .cot_blocks
        .iter()
        .map(|block| ProgressUpdate::new(ProgressKind::Cot, block.trim().to_string(), json!({})))
        .collect();
    (updates, extraction.remainder)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task_state::TaskStatus;
    use crate::tool_gateway::ToolResult;
    use serde_json::Map;

    #[test]
    fn node_executed_reflect_appends_continue_marker() {
        let event = NodeExecuted {
            node: "reflect",
            iteration: 2,
            max_iterations: 10,
            status: TaskStatus::InProgress,
            should_continue: true,
            task_description_preview: "do a thing".to_string(),
        };
        let update = node_executed_update(&event);
        assert!(update.message.contains("will continue"));
        assert_eq!(update.kind, ProgressKind::Status);
    }

    #[test]
    fn node_executed_reflect_marks_completion() {
        let event = NodeExecuted {
            node: "reflect",
            iteration: 3,
            max_iterations: 10,
            status: TaskStatus::Completed,
            should_continue: false,
            task_description_preview: "do a thing".to_string(),
        };
        let update = node_executed_update(&event);
        assert!(update.message.contains("will complete"));
    }

    #[test]
    fn tool_executed_log_includes_path_and_bytes() {
        let mut metadata = Map::new();
        metadata.insert("path".to_string(), json!("/workspace/a.rs"));
        metadata.insert("bytes".to_string(), json!(42));
        let event = ToolExecuted {
            tool: "WRITE_FILE".to_string(),
            params: json!({"path": "a.rs"}),
            result: ToolResult::ok(json!({"path": "/workspace/a.rs"}), metadata),
            success: true,
        };
        let updates = tool_executed_updates(&event);
        assert_eq!(updates.len(), 2);
        assert!(updates[1].message.contains("/workspace/a.rs"));
        assert!(updates[1].message.contains("42 bytes"));
    }

    #[test]
    fn extract_cot_strips_single_block() {
        let extraction = extract_cot("<think>reasoning here</think>the answer");
        assert_eq!(extraction.cot_blocks, vec!["reasoning here".to_string()]);
        assert_eq!(extraction.remainder, "the answer");
    }

    #[test]
    fn extract_cot_handles_no_blocks() {
        let extraction = extract_cot("just an answer");
        assert!(extraction.cot_blocks.is_empty());
        assert_eq!(extraction.remainder, "just an answer");
    }

    #[test]
    fn extract_cot_nested_tags_are_swallowed_into_outer_block() {
        let extraction = extract_cot("<think>outer <think>inner</think> tail</think>answer");
        assert_eq!(extraction.cot_blocks.len(), 1);
        assert_eq!(extraction.cot_blocks[0], "outer <think>inner");
        assert_eq!(extraction.remainder, " tail</think>answer");
    }

    #[test]
    fn extract_cot_handles_multiple_sequential_blocks() {
        let extraction = extract_cot("<think>a</think>mid<think>b</think>end");
        assert_eq!(extraction.cot_blocks, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(extraction.remainder, "midend");
    }
}
