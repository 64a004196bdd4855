//! Crate-wide error taxonomy.
//!
//! One enum per the error classes the engine distinguishes in its propagation rules:
//! nodes catch errors internally and translate them into a `TaskState` status transition,
//! so `AgenticError` rarely escapes `Workflow::run_stream` itself — it is what gets
//! attached to `TaskState::errors` and reported by the orchestrator on total failure.

use std::fmt;

/// A single named failure mode recognized by the runtime.
#[derive(Debug, Clone)]
pub enum AgenticError {
    /// All configured LLM endpoints are unhealthy and retries are exhausted.
    LLMUnavailable { detail: String },
    /// The LLM's response could not be parsed into the expected shape.
    LLMInvalidResponse { detail: String },
    /// The tool gateway reported `success=false` for an invocation.
    ToolError { tool: String, detail: String },
    /// The safety checker rejected a tool invocation before it ran.
    SafetyDenied { tool: String, reason: String },
    /// A per-tool, per-agent, or per-task timeout elapsed.
    TimeoutError { scope: String, seconds: u64 },
    /// Cooperative cancellation was observed at a suspension point.
    CancelledError,
    /// A state or configuration invariant was violated before any external call was made.
    ValidationError { detail: String },
    /// The workflow's node-transition count reached `recursion_limit_effective`.
    RecursionLimitExceeded { last_node: String, limit: u32 },
}

impl AgenticError {
    /// A short, user-facing remediation hint, when one applies.
    pub fn remediation_hint(&self) -> Option<&'static str> {
        match self {
            AgenticError::LLMUnavailable { .. } => Some("Is the LLM server running?"),
            AgenticError::TimeoutError { .. } => {
                Some("Consider raising the relevant timeout in configuration.")
            }
            AgenticError::SafetyDenied { .. } => {
                Some("Adjust the safety allow/deny policy if this action was expected.")
            }
            _ => None,
        }
    }
}

impl fmt::Display for AgenticError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgenticError::LLMUnavailable { detail } => {
                write!(f, "no healthy LLM endpoint available: {}", detail)
            }
            AgenticError::LLMInvalidResponse { detail } => {
                write!(f, "LLM response did not match the expected shape: {}", detail)
            }
            AgenticError::ToolError { tool, detail } => {
                write!(f, "tool '{}' failed: {}", tool, detail)
            }
            AgenticError::SafetyDenied { tool, reason } => {
                write!(f, "safety checker denied '{}': {}", tool, reason)
            }
            AgenticError::TimeoutError { scope, seconds } => {
                write!(f, "{} timed out after {}s", scope, seconds)
            }
            AgenticError::CancelledError => write!(f, "task was cancelled"),
            AgenticError::ValidationError { detail } => {
                write!(f, "invariant violated: {}", detail)
            }
            AgenticError::RecursionLimitExceeded { last_node, limit } => write!(
                f,
                "recursion limit ({}) exceeded; last node was '{}'",
                limit, last_node
            ),
        }
    }
}

impl std::error::Error for AgenticError {}
