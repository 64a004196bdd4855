//! Workflow Engine (spec §4.3): a domain-polymorphic, iteration-bounded state machine —
//! plan → check_complexity → {spawn_sub_agents | execute ↔ reflect} — shared by all four
//! domains. Each domain supplies its own prompts and action set; the node skeleton,
//! streaming contract, and limit bookkeeping live once in `engine`.

pub mod action;
pub mod coding;
pub mod data;
pub mod engine;
pub mod general;
pub mod research;

pub use action::{ActionParseError, ActionSet, RawAction};
pub use coding::{CodingAction, Dispatch};
pub use data::DataAction;
pub use engine::{NodeExecuted, ToolExecuted, Workflow, WorkflowCompleted, WorkflowEvent};
pub use general::GeneralAction;
pub use research::ResearchAction;

/// Concrete workflow types for each domain (spec §2's component table).
pub type CodingWorkflow = Workflow<CodingAction>;
pub type ResearchWorkflow = Workflow<ResearchAction>;
pub type DataWorkflow = Workflow<DataAction>;
pub type GeneralWorkflow = Workflow<GeneralAction>;

/// Default system prompt fragments per domain, used when a caller doesn't supply its own.
pub const CODING_SYSTEM_PROMPT: &str =
    "You are a coding agent working inside a sandboxed workspace. Use the available actions \
     to read, write, and test code, then call COMPLETE when the task is done.";
pub const RESEARCH_SYSTEM_PROMPT: &str =
    "You are a research agent working inside a sandboxed workspace. Use the available \
     actions to search and gather information, then call COMPLETE when the task is done.";
pub const DATA_SYSTEM_PROMPT: &str =
    "You are a data-analysis agent working inside a sandboxed workspace. Use the available \
     actions to load and analyze data, then call COMPLETE when the task is done.";
pub const GENERAL_SYSTEM_PROMPT: &str =
    "You are a general-purpose agent working inside a sandboxed workspace. Use the \
     available actions to satisfy the task, then call COMPLETE when the task is done.";
