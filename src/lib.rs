//! Agentic 2.0: an on-premise agent runtime. A free-form task is classified into a
//! workflow domain, then driven through a bounded plan/execute/reflect loop against a
//! local LLM server and a small set of sandboxed tools, with optional fan-out into a
//! bounded pool of specialized sub-agents.
//!
//! [`orchestrator::Orchestrator`] is the top-level facade most callers want; the
//! workflow engine ([`workflow`]) is the core this crate is built around.

pub mod aggregator;
pub mod backend_bridge;
pub mod checkpoint;
pub mod config;
pub mod decomposer;
pub mod error;
pub mod intent_router;
pub mod llm;
pub mod orchestrator;
pub mod parallel_executor;
pub mod runtime;
pub mod sub_agent;
pub mod sub_agent_manager;
pub mod task_state;
pub mod tool_gateway;
pub mod workflow;

pub use config::RuntimeConfig;
pub use error::AgenticError;
pub use intent_router::{Classification, Domain, EstimatedComplexity, IntentRouter};
pub use orchestrator::{Orchestrator, OrchestratorEvent};
pub use runtime::Runtime;
pub use task_state::{TaskState, TaskStatus};
