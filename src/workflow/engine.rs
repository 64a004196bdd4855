//! The Workflow Engine (spec §4.3): the core of this runtime. A domain-polymorphic,
//! iteration-bounded state machine — plan → check_complexity → {spawn_sub_agents |
//! execute ↔ reflect} — streaming a typed event per node boundary.
//!
//! Per §9's design note on "a specific async runtime named in the state machine itself",
//! the stream is produced by an explicit `tokio::sync::mpsc` channel fed by a driver task,
//! consumed as a `ReceiverStream` — the same shape the teacher uses for
//! `send_message_stream`'s boxed stream return, generalized from one LLM call to a whole
//! node sequence.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::config::WorkflowsConfig;
use crate::decomposer::TaskDecomposer;
use crate::error::AgenticError;
use crate::intent_router::{Domain, IntentRouter};
use crate::llm::{ChatOptions, ConversationHistory, LlmClient, Message};
use crate::sub_agent_manager::SubAgentManager;
use crate::task_state::{ActionDetails, LastToolExecution, Plan, TaskState, TaskStatus, ToolCallRecord};
use crate::tool_gateway::{with_timeout, SafetyChecker, ToolGateway};

use super::action::{ActionParseError, ActionSet, RawAction};
use super::coding::Dispatch;

const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_CONSECUTIVE_PARSE_FAILURES: u32 = 3;

/// One node-completion event (spec §4.3's streaming contract).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeExecuted {
    pub node: &'static str,
    pub iteration: u32,
    pub max_iterations: u32,
    pub status: TaskStatus,
    pub should_continue: bool,
    pub task_description_preview: String,
}

/// Emitted by the execute node right after each tool call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolExecuted {
    pub tool: String,
    pub params: Value,
    pub result: crate::tool_gateway::ToolResult,
    pub success: bool,
}

/// The terminal event, always the last one emitted for a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowCompleted {
    pub status: TaskStatus,
    pub iterations: u32,
    pub tool_call_count: usize,
    pub duration_seconds: f64,
    /// The task's final `result` text, if one was set (spec §4.8 needs this to populate
    /// the Backend Bridge's terminal `result` update, not just the iteration counts).
    pub result: Option<String>,
}

/// Every value a `Workflow::run_stream` can yield.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WorkflowEvent {
    NodeExecuted(NodeExecuted),
    ToolExecuted(ToolExecuted),
    /// A non-fatal error surfaced during a node, logged and carried in `TaskState::errors`
    /// without itself ending the stream (spec §4.3: "do not terminate the stream unless
    /// they raise status=failed").
    Error { message: String },
    /// Emitted from the execute node when `<think>...</think>` blocks are stripped from the
    /// LLM's raw response (spec §4.8's `cot` update, gated by `llm.chain_of_thought.enabled`).
    Thought { text: String },
    WorkflowCompleted(WorkflowCompleted),
}

/// Everything one domain's workflow needs to run a task to completion.
pub struct Workflow<A: ActionSet + Dispatch> {
    llm: Arc<dyn LlmClient>,
    gateway: Arc<dyn ToolGateway>,
    safety: Arc<dyn SafetyChecker>,
    sub_agents: Arc<SubAgentManager>,
    config: WorkflowsConfig,
    sub_agents_enabled: bool,
    chain_of_thought_enabled: bool,
    system_prompt: &'static str,
    _marker: std::marker::PhantomData<A>,
}

impl<A: ActionSet + Dispatch> Workflow<A> {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        gateway: Arc<dyn ToolGateway>,
        safety: Arc<dyn SafetyChecker>,
        sub_agents: Arc<SubAgentManager>,
        config: WorkflowsConfig,
        sub_agents_enabled: bool,
        system_prompt: &'static str,
    ) -> Self {
        Self::new_with_chain_of_thought(llm, gateway, safety, sub_agents, config, sub_agents_enabled, true, system_prompt)
    }

    /// Same as `new`, with explicit control over whether `<think>` blocks are stripped and
    /// surfaced as `cot` progress updates (spec §6: `llm.chain_of_thought.enabled`).
    #[allow(clippy::too_many_arguments)]
    pub fn new_with_chain_of_thought(
        llm: Arc<dyn LlmClient>,
        gateway: Arc<dyn ToolGateway>,
        safety: Arc<dyn SafetyChecker>,
        sub_agents: Arc<SubAgentManager>,
        config: WorkflowsConfig,
        sub_agents_enabled: bool,
        chain_of_thought_enabled: bool,
        system_prompt: &'static str,
    ) -> Self {
        Self {
            llm,
            gateway,
            safety,
            sub_agents,
            config,
            sub_agents_enabled,
            chain_of_thought_enabled,
            system_prompt,
            _marker: std::marker::PhantomData,
        }
    }

    /// Drives `state` through the node skeleton to completion, returning a stream of
    /// `WorkflowEvent`s. The driver task owns `state` for the run's duration; the final
    /// `TaskState` is not returned here — callers that need it should inspect the terminal
    /// event plus whatever side effects (e.g. a `CheckpointStore`) the caller wired in.
    pub fn run_stream(self, mut state: TaskState) -> ReceiverStream<WorkflowEvent> {
        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(async move {
            self.drive(&mut state, &tx).await;
        });
        ReceiverStream::new(rx)
    }

    async fn drive(&self, state: &mut TaskState, tx: &mpsc::Sender<WorkflowEvent>) {
        let started = Instant::now();

        if !self.visit(state, "plan", tx).await {
            self.finish(state, started, tx).await;
            return;
        }
        self.node_plan(state).await;
        self.emit_node_executed(state, "plan", tx).await;

        if state.is_terminal() {
            self.finish(state, started, tx).await;
            return;
        }

        if !self.visit(state, "check_complexity", tx).await {
            self.finish(state, started, tx).await;
            return;
        }
        self.node_check_complexity(state).await;
        self.emit_node_executed(state, "check_complexity", tx).await;

        if state.use_sub_agents {
            if !self.visit(state, "spawn_sub_agents", tx).await {
                self.finish(state, started, tx).await;
                return;
            }
            self.node_spawn_sub_agents(state).await;
            self.emit_node_executed(state, "spawn_sub_agents", tx).await;
            self.finish(state, started, tx).await;
            return;
        }

        loop {
            if !self.visit(state, "execute", tx).await {
                break;
            }
            self.node_execute(state, tx).await;
            self.emit_node_executed(state, "execute", tx).await;

            if state.is_terminal() {
                break;
            }

            if !self.visit(state, "reflect", tx).await {
                break;
            }
            self.node_reflect(state).await;
            self.emit_node_executed(state, "reflect", tx).await;

            if !state.should_continue {
                break;
            }
        }

        self.finish(state, started, tx).await;
    }

    /// Increments the node-transition counter and fails the task if `recursion_limit` is
    /// exceeded (spec §9's recursion-vs-iteration distinction). Returns `false` if the run
    /// must stop here.
    async fn visit(&self, state: &mut TaskState, node: &'static str, tx: &mpsc::Sender<WorkflowEvent>) -> bool {
        state.node_transitions += 1;
        let limit = self.config.recursion_limit_effective();
        if state.node_transitions > limit {
            state.status = TaskStatus::Failed;
            state.should_continue = false;
            state.push_error(format!(
                "{}",
                AgenticError::RecursionLimitExceeded { last_node: node.to_string(), limit }
            ));
            let _ = tx
                .send(WorkflowEvent::Error {
                    message: format!("recursion limit ({}) exceeded at node '{}'", limit, node),
                })
                .await;
            return false;
        }
        true
    }

    async fn emit_node_executed(&self, state: &TaskState, node: &'static str, tx: &mpsc::Sender<WorkflowEvent>) {
        let _ = tx
            .send(WorkflowEvent::NodeExecuted(NodeExecuted {
                node,
                iteration: state.iteration,
                max_iterations: state.max_iterations,
                status: state.status,
                should_continue: state.should_continue,
                task_description_preview: state.description_preview(),
            }))
            .await;
    }

    async fn finish(&self, state: &TaskState, started: Instant, tx: &mpsc::Sender<WorkflowEvent>) {
        let _ = tx
            .send(WorkflowEvent::WorkflowCompleted(WorkflowCompleted {
                status: state.status,
                iterations: state.iteration,
                tool_call_count: state.tool_calls.len(),
                duration_seconds: started.elapsed().as_secs_f64(),
                result: state.result.clone(),
            }))
            .await;
    }

    /// Ensures `context.plan`/`completed_steps` are initialized, asks the LLM for a plan,
    /// and stores it. Idempotent on re-entry (spec §4.3); the general workflow's greeting
    /// bypass short-circuits straight to completion.
    async fn node_plan(&self, state: &mut TaskState) {
        if state.domain == Domain::General {
            if let Some(greeting) = IntentRouter::greeting_bypass(&state.task_description) {
                state.status = TaskStatus::Completed;
                state.should_continue = false;
                state.result = Some(format!(
                    "Hello! {}",
                    greeting.reasoning
                ));
                return;
            }
        }

        if state.context.plan.is_some() {
            return;
        }

        let prompt = format!(
            "{}\n\nPlan how to accomplish the following task. Respond with only a JSON \
             object: {{\"approach\": string, \"steps\": [string], \
             \"estimated_iterations\": int?, \"rationale\": string?}}.\n\nTask: {}",
            self.system_prompt, state.task_description
        );

        match self.llm.chat(&[Message::user(prompt)], &ChatOptions::default()).await {
            Ok(reply) => match parse_plan(&reply.message.content) {
                Some(plan) => state.context.plan = Some(plan),
                None => {
                    state.push_error("plan node: LLM response was not a parseable plan, using a single-step fallback");
                    state.context.plan = Some(fallback_plan(&state.task_description));
                }
            },
            Err(e) => {
                state.push_error(format!("plan node: {}", e));
                state.context.plan = Some(fallback_plan(&state.task_description));
            }
        }
    }

    /// Estimates task complexity and decides whether to hand off to the Sub-Agent Manager.
    /// Caches the full decomposition so `spawn_sub_agents` never calls the decomposer twice
    /// for one task.
    async fn node_check_complexity(&self, state: &mut TaskState) {
        if !self.sub_agents_enabled {
            state.use_sub_agents = false;
            return;
        }

        let decomposer = TaskDecomposer::new(self.llm.as_ref());
        let decomposition = decomposer.decompose(&state.task_description).await;

        state.use_sub_agents = decomposition.complexity > self.config.complexity_threshold;
        state.context.cached_decomposition = Some(decomposition);
    }

    /// Delegates to the Sub-Agent Manager with the already-cached decomposition.
    async fn node_spawn_sub_agents(&self, state: &mut TaskState) {
        let decomposition = state
            .context
            .cached_decomposition
            .take()
            .unwrap_or_else(|| crate::decomposer::Decomposition::fallback(&state.task_description));

        let aggregated = self.sub_agents.execute_decomposition(decomposition).await;

        state.result = Some(aggregated.summary);
        state.status = if aggregated.success { TaskStatus::Completed } else { TaskStatus::Failed };
        state.should_continue = false;
        if !aggregated.success {
            for err in &aggregated.errors {
                state.push_error(err.clone());
            }
        }
    }

    /// Builds an execute prompt, calls the LLM, parses a domain action, and dispatches it
    /// through the Tool Gateway (after a Safety Checker pass). Always increments
    /// `iteration`, matching spec §4.3's unconditional "Increment iteration" step.
    ///
    /// The prompt is appended to `state.messages` rather than sent as a one-off
    /// system+user pair, so later iterations carry the trimmed history of prior turns
    /// (spec §3's Conversation History component) instead of re-deriving context purely
    /// from `state.context` each time.
    async fn node_execute(&self, state: &mut TaskState, tx: &mpsc::Sender<WorkflowEvent>) {
        let prompt = self.execute_prompt(state);
        let history = state
            .messages
            .get_or_insert_with(|| ConversationHistory::new(self.system_prompt, self.config.max_prompt_tokens));
        history.add_message(Message::user(prompt));

        let reply = match self.llm.chat(history.messages(), &ChatOptions::default()).await {
            Ok(reply) => reply,
            Err(e) => {
                state.push_error(format!("execute node: {}", e));
                let _ = tx.send(WorkflowEvent::Error { message: e.to_string() }).await;
                state.iteration += 1;
                return;
            }
        };

        state
            .messages
            .as_mut()
            .expect("inserted above")
            .add_message(Message::assistant(reply.message.content.clone()));

        let content_for_parsing = if self.chain_of_thought_enabled {
            let extraction = crate::backend_bridge::extract_cot(&reply.message.content);
            if !extraction.cot_blocks.is_empty() {
                let _ = tx
                    .send(WorkflowEvent::Thought { text: extraction.cot_blocks.join("\n\n") })
                    .await;
            }
            extraction.remainder
        } else {
            reply.message.content.to_string()
        };

        let raw = extract_raw_action(&content_for_parsing);
        let action = match raw.and_then(|r| A::from_raw(r).map_err(|e: ActionParseError| e.detail).ok()) {
            Some(action) => {
                state.consecutive_parse_failures = 0;
                action
            }
            None => {
                self.record_parse_failure(state, &reply.message.content);
                state.iteration += 1;
                return;
            }
        };

        if action.is_complete() {
            state.status = TaskStatus::Completed;
            state.result = Some(action.complete_summary().unwrap_or_default().to_string());
            state.should_continue = false;
            state.tool_calls.push(ToolCallRecord {
                action: action.name().to_string(),
                action_details: ActionDetails::default(),
                result: crate::tool_gateway::ToolResult::ok(
                    Value::String(state.result.clone().unwrap_or_default()),
                    Default::default(),
                ),
                success: true,
                iteration: state.iteration,
            });
            state.iteration += 1;
            return;
        }

        let verdict = self.safety.validate(action.name(), &action_value(&action));
        let result = if verdict.allowed {
            with_timeout(DEFAULT_TOOL_TIMEOUT, action.dispatch(self.gateway.as_ref())).await
        } else {
            crate::tool_gateway::ToolResult::fail(format!(
                "denied by safety policy: {}",
                verdict.reason.unwrap_or_default()
            ))
        };

        let _ = tx
            .send(WorkflowEvent::ToolExecuted(ToolExecuted {
                tool: action.name().to_string(),
                params: action_value(&action),
                result: result.clone(),
                success: result.success,
            }))
            .await;

        if result.success {
            state.context.completed_steps.push(action.name().to_string());
        }
        state.context.last_tool_execution = Some(LastToolExecution {
            action: action.name().to_string(),
            action_details: ActionDetails {
                parameters: action_value(&action).as_object().cloned().unwrap_or_default(),
            },
            result: result.clone(),
            success: result.success,
        });
        state.tool_calls.push(ToolCallRecord {
            action: action.name().to_string(),
            action_details: ActionDetails {
                parameters: action_value(&action).as_object().cloned().unwrap_or_default(),
            },
            result,
            success: verdict.allowed,
            iteration: state.iteration,
        });

        state.iteration += 1;
    }

    fn record_parse_failure(&self, state: &mut TaskState, raw_response: &str) {
        state.consecutive_parse_failures += 1;
        state.tool_calls.push(ToolCallRecord {
            action: "JSON_PARSE_ERROR".to_string(),
            action_details: ActionDetails::default(),
            result: crate::tool_gateway::ToolResult::fail_with_metadata(
                "LLM response could not be parsed into a recognized action",
                [("raw_response".to_string(), Value::String(raw_response.to_string()))]
                    .into_iter()
                    .collect(),
            ),
            success: false,
            iteration: state.iteration,
        });

        if state.consecutive_parse_failures >= MAX_CONSECUTIVE_PARSE_FAILURES {
            state.status = TaskStatus::Failed;
            state.should_continue = false;
            state.push_error(format!(
                "{}",
                AgenticError::LLMInvalidResponse {
                    detail: format!(
                        "{} consecutive unparseable responses",
                        state.consecutive_parse_failures
                    ),
                }
            ));
        }
    }

    /// If already terminal, does nothing (preserves `should_continue=false`); otherwise
    /// checks `max_iterations` and logs progress (spec §9's precedence rule, preventing a
    /// terminal decision made elsewhere from being silently overwritten here).
    async fn node_reflect(&self, state: &mut TaskState) {
        if state.is_terminal() {
            return;
        }

        if state.iteration >= state.max_iterations {
            state.status = TaskStatus::Failed;
            state.should_continue = false;
            state.push_error("max iterations reached");
            return;
        }

        let plan_len = state.context.plan.as_ref().map(|p| p.steps.len()).unwrap_or(0);
        let completed = state.context.completed_steps.len();
        if log::log_enabled!(log::Level::Debug) {
            log::debug!(
                "reflect: task {} iteration {}/{}: {}/{} plan steps completed",
                state.task_id,
                state.iteration,
                state.max_iterations,
                completed,
                plan_len.max(completed)
            );
        }
        state.should_continue = true;
    }

    fn execute_prompt(&self, state: &TaskState) -> String {
        let completed = if state.context.completed_steps.is_empty() {
            "none yet".to_string()
        } else {
            state.context.completed_steps.join(", ")
        };
        let plan_summary = state
            .context
            .plan
            .as_ref()
            .map(|p| p.approach.clone())
            .unwrap_or_else(|| "no plan recorded".to_string());

        format!(
            "Task: {}\nApproach: {}\nCompleted so far: {}\nIteration {} of {}.\n\n\
             Choose exactly one action. Respond with only a JSON object: \
             {{\"action\": one of [{}], \"parameters\": {{...}}, \"summary\": string (for COMPLETE)}}.\n\n\
             Available actions:\n{}",
            state.task_description,
            plan_summary,
            completed,
            state.iteration + 1,
            state.max_iterations,
            A::action_names().join(", "),
            A::prompt_schema(),
        )
    }
}

/// Renders an action's parameters back out as JSON, for the safety checker and the
/// `tool_executed` event's `params` field.
fn action_value<A: ActionSet>(action: &A) -> Value {
    Value::Object(action.to_parameters())
}

fn parse_plan(text: &str) -> Option<Plan> {
    let json_str = extract_json_object(text)?;
    serde_json::from_str(json_str).ok()
}

fn fallback_plan(task: &str) -> Plan {
    Plan {
        approach: format!("Directly address the task: {}", task),
        steps: vec!["complete the task".to_string()],
        estimated_iterations: None,
        rationale: Some("fallback plan: LLM planning call failed or returned unparseable output".to_string()),
    }
}

fn extract_raw_action(text: &str) -> Option<RawAction> {
    let json_str = extract_json_object(text)?;
    serde_json::from_str(json_str).ok()
}

fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0i32;
    for (i, ch) in text[start..].char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + i + 1]);
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
    fn fallback_plan_has_one_step() {
        let plan = fallback_plan("write a parser");
        assert_eq!(plan.steps.len(), 1);
        assert!(plan.approach.contains("write a parser"));
    }

    #[test]
    fn extract_json_object_finds_nested_braces() {
        let text = "noise {\"a\": {\"b\": 1}} trailing";
        assert_eq!(extract_json_object(text), Some("{\"a\": {\"b\": 1}}"));
    }

    #[test]
    fn extract_raw_action_parses_complete() {
        let text = "{\"action\": \"COMPLETE\", \"summary\": \"done\"}";
        let raw = extract_raw_action(text).unwrap();
        assert_eq!(raw.action, "COMPLETE");
        assert_eq!(raw.summary.as_deref(), Some("done"));
    }
}
