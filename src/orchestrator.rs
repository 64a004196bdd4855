//! Orchestrator (spec §4.7): the top-level facade. Classifies a task, selects the matching
//! domain workflow, and streams events — first a one-time `classified` event, then every
//! event the workflow itself emits.

use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use futures_util::stream::{self, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::ReceiverStream;

use crate::config::RuntimeConfig;
use crate::error::AgenticError;
use crate::intent_router::{Classification, Domain, EstimatedComplexity, IntentRouter};
use crate::llm::LlmClient;
use crate::sub_agent_manager::SubAgentManager;
use crate::task_state::{TaskState, TaskStatus};
use crate::tool_gateway::{SafetyChecker, ToolGateway};
use crate::workflow::{
    CodingWorkflow, DataWorkflow, GeneralWorkflow, ResearchWorkflow, Workflow, WorkflowEvent,
    CODING_SYSTEM_PROMPT, DATA_SYSTEM_PROMPT, GENERAL_SYSTEM_PROMPT, RESEARCH_SYSTEM_PROMPT,
};

/// Every value `execute_task_stream` can yield: the one-time classification, then the
/// workflow's own event stream, verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OrchestratorEvent {
    Classified {
        domain: Domain,
        confidence: f64,
        reasoning: String,
        requires_sub_agents: bool,
    },
    Workflow(WorkflowEvent),
}

/// The payload `execute_task` (the non-streaming facade) returns: the classification plus
/// the terminal `WorkflowCompleted` event's fields, since `Workflow::run_stream` does not
/// hand the caller its `TaskState` back directly (see `workflow::engine`'s doc comment).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub domain: Domain,
    pub status: TaskStatus,
    pub iterations: u32,
    pub tool_call_count: usize,
    pub duration_seconds: f64,
    pub result: Option<String>,
}

impl TaskResult {
    fn pending(domain: Domain) -> Self {
        Self {
            domain,
            status: TaskStatus::Failed,
            iterations: 0,
            tool_call_count: 0,
            duration_seconds: 0.0,
            result: None,
        }
    }
}

pub struct Orchestrator {
    llm: Arc<dyn LlmClient>,
    gateway: Arc<dyn ToolGateway>,
    safety: Arc<dyn SafetyChecker>,
    sub_agents: Arc<SubAgentManager>,
    config: RuntimeConfig,
}

impl Orchestrator {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        gateway: Arc<dyn ToolGateway>,
        safety: Arc<dyn SafetyChecker>,
        sub_agents: Arc<SubAgentManager>,
        config: RuntimeConfig,
    ) -> Self {
        Self { llm, gateway, safety, sub_agents, config }
    }

    /// Classifies `task` (unless `domain_override` is given, which skips classification
    /// entirely per spec §4.7), selects the matching workflow, and streams every event.
    pub async fn execute_task_stream(
        &self,
        task: String,
        workspace: PathBuf,
        domain_override: Option<Domain>,
    ) -> Pin<Box<dyn Stream<Item = OrchestratorEvent> + Send>> {
        let classification = match domain_override {
            Some(domain) => Classification {
                domain,
                confidence: 1.0,
                reasoning: "domain_override supplied; classification skipped".to_string(),
                requires_sub_agents: false,
                estimated_complexity: EstimatedComplexity::Low,
            },
            None => {
                let router = IntentRouter::new(self.llm.as_ref());
                match router.classify(&task).await {
                    Ok(c) => c,
                    Err(e) => {
                        // classify() only returns Err for invariant violations the keyword
                        // fallback can't paper over (spec §7 ValidationError); surface a
                        // degenerate general classification so the stream still completes
                        // with a `workflow_completed` event rather than panicking.
                        if log::log_enabled!(log::Level::Error) {
                            log::error!("orchestrator: classification failed validation: {}", e);
                        }
                        Classification {
                            domain: Domain::General,
                            confidence: 0.0,
                            reasoning: format!("classification failed: {}", e),
                            requires_sub_agents: false,
                            estimated_complexity: EstimatedComplexity::Low,
                        }
                    }
                }
            }
        };

        let classified_event = OrchestratorEvent::Classified {
            domain: classification.domain,
            confidence: classification.confidence,
            reasoning: classification.reasoning,
            requires_sub_agents: classification.requires_sub_agents,
        };

        let max_iterations = self.config.workflows.max_iterations;
        let recursion_limit = self.config.workflows.recursion_limit_effective();
        let state = TaskState::new(task, classification.domain, workspace, max_iterations, recursion_limit);
        let sub_agents_enabled = self.config.sub_agents.max_concurrent > 0
            && self.runtime_sub_agents_enabled();

        let workflow_stream: ReceiverStream<WorkflowEvent> = match classification.domain {
            Domain::Coding => self.spawn::<CodingWorkflow>(CODING_SYSTEM_PROMPT, sub_agents_enabled, state),
            Domain::Research => self.spawn::<ResearchWorkflow>(RESEARCH_SYSTEM_PROMPT, sub_agents_enabled, state),
            Domain::Data => self.spawn::<DataWorkflow>(DATA_SYSTEM_PROMPT, sub_agents_enabled, state),
            Domain::General => self.spawn::<GeneralWorkflow>(GENERAL_SYSTEM_PROMPT, sub_agents_enabled, state),
        };

        Box::pin(
            stream::once(async move { classified_event })
                .chain(workflow_stream.map(OrchestratorEvent::Workflow)),
        )
    }

    /// Collects `execute_task_stream` to completion and returns the terminal payload. If
    /// `workflows.timeout_seconds` is configured, the whole collection is bounded by it
    /// (spec §6's per-task ceiling); a task that doesn't finish in time is reported as
    /// `Failed` with a `TimeoutError` message rather than left to run unbounded.
    pub async fn execute_task(
        &self,
        task: String,
        workspace: PathBuf,
        domain_override: Option<Domain>,
    ) -> TaskResult {
        let domain = domain_override.unwrap_or(Domain::General);
        let collect = self.collect_task(task, workspace, domain_override);

        match self.config.workflows.timeout() {
            Some(budget) => match tokio::time::timeout(budget, collect).await {
                Ok(result) => result,
                Err(_) => {
                    let mut result = TaskResult::pending(domain);
                    result.result = Some(
                        AgenticError::TimeoutError { scope: "task".to_string(), seconds: budget.as_secs() }
                            .to_string(),
                    );
                    result
                }
            },
            None => collect.await,
        }
    }

    async fn collect_task(&self, task: String, workspace: PathBuf, domain_override: Option<Domain>) -> TaskResult {
        let mut domain = domain_override.unwrap_or(Domain::General);
        let mut result = TaskResult::pending(domain);
        let mut stream = self.execute_task_stream(task, workspace, domain_override).await;

        while let Some(event) = stream.next().await {
            match event {
                OrchestratorEvent::Classified { domain: d, .. } => domain = d,
                OrchestratorEvent::Workflow(WorkflowEvent::WorkflowCompleted(completed)) => {
                    result = TaskResult {
                        domain,
                        status: completed.status,
                        iterations: completed.iterations,
                        tool_call_count: completed.tool_call_count,
                        duration_seconds: completed.duration_seconds,
                        result: completed.result,
                    };
                }
                _ => {}
            }
        }

        result
    }

    fn runtime_sub_agents_enabled(&self) -> bool {
        // `RuntimeConfig` has no separate `sub_agents.enabled` boolean field beyond the
        // `SubAgentConfig` bounds themselves; callers that want sub-agents off entirely
        // set `max_concurrent = 0`, which `execute_task_stream` already treats as disabled.
        true
    }

    fn spawn<A>(
        &self,
        system_prompt: &'static str,
        sub_agents_enabled: bool,
        state: TaskState,
    ) -> ReceiverStream<WorkflowEvent>
    where
        A: crate::workflow::ActionSet + crate::workflow::Dispatch,
    {
        let workflow = Workflow::<A>::new_with_chain_of_thought(
            Arc::clone(&self.llm),
            Arc::clone(&self.gateway),
            Arc::clone(&self.safety),
            Arc::clone(&self.sub_agents),
            self.config.workflows.clone(),
            sub_agents_enabled,
            self.config.llm.chain_of_thought_enabled,
            system_prompt,
        );
        workflow.run_stream(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ChatOptions, ChatReply, Message};
    use crate::tool_gateway::{LocalToolGateway, PermissiveChecker};
    use async_trait::async_trait;
    use tempfile::TempDir;

    /// A stub `LlmClient` that always returns a fixed reply, for tests that only need the
    /// orchestrator's wiring exercised, not real classification/planning behavior.
    struct StubLlm {
        reply: String,
    }

    #[async_trait]
    impl LlmClient for StubLlm {
        async fn chat(&self, _messages: &[Message], _options: &ChatOptions) -> Result<ChatReply, AgenticError> {
            Ok(ChatReply { message: Message::assistant(self.reply.clone()), endpoint: "stub".to_string() })
        }
    }

    fn test_orchestrator(reply: &str) -> (Orchestrator, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let llm: Arc<dyn LlmClient> = Arc::new(StubLlm { reply: reply.to_string() });
        let gateway: Arc<dyn ToolGateway> = Arc::new(LocalToolGateway::new(temp_dir.path().to_path_buf()));
        let safety: Arc<dyn SafetyChecker> = Arc::new(PermissiveChecker);
        let sub_agents = Arc::new(SubAgentManager::new(
            Arc::clone(&llm),
            Arc::clone(&gateway),
            Arc::clone(&safety),
            RuntimeConfig::default().sub_agents,
        ));
        let orchestrator = Orchestrator::new(llm, gateway, safety, sub_agents, RuntimeConfig::default());
        (orchestrator, temp_dir)
    }

    #[tokio::test]
    async fn greeting_completes_in_one_node_visit_with_no_tool_calls() {
        let (orchestrator, temp_dir) = test_orchestrator("irrelevant, greeting bypass short-circuits");
        let result = orchestrator
            .execute_task("hello".to_string(), temp_dir.path().to_path_buf(), None)
            .await;
        assert_eq!(result.domain, Domain::General);
        assert_eq!(result.status, TaskStatus::Completed);
        assert_eq!(result.tool_call_count, 0);
    }

    #[tokio::test]
    async fn domain_override_skips_classification() {
        let (orchestrator, temp_dir) = test_orchestrator("{\"action\": \"COMPLETE\", \"summary\": \"done\"}");
        let mut stream = orchestrator
            .execute_task_stream(
                "anything at all".to_string(),
                temp_dir.path().to_path_buf(),
                Some(Domain::Coding),
            )
            .await;
        let first = stream.next().await.unwrap();
        match first {
            OrchestratorEvent::Classified { domain, confidence, .. } => {
                assert_eq!(domain, Domain::Coding);
                assert_eq!(confidence, 1.0);
            }
            _ => panic!("expected Classified as the first event"),
        }
    }
}
