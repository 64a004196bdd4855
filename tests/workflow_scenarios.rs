//! End-to-end scenarios from spec §8, driven through the public `Orchestrator` facade
//! against a scripted `LlmClient` stub instead of a real LLM server.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;

use agentic::config::RuntimeConfig;
use agentic::error::AgenticError;
use agentic::intent_router::Domain;
use agentic::llm::{ChatOptions, ChatReply, LlmClient, Message};
use agentic::orchestrator::Orchestrator;
use agentic::sub_agent_manager::SubAgentManager;
use agentic::task_state::TaskStatus;
use agentic::tool_gateway::{LocalToolGateway, PermissiveChecker, SafetyChecker, ToolGateway};

use async_trait::async_trait;
use tempfile::TempDir;

/// Replies to the decomposition prompt and the plan prompt with fixed canned answers, and
/// hands out execute-node replies from a scripted queue, one per call. Panics if the
/// execute queue is exhausted, so a wrong call count fails loudly instead of hanging.
struct ScriptedLlm {
    decomposition_reply: String,
    plan_reply: String,
    execute_replies: Mutex<Vec<String>>,
    execute_calls: Mutex<usize>,
}

impl ScriptedLlm {
    fn new(decomposition_reply: impl Into<String>, plan_reply: impl Into<String>, execute_replies: Vec<&str>) -> Self {
        Self {
            decomposition_reply: decomposition_reply.into(),
            plan_reply: plan_reply.into(),
            execute_replies: Mutex::new(execute_replies.into_iter().rev().map(String::from).collect()),
            execute_calls: Mutex::new(0),
        }
    }

    fn low_complexity_coding(execute_replies: Vec<&str>) -> Self {
        Self::new(
            r#"{"requires_decomposition": false, "complexity": 0.1, "execution_strategy": "SEQUENTIAL", "subtasks": [{"id": "s0", "description": "d", "agent_type": "general_task_executor", "priority": 0, "depends_on": []}]}"#,
            r#"{"approach": "write the file directly", "steps": ["write calculator.py"], "estimated_iterations": 2, "rationale": "trivial task"}"#,
            execute_replies,
        )
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn chat(&self, messages: &[Message], _options: &ChatOptions) -> Result<ChatReply, AgenticError> {
        let last = messages.last().map(|m| m.content.to_string()).unwrap_or_default();

        let content = if last.contains("Decompose the following task") {
            self.decomposition_reply.clone()
        } else if last.contains("Plan how to accomplish") {
            self.plan_reply.clone()
        } else if last.contains("Choose exactly one action") {
            *self.execute_calls.lock().unwrap() += 1;
            self.execute_replies
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| panic!("ScriptedLlm: execute queue exhausted"))
        } else {
            // Sub-agent "Subtask: ..." prompts and anything else: complete immediately.
            r#"{"action": "COMPLETE", "summary": "sub-agent done"}"#.to_string()
        };

        Ok(ChatReply { message: Message::assistant(content), endpoint: "scripted".to_string() })
    }
}

fn build_orchestrator(llm: Arc<dyn LlmClient>, temp_dir: &TempDir) -> Orchestrator {
    let gateway: Arc<dyn ToolGateway> = Arc::new(LocalToolGateway::new(temp_dir.path().to_path_buf()));
    let safety: Arc<dyn SafetyChecker> = Arc::new(PermissiveChecker);
    let sub_agents = Arc::new(SubAgentManager::new(
        Arc::clone(&llm),
        Arc::clone(&gateway),
        Arc::clone(&safety),
        RuntimeConfig::default().sub_agents,
    ));
    Orchestrator::new(llm, gateway, safety, sub_agents, RuntimeConfig::default())
}

fn workspace(temp_dir: &TempDir) -> PathBuf {
    temp_dir.path().to_path_buf()
}

/// Scenario 2: a simple coding task completes after one WRITE_FILE action and a COMPLETE.
#[tokio::test]
async fn simple_coding_task_writes_file_then_completes() {
    let temp_dir = TempDir::new().unwrap();
    let llm: Arc<dyn LlmClient> = Arc::new(ScriptedLlm::low_complexity_coding(vec![
        r#"{"action": "WRITE_FILE", "parameters": {"file_path": "calculator.py", "content": "def add(a, b):\n    return a + b\n"}}"#,
        r#"{"action": "COMPLETE", "summary": "calculator.py created with add/subtract"}"#,
    ]));
    let orchestrator = build_orchestrator(llm, &temp_dir);

    let result = orchestrator
        .execute_task("Create calculator.py with add/subtract".to_string(), workspace(&temp_dir), Some(Domain::Coding))
        .await;

    assert_eq!(result.status, TaskStatus::Completed);
    assert_eq!(result.iterations, 2);
    assert_eq!(result.tool_call_count, 2);
    assert!(temp_dir.path().join("calculator.py").exists());
}

/// Scenario 4: two unparseable execute responses are recorded as JSON_PARSE_ERROR, and the
/// task still completes once the third response is valid.
#[tokio::test]
async fn parse_failures_below_threshold_recover() {
    let temp_dir = TempDir::new().unwrap();
    let llm: Arc<dyn LlmClient> = Arc::new(ScriptedLlm::low_complexity_coding(vec![
        "not json at all",
        "still not json",
        r#"{"action": "COMPLETE", "summary": "done on the third try"}"#,
    ]));
    let orchestrator = build_orchestrator(llm, &temp_dir);

    let result = orchestrator
        .execute_task("do something trivial".to_string(), workspace(&temp_dir), Some(Domain::Coding))
        .await;

    assert_eq!(result.status, TaskStatus::Completed);
    assert_eq!(result.result.as_deref(), Some("done on the third try"));
}

/// Scenario 5: three consecutive unparseable execute responses fail the task.
#[tokio::test]
async fn parse_failures_exceeding_threshold_fail_the_task() {
    let temp_dir = TempDir::new().unwrap();
    let llm: Arc<dyn LlmClient> = Arc::new(ScriptedLlm::low_complexity_coding(vec![
        "garbage one",
        "garbage two",
        "garbage three",
    ]));
    let orchestrator = build_orchestrator(llm, &temp_dir);

    let result = orchestrator
        .execute_task("do something trivial".to_string(), workspace(&temp_dir), Some(Domain::Coding))
        .await;

    assert_eq!(result.status, TaskStatus::Failed);
}

/// Scenario 3: a high-complexity decomposition routes to `spawn_sub_agents` instead of the
/// execute/reflect loop, and the aggregated result reports every subtask as successful.
#[tokio::test]
async fn complex_task_spawns_sub_agents_and_aggregates() {
    let temp_dir = TempDir::new().unwrap();
    let decomposition = r#"{
        "requires_decomposition": true,
        "complexity": 0.9,
        "execution_strategy": "PARALLEL",
        "subtasks": [
            {"id": "frontend", "description": "build the UI", "agent_type": "code_writer", "priority": 0, "depends_on": []},
            {"id": "backend", "description": "build the API", "agent_type": "code_writer", "priority": 0, "depends_on": []},
            {"id": "tests", "description": "test the app", "agent_type": "code_tester", "priority": 1, "depends_on": ["frontend", "backend"]}
        ]
    }"#;
    let llm: Arc<dyn LlmClient> = Arc::new(ScriptedLlm::new(decomposition, "{}", vec![]));
    let orchestrator = build_orchestrator(llm, &temp_dir);

    let result = orchestrator
        .execute_task("Build a full stack app".to_string(), workspace(&temp_dir), Some(Domain::Coding))
        .await;

    assert_eq!(result.status, TaskStatus::Completed);
    assert!(result.result.is_some());
}

/// Boundary: `max_iterations = 0` fails after one plan attempt (spec §8).
#[tokio::test]
async fn zero_max_iterations_fails_after_plan() {
    let temp_dir = TempDir::new().unwrap();
    let llm: Arc<dyn LlmClient> = Arc::new(ScriptedLlm::low_complexity_coding(vec![
        r#"{"action": "LIST_DIRECTORY", "parameters": {"path": "."}}"#,
    ]));
    let gateway: Arc<dyn ToolGateway> = Arc::new(LocalToolGateway::new(temp_dir.path().to_path_buf()));
    let safety: Arc<dyn SafetyChecker> = Arc::new(PermissiveChecker);
    let sub_agents = Arc::new(SubAgentManager::new(
        Arc::clone(&llm),
        Arc::clone(&gateway),
        Arc::clone(&safety),
        RuntimeConfig::default().sub_agents,
    ));
    let mut config = RuntimeConfig::default();
    config.workflows.max_iterations = 0;
    let orchestrator = Orchestrator::new(llm, gateway, safety, sub_agents, config);

    let result = orchestrator
        .execute_task("anything".to_string(), workspace(&temp_dir), Some(Domain::Coding))
        .await;

    assert_eq!(result.status, TaskStatus::Failed);
    assert_eq!(result.iterations, 1);
}
