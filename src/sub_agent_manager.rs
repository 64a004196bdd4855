//! Sub-Agent Manager (spec §4.5): decomposes a task, spawns one sub-agent per subtask,
//! hands off to the parallel executor, and aggregates the results.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use crate::aggregator::{AggregatedResult, AggregationStrategy, ResultAggregator};
use crate::config::SubAgentConfig;
use crate::decomposer::{Decomposition, ExecutionStrategy, Subtask, TaskDecomposer};
use crate::llm::LlmClient;
use crate::parallel_executor::run_subtasks;
use crate::sub_agent::SubAgent;
use crate::tool_gateway::{SafetyChecker, ToolGateway};

/// Picks an aggregation strategy from the shape of the decomposition, per spec §4.6's
/// guidance ("SUMMARIZE... used when outputs are long or mixed"). Exposed so callers with
/// a stronger opinion can bypass it and call `ResultAggregator` directly.
pub fn default_strategy_for(strategy: ExecutionStrategy, subtask_count: usize) -> AggregationStrategy {
    match strategy {
        ExecutionStrategy::Sequential if subtask_count <= 1 => AggregationStrategy::Concatenate,
        _ if subtask_count > 4 => AggregationStrategy::Summarize,
        _ => AggregationStrategy::Concatenate,
    }
}

pub struct SubAgentManager {
    llm: Arc<dyn LlmClient>,
    gateway: Arc<dyn ToolGateway>,
    safety: Arc<dyn SafetyChecker>,
    config: SubAgentConfig,
}

impl SubAgentManager {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        gateway: Arc<dyn ToolGateway>,
        safety: Arc<dyn SafetyChecker>,
        config: SubAgentConfig,
    ) -> Self {
        Self { llm, gateway, safety, config }
    }

    /// Decomposes `task`, runs every subtask to completion under the parallel executor,
    /// and aggregates. `workspace` is currently informational (sub-agents share the
    /// gateway's sandboxed root); it is threaded through for future per-subtask workspace
    /// isolation.
    pub async fn execute_with_subagents(
        &self,
        task: &str,
        _workspace: &Path,
    ) -> AggregatedResult {
        let decomposer = TaskDecomposer::new(self.llm.as_ref());
        let decomposition = decomposer.decompose(task).await;
        self.execute_decomposition(decomposition).await
    }

    /// Runs an already-computed decomposition (the `check_complexity` node caches one to
    /// avoid calling the decomposer twice for one task, per spec §9's "Open Questions"
    /// resolution carried in DESIGN.md).
    pub async fn execute_decomposition(&self, decomposition: Decomposition) -> AggregatedResult {
        let Decomposition { subtasks, execution_strategy, .. } = decomposition;
        let started = Instant::now();

        let llm = Arc::clone(&self.llm);
        let gateway = Arc::clone(&self.gateway);
        let safety = Arc::clone(&self.safety);
        let max_iterations = self.config.max_iterations;
        let timeout_seconds = self.config.timeout_seconds;

        let results = run_subtasks(
            &subtasks,
            execution_strategy,
            self.config.max_concurrent,
            move |subtask: Subtask| {
                let llm = Arc::clone(&llm);
                let gateway = Arc::clone(&gateway);
                let safety = Arc::clone(&safety);
                async move {
                    let agent = SubAgent::new(
                        subtask.agent_type,
                        max_iterations,
                        timeout_seconds,
                        llm.as_ref(),
                        gateway.as_ref(),
                        safety.as_ref(),
                    );
                    agent.run(&subtask).await
                }
            },
        )
        .await;

        let wall_clock = match execution_strategy {
            ExecutionStrategy::Sequential => results.iter().map(|r| r.duration_seconds).sum(),
            ExecutionStrategy::Parallel | ExecutionStrategy::Mixed => started.elapsed().as_secs_f64(),
        };

        let strategy = default_strategy_for(execution_strategy, subtasks.len());
        let aggregator = ResultAggregator::new(Some(self.llm.as_ref()));
        aggregator.aggregate(results, strategy, wall_clock).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_sequential_subtask_prefers_concatenate() {
        assert_eq!(
            default_strategy_for(ExecutionStrategy::Sequential, 1),
            AggregationStrategy::Concatenate
        );
    }

    #[test]
    fn many_subtasks_prefer_summarize() {
        assert_eq!(default_strategy_for(ExecutionStrategy::Parallel, 6), AggregationStrategy::Summarize);
    }
}
