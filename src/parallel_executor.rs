//! Parallel Executor (spec §4.5): a bounded-concurrency scheduler that honors subtask
//! dependencies. Built the way the teacher's `orchestration.rs` fans agents out with
//! `tokio::spawn`, generalized with a `tokio::sync::Semaphore` so at most `max_concurrent`
//! subtasks run at once (spec §5), and leveled by the decomposer's topological-sort
//! machinery so a level only proceeds once its predecessors have settled.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::decomposer::{dependency_levels, ExecutionStrategy, Subtask};
use crate::sub_agent::SubAgentResult;

/// Runs `subtasks` to completion, honoring `strategy` and `max_concurrent`. `run_one` is
/// called once per subtask and must itself apply any per-subtask timeout (spec §5: "a
/// per-subtask timeout cancels only that subtask").
///
/// A panicking or erroring subtask never cancels its siblings at the same level (spec
/// §4.5) — `run_one`'s return type is `SubAgentResult`, which already encodes failure as
/// data rather than as a thrown error, but a `tokio::spawn` join error (e.g. a panic) is
/// still caught and converted into a failed `SubAgentResult` rather than propagated.
pub async fn run_subtasks<F, Fut>(
    subtasks: &[Subtask],
    strategy: ExecutionStrategy,
    max_concurrent: usize,
    run_one: F,
) -> Vec<SubAgentResult>
where
    F: Fn(Subtask) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = SubAgentResult> + Send + 'static,
{
    let effective_concurrency = match strategy {
        ExecutionStrategy::Sequential => 1,
        ExecutionStrategy::Parallel | ExecutionStrategy::Mixed => max_concurrent.max(1),
    };

    let by_id: std::collections::HashMap<String, Subtask> =
        subtasks.iter().map(|s| (s.id.clone(), s.clone())).collect();
    let levels = dependency_levels(subtasks);

    let semaphore = Arc::new(Semaphore::new(effective_concurrency));
    let run_one = Arc::new(run_one);
    let mut results = Vec::with_capacity(subtasks.len());

    for level in levels {
        let mut join_set: JoinSet<SubAgentResult> = JoinSet::new();
        for id in level {
            let subtask = by_id.get(&id).cloned().expect("level id must exist in by_id");
            let semaphore = Arc::clone(&semaphore);
            let run_one = Arc::clone(&run_one);
            join_set.spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore never closed");
                run_one(subtask).await
            });
        }

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(join_error) => {
                    if log::log_enabled!(log::Level::Error) {
                        log::error!("parallel executor: subtask task panicked: {}", join_error);
                    }
                    results.push(SubAgentResult {
                        subtask_id: "unknown".to_string(),
                        agent_type: crate::sub_agent::AgentType::GeneralTaskExecutor,
                        success: false,
                        output: String::new(),
                        error: Some(format!("subtask task panicked: {}", join_error)),
                        iterations: 0,
                        duration_seconds: 0.0,
                    });
                }
            }
        }
    }

    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sub_agent::AgentType;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn subtask(id: &str, deps: &[&str]) -> Subtask {
        Subtask {
            id: id.to_string(),
            description: "d".to_string(),
            agent_type: AgentType::GeneralTaskExecutor,
            priority: 0,
            depends_on: deps.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn ok_result(subtask_id: &str) -> SubAgentResult {
        SubAgentResult {
            subtask_id: subtask_id.to_string(),
            agent_type: AgentType::GeneralTaskExecutor,
            success: true,
            output: "done".to_string(),
            error: None,
            iterations: 1,
            duration_seconds: 0.0,
        }
    }

    #[tokio::test]
    async fn runs_all_subtasks_and_respects_concurrency_cap() {
        let subtasks = vec![subtask("a", &[]), subtask("b", &[]), subtask("c", &["a", "b"])];
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_observed = Arc::new(AtomicUsize::new(0));
        let in_flight_clone = Arc::clone(&in_flight);
        let max_observed_clone = Arc::clone(&max_observed);

        let results = run_subtasks(&subtasks, ExecutionStrategy::Parallel, 4, move |s| {
            let in_flight = Arc::clone(&in_flight_clone);
            let max_observed = Arc::clone(&max_observed_clone);
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                max_observed.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                ok_result(&s.id)
            }
        })
        .await;

        assert_eq!(results.len(), 3);
        assert!(max_observed.load(Ordering::SeqCst) <= 4);
    }

    #[tokio::test]
    async fn sequential_strategy_runs_one_at_a_time() {
        let subtasks = vec![subtask("a", &[]), subtask("b", &[])];
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_observed = Arc::new(AtomicUsize::new(0));
        let in_flight_clone = Arc::clone(&in_flight);
        let max_observed_clone = Arc::clone(&max_observed);

        run_subtasks(&subtasks, ExecutionStrategy::Sequential, 4, move |s| {
            let in_flight = Arc::clone(&in_flight_clone);
            let max_observed = Arc::clone(&max_observed_clone);
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                max_observed.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(std::time::Duration::from_millis(2)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                ok_result(&s.id)
            }
        })
        .await;

        assert_eq!(max_observed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn one_subtask_failure_does_not_cancel_siblings() {
        let subtasks = vec![subtask("a", &[]), subtask("b", &[])];
        let results = run_subtasks(&subtasks, ExecutionStrategy::Parallel, 4, |s| async move {
            if s.id == "a" {
                SubAgentResult {
                    subtask_id: s.id,
                    agent_type: AgentType::GeneralTaskExecutor,
                    success: false,
                    output: String::new(),
                    error: Some("boom".to_string()),
                    iterations: 0,
                    duration_seconds: 0.0,
                }
            } else {
                ok_result(&s.id)
            }
        })
        .await;

        assert_eq!(results.len(), 2);
        assert!(results.iter().any(|r| r.subtask_id == "a" && !r.success));
        assert!(results.iter().any(|r| r.subtask_id == "b" && r.success));
    }
}
