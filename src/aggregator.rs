//! Result Aggregator (spec §4.6): merges sub-agent outputs under a chosen strategy.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::AgenticError;
use crate::llm::{ChatOptions, LlmClient, Message};
use crate::sub_agent::SubAgentResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AggregationStrategy {
    Concatenate,
    Summarize,
    MergeJson,
    List,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedResult {
    pub success: bool,
    pub summary: String,
    pub total_duration_seconds: f64,
    pub success_count: usize,
    pub failure_count: usize,
    pub errors: Vec<String>,
    pub per_subtask: Vec<SubAgentResult>,
}

pub struct ResultAggregator<'a> {
    llm: Option<&'a dyn LlmClient>,
}

impl<'a> ResultAggregator<'a> {
    pub fn new(llm: Option<&'a dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// `wall_clock_seconds` should be the parallel executor's actual elapsed time for
    /// parallel/mixed runs, or the sum of per-subtask durations for sequential runs (spec
    /// §4.6: "duration is wall-clock for parallel runs, sum for sequential").
    pub async fn aggregate(
        &self,
        results: Vec<SubAgentResult>,
        strategy: AggregationStrategy,
        wall_clock_seconds: f64,
    ) -> AggregatedResult {
        let success_count = results.iter().filter(|r| r.success).count();
        let failure_count = results.len() - success_count;
        let errors: Vec<String> = results
            .iter()
            .filter_map(|r| r.error.clone())
            .collect();
        let overall_success = failure_count == 0 && !results.is_empty();

        let summary = match strategy {
            AggregationStrategy::Concatenate => concatenate(&results),
            AggregationStrategy::List => list_summary(&results),
            AggregationStrategy::MergeJson => merge_json_summary(&results),
            AggregationStrategy::Summarize => match self.summarize_via_llm(&results).await {
                Ok(summary) => summary,
                Err(e) => {
                    if log::log_enabled!(log::Level::Warn) {
                        log::warn!("aggregator: summarize fallback to concatenate ({})", e);
                    }
                    concatenate(&results)
                }
            },
        };

        AggregatedResult {
            success: overall_success,
            summary,
            total_duration_seconds: wall_clock_seconds,
            success_count,
            failure_count,
            errors,
            per_subtask: results,
        }
    }

    async fn summarize_via_llm(&self, results: &[SubAgentResult]) -> Result<String, AgenticError> {
        let llm = self.llm.ok_or_else(|| AgenticError::ValidationError {
            detail: "SUMMARIZE strategy requires an LLM client".to_string(),
        })?;
        let joined = concatenate(results);
        let prompt = format!(
            "Summarize the following sub-agent outputs into one concise paragraph:\n\n{}",
            joined
        );
        let reply = llm.chat(&[Message::user(prompt)], &ChatOptions::default()).await?;
        Ok(reply.message.content.to_string())
    }
}

/// Ordered join of text outputs with separators (spec §4.6: "ordered join... with
/// separators"). A single subtask's output is returned verbatim, with no label attached,
/// per spec §8's round-trip property; the `[agent/subtask]` label is only meaningful as a
/// separator between two or more joined outputs.
fn concatenate(results: &[SubAgentResult]) -> String {
    match results {
        [only] => only.output.clone(),
        _ => results
            .iter()
            .map(|r| format!("[{:?}/{}] {}", r.agent_type, r.subtask_id, r.output))
            .collect::<Vec<_>>()
            .join("\n---\n"),
    }
}

/// Returns results as a list without merging (spec §4.6), distinct from `CONCATENATE`'s
/// separator-joined prose: a JSON array of `{agent_type, subtask_id, output}` objects, one
/// per subtask, in input order.
fn list_summary(results: &[SubAgentResult]) -> String {
    let items: Vec<Value> = results
        .iter()
        .map(|r| {
            serde_json::json!({
                "agent_type": r.agent_type,
                "subtask_id": r.subtask_id,
                "output": r.output,
            })
        })
        .collect();
    serde_json::to_string_pretty(&items).unwrap_or_default()
}

/// Deep-merges each subtask's output (parsed as JSON where possible) into one object,
/// last-writer-wins on scalar conflicts, arrays concatenated.
fn merge_json_summary(results: &[SubAgentResult]) -> String {
    let mut merged = serde_json::Map::new();
    for r in results {
        if let Ok(Value::Object(obj)) = serde_json::from_str::<Value>(&r.output) {
            deep_merge(&mut merged, obj);
        } else if !r.output.is_empty() {
            merged.insert(r.subtask_id.clone(), Value::String(r.output.clone()));
        }
    }
    serde_json::to_string_pretty(&merged).unwrap_or_default()
}

fn deep_merge(into: &mut serde_json::Map<String, Value>, from: serde_json::Map<String, Value>) {
    for (key, value) in from {
        match (into.get_mut(&key), value) {
            (Some(Value::Array(existing)), Value::Array(incoming)) => {
                existing.extend(incoming);
            }
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                deep_merge(existing, incoming);
            }
            (_, incoming) => {
                into.insert(key, incoming);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sub_agent::AgentType;

    fn result(id: &str, success: bool, output: &str) -> SubAgentResult {
        SubAgentResult {
            subtask_id: id.to_string(),
            agent_type: AgentType::GeneralTaskExecutor,
            success,
            output: output.to_string(),
            error: if success { None } else { Some("failed".to_string()) },
            iterations: 1,
            duration_seconds: 1.0,
        }
    }

    #[tokio::test]
    async fn concatenate_single_subtask_returns_it_verbatim() {
        let aggregator = ResultAggregator::new(None);
        let aggregated = aggregator
            .aggregate(vec![result("s0", true, "hello")], AggregationStrategy::Concatenate, 1.0)
            .await;
        assert_eq!(aggregated.summary, "hello");
        assert!(aggregated.success);
    }

    #[tokio::test]
    async fn overall_success_requires_every_subtask_to_succeed() {
        let aggregator = ResultAggregator::new(None);
        let aggregated = aggregator
            .aggregate(
                vec![result("s0", true, "ok"), result("s1", false, "")],
                AggregationStrategy::List,
                2.0,
            )
            .await;
        assert!(!aggregated.success);
        assert_eq!(aggregated.failure_count, 1);
        assert_eq!(aggregated.success_count, 1);
    }

    #[tokio::test]
    async fn list_strategy_differs_from_concatenate() {
        let aggregator = ResultAggregator::new(None);
        let results = || vec![result("s0", true, "a"), result("s1", true, "b")];

        let concatenated = aggregator.aggregate(results(), AggregationStrategy::Concatenate, 1.0).await;
        let listed = aggregator.aggregate(results(), AggregationStrategy::List, 1.0).await;

        assert_ne!(concatenated.summary, listed.summary);
        let parsed: Value = serde_json::from_str(&listed.summary).unwrap();
        assert_eq!(parsed.as_array().unwrap().len(), 2);
        assert_eq!(parsed[0]["output"], "a");
        assert_eq!(parsed[1]["output"], "b");
    }

    #[tokio::test]
    async fn merge_json_concatenates_arrays_and_overwrites_scalars() {
        let aggregator = ResultAggregator::new(None);
        let aggregated = aggregator
            .aggregate(
                vec![
                    result("s0", true, r#"{"tags": ["a"], "name": "first"}"#),
                    result("s1", true, r#"{"tags": ["b"], "name": "second"}"#),
                ],
                AggregationStrategy::MergeJson,
                2.0,
            )
            .await;
        let parsed: Value = serde_json::from_str(&aggregated.summary).unwrap();
        assert_eq!(parsed["name"], "second");
        assert_eq!(parsed["tags"].as_array().unwrap().len(), 2);
    }
}
