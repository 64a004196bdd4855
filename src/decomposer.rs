//! Task Decomposer (spec §4.4): breaks a complex task into a dependency-aware DAG of
//! subtasks, each annotated with one of the 12 sub-agent specializations.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AgenticError;
use crate::llm::{ChatOptions, LlmClient, Message};
use crate::sub_agent::AgentType;

/// How the parallel executor should schedule a decomposition's subtasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExecutionStrategy {
    Parallel,
    Sequential,
    Mixed,
}

/// One node in the subtask DAG.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subtask {
    pub id: String,
    pub description: String,
    pub agent_type: AgentType,
    pub priority: u32,
    #[serde(default)]
    pub depends_on: Vec<String>,
}

/// The decomposer's full output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decomposition {
    pub requires_decomposition: bool,
    pub complexity: f64,
    pub subtasks: Vec<Subtask>,
    pub execution_strategy: ExecutionStrategy,
}

impl Decomposition {
    /// The safe fallback used on LLM error or invalid output: a single subtask mirroring
    /// the original task.
    pub(crate) fn fallback(task: &str) -> Self {
        Self {
            requires_decomposition: false,
            complexity: 0.0,
            subtasks: vec![Subtask {
                id: "subtask-0".to_string(),
                description: task.to_string(),
                agent_type: AgentType::GeneralTaskExecutor,
                priority: 0,
                depends_on: Vec::new(),
            }],
            execution_strategy: ExecutionStrategy::Sequential,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawSubtask {
    id: String,
    description: String,
    agent_type: String,
    #[serde(default)]
    priority: u32,
    #[serde(default)]
    depends_on: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawDecomposition {
    requires_decomposition: bool,
    complexity: f64,
    subtasks: Vec<RawSubtask>,
    execution_strategy: String,
}

pub struct TaskDecomposer<'a> {
    llm: &'a dyn LlmClient,
}

impl<'a> TaskDecomposer<'a> {
    pub fn new(llm: &'a dyn LlmClient) -> Self {
        Self { llm }
    }

    pub async fn decompose(&self, task: &str) -> Decomposition {
        match self.decompose_via_llm(task).await {
            Ok(decomposition) => decomposition,
            Err(e) => {
                if log::log_enabled!(log::Level::Warn) {
                    log::warn!("task decomposer: falling back to single subtask ({})", e);
                }
                Decomposition::fallback(task)
            }
        }
    }

    async fn decompose_via_llm(&self, task: &str) -> Result<Decomposition, AgenticError> {
        let prompt = format!(
            "Decompose the following task into 1-N subtasks for a multi-agent system. \
             Respond with only a JSON object: {{\"requires_decomposition\": bool, \
             \"complexity\": 0.0-1.0, \"execution_strategy\": \"PARALLEL\"|\"SEQUENTIAL\"|\"MIXED\", \
             \"subtasks\": [{{\"id\": string, \"description\": string, \"agent_type\": string, \
             \"priority\": int, \"depends_on\": [string]}}]}}.\n\nTask: {}",
            task
        );
        let reply = self
            .llm
            .chat(&[Message::user(prompt)], &ChatOptions::default())
            .await?;

        let json_str = extract_json_object(&reply.message.content).ok_or_else(|| {
            AgenticError::LLMInvalidResponse {
                detail: "no JSON object found in decomposition response".to_string(),
            }
        })?;

        let raw: RawDecomposition = serde_json::from_str(json_str).map_err(|e| {
            AgenticError::LLMInvalidResponse {
                detail: format!("decomposition JSON did not match expected shape: {}", e),
            }
        })?;

        let strategy = match raw.execution_strategy.to_uppercase().as_str() {
            "PARALLEL" => ExecutionStrategy::Parallel,
            "SEQUENTIAL" => ExecutionStrategy::Sequential,
            "MIXED" => ExecutionStrategy::Mixed,
            other => {
                return Err(AgenticError::LLMInvalidResponse {
                    detail: format!("unknown execution_strategy '{}'", other),
                })
            }
        };

        if raw.subtasks.is_empty() {
            return Err(AgenticError::LLMInvalidResponse {
                detail: "decomposition produced zero subtasks".to_string(),
            });
        }

        let mut subtasks = Vec::with_capacity(raw.subtasks.len());
        for rs in raw.subtasks {
            let agent_type = AgentType::from_keyword_str(&rs.agent_type).ok_or_else(|| {
                AgenticError::LLMInvalidResponse {
                    detail: format!("unknown agent_type '{}'", rs.agent_type),
                }
            })?;
            subtasks.push(Subtask {
                id: rs.id,
                description: rs.description,
                agent_type,
                priority: rs.priority,
                depends_on: rs.depends_on,
            });
        }

        validate_dag(&subtasks)?;

        Ok(Decomposition {
            requires_decomposition: raw.requires_decomposition,
            complexity: raw.complexity,
            subtasks,
            execution_strategy: strategy,
        })
    }
}

/// Validates that every `depends_on` reference is a known subtask id and that the DAG has
/// no cycles (detected by a failed topological sort).
fn validate_dag(subtasks: &[Subtask]) -> Result<(), AgenticError> {
    let ids: HashSet<&str> = subtasks.iter().map(|s| s.id.as_str()).collect();
    for s in subtasks {
        for dep in &s.depends_on {
            if !ids.contains(dep.as_str()) {
                return Err(AgenticError::LLMInvalidResponse {
                    detail: format!("subtask '{}' depends on unknown id '{}'", s.id, dep),
                });
            }
        }
    }
    topological_order(subtasks).map(|_| ()).ok_or_else(|| AgenticError::LLMInvalidResponse {
        detail: "subtask dependency graph contains a cycle".to_string(),
    })
}

/// Kahn's algorithm; returns `None` if the graph has a cycle, matching "a topological order
/// exists (no cycles)" in spec §8.
pub fn topological_order(subtasks: &[Subtask]) -> Option<Vec<String>> {
    let mut in_degree: HashMap<&str, usize> =
        subtasks.iter().map(|s| (s.id.as_str(), s.depends_on.len())).collect();
    let mut queue: Vec<&str> = in_degree
        .iter()
        .filter(|(_, &d)| d == 0)
        .map(|(id, _)| *id)
        .collect();
    queue.sort();

    let mut order = Vec::with_capacity(subtasks.len());
    let mut queue_idx = 0;
    while queue_idx < queue.len() {
        let current = queue[queue_idx];
        queue_idx += 1;
        order.push(current.to_string());
        let mut newly_ready: Vec<&str> = Vec::new();
        for s in subtasks {
            if s.depends_on.iter().any(|d| d == current) {
                let entry = in_degree.get_mut(s.id.as_str()).unwrap();
                *entry -= 1;
                if *entry == 0 {
                    newly_ready.push(s.id.as_str());
                }
            }
        }
        newly_ready.sort();
        queue.extend(newly_ready);
    }

    if order.len() == subtasks.len() {
        Some(order)
    } else {
        None
    }
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

/// Used by `crate::parallel_executor` to compute dependency levels directly from subtask
/// ids, reusing this module's validated topological machinery.
pub fn dependency_levels(subtasks: &[Subtask]) -> Vec<Vec<String>> {
    let mut remaining: HashMap<&str, &Subtask> = subtasks.iter().map(|s| (s.id.as_str(), s)).collect();
    let mut done: HashSet<&str> = HashSet::new();
    let mut levels = Vec::new();

    while !remaining.is_empty() {
        let mut ready: Vec<&str> = remaining
            .values()
            .filter(|s| s.depends_on.iter().all(|d| done.contains(d.as_str())))
            .map(|s| s.id.as_str())
            .collect();
        if ready.is_empty() {
            // Cycle (should have been rejected by validate_dag already); dump the rest as
            // one final level rather than looping forever.
            ready = remaining.keys().copied().collect();
        }
        ready.sort();
        for id in &ready {
            done.insert(id);
            remaining.remove(id);
        }
        levels.push(ready.into_iter().map(str::to_string).collect());
    }
    levels
}

/// Generates a fresh subtask id for callers constructing ad-hoc decompositions (e.g. in
/// tests) without going through the LLM.
pub fn new_subtask_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subtask(id: &str, deps: &[&str]) -> Subtask {
        Subtask {
            id: id.to_string(),
            description: "d".to_string(),
            agent_type: AgentType::GeneralTaskExecutor,
            priority: 0,
            depends_on: deps.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn topological_order_exists_for_dag() {
        let subtasks = vec![subtask("a", &[]), subtask("b", &["a"]), subtask("c", &["a", "b"])];
        let order = topological_order(&subtasks).unwrap();
        assert_eq!(order.len(), 3);
        assert!(order.iter().position(|x| x == "a").unwrap() < order.iter().position(|x| x == "b").unwrap());
    }

    #[test]
    fn cycle_is_detected() {
        let subtasks = vec![subtask("a", &["b"]), subtask("b", &["a"])];
        assert!(topological_order(&subtasks).is_none());
    }

    #[test]
    fn dependency_levels_group_independent_subtasks() {
        let subtasks = vec![subtask("a", &[]), subtask("b", &[]), subtask("c", &["a", "b"])];
        let levels = dependency_levels(&subtasks);
        assert_eq!(levels.len(), 2);
        assert_eq!(levels[0].len(), 2);
        assert_eq!(levels[1], vec!["c".to_string()]);
    }

    #[test]
    fn fallback_mirrors_original_task() {
        let decomposition = Decomposition::fallback("do the thing");
        assert_eq!(decomposition.subtasks.len(), 1);
        assert_eq!(decomposition.subtasks[0].description, "do the thing");
        assert!(!decomposition.requires_decomposition);
    }
}
