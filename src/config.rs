//! Runtime configuration.
//!
//! Unlike the teacher's deliberately code-only `CloudLLMConfig`, this runtime's configuration
//! surface is large enough (llm/workflows/workspace/safety/observability sections) to warrant
//! file-based loading, so every section derives `serde::Deserialize` with `#[serde(default)]`
//! and can be parsed from TOML. The struct remains fully usable without a config file —
//! `RuntimeConfig::default()` is a complete, valid configuration on its own.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::llm::EndpointMode;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub endpoints: Vec<String>,
    pub model: String,
    pub api_key: String,
    pub max_retries: u32,
    pub request_timeout_seconds: u64,
    pub health_check_interval_seconds: u64,
    /// Selection policy across `endpoints`: spread load across every healthy endpoint, or
    /// prefer the first and only fail over when it's unreachable.
    pub mode: EndpointMode,
    pub temperature: f64,
    pub max_tokens: Option<u32>,
    pub top_p: f64,
    /// Toggles whether the execute node strips and surfaces `<think>...</think>` blocks as
    /// `cot` progress updates, or leaves them in the response text untouched.
    pub chain_of_thought_enabled: bool,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoints: vec!["http://localhost:8080".to_string()],
            model: "local-model".to_string(),
            api_key: "placeholder".to_string(),
            max_retries: 4,
            request_timeout_seconds: 120,
            health_check_interval_seconds: 30,
            mode: EndpointMode::ActiveActive,
            temperature: 0.7,
            max_tokens: None,
            top_p: 1.0,
            chain_of_thought_enabled: true,
        }
    }
}

impl LlmConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval_seconds)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkflowsConfig {
    pub max_iterations: u32,
    pub recursion_limit: Option<u32>,
    pub complexity_threshold: f64,
    pub max_prompt_tokens: usize,
    pub max_prompt_tokens_sub_agent: usize,
    /// Per-task ceiling (spec §6); `None` leaves a task to run until `max_iterations`
    /// exhausts it rather than imposing a wall-clock bound.
    pub timeout_seconds: Option<u64>,
}

impl Default for WorkflowsConfig {
    fn default() -> Self {
        Self {
            max_iterations: 15,
            recursion_limit: None,
            complexity_threshold: 0.6,
            max_prompt_tokens: 3072,
            max_prompt_tokens_sub_agent: 1024,
            timeout_seconds: None,
        }
    }
}

impl WorkflowsConfig {
    pub fn timeout(&self) -> Option<std::time::Duration> {
        self.timeout_seconds.map(std::time::Duration::from_secs)
    }
}

impl WorkflowsConfig {
    /// `recursion_limit_effective = max(configured, max_iterations * 6)`, per the engine's
    /// anti-starvation rule.
    pub fn recursion_limit_effective(&self) -> u32 {
        self.recursion_limit
            .unwrap_or(0)
            .max(self.max_iterations.saturating_mul(6))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    pub default_path: PathBuf,
    pub allowed_extensions: Vec<String>,
    /// If true, each task runs inside its own subdirectory of `default_path` (named after
    /// its `task_id`) rather than sharing `default_path` directly.
    pub isolation: bool,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            default_path: PathBuf::from("."),
            allowed_extensions: Vec::new(),
            isolation: false,
        }
    }
}

impl WorkspaceConfig {
    /// Resolves the workspace directory for one task, honoring `isolation`.
    pub fn resolve_for_task(&self, task_id: &str) -> PathBuf {
        if self.isolation {
            self.default_path.join(task_id)
        } else {
            self.default_path.clone()
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SafetyConfig {
    pub allowed_commands: Vec<String>,
    pub denied_commands: Vec<String>,
    pub protected_paths: Vec<String>,
    /// Glob-ish patterns (leading/trailing `*`, else substring) matched against tool paths
    /// in addition to the literal `protected_paths` prefixes.
    pub protected_patterns: Vec<String>,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            allowed_commands: vec![
                "ls".into(), "cat".into(), "grep".into(), "find".into(), "git".into(),
                "cargo".into(), "echo".into(), "pwd".into(), "head".into(), "tail".into(),
            ],
            denied_commands: vec![
                "rm".into(), "sudo".into(), "shutdown".into(), "reboot".into(),
                "mkfs".into(), "dd".into(), "chmod".into(), "chown".into(),
            ],
            protected_paths: Vec::new(),
            protected_patterns: vec!["*.pem".into(), "*.key".into(), "*id_rsa*".into()],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub log_file: Option<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_file: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SubAgentConfig {
    pub max_concurrent: usize,
    pub max_iterations: u32,
    pub timeout_seconds: u64,
}

impl Default for SubAgentConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 4,
            max_iterations: 10,
            timeout_seconds: 300,
        }
    }
}

/// Top-level runtime configuration, aggregating every section named in the external
/// interfaces' configuration table.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RuntimeConfig {
    pub llm: LlmConfig,
    pub workflows: WorkflowsConfig,
    pub workspace: WorkspaceConfig,
    pub safety: SafetyConfig,
    pub observability: ObservabilityConfig,
    pub sub_agents: SubAgentConfig,
}

impl RuntimeConfig {
    /// Parse a `RuntimeConfig` from a TOML document. Missing sections and fields fall back
    /// to their defaults.
    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    pub fn from_toml_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigLoadError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigLoadError::Io(path.as_ref().display().to_string(), e))?;
        Self::from_toml_str(&contents).map_err(ConfigLoadError::Parse)
    }
}

#[derive(Debug)]
pub enum ConfigLoadError {
    Io(String, std::io::Error),
    Parse(toml::de::Error),
}

impl std::fmt::Display for ConfigLoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigLoadError::Io(path, e) => write!(f, "could not read config file '{}': {}", path, e),
            ConfigLoadError::Parse(e) => write!(f, "could not parse config TOML: {}", e),
        }
    }
}

impl std::error::Error for ConfigLoadError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_self_consistent() {
        let config = RuntimeConfig::default();
        assert_eq!(config.llm.endpoints.len(), 1);
        assert_eq!(config.workflows.recursion_limit_effective(), 90);
    }

    #[test]
    fn partial_toml_fills_remaining_fields_with_defaults() {
        let toml_str = r#"
            [llm]
            model = "custom-model"
        "#;
        let config = RuntimeConfig::from_toml_str(toml_str).unwrap();
        assert_eq!(config.llm.model, "custom-model");
        assert_eq!(config.llm.max_retries, 4);
        assert_eq!(config.workflows.max_iterations, 15);
    }

    #[test]
    fn workspace_isolation_nests_under_task_id() {
        let mut workspace = WorkspaceConfig::default();
        workspace.isolation = true;
        assert_eq!(workspace.resolve_for_task("task-123"), PathBuf::from("./task-123"));

        workspace.isolation = false;
        assert_eq!(workspace.resolve_for_task("task-123"), PathBuf::from("."));
    }

    #[test]
    fn workflows_timeout_is_none_by_default() {
        assert!(WorkflowsConfig::default().timeout().is_none());
    }

    #[test]
    fn llm_mode_parses_from_kebab_case_toml() {
        let toml_str = r#"
            [llm]
            mode = "primary-secondary"
        "#;
        let config = RuntimeConfig::from_toml_str(toml_str).unwrap();
        assert_eq!(config.llm.mode, crate::llm::EndpointMode::PrimarySecondary);
    }

    #[test]
    fn recursion_limit_effective_respects_explicit_override() {
        let mut config = WorkflowsConfig::default();
        config.recursion_limit = Some(500);
        assert_eq!(config.recursion_limit_effective(), 500);
    }
}
