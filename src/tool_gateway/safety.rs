//! Safety Checker: validates tool invocations against allow/deny policy before they run.
//!
//! Specified in §6 as "consumed, not defined here" (`validate(tool_name, parameters,
//! context) → (allowed, reason)`); this module provides the trait plus one concrete
//! `AllowDenyPolicy` implementation driven by `crate::config::SafetyConfig`, following the
//! same pattern as the reference Tool Gateway: the engine depends only on the trait.

use serde_json::Value;

use crate::config::SafetyConfig;
use crate::tool_gateway::search_primitive::glob_matches;

/// Outcome of a safety check.
#[derive(Debug, Clone)]
pub struct SafetyVerdict {
    pub allowed: bool,
    pub reason: Option<String>,
}

impl SafetyVerdict {
    pub fn allow() -> Self {
        Self { allowed: true, reason: None }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self { allowed: false, reason: Some(reason.into()) }
    }
}

/// Dangerous shell patterns denied regardless of the allow/deny command lists — things no
/// on-premise runtime should execute no matter what the LLM asked for.
const DANGEROUS_PATTERNS: &[&str] = &[
    "rm -rf /", ":(){ :|:& };:", "mkfs", "> /dev/sd", "dd if=", "curl | sh", "wget | sh",
];

pub trait SafetyChecker: Send + Sync {
    fn validate(&self, tool_name: &str, parameters: &Value) -> SafetyVerdict;
}

/// Reference `SafetyChecker`: a command allow/denylist, a protected-path list, and a fixed
/// dangerous-pattern set, matching §6's configuration table.
pub struct AllowDenyPolicy {
    config: SafetyConfig,
}

impl AllowDenyPolicy {
    pub fn new(config: SafetyConfig) -> Self {
        Self { config }
    }

    fn validate_command(&self, cmd: &str) -> SafetyVerdict {
        for pattern in DANGEROUS_PATTERNS {
            if cmd.contains(pattern) {
                return SafetyVerdict::deny(format!("matches dangerous pattern '{}'", pattern));
            }
        }
        if !self.config.denied_commands.is_empty() {
            if let Some(denied) = self
                .config
                .denied_commands
                .iter()
                .find(|d| cmd.trim_start().starts_with(d.as_str()))
            {
                return SafetyVerdict::deny(format!("command starts with denied prefix '{}'", denied));
            }
        }
        if !self.config.allowed_commands.is_empty() {
            let allowed = self
                .config
                .allowed_commands
                .iter()
                .any(|a| cmd.trim_start().starts_with(a.as_str()));
            if !allowed {
                return SafetyVerdict::deny("command is not on the allowlist");
            }
        }
        SafetyVerdict::allow()
    }

    fn validate_path(&self, path: &str) -> SafetyVerdict {
        for protected in &self.config.protected_paths {
            if path.starts_with(protected.as_str()) {
                return SafetyVerdict::deny(format!("path is under protected prefix '{}'", protected));
            }
        }
        for pattern in &self.config.protected_patterns {
            if glob_matches(pattern, path) {
                return SafetyVerdict::deny(format!("path matches protected pattern '{}'", pattern));
            }
        }
        SafetyVerdict::allow()
    }
}

impl SafetyChecker for AllowDenyPolicy {
    fn validate(&self, tool_name: &str, parameters: &Value) -> SafetyVerdict {
        match tool_name {
            "RUN_COMMAND" => {
                let cmd = parameters.get("command").and_then(Value::as_str).unwrap_or("");
                self.validate_command(cmd)
            }
            "WRITE_FILE" | "READ_FILE" | "LIST_DIRECTORY" | "SEARCH_CODE" => {
                let path = parameters
                    .get("path")
                    .or_else(|| parameters.get("file_path"))
                    .or_else(|| parameters.get("directory"))
                    .and_then(Value::as_str)
                    .unwrap_or("");
                self.validate_path(path)
            }
            _ => SafetyVerdict::allow(),
        }
    }
}

/// Always-allow checker used in tests and for consumers that have no policy yet.
pub struct PermissiveChecker;

impl SafetyChecker for PermissiveChecker {
    fn validate(&self, _tool_name: &str, _parameters: &Value) -> SafetyVerdict {
        SafetyVerdict::allow()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn denies_dangerous_pattern_regardless_of_lists() {
        let policy = AllowDenyPolicy::new(SafetyConfig {
            allowed_commands: vec![],
            denied_commands: vec![],
            protected_paths: vec![],
            protected_patterns: vec![],
        });
        let verdict = policy.validate("RUN_COMMAND", &json!({"command": "rm -rf /"}));
        assert!(!verdict.allowed);
    }

    #[test]
    fn denies_protected_path() {
        let policy = AllowDenyPolicy::new(SafetyConfig {
            allowed_commands: vec![],
            denied_commands: vec![],
            protected_paths: vec!["/etc".to_string()],
            protected_patterns: vec![],
        });
        let verdict = policy.validate("READ_FILE", &json!({"path": "/etc/passwd"}));
        assert!(!verdict.allowed);
    }

    #[test]
    fn denies_path_matching_protected_pattern() {
        let policy = AllowDenyPolicy::new(SafetyConfig {
            allowed_commands: vec![],
            denied_commands: vec![],
            protected_paths: vec![],
            protected_patterns: vec!["*.pem".to_string()],
        });
        let verdict = policy.validate("READ_FILE", &json!({"path": "/workspace/server.pem"}));
        assert!(!verdict.allowed);
    }

    #[test]
    fn allows_command_on_allowlist() {
        let policy = AllowDenyPolicy::new(SafetyConfig::default());
        let verdict = policy.validate("RUN_COMMAND", &json!({"command": "cargo test"}));
        assert!(verdict.allowed);
    }

    #[test]
    fn denies_command_off_allowlist() {
        let policy = AllowDenyPolicy::new(SafetyConfig::default());
        let verdict = policy.validate("RUN_COMMAND", &json!({"command": "curl evil.sh"}));
        assert!(!verdict.allowed);
    }
}
