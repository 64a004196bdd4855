//! `ToolResult` and the `ToolGateway` trait the workflow engine executes actions through,
//! plus `LocalToolGateway`, the in-process reference implementation described in
//! SPEC_FULL.md §2.
//!
//! Per the design note on "duck-typed tool result wrapping" (spec §9): every operation
//! returns the same concrete `ToolResult`, constructed once with its full `metadata`, and
//! nothing downstream is allowed to rebuild a narrower copy — the workflow engine's
//! `tool_calls` records this value unchanged.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::fs_primitive::FileSystemTool;
use super::git_primitive::GitPrimitive;
use super::process_primitive::{BashTool, Platform};
use super::search_primitive::SearchPrimitive;

/// The uniform shape every tool invocation returns, across every layer (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    pub output: Value,
    pub error: Option<String>,
    pub metadata: Map<String, Value>,
}

impl ToolResult {
    pub fn ok(output: Value, metadata: Map<String, Value>) -> Self {
        Self { success: true, output, error: None, metadata }
    }

    pub fn fail(error: impl Into<String>) -> Self {
        Self { success: false, output: Value::Null, error: Some(error.into()), metadata: Map::new() }
    }

    pub fn fail_with_metadata(error: impl Into<String>, metadata: Map<String, Value>) -> Self {
        Self { success: false, output: Value::Null, error: Some(error.into()), metadata }
    }
}

/// The narrow capability interface consumed by the workflow engine (spec §6). The engine
/// never depends on `LocalToolGateway` directly, only on this trait.
#[async_trait]
pub trait ToolGateway: Send + Sync {
    async fn read_file(&self, path: &str) -> ToolResult;
    async fn write_file(&self, path: &str, content: &str) -> ToolResult;
    async fn list_directory(&self, path: &str, recursive: bool) -> ToolResult;
    async fn search(&self, pattern: &str, glob: Option<&str>) -> ToolResult;
    async fn run_command(&self, cmd: &str, cwd: Option<&str>, timeout_secs: Option<u64>) -> ToolResult;
    async fn git_status(&self, repo: &str) -> ToolResult;
}

/// In-process, sandboxed reference `ToolGateway`: filesystem + process + naive text search
/// + git status, all restricted to `workspace_root`.
pub struct LocalToolGateway {
    fs: FileSystemTool,
    bash: BashTool,
    workspace_root: PathBuf,
}

impl LocalToolGateway {
    pub fn new(workspace_root: PathBuf) -> Self {
        let fs = FileSystemTool::new().with_root_path(workspace_root.clone());
        let bash = BashTool::new(Platform::Linux).with_cwd_restriction(workspace_root.clone());
        Self { fs, bash, workspace_root }
    }

    pub fn workspace_root(&self) -> &std::path::Path {
        &self.workspace_root
    }
}

#[async_trait]
impl ToolGateway for LocalToolGateway {
    async fn read_file(&self, path: &str) -> ToolResult {
        match self.fs.read_file(path).await {
            Ok(content) => {
                let resolved = self.fs.resolve(path).unwrap_or_else(|_| PathBuf::from(path));
                let absolute = resolved.canonicalize().unwrap_or(resolved);
                let mut metadata = Map::new();
                metadata.insert("path".into(), json!(absolute.display().to_string()));
                metadata.insert("bytes".into(), json!(content.len()));
                metadata.insert("lines".into(), json!(content.lines().count()));
                ToolResult::ok(json!(content), metadata)
            }
            Err(e) => ToolResult::fail(e.to_string()),
        }
    }

    async fn write_file(&self, path: &str, content: &str) -> ToolResult {
        match self.fs.write_file(path, content).await {
            Ok(()) => {
                let resolved = self.fs.resolve(path).unwrap_or_else(|_| PathBuf::from(path));
                let absolute = resolved.canonicalize().unwrap_or(resolved);
                let mut metadata = Map::new();
                metadata.insert("path".into(), json!(absolute.display().to_string()));
                metadata.insert("bytes".into(), json!(content.len()));
                metadata.insert("lines".into(), json!(content.lines().count()));
                ToolResult::ok(json!({"path": absolute.display().to_string()}), metadata)
            }
            Err(e) => ToolResult::fail(e.to_string()),
        }
    }

    async fn list_directory(&self, path: &str, recursive: bool) -> ToolResult {
        match self.fs.read_directory(path, recursive).await {
            Ok(entries) => {
                let output: Vec<Value> = entries
                    .iter()
                    .map(|e| {
                        json!({
                            "name": e.name,
                            "type": if e.is_directory { "dir" } else { "file" },
                            "size": e.size,
                        })
                    })
                    .collect();
                let mut metadata = Map::new();
                metadata.insert("count".into(), json!(output.len()));
                ToolResult::ok(json!(output), metadata)
            }
            Err(e) => ToolResult::fail(e.to_string()),
        }
    }

    async fn search(&self, pattern: &str, glob: Option<&str>) -> ToolResult {
        let search = SearchPrimitive::new(&self.fs);
        match search.search(".", pattern, glob).await {
            Ok(matches) => {
                let output: Vec<Value> = matches
                    .iter()
                    .map(|m| json!({"path": m.path, "line_number": m.line_number, "line": m.line}))
                    .collect();
                let mut metadata = Map::new();
                metadata.insert("match_count".into(), json!(output.len()));
                ToolResult::ok(json!(output), metadata)
            }
            Err(e) => ToolResult::fail(e.to_string()),
        }
    }

    async fn run_command(&self, cmd: &str, cwd: Option<&str>, timeout_secs: Option<u64>) -> ToolResult {
        let mut bash = self.bash.clone();
        if let Some(secs) = timeout_secs {
            bash = bash.with_timeout(secs);
        }
        if let Some(dir) = cwd {
            bash = bash.with_cwd_restriction(self.workspace_root.join(dir));
        }
        match bash.execute(cmd).await {
            Ok(result) => {
                let mut metadata = Map::new();
                metadata.insert("exit_code".into(), json!(result.exit_code));
                metadata.insert("duration_ms".into(), json!(result.duration_ms));
                if result.success {
                    ToolResult::ok(json!({"stdout": result.stdout, "stderr": result.stderr}), metadata)
                } else {
                    ToolResult::fail_with_metadata(
                        format!("command exited with code {}: {}", result.exit_code, result.stderr),
                        metadata,
                    )
                }
            }
            Err(e) => ToolResult::fail(e.to_string()),
        }
    }

    async fn git_status(&self, repo: &str) -> ToolResult {
        let git = GitPrimitive::new(&self.bash);
        match git.status(repo).await {
            Ok(status) => {
                let entries: Vec<Value> = status
                    .entries
                    .iter()
                    .map(|e| json!({"path": e.path, "code": e.code}))
                    .collect();
                let mut metadata = Map::new();
                metadata.insert("clean".into(), json!(status.clean));
                ToolResult::ok(json!({"branch": status.branch, "entries": entries}), metadata)
            }
            Err(e) => ToolResult::fail(e.to_string()),
        }
    }
}

/// Timeout wrapper used by the workflow engine's execute node for the per-tool timeout
/// (default 30s, spec §5). Not part of the `ToolGateway` trait itself — the engine applies
/// it uniformly to whichever gateway it was given.
pub async fn with_timeout(duration: Duration, result: impl std::future::Future<Output = ToolResult>) -> ToolResult {
    match tokio::time::timeout(duration, result).await {
        Ok(r) => r,
        Err(_) => ToolResult::fail(format!("tool call timed out after {}s", duration.as_secs())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn write_then_read_preserves_metadata() {
        let temp_dir = TempDir::new().unwrap();
        let gateway = LocalToolGateway::new(temp_dir.path().to_path_buf());

        let write_result = gateway.write_file("notes.txt", "hello world").await;
        assert!(write_result.success);
        assert!(write_result.metadata.contains_key("path"));
        assert_eq!(write_result.metadata["bytes"], json!(11));

        let read_result = gateway.read_file("notes.txt").await;
        assert!(read_result.success);
        assert_eq!(read_result.output, json!("hello world"));
        assert!(read_result.metadata["path"].as_str().unwrap().starts_with('/'));
    }

    #[tokio::test]
    async fn read_missing_file_fails_without_panicking() {
        let temp_dir = TempDir::new().unwrap();
        let gateway = LocalToolGateway::new(temp_dir.path().to_path_buf());
        let result = gateway.read_file("missing.txt").await;
        assert!(!result.success);
        assert!(result.error.is_some());
    }

    #[tokio::test]
    async fn list_directory_reports_entries() {
        let temp_dir = TempDir::new().unwrap();
        let gateway = LocalToolGateway::new(temp_dir.path().to_path_buf());
        gateway.write_file("a.txt", "x").await;
        gateway.write_file("b.txt", "y").await;

        let result = gateway.list_directory(".", false).await;
        assert!(result.success);
        assert_eq!(result.metadata["count"], json!(2));
    }

    #[tokio::test]
    async fn run_command_times_out() {
        let temp_dir = TempDir::new().unwrap();
        let gateway = LocalToolGateway::new(temp_dir.path().to_path_buf());
        let result = with_timeout(Duration::from_millis(1), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            ToolResult::ok(Value::Null, Map::new())
        })
        .await;
        assert!(!result.success);
        let _ = gateway; // silence unused warning if gateway unused on this path
    }
}
