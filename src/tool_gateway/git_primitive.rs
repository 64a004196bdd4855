//! `git status` support for the reference Tool Gateway, built on `process_primitive`'s
//! `BashTool` the same way the rest of the gateway composes primitives rather than
//! shelling out ad hoc.

use super::process_primitive::{BashError, BashResult, BashTool};

pub struct GitPrimitive<'a> {
    bash: &'a BashTool,
}

/// Parsed `git status --porcelain=v1` output.
#[derive(Debug, Clone)]
pub struct GitStatus {
    pub branch: Option<String>,
    pub entries: Vec<GitStatusEntry>,
    pub clean: bool,
}

#[derive(Debug, Clone)]
pub struct GitStatusEntry {
    pub path: String,
    pub code: String,
}

impl<'a> GitPrimitive<'a> {
    pub fn new(bash: &'a BashTool) -> Self {
        Self { bash }
    }

    pub async fn status(&self, repo: &str) -> Result<GitStatus, BashError> {
        let cmd = format!("git -C {} status --porcelain=v1 --branch", shell_quote(repo));
        let result: BashResult = self.bash.execute(&cmd).await?;
        if !result.success {
            return Err(BashError::ExecutionFailed(result.stderr));
        }
        Ok(parse_porcelain(&result.stdout))
    }
}

fn shell_quote(path: &str) -> String {
    format!("'{}'", path.replace('\'', "'\\''"))
}

fn parse_porcelain(stdout: &str) -> GitStatus {
    let mut branch = None;
    let mut entries = Vec::new();
    for line in stdout.lines() {
        if let Some(rest) = line.strip_prefix("## ") {
            branch = Some(rest.split("...").next().unwrap_or(rest).to_string());
            continue;
        }
        if line.len() >= 3 {
            entries.push(GitStatusEntry {
                code: line[..2].to_string(),
                path: line[3..].to_string(),
            });
        }
    }
    let clean = entries.is_empty();
    GitStatus { branch, entries, clean }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_branch_and_entries() {
        let stdout = "## main...origin/main\n M src/lib.rs\n?? new_file.rs\n";
        let status = parse_porcelain(stdout);
        assert_eq!(status.branch.as_deref(), Some("main"));
        assert_eq!(status.entries.len(), 2);
        assert!(!status.clean);
    }

    #[test]
    fn empty_status_is_clean() {
        let status = parse_porcelain("## main...origin/main\n");
        assert!(status.clean);
    }
}
