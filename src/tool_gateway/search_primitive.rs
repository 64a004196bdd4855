//! Naive recursive text search, grounded in `fs_primitive`'s directory walk.
//!
//! The teacher has no standalone search tool (its `tools/` module covers filesystem and
//! bash only); this is additive scaffolding per SPEC_FULL.md's reference Tool Gateway,
//! built the same restricted-root way `FileSystemTool` is.

use std::fs;
use std::path::{Path, PathBuf};

use super::fs_primitive::{FileSystemError, FileSystemTool};

/// One line matching a search pattern.
#[derive(Debug, Clone)]
pub struct SearchMatch {
    pub path: String,
    pub line_number: usize,
    pub line: String,
}

/// Simple substring search over files under `directory`, optionally restricted to names
/// matching `glob` (a plain suffix/prefix/substring matcher — not a full glob grammar).
pub struct SearchPrimitive<'a> {
    fs: &'a FileSystemTool,
}

impl<'a> SearchPrimitive<'a> {
    pub fn new(fs: &'a FileSystemTool) -> Self {
        Self { fs }
    }

    pub async fn search(
        &self,
        directory: &str,
        pattern: &str,
        glob: Option<&str>,
    ) -> Result<Vec<SearchMatch>, FileSystemError> {
        let root = self.fs.resolve(directory)?;
        let mut matches = Vec::new();
        self.walk(&root, pattern, glob, &mut matches)?;
        Ok(matches)
    }

    fn walk(
        &self,
        dir: &Path,
        pattern: &str,
        glob: Option<&str>,
        out: &mut Vec<SearchMatch>,
    ) -> Result<(), FileSystemError> {
        let entries = fs::read_dir(dir)
            .map_err(|e| FileSystemError::IOError(format!("read_dir '{}': {}", dir.display(), e)))?;
        for entry in entries {
            let entry =
                entry.map_err(|e| FileSystemError::IOError(format!("dir entry: {}", e)))?;
            let path: PathBuf = entry.path();
            let file_type = entry
                .file_type()
                .map_err(|e| FileSystemError::IOError(format!("file_type: {}", e)))?;
            if file_type.is_dir() {
                self.walk(&path, pattern, glob, out)?;
                continue;
            }
            if let Some(g) = glob {
                let name = path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
                if !glob_matches(g, &name) {
                    continue;
                }
            }
            let Ok(content) = fs::read_to_string(&path) else {
                continue; // binary or unreadable file, skip
            };
            for (i, line) in content.lines().enumerate() {
                if line.contains(pattern) {
                    out.push(SearchMatch {
                        path: path.display().to_string(),
                        line_number: i + 1,
                        line: line.to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Tolerant glob matcher: supports a single leading and/or trailing `*`, otherwise falls
/// back to substring containment. Also used by the Safety Checker to match
/// `protected_patterns` against tool-invocation paths.
pub(crate) fn glob_matches(glob: &str, name: &str) -> bool {
    if let Some(suffix) = glob.strip_prefix('*') {
        return name.ends_with(suffix);
    }
    if let Some(prefix) = glob.strip_suffix('*') {
        return name.starts_with(prefix);
    }
    name.contains(glob)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn finds_matching_lines_recursively() {
        let temp_dir = TempDir::new().unwrap();
        let fs = FileSystemTool::new().with_root_path(temp_dir.path().to_path_buf());
        fs.write_file("a.rs", "fn main() {}\nlet needle = 1;").await.unwrap();
        fs.create_directory("sub").await.unwrap();
        fs.write_file("sub/b.rs", "let needle = 2;").await.unwrap();

        let search = SearchPrimitive::new(&fs);
        let matches = search.search(".", "needle", None).await.unwrap();
        assert_eq!(matches.len(), 2);
    }

    #[tokio::test]
    async fn glob_restricts_to_matching_file_names() {
        let temp_dir = TempDir::new().unwrap();
        let fs = FileSystemTool::new().with_root_path(temp_dir.path().to_path_buf());
        fs.write_file("a.rs", "needle").await.unwrap();
        fs.write_file("a.txt", "needle").await.unwrap();

        let search = SearchPrimitive::new(&fs);
        let matches = search.search(".", "needle", Some("*.rs")).await.unwrap();
        assert_eq!(matches.len(), 1);
        assert!(matches[0].path.ends_with("a.rs"));
    }
}
