//! Recursive file search by path pattern and content.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::args::{self, non_empty};
use crate::path_guard::{relative_display, resolve_path};
use crate::{Tool, ToolContext, ToolResult};

pub struct SearchFilesTool {
    max_results: usize,
    exclude: Vec<String>,
}

impl SearchFilesTool {
    pub fn new(max_results: usize, exclude: Vec<String>) -> Self {
        Self {
            max_results,
            exclude,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchFilesArgs {
    #[serde(default, deserialize_with = "non_empty")]
    path: Option<String>,
    #[serde(default, deserialize_with = "non_empty")]
    filter: Option<String>,
    #[serde(default, deserialize_with = "non_empty")]
    contains: Option<String>,
}

/// Path filter: a regex, or a glob when the text is not a valid regex.
#[derive(Debug)]
enum PathFilter {
    Regex(Regex),
    Glob(glob::Pattern),
}

impl PathFilter {
    fn parse(raw: &str) -> Result<Self, String> {
        if let Ok(re) = Regex::new(raw) {
            return Ok(PathFilter::Regex(re));
        }
        glob::Pattern::new(raw)
            .map(PathFilter::Glob)
            .map_err(|e| format!("filter '{raw}' is neither a regex nor a glob: {e}"))
    }

    fn matches(&self, relative: &str) -> bool {
        match self {
            PathFilter::Regex(re) => re.is_match(relative),
            PathFilter::Glob(pattern) => pattern.matches(relative),
        }
    }
}

struct Search<'a> {
    workspace: &'a Path,
    filter: Option<PathFilter>,
    contains: Option<Regex>,
    exclude: &'a [String],
    max_results: usize,
    found: Vec<String>,
    truncated: bool,
}

impl Search<'_> {
    fn walk(&mut self, dir: &Path) -> std::io::Result<()> {
        let mut entries: Vec<_> = std::fs::read_dir(dir)?.filter_map(|e| e.ok()).collect();
        entries.sort_by_key(|e| e.file_name());

        for entry in entries {
            if self.truncated {
                return Ok(());
            }
            let name = entry.file_name();
            let name = name.to_string_lossy();
            let path = entry.path();
            // Symlinks are reported but never followed.
            let Ok(file_type) = entry.file_type() else {
                continue;
            };

            if file_type.is_dir() {
                if self.exclude.iter().any(|x| x == name.as_ref()) {
                    continue;
                }
                if self.contains.is_none() {
                    let display = format!("{}/", relative_display(&path, self.workspace));
                    self.consider(display, &path);
                }
                if let Err(e) = self.walk(&path) {
                    debug!(path = %path.display(), error = %e, "Skipping unreadable directory");
                }
            } else {
                let display = relative_display(&path, self.workspace);
                self.consider(display, &path);
            }
        }
        Ok(())
    }

    fn consider(&mut self, display: String, path: &Path) {
        if let Some(filter) = &self.filter {
            if !filter.matches(display.trim_end_matches('/')) {
                return;
            }
        }
        if let Some(re) = &self.contains {
            match std::fs::read_to_string(path) {
                Ok(content) if re.is_match(&content) => {}
                _ => return,
            }
        }
        if self.found.len() >= self.max_results {
            self.truncated = true;
            return;
        }
        self.found.push(display);
    }
}

#[async_trait]
impl Tool for SearchFilesTool {
    fn name(&self) -> &str {
        "search_files"
    }

    fn description(&self) -> &str {
        "Recursively search a directory for files whose path matches a filter (regex or glob such as \"*.go\") and whose content matches an optional regex. Returns workspace-relative paths; directories end with '/'."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Directory to search from. Default: \".\""
                },
                "filter": {
                    "type": "string",
                    "description": "Regex or glob matched against the relative path (e.g. \"*.go\", \"^src/.*\\\\.rs$\")"
                },
                "contains": {
                    "type": "string",
                    "description": "Regex a file's content must match"
                }
            }
        })
    }

    async fn execute(
        &self,
        params: serde_json::Value,
        context: &ToolContext,
    ) -> anyhow::Result<ToolResult> {
        let args: SearchFilesArgs = args::decode(self.name(), params)?;
        let raw_path = args.path.as_deref().unwrap_or(".");

        let root = match resolve_path(raw_path, &context.workspace, context.restrict_to_workspace) {
            Ok(p) => p,
            Err(e) => return Ok(ToolResult::failed(format!("Path error: {e}"))),
        };
        if !root.is_dir() {
            return Ok(ToolResult::failed(format!("Not a directory: {raw_path}")));
        }

        let filter = match args.filter.as_deref().map(PathFilter::parse).transpose() {
            Ok(f) => f,
            Err(e) => return Ok(ToolResult::failed(e)),
        };
        let contains = match args.contains.as_deref().map(Regex::new).transpose() {
            Ok(c) => c,
            Err(e) => return Ok(ToolResult::failed(format!("invalid contains regex: {e}"))),
        };

        let workspace: PathBuf = context
            .workspace
            .canonicalize()
            .unwrap_or_else(|_| context.workspace.clone());
        let exclude = self.exclude.clone();
        let max_results = self.max_results;

        let (found, truncated) = tokio::task::spawn_blocking(move || {
            let mut search = Search {
                workspace: &workspace,
                filter,
                contains,
                exclude: &exclude,
                max_results,
                found: Vec::new(),
                truncated: false,
            };
            search.walk(&root).map(|_| (search.found, search.truncated))
        })
        .await??;

        let count = found.len();
        Ok(ToolResult::success(json!({
            "files": found,
            "count": count,
            "truncated": truncated,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool() -> SearchFilesTool {
        SearchFilesTool::new(1000, vec![".git".into(), "vendor".into()])
    }

    fn fixture() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("cmd/app")).unwrap();
        std::fs::create_dir_all(root.join("vendor/lib")).unwrap();
        std::fs::create_dir_all(root.join(".git")).unwrap();
        std::fs::write(root.join("main.go"), "package main\nfunc main() {}\n").unwrap();
        std::fs::write(root.join("cmd/app/app.go"), "package app\n// TODO: wire\n").unwrap();
        std::fs::write(root.join("README.md"), "# readme\n").unwrap();
        std::fs::write(root.join("vendor/lib/dep.go"), "package lib\n").unwrap();
        std::fs::write(root.join(".git/HEAD"), "ref: main\n").unwrap();
        dir
    }

    fn files(result: &ToolResult) -> Vec<String> {
        result.data["files"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap().to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_glob_filter_star_go() {
        let dir = fixture();
        let result = tool()
            .execute(json!({"path": ".", "filter": "*.go"}), &ToolContext::new(dir.path()))
            .await
            .unwrap();
        assert!(result.is_success());
        assert_eq!(files(&result), vec!["cmd/app/app.go", "main.go"]);
    }

    #[tokio::test]
    async fn test_regex_filter() {
        let dir = fixture();
        let result = tool()
            .execute(json!({"filter": "^cmd/.*\\.go$"}), &ToolContext::new(dir.path()))
            .await
            .unwrap();
        assert_eq!(files(&result), vec!["cmd/app/app.go"]);
    }

    #[tokio::test]
    async fn test_no_filter_lists_dirs_with_slash_and_skips_excluded() {
        let dir = fixture();
        let result = tool()
            .execute(json!({}), &ToolContext::new(dir.path()))
            .await
            .unwrap();
        assert_eq!(
            files(&result),
            vec!["README.md", "cmd/", "cmd/app/", "cmd/app/app.go", "main.go"]
        );
    }

    #[tokio::test]
    async fn test_contains_matches_content() {
        let dir = fixture();
        let result = tool()
            .execute(json!({"contains": "TODO"}), &ToolContext::new(dir.path()))
            .await
            .unwrap();
        assert_eq!(files(&result), vec!["cmd/app/app.go"]);
    }

    #[tokio::test]
    async fn test_subdirectory_reports_workspace_relative_paths() {
        let dir = fixture();
        let result = tool()
            .execute(json!({"path": "cmd"}), &ToolContext::new(dir.path()))
            .await
            .unwrap();
        assert_eq!(files(&result), vec!["cmd/app/", "cmd/app/app.go"]);
    }

    #[tokio::test]
    async fn test_max_results_truncates() {
        let dir = fixture();
        let result = SearchFilesTool::new(1, vec![])
            .execute(json!({"filter": "*.go"}), &ToolContext::new(dir.path()))
            .await
            .unwrap();
        assert_eq!(result.data["count"], 1);
        assert_eq!(result.data["truncated"], true);
    }

    #[tokio::test]
    async fn test_missing_directory_fails() {
        let dir = fixture();
        let result = tool()
            .execute(json!({"path": "nope"}), &ToolContext::new(dir.path()))
            .await
            .unwrap();
        assert!(!result.is_success());
    }

    #[tokio::test]
    async fn test_bad_contains_regex_fails() {
        let dir = fixture();
        let result = tool()
            .execute(json!({"contains": "("}), &ToolContext::new(dir.path()))
            .await
            .unwrap();
        assert!(result.data["error"].as_str().unwrap().contains("contains"));
    }
}
