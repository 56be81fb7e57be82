//! File reading tool.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::args::{self, lenient_opt_usize};
use crate::path_guard::{relative_display, resolve_path};
use crate::{Tool, ToolContext, ToolResult};

pub struct ReadFileTool {
    max_words: usize,
}

impl ReadFileTool {
    pub fn new(max_words: usize) -> Self {
        Self { max_words }
    }
}

#[derive(Debug, Deserialize)]
struct ReadFileArgs {
    path: String,
    #[serde(default, deserialize_with = "lenient_opt_usize")]
    offset: Option<usize>,
    #[serde(default, deserialize_with = "lenient_opt_usize")]
    limit: Option<usize>,
}

/// Cut `text` before its `max_words + 1`-th whitespace-separated word.
fn truncate_words(text: &str, max_words: usize) -> (&str, bool) {
    let mut words = 0;
    let mut in_word = false;
    for (pos, ch) in text.char_indices() {
        if ch.is_whitespace() {
            in_word = false;
        } else if !in_word {
            in_word = true;
            words += 1;
            if words > max_words {
                return (text[..pos].trim_end(), true);
            }
        }
    }
    (text, false)
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read the contents of a file, optionally starting at a line offset and limited to a number of lines. Long files are truncated."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path to the file (relative to workspace or absolute)"
                },
                "offset": {
                    "type": "integer",
                    "description": "Line number to start from (0-indexed)"
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum number of lines to return"
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(
        &self,
        params: serde_json::Value,
        context: &ToolContext,
    ) -> anyhow::Result<ToolResult> {
        let args: ReadFileArgs = args::decode(self.name(), params)?;

        let path = match resolve_path(&args.path, &context.workspace, context.restrict_to_workspace) {
            Ok(p) => p,
            Err(e) => return Ok(ToolResult::failed(format!("Path error: {e}"))),
        };

        if !path.exists() {
            return Ok(ToolResult::failed(format!("File not found: {}", args.path)));
        }

        if !path.is_file() {
            return Ok(ToolResult::failed(format!("Not a file: {}", args.path)));
        }

        let content = match tokio::fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) => return Ok(ToolResult::failed(format!("Read error: {e}"))),
        };

        let lines: Vec<&str> = content.split_inclusive('\n').collect();
        let total_lines = lines.len();
        let offset = args.offset.unwrap_or(0).min(total_lines);
        let end = match args.limit {
            Some(limit) => offset.saturating_add(limit).min(total_lines),
            None => total_lines,
        };
        let selected = lines[offset..end].concat();

        let (file_contents, truncated) = truncate_words(&selected, self.max_words);

        let workspace = context
            .workspace
            .canonicalize()
            .unwrap_or_else(|_| context.workspace.clone());

        Ok(ToolResult::success(json!({
            "path": relative_display(&path, &workspace),
            "file_contents": file_contents,
            "total_lines": total_lines,
            "truncated": truncated,
        })))
    }
}
