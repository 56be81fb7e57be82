//! File creation tool.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::args;
use crate::path_guard::{relative_display, resolve_path};
use crate::{Tool, ToolContext, ToolResult};

pub struct CreateFileTool;

#[derive(Debug, Deserialize)]
struct CreateFileArgs {
    path: String,
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl Tool for CreateFileTool {
    fn name(&self) -> &str {
        "create_file"
    }

    fn description(&self) -> &str {
        "Create a new file, creating parent directories as needed. Fails if the file already exists."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path of the new file (relative to workspace or absolute)"
                },
                "content": {
                    "type": "string",
                    "description": "Initial content. Default: empty"
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
        let args: CreateFileArgs = args::decode(self.name(), params)?;

        let path = match resolve_path(&args.path, &context.workspace, context.restrict_to_workspace) {
            Ok(p) => p,
            Err(e) => return Ok(ToolResult::failed(format!("Path error: {e}"))),
        };

        if path.exists() {
            return Ok(ToolResult::failed(format!("File already exists: {}", args.path)));
        }

        if let Some(parent) = path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                return Ok(ToolResult::failed(format!("Create directory error: {e}")));
            }
        }

        let content = args.content.unwrap_or_default();
        // create_new closes the race between the exists check and the write
        let file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await;
        let mut file = match file {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Ok(ToolResult::failed(format!("File already exists: {}", args.path)));
            }
            Err(e) => return Ok(ToolResult::failed(format!("Create error: {e}"))),
        };
        tokio::io::AsyncWriteExt::write_all(&mut file, content.as_bytes()).await?;
        tokio::io::AsyncWriteExt::flush(&mut file).await?;

        let workspace = context
            .workspace
            .canonicalize()
            .unwrap_or_else(|_| context.workspace.clone());

        Ok(ToolResult::success(json!({
            "path": relative_display(&path, &workspace),
            "bytes": content.len(),
        })))
    }
}
