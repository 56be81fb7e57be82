//! Tools the model can invoke during an agent run.
//!
//! Each tool implements the [`Tool`] trait and is registered once in a
//! [`ToolRegistry`]. The registry is the only place tools are invoked: it
//! decodes nothing itself, but it turns every error or panic raised by a
//! tool into a FAILED [`ToolResult`] so a misbehaving tool can never take
//! the agent loop down with it.

use std::panic::AssertUnwindSafe;
use std::path::PathBuf;

use async_trait::async_trait;
use futures::FutureExt;
use tracing::{debug, warn};

use codeloop_core::config::Config;
use codeloop_core::{CodeloopError, ToolCallRequest, ToolSchema};

pub mod args;
pub mod create_file;
pub mod edit_file;
pub mod path_guard;
pub mod read_file;
pub mod remote;
pub mod result;
pub mod search_files;
pub mod syntax;

pub use result::{ToolResult, ToolStatus};

/// Context provided to tools during execution.
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub workspace: PathBuf,
    pub restrict_to_workspace: bool,
}

impl ToolContext {
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        Self {
            workspace: workspace.into(),
            restrict_to_workspace: true,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            workspace: config.workspace_dir(),
            restrict_to_workspace: config.restrict_to_workspace(),
        }
    }
}

/// The core tool trait. Every built-in and remote tool implements this.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name as exposed to the model (e.g. "read_file").
    fn name(&self) -> &str;

    /// Human-readable description for the model.
    fn description(&self) -> &str;

    /// JSON Schema describing the tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool with the given arguments.
    ///
    /// Expected failures (missing file, bad line number) come back as
    /// `Ok(ToolResult::failed(..))`; an `Err` is converted by the registry.
    async fn execute(
        &self,
        params: serde_json::Value,
        context: &ToolContext,
    ) -> anyhow::Result<ToolResult>;

    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// Registry of available tools.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the four file tools plus any configured remote tools.
    pub fn with_builtin(config: &Config) -> codeloop_core::Result<Self> {
        let mut registry = Self::new();
        registry.register(Box::new(read_file::ReadFileTool::new(config.read_max_words())))?;
        registry.register(Box::new(search_files::SearchFilesTool::new(
            config.search_max_results(),
            config.search_exclude(),
        )))?;
        registry.register(Box::new(create_file::CreateFileTool))?;
        registry.register(Box::new(edit_file::EditFileTool))?;
        for remote in config.remote_tools() {
            registry.register(Box::new(remote::RemoteTool::from_config(remote)))?;
        }
        Ok(registry)
    }

    /// Add a tool. Names must be unique for the lifetime of the registry.
    pub fn register(&mut self, tool: Box<dyn Tool>) -> codeloop_core::Result<()> {
        if self.contains(tool.name()) {
            return Err(CodeloopError::DuplicateTool(tool.name().to_string()));
        }
        self.tools.push(tool);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.iter().find(|t| t.name() == name).map(|t| t.as_ref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn list(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Schemas for every registered tool, in registration order.
    pub fn describe(&self) -> Vec<ToolSchema> {
        self.tools.iter().map(|t| t.schema()).collect()
    }

    /// Invoke the tool named by `request`.
    ///
    /// Returns `None` when no such tool is registered. Otherwise always
    /// returns a result: errors and panics become FAILED envelopes.
    pub async fn call(&self, request: &ToolCallRequest, context: &ToolContext) -> Option<ToolResult> {
        let tool = self.get(&request.name)?;

        let outcome = AssertUnwindSafe(tool.execute(request.arguments.clone(), context))
            .catch_unwind()
            .await;

        let result = match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                debug!(tool = %request.name, error = %e, "Tool returned an error");
                ToolResult::failed(format!("{e:#}"))
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                warn!(tool = %request.name, panic = %message, "Tool panicked");
                ToolResult::failed(format!("tool '{}' panicked: {message}", request.name))
            }
        };
        Some(result)
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
