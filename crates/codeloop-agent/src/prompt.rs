//! System prompt builder for the agent.

use std::path::Path;

use codeloop_tools::ToolRegistry;

/// Identity and tool-result contract used when no prompt is configured.
pub const DEFAULT_SYSTEM_PROMPT: &str = "\
You are a coding assistant working inside a developer's project directory.
Use the available tools to inspect and change files instead of guessing.

Every tool returns a JSON object of the form {\"status\": \"SUCCESS\" | \"FAILED\", \"data\": {...}}.
When status is FAILED, data.error explains what went wrong; correct the call or explain the problem to the user.
Do not repeat a tool call whose result is already in the conversation.
Paths are relative to the workspace directory.
Line numbers for edit_file start at 1.";

/// Build the system prompt.
pub fn build_system_prompt(custom: Option<&str>, tools: &ToolRegistry, workspace: &Path) -> String {
    let mut parts = Vec::new();

    parts.push(custom.unwrap_or(DEFAULT_SYSTEM_PROMPT).to_string());
    parts.push(format!("Workspace directory: {}", workspace.display()));

    let tool_names = tools.list();
    if !tool_names.is_empty() {
        parts.push(format!("Available tools: {}", tool_names.join(", ")));
    }

    parts.join("\n\n")
}
