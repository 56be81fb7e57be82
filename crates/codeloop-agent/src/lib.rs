//! Agent runtime: the tool-calling loop between a user, a model endpoint and
//! a set of tools.
//!
//! The [`Agent`] pulls user input, streams the model's reply, dispatches any
//! requested tool calls and feeds their results back until the model answers
//! with plain content. Progress is reported as a stream of [`AgentEvent`]s
//! for a front end to render.

use serde::{Deserialize, Serialize};

use codeloop_core::Role;

pub mod classifier;
pub mod conversation;
pub mod guard;
pub mod input;
pub mod progress;
pub mod prompt;
pub mod runtime;
pub mod token;
pub mod window;

pub use input::{ScriptedInput, StdinInput, UserInput};
pub use runtime::{Agent, AgentConfig};
pub use window::TokenSnapshot;

/// Events emitted by the agent while it runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// The loop is waiting for the next line of user input.
    AwaitingInput,

    /// Still waiting for the first fragment of a model response.
    Waiting { elapsed_ms: u64 },

    /// Streaming assistant text.
    ContentDelta { text: String },

    /// Streaming reasoning text. Never persisted.
    ReasoningDelta { text: String },

    /// A tool call is being made.
    ToolCall {
        id: Option<String>,
        name: String,
        arguments: serde_json::Value,
    },

    /// A tool call has completed.
    ToolResult {
        name: String,
        content: String,
        is_error: bool,
    },

    /// A repeated call was answered without running the tool.
    DuplicateToolCall { name: String },

    /// Token usage after a conversation mutation.
    TokenUsage { snapshot: TokenSnapshot },

    /// A message was dropped to fit the context window.
    Eviction { role: Role, tokens: usize },

    /// A model call failed; the loop is back to waiting for input.
    Error { kind: String, message: String },

    /// The model answered with content and no tool calls.
    TurnComplete { content: String },
}

/// Totals for one [`Agent::run`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub user_turns: usize,
    pub model_calls: usize,
    pub tool_calls: usize,
    pub duplicate_calls: usize,
    pub unknown_tools: usize,
    pub evictions: usize,
    pub transport_errors: usize,
    /// Token usage when input ended.
    pub snapshot: Option<TokenSnapshot>,
}
