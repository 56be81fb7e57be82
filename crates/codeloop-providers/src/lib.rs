//! Model endpoint abstraction.
//!
//! A [`ModelEndpoint`] takes the full conversation plus the advertised tool
//! schemas and returns a finite stream of [`StreamFragment`]s. The stream is
//! consumed once; endpoint failures surface as a single `Err` item (or as an
//! `Err` from [`ModelEndpoint::stream`] itself when the request is rejected).

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use codeloop_core::Message;
use codeloop_core::config::SamplingParams;

pub use codeloop_core::ToolSchema;

pub mod openai;
pub mod sse;

pub use openai::OpenAiCompatible;

/// One streamed chat request.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolSchema>,
    pub sampling: SamplingParams,
}

/// A piece of a tool-call request. Endpoints may split one call across
/// several fragments sharing the same `index`; `arguments` pieces are
/// concatenated in arrival order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolCallDelta {
    pub index: usize,
    pub id: Option<String>,
    pub name: Option<String>,
    pub arguments: String,
}

/// A classified piece of a streamed model turn.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamFragment {
    Content(String),
    Reasoning(String),
    ToolCall(ToolCallDelta),
}

pub type FragmentStream = Pin<Box<dyn Stream<Item = anyhow::Result<StreamFragment>> + Send>>;

/// The model server the agent talks to.
#[async_trait]
pub trait ModelEndpoint: Send + Sync {
    /// Endpoint identifier used in logs (e.g. "ollama").
    fn id(&self) -> &str;

    /// Stream a chat completion.
    async fn stream(&self, request: &ChatRequest) -> anyhow::Result<FragmentStream>;
}
