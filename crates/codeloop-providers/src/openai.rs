//! OpenAI-compatible Chat Completions client.
//!
//! Streams `/v1/chat/completions` responses. Works against Ollama (the
//! default), OpenAI, and any server speaking the same SSE dialect. Ollama
//! reports reasoning in a `reasoning` delta field; some servers use
//! `reasoning_content`. Both are surfaced as [`StreamFragment::Reasoning`].

use std::collections::VecDeque;
use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_stream::StreamExt;
use tracing::{debug, trace};

use codeloop_core::Message;
use codeloop_core::config::DEFAULT_ENDPOINT_URL;

use crate::sse::{SseEvent, parse_sse_stream};
use crate::{ChatRequest, FragmentStream, ModelEndpoint, StreamFragment, ToolCallDelta, ToolSchema};

pub struct OpenAiCompatible {
    pub endpoint_url: String,
    api_key: Option<String>,
    provider_id: String,
    client: reqwest::Client,
}

impl OpenAiCompatible {
    /// Client for a full chat-completions URL.
    pub fn new(endpoint_url: &str) -> Self {
        let provider_id = if endpoint_url.contains(":11434") {
            "ollama"
        } else {
            "openai-compatible"
        };
        Self {
            endpoint_url: endpoint_url.trim_end_matches('/').to_string(),
            api_key: None,
            provider_id: provider_id.into(),
            client: reqwest::Client::new(),
        }
    }

    /// Client for a local Ollama server.
    pub fn ollama() -> Self {
        Self::new(DEFAULT_ENDPOINT_URL)
    }

    /// Send `Authorization: Bearer <key>` with every request.
    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key.filter(|k| !k.is_empty());
        self
    }

    fn format_tools(tools: &[ToolSchema]) -> Vec<serde_json::Value> {
        tools
            .iter()
            .map(|t| {
                json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters,
                    }
                })
            })
            .collect()
    }

    fn build_body<'a>(request: &'a ChatRequest) -> OpenAiRequest<'a> {
        OpenAiRequest {
            model: &request.model,
            messages: &request.messages,
            stream: true,
            temperature: request.sampling.temperature,
            top_p: request.sampling.top_p,
            top_k: request.sampling.top_k,
            tools: if request.tools.is_empty() {
                None
            } else {
                Some(Self::format_tools(&request.tools))
            },
        }
    }
}

// --- OpenAI request/response types ---

#[derive(Debug, Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    reasoning: Option<String>,
    #[serde(default)]
    reasoning_content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCallDelta>>,
}

#[derive(Debug, Deserialize)]
struct WireToolCallDelta {
    #[serde(default)]
    index: Option<usize>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<FunctionDelta>,
}

#[derive(Debug, Default, Deserialize)]
struct FunctionDelta {
    #[serde(default)]
    name: Option<String>,
    /// A JSON string on OpenAI; some servers send the object itself.
    #[serde(default)]
    arguments: Option<serde_json::Value>,
}

impl FunctionDelta {
    fn arguments_text(&self) -> String {
        match &self.arguments {
            None | Some(serde_json::Value::Null) => String::new(),
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        }
    }
}

/// Translate one decoded chunk into zero or more fragments.
fn fragments_from_chunk(chunk: ChatCompletionChunk) -> Vec<StreamFragment> {
    let mut out = Vec::new();
    let Some(choice) = chunk.choices.into_iter().next() else {
        return out;
    };
    let delta = choice.delta;

    for reasoning in [delta.reasoning, delta.reasoning_content].into_iter().flatten() {
        if !reasoning.is_empty() {
            out.push(StreamFragment::Reasoning(reasoning));
        }
    }

    if let Some(content) = delta.content {
        if !content.is_empty() {
            out.push(StreamFragment::Content(content));
        }
    }

    if let Some(calls) = delta.tool_calls {
        for (position, tc) in calls.into_iter().enumerate() {
            let function = tc.function.unwrap_or_default();
            out.push(StreamFragment::ToolCall(ToolCallDelta {
                index: tc.index.unwrap_or(position),
                id: tc.id.filter(|id| !id.is_empty()),
                name: function.name.clone().filter(|n| !n.is_empty()),
                arguments: function.arguments_text(),
            }));
        }
    }

    out
}

/// Decode one SSE event. `Ok(None)` marks the `[DONE]` sentinel.
fn decode_event(event: &SseEvent) -> anyhow::Result<Option<Vec<StreamFragment>>> {
    let data = event.data.trim();
    if data == "[DONE]" {
        return Ok(None);
    }

    let chunk: ChatCompletionChunk = serde_json::from_str(data).map_err(|e| {
        trace!(%e, data, "Failed to parse chat completion chunk");
        anyhow::anyhow!("Malformed stream chunk: {e}")
    })?;

    if let Some(error) = &chunk.error {
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        anyhow::bail!("Model endpoint reported an error: {message}");
    }

    Ok(Some(fragments_from_chunk(chunk)))
}

#[async_trait]
impl ModelEndpoint for OpenAiCompatible {
    fn id(&self) -> &str {
        &self.provider_id
    }

    async fn stream(&self, request: &ChatRequest) -> anyhow::Result<FragmentStream> {
        let body = Self::build_body(request);

        debug!(
            model = %body.model,
            endpoint = %self.endpoint_url,
            messages = body.messages.len(),
            "Streaming chat completion"
        );

        let mut req_builder = self
            .client
            .post(&self.endpoint_url)
            .header("content-type", "application/json");

        if let Some(ref key) = self.api_key {
            req_builder = req_builder.header("authorization", format!("Bearer {key}"));
        }

        let response = req_builder.json(&body).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Model endpoint error {status}: {body}");
        }

        let sse_stream = parse_sse_stream(response);

        let fragment_stream = futures::stream::unfold(
            ChunkState {
                sse: Box::pin(sse_stream),
                pending: VecDeque::new(),
                done: false,
            },
            |mut state| async move {
                loop {
                    if let Some(fragment) = state.pending.pop_front() {
                        return Some((Ok(fragment), state));
                    }
                    if state.done {
                        return None;
                    }

                    match state.sse.next().await {
                        Some(Ok(event)) => match decode_event(&event) {
                            Ok(Some(fragments)) => state.pending.extend(fragments),
                            Ok(None) => state.done = true,
                            Err(e) => {
                                state.done = true;
                                return Some((Err(e), state));
                            }
                        },
                        Some(Err(e)) => {
                            state.done = true;
                            return Some((Err(e), state));
                        }
                        None => return None,
                    }
                }
            },
        );

        Ok(Box::pin(fragment_stream))
    }
}

struct ChunkState {
    sse: Pin<Box<dyn Stream<Item = anyhow::Result<SseEvent>> + Send>>,
    pending: VecDeque<StreamFragment>,
    done: bool,
}
