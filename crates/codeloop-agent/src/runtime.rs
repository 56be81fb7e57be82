//! Agent runtime loop: user input, model streaming, tool dispatch.
//!
//! The loop is a three-state machine. A user line moves it from
//! `AwaitingUserInput` to `AwaitingModelResponse`; a turn with tool calls
//! moves it to `DispatchingTools`, which goes straight back to the model
//! once results are appended, so multi-step tool chains run within one user
//! turn. A turn with plain content, an empty turn, or a failed model call
//! returns to `AwaitingUserInput`. End of input is the only way out.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tracing::{debug, error, info, warn};

use codeloop_core::config::{Config, SamplingParams};
use codeloop_core::{Message, ToolCallRequest};
use codeloop_providers::{ChatRequest, ModelEndpoint};
use codeloop_tools::{ToolContext, ToolRegistry};

use crate::classifier::{Classified, ClassifiedTurn, StreamClassifier};
use crate::conversation::Conversation;
use crate::guard::DuplicateGuard;
use crate::input::UserInput;
use crate::progress::ProgressTicker;
use crate::prompt::build_system_prompt;
use crate::token::{CharHeuristic, TokenCounter};
use crate::window::ContextWindow;
use crate::{AgentEvent, RunSummary};

pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_millis(100);

/// Everything the loop needs to know about the model it talks to.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub model: String,
    /// Token budget for the whole conversation.
    pub context_window: usize,
    pub sampling: SamplingParams,
    /// Ceiling for one model call, first byte to end of stream.
    pub request_timeout: Duration,
    /// Replaces the default system prompt when set.
    pub system_prompt: Option<String>,
    pub progress_interval: Duration,
}

impl AgentConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            model: config.model_name(),
            context_window: config.context_window(),
            sampling: config.sampling(),
            request_timeout: config.request_timeout(),
            system_prompt: config.system_prompt().map(str::to_string),
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }
}

enum LoopState {
    AwaitingUserInput,
    AwaitingModelResponse,
    DispatchingTools(ClassifiedTurn),
}

pub struct Agent {
    config: AgentConfig,
    endpoint: Arc<dyn ModelEndpoint>,
    tools: ToolRegistry,
    context: ToolContext,
    system_prompt: String,
    conversation: Conversation,
    guard: DuplicateGuard,
    events: mpsc::UnboundedSender<AgentEvent>,
    summary: RunSummary,
}

impl Agent {
    pub fn new(
        config: AgentConfig,
        endpoint: Arc<dyn ModelEndpoint>,
        tools: ToolRegistry,
        context: ToolContext,
        events: mpsc::UnboundedSender<AgentEvent>,
    ) -> Self {
        let system_prompt =
            build_system_prompt(config.system_prompt.as_deref(), &tools, &context.workspace);
        let window = ContextWindow::new(config.context_window, Arc::new(CharHeuristic));
        let conversation = Conversation::with_system_prompt(window, system_prompt.clone());
        Self {
            config,
            endpoint,
            tools,
            context,
            system_prompt,
            conversation,
            guard: DuplicateGuard::new(),
            events,
            summary: RunSummary::default(),
        }
    }

    /// Replace the token counter. Resets the conversation to the system prompt.
    pub fn with_token_counter(mut self, counter: Arc<dyn TokenCounter>) -> Self {
        let window = ContextWindow::new(self.config.context_window, counter);
        self.conversation = Conversation::with_system_prompt(window, self.system_prompt.clone());
        self
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Run until `input` is exhausted.
    pub async fn run(&mut self, input: &mut dyn UserInput) -> anyhow::Result<RunSummary> {
        info!(
            endpoint = self.endpoint.id(),
            model = %self.config.model,
            context_window = self.config.context_window,
            tools = self.tools.len(),
            "Agent started"
        );

        let mut state = LoopState::AwaitingUserInput;
        loop {
            state = match state {
                LoopState::AwaitingUserInput => {
                    self.emit(AgentEvent::AwaitingInput);
                    let line = match input.next_input().await {
                        Ok(Some(line)) => line,
                        Ok(None) => break,
                        Err(e) => {
                            warn!(%e, "Reading user input failed; treating as end of input");
                            break;
                        }
                    };
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }

                    self.summary.user_turns += 1;
                    self.guard.reset();
                    self.append(vec![Message::user(line)], "");
                    LoopState::AwaitingModelResponse
                }

                LoopState::AwaitingModelResponse => match self.call_model().await {
                    Ok(turn) if !turn.tool_calls.is_empty() => LoopState::DispatchingTools(turn),
                    Ok(turn) if turn.has_content() => {
                        self.guard.reset();
                        self.append(vec![Message::assistant(turn.content.clone())], &turn.reasoning);
                        self.emit(AgentEvent::TurnComplete {
                            content: turn.content,
                        });
                        LoopState::AwaitingUserInput
                    }
                    Ok(_) => {
                        debug!("Model turn produced no content and no tool calls");
                        LoopState::AwaitingUserInput
                    }
                    Err(e) => {
                        self.summary.transport_errors += 1;
                        let message = format!("{e:#}");
                        error!(event = "transport_error", endpoint = self.endpoint.id(), error = %message, "Model call failed");
                        self.emit(AgentEvent::Error {
                            kind: "transport".into(),
                            message,
                        });
                        self.guard.reset();
                        LoopState::AwaitingUserInput
                    }
                },

                LoopState::DispatchingTools(turn) => {
                    if self.dispatch(turn).await {
                        LoopState::AwaitingModelResponse
                    } else {
                        LoopState::AwaitingUserInput
                    }
                }
            };
        }

        let snapshot = self.conversation.snapshot("");
        self.summary.snapshot = Some(snapshot);
        info!(
            user_turns = self.summary.user_turns,
            model_calls = self.summary.model_calls,
            tool_calls = self.summary.tool_calls,
            evictions = self.summary.evictions,
            "Input ended"
        );
        Ok(std::mem::take(&mut self.summary))
    }

    /// Stream one model turn and classify it. The conversation is not
    /// touched here; a failure leaves it exactly as it was.
    async fn call_model(&mut self) -> anyhow::Result<ClassifiedTurn> {
        self.summary.model_calls += 1;
        let request = ChatRequest {
            model: self.config.model.clone(),
            messages: self.conversation.messages().to_vec(),
            tools: self.tools.describe(),
            sampling: self.config.sampling.clone(),
        };
        debug!(
            endpoint = self.endpoint.id(),
            messages = request.messages.len(),
            tools = request.tools.len(),
            "Calling model"
        );

        let mut ticker = Some(ProgressTicker::start(
            self.events.clone(),
            self.config.progress_interval,
        ));
        let outcome = tokio::time::timeout(
            self.config.request_timeout,
            drain(self.endpoint.as_ref(), &request, &self.events, &mut ticker),
        )
        .await;
        if let Some(ticker) = ticker.take() {
            ticker.stop().await;
        }

        match outcome {
            Ok(result) => result,
            Err(_) => anyhow::bail!(
                "model call timed out after {}s",
                self.config.request_timeout.as_secs()
            ),
        }
    }

    /// Run the turn's tool calls. Returns whether anything was appended,
    /// in which case the model is called again without waiting for input.
    async fn dispatch(&mut self, turn: ClassifiedTurn) -> bool {
        if turn.has_content() {
            debug!("Assistant content alongside tool calls is not persisted");
        }

        if let Some(message) = self.guard.check(&turn.tool_calls) {
            self.summary.duplicate_calls += 1;
            self.emit(AgentEvent::DuplicateToolCall {
                name: message.tool_name.clone().unwrap_or_default(),
            });
            self.append(vec![message], &turn.reasoning);
            if self.guard.exhausted() {
                let message = format!(
                    "model repeated the same tool call {} times in a row; waiting for input",
                    self.guard.repeats() + 1
                );
                warn!(event = "duplicate_tool_call", repeats = self.guard.repeats(), "Giving control back to the user");
                self.emit(AgentEvent::Error {
                    kind: "repeated_tool_call".into(),
                    message,
                });
                self.guard.reset();
                return false;
            }
            return true;
        }

        let mut appended = false;
        for request in &turn.tool_calls {
            if !self.tools.contains(&request.name) {
                self.summary.unknown_tools += 1;
                debug!(event = "tool_unknown", tool_name = %request.name, "Ignoring call to unregistered tool");
                continue;
            }

            info!(
                event = "tool_dispatch",
                tool_name = %request.name,
                arguments = %request.canonical_arguments(),
                "Dispatching tool call"
            );
            self.emit(AgentEvent::ToolCall {
                id: request.id.clone(),
                name: request.name.clone(),
                arguments: request.arguments.clone(),
            });
            self.append(vec![Message::assistant(describe_call(request))], &turn.reasoning);

            let Some(result) = self.tools.call(request, &self.context).await else {
                continue;
            };
            self.summary.tool_calls += 1;

            let content = result.to_content();
            self.emit(AgentEvent::ToolResult {
                name: request.name.clone(),
                content: content.clone(),
                is_error: !result.is_success(),
            });
            self.append(
                vec![Message::tool(request.id.clone(), &request.name, content)],
                &turn.reasoning,
            );
            appended = true;
        }
        appended
    }

    fn append(&mut self, messages: Vec<Message>, reasoning: &str) {
        let enforcement = self.conversation.append(messages, reasoning);
        for eviction in enforcement.evicted {
            self.summary.evictions += 1;
            self.emit(AgentEvent::Eviction {
                role: eviction.role,
                tokens: eviction.tokens,
            });
        }
        self.emit(AgentEvent::TokenUsage {
            snapshot: enforcement.snapshot,
        });
    }

    fn emit(&self, event: AgentEvent) {
        let _ = self.events.send(event);
    }
}

/// Pull every fragment of one model turn through the classifier. The
/// ticker is stopped, and joined, on the first fragment.
async fn drain(
    endpoint: &dyn ModelEndpoint,
    request: &ChatRequest,
    events: &mpsc::UnboundedSender<AgentEvent>,
    ticker: &mut Option<ProgressTicker>,
) -> anyhow::Result<ClassifiedTurn> {
    let mut stream = endpoint.stream(request).await?;
    let mut classifier = StreamClassifier::new();

    while let Some(fragment) = stream.next().await {
        let fragment = fragment?;
        if let Some(ticker) = ticker.take() {
            ticker.stop().await;
        }
        for piece in classifier.push(fragment) {
            forward(events, piece);
        }
    }

    let (turn, tail) = classifier.finish();
    for piece in tail {
        forward(events, piece);
    }
    Ok(turn)
}

fn forward(events: &mpsc::UnboundedSender<AgentEvent>, piece: Classified) {
    let event = match piece {
        Classified::Content(text) => AgentEvent::ContentDelta { text },
        Classified::Reasoning(text) => AgentEvent::ReasoningDelta { text },
    };
    let _ = events.send(event);
}

/// `Tool call <id>: <name>(<arguments>)`, recorded before the result so the
/// model can see which call a result answers.
fn describe_call(request: &ToolCallRequest) -> String {
    match &request.id {
        Some(id) => format!("Tool call {id}: {}", request.signature()),
        None => format!("Tool call: {}", request.signature()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_describe_call_with_and_without_id() {
        let with_id = ToolCallRequest::new(Some("call_1".into()), "read_file", json!({"path": "a"}));
        assert_eq!(describe_call(&with_id), "Tool call call_1: read_file({\"path\":\"a\"})");

        let without = ToolCallRequest::new(None, "read_file", json!({}));
        assert_eq!(describe_call(&without), "Tool call: read_file({})");
    }

    #[test]
    fn test_agent_config_defaults() {
        let config = AgentConfig::from_config(&Config::default());
        assert_eq!(config.model, "gpt-oss:latest");
        assert_eq!(config.request_timeout, Duration::from_secs(300));
        assert_eq!(config.progress_interval, DEFAULT_PROGRESS_INTERVAL);
        assert!(config.system_prompt.is_none());
    }
}
