//! The ordered message history.
//!
//! Every append runs the context window before returning, so the history
//! handed to the next model call always fits the budget.

use codeloop_core::Message;

use crate::window::{ContextWindow, Enforcement, TokenSnapshot};

#[derive(Debug)]
pub struct Conversation {
    messages: Vec<Message>,
    window: ContextWindow,
}

impl Conversation {
    pub fn new(window: ContextWindow) -> Self {
        Self {
            messages: Vec::new(),
            window,
        }
    }

    /// Start with a system prompt at index 0.
    pub fn with_system_prompt(window: ContextWindow, prompt: impl Into<String>) -> Self {
        let mut conversation = Self::new(window);
        conversation.messages.push(Message::system(prompt));
        conversation
    }

    /// Append messages, then evict until the window fits again.
    /// `reasoning` is the in-flight reasoning text of the current turn.
    pub fn append(&mut self, messages: Vec<Message>, reasoning: &str) -> Enforcement {
        self.messages.extend(messages);
        self.window.enforce(&mut self.messages, reasoning)
    }

    pub fn snapshot(&self, reasoning: &str) -> TokenSnapshot {
        self.window.snapshot(&self.messages, reasoning)
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }
}
