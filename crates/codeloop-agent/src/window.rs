//! Context window enforcement.
//!
//! The window is the sum of every message's token estimate plus the
//! reasoning text of the turn in flight. While that total exceeds the
//! budget the oldest evictable message is dropped: index 1 when index 0 is
//! the system prompt, index 0 otherwise.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use codeloop_core::{Message, Role};

use crate::token::TokenCounter;

/// Token usage at one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TokenSnapshot {
    /// Messages plus reasoning.
    pub total: usize,
    pub reasoning: usize,
    /// Messages only.
    pub window: usize,
    pub budget: usize,
}

impl TokenSnapshot {
    /// Share of the budget used by messages, in percent.
    pub fn percent(&self) -> f64 {
        if self.budget == 0 {
            return 0.0;
        }
        self.window as f64 / self.budget as f64 * 100.0
    }

    /// `Tokens Total[n] Reason[n] Window[n] (p% of NK)`
    pub fn report_line(&self) -> String {
        format!(
            "Tokens Total[{}] Reason[{}] Window[{}] ({:.0}% of {:.0}K)",
            self.total,
            self.reasoning,
            self.window,
            self.percent(),
            self.budget as f64 / 1024.0
        )
    }
}

/// A message removed to satisfy the budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Eviction {
    pub role: Role,
    pub tokens: usize,
}

/// Outcome of one enforcement pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Enforcement {
    pub evicted: Vec<Eviction>,
    pub snapshot: TokenSnapshot,
}

#[derive(Clone)]
pub struct ContextWindow {
    budget: usize,
    counter: Arc<dyn TokenCounter>,
}

impl ContextWindow {
    pub fn new(budget: usize, counter: Arc<dyn TokenCounter>) -> Self {
        Self { budget, counter }
    }

    pub fn budget(&self) -> usize {
        self.budget
    }

    pub fn count(&self, text: &str) -> usize {
        self.counter.count(text)
    }

    pub fn snapshot(&self, messages: &[Message], reasoning: &str) -> TokenSnapshot {
        let window: usize = messages.iter().map(|m| self.counter.count(&m.content)).sum();
        let reasoning = self.counter.count(reasoning);
        TokenSnapshot {
            total: window + reasoning,
            reasoning,
            window,
            budget: self.budget,
        }
    }

    /// Evict until the total fits the budget or nothing evictable is left.
    pub fn enforce(&self, messages: &mut Vec<Message>, reasoning: &str) -> Enforcement {
        let mut evicted = Vec::new();
        let mut snapshot = self.snapshot(messages, reasoning);

        while snapshot.total > self.budget {
            let first = if messages.first().is_some_and(Message::is_system) {
                1
            } else {
                0
            };
            if messages.len() <= first {
                warn!(
                    event = "token_budget",
                    tokens_total = snapshot.total,
                    tokens_budget = self.budget,
                    "Nothing left to evict; conversation still exceeds the context window"
                );
                break;
            }

            let removed = messages.remove(first);
            let tokens = self.counter.count(&removed.content);
            snapshot.window -= tokens;
            snapshot.total -= tokens;
            info!(
                event = "eviction",
                role = %removed.role,
                tokens,
                tokens_total = snapshot.total,
                tokens_budget = self.budget,
                "Evicted oldest message"
            );
            evicted.push(Eviction {
                role: removed.role,
                tokens,
            });
        }

        debug!(
            event = "token_budget",
            tokens_total = snapshot.total,
            tokens_reasoning = snapshot.reasoning,
            tokens_window = snapshot.window,
            tokens_budget = self.budget,
            percent = snapshot.percent(),
            "{}",
            snapshot.report_line()
        );

        Enforcement { evicted, snapshot }
    }
}

impl std::fmt::Debug for ContextWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextWindow")
            .field("budget", &self.budget)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::{CharHeuristic, WordCounter};

    fn words(n: usize) -> String {
        vec!["w"; n].join(" ")
    }

    fn window(budget: usize) -> ContextWindow {
        ContextWindow::new(budget, Arc::new(WordCounter))
    }

    #[test]
    fn test_under_budget_is_untouched() {
        let mut messages = vec![Message::system(words(10)), Message::user(words(10))];
        let result = window(100).enforce(&mut messages, "");
        assert!(result.evicted.is_empty());
        assert_eq!(result.snapshot.window, 20);
        assert_eq!(messages.len(), 2);
    }

    #[test]
    fn test_evicts_oldest_non_system_until_within_budget() {
        // 7,900 of 8,000 plus a 200-token user message
        let mut messages = vec![
            Message::system(words(100)),
            Message::user(words(3000)),
            Message::assistant(words(2800)),
            Message::user(words(2000)),
            Message::user(words(200)),
        ];
        let result = window(8000).enforce(&mut messages, "");
        assert_eq!(result.evicted.len(), 1);
        assert_eq!(result.evicted[0].tokens, 3000);
        assert_eq!(result.snapshot.window, 5100);
        assert!(messages[0].is_system());
        assert_eq!(messages.len(), 4);
    }

    #[test]
    fn test_system_message_never_evicted() {
        let mut messages = vec![Message::system(words(50)), Message::user(words(50))];
        let result = window(10).enforce(&mut messages, "");
        assert_eq!(result.evicted.len(), 1);
        assert_eq!(messages.len(), 1);
        assert!(messages[0].is_system());
        assert_eq!(result.snapshot.total, 50);
    }

    #[test]
    fn test_without_system_prompt_index_zero_goes() {
        let mut messages = vec![Message::user(words(5)), Message::assistant(words(5))];
        let result = window(6).enforce(&mut messages, "");
        assert_eq!(result.evicted, vec![Eviction { role: Role::User, tokens: 5 }]);
        assert_eq!(messages[0].role, Role::Assistant);
    }

    #[test]
    fn test_reasoning_counts_toward_total() {
        let mut messages = vec![
            Message::system(words(10)),
            Message::user(words(10)),
            Message::assistant(words(10)),
        ];
        let result = window(35).enforce(&mut messages, &words(10));
        assert_eq!(result.evicted.len(), 1);
        assert_eq!(result.snapshot.reasoning, 10);
        assert_eq!(result.snapshot.total, 30);
        assert_eq!(result.snapshot.window, 20);
    }

    #[test]
    fn test_report_line() {
        let snapshot = TokenSnapshot {
            total: 4196,
            reasoning: 100,
            window: 4096,
            budget: 8192,
        };
        assert_eq!(
            snapshot.report_line(),
            "Tokens Total[4196] Reason[100] Window[4096] (50% of 8K)"
        );
    }

    #[test]
    fn test_char_heuristic_window() {
        let win = ContextWindow::new(8192, Arc::new(CharHeuristic));
        let snapshot = win.snapshot(&[Message::user("abcdefgh")], "abcd");
        assert_eq!(snapshot.window, 2);
        assert_eq!(snapshot.total, 3);
    }
}
