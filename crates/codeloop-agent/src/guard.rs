//! Duplicate tool-call detection.
//!
//! Some models, given stale or ambiguous context, re-issue the exact call
//! they just made, forever. When a turn's calls equal the previous turn's
//! calls the tools are not run again; the model gets one FAILED result
//! pointing it back at the conversation instead.

use tracing::info;

use codeloop_core::{Message, ToolCallRequest};
use codeloop_tools::ToolResult;

pub const DUPLICATE_CALL_ERROR: &str =
    "data already provided in a previous response, please review the conversation history";

/// Consecutive suppressed repeats after which the loop hands control back
/// to the user.
pub const MAX_CONSECUTIVE_DUPLICATES: usize = 3;

/// Compare two call sets. Equal when they have the same length and, pairwise,
/// the same tool name and the same canonical (sorted-key) arguments.
pub fn compare(last: &[ToolCallRequest], current: &[ToolCallRequest]) -> Option<Message> {
    if last.is_empty() || last.len() != current.len() {
        return None;
    }
    let identical = last.iter().zip(current).all(|(a, b)| {
        a.name == b.name && a.canonical_arguments() == b.canonical_arguments()
    });
    if !identical {
        return None;
    }

    let first = &current[0];
    Some(Message::tool(
        first.id.clone(),
        &first.name,
        ToolResult::failed(DUPLICATE_CALL_ERROR).to_content(),
    ))
}

/// Remembers the previous turn's calls.
#[derive(Debug, Default)]
pub struct DuplicateGuard {
    last: Vec<ToolCallRequest>,
    repeats: usize,
}

impl DuplicateGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check `current` against the previous turn, then remember it.
    pub fn check(&mut self, current: &[ToolCallRequest]) -> Option<Message> {
        let duplicate = compare(&self.last, current);
        if duplicate.is_some() {
            self.repeats += 1;
            let calls: Vec<String> = current.iter().map(ToolCallRequest::signature).collect();
            info!(event = "duplicate_tool_call", calls = ?calls, repeats = self.repeats, "Suppressed repeated tool call");
        } else {
            self.repeats = 0;
        }
        self.last = current.to_vec();
        duplicate
    }

    pub fn reset(&mut self) {
        self.last.clear();
        self.repeats = 0;
    }

    /// Repeats suppressed in a row since the last distinct call set.
    pub fn repeats(&self) -> usize {
        self.repeats
    }

    /// The model keeps re-issuing the same calls.
    pub fn exhausted(&self) -> bool {
        self.repeats >= MAX_CONSECUTIVE_DUPLICATES
    }

    pub fn last(&self) -> &[ToolCallRequest] {
        &self.last
    }
}
