//! Classification of streamed model output.
//!
//! Fragments arrive as content, reasoning, or pieces of tool calls. Some
//! models put their reasoning inline between `<think>` and `</think>`
//! instead of using a dedicated field; the classifier routes that text to
//! the reasoning buffer and drops the tags themselves. A tag may be split
//! across fragments, so a possible tag prefix at the end of a fragment is
//! held back until the next one arrives.

use tracing::warn;

use codeloop_core::ToolCallRequest;
use codeloop_providers::{StreamFragment, ToolCallDelta};

const THINK_OPEN: &str = "<think>";
const THINK_CLOSE: &str = "</think>";

/// Text ready for display, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum Classified {
    Content(String),
    Reasoning(String),
}

/// Everything one model turn produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassifiedTurn {
    /// Assistant text with leading newlines stripped.
    pub content: String,
    pub reasoning: String,
    pub tool_calls: Vec<ToolCallRequest>,
}

impl ClassifiedTurn {
    pub fn has_content(&self) -> bool {
        !self.content.trim().is_empty()
    }
}

#[derive(Debug, Default)]
struct PartialCall {
    index: usize,
    id: Option<String>,
    name: String,
    arguments: String,
}

#[derive(Debug, Default)]
pub struct StreamClassifier {
    content: String,
    reasoning: String,
    in_reasoning: bool,
    /// Tail of the last content fragment that may begin a tag.
    held: String,
    calls: Vec<PartialCall>,
}

impl StreamClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, fragment: StreamFragment) -> Vec<Classified> {
        match fragment {
            StreamFragment::Content(text) => self.push_content(&text),
            StreamFragment::Reasoning(text) => {
                self.reasoning.push_str(&text);
                vec![Classified::Reasoning(text)]
            }
            StreamFragment::ToolCall(delta) => {
                self.push_tool_call(delta);
                Vec::new()
            }
        }
    }

    fn emit(&mut self, text: &str, out: &mut Vec<Classified>) {
        if text.is_empty() {
            return;
        }
        if self.in_reasoning {
            self.reasoning.push_str(text);
            out.push(Classified::Reasoning(text.to_string()));
        } else {
            self.content.push_str(text);
            out.push(Classified::Content(text.to_string()));
        }
    }

    fn push_content(&mut self, text: &str) -> Vec<Classified> {
        let mut out = Vec::new();
        let mut buf = std::mem::take(&mut self.held);
        buf.push_str(text);
        let mut rest = buf.as_str();

        loop {
            let open = rest.find(THINK_OPEN).map(|p| (p, THINK_OPEN, true));
            let close = rest.find(THINK_CLOSE).map(|p| (p, THINK_CLOSE, false));
            let next = match (open, close) {
                (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
                (a, b) => a.or(b),
            };

            match next {
                Some((pos, tag, opens)) => {
                    self.emit(&rest[..pos], &mut out);
                    self.in_reasoning = opens;
                    rest = &rest[pos + tag.len()..];
                }
                None => {
                    let keep = partial_tag_suffix(rest);
                    let split = rest.len() - keep;
                    self.emit(&rest[..split], &mut out);
                    self.held = rest[split..].to_string();
                    break;
                }
            }
        }
        out
    }

    fn push_tool_call(&mut self, delta: ToolCallDelta) {
        // A fresh id on an index already in use starts a new call.
        let existing = self.calls.iter().rposition(|c| c.index == delta.index);
        let position = match existing {
            Some(pos)
                if !matches!((&delta.id, &self.calls[pos].id), (Some(new), Some(old)) if new != old) =>
            {
                pos
            }
            _ => {
                self.calls.push(PartialCall {
                    index: delta.index,
                    ..PartialCall::default()
                });
                self.calls.len() - 1
            }
        };

        let call = &mut self.calls[position];
        if delta.id.is_some() {
            call.id = delta.id;
        }
        if let Some(name) = delta.name {
            call.name = name;
        }
        call.arguments.push_str(&delta.arguments);
    }

    /// Flush held text and fold tool-call pieces into complete requests.
    pub fn finish(mut self) -> (ClassifiedTurn, Vec<Classified>) {
        let mut out = Vec::new();
        let held = std::mem::take(&mut self.held);
        self.emit(&held, &mut out);

        let tool_calls = self
            .calls
            .into_iter()
            .filter_map(|call| {
                if call.name.trim().is_empty() {
                    warn!(arguments = %call.arguments, "Dropping tool call without a name");
                    return None;
                }
                let arguments = parse_arguments(&call.name, &call.arguments);
                Some(ToolCallRequest::new(call.id, call.name.trim(), arguments))
            })
            .collect();

        let turn = ClassifiedTurn {
            content: self.content.trim_start_matches(['\n', '\r']).to_string(),
            reasoning: self.reasoning,
            tool_calls,
        };
        (turn, out)
    }
}

fn parse_arguments(name: &str, raw: &str) -> serde_json::Value {
    if raw.trim().is_empty() {
        return serde_json::json!({});
    }
    match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(e) => {
            warn!(tool = %name, error = %e, arguments = %raw, "Tool call arguments are not valid JSON");
            serde_json::json!({})
        }
    }
}

/// Length of the longest suffix of `text` that is a proper prefix of a tag.
fn partial_tag_suffix(text: &str) -> usize {
    let mut best = 0;
    for tag in [THINK_OPEN, THINK_CLOSE] {
        for len in (1..tag.len()).rev() {
            if len > best && text.ends_with(&tag[..len]) {
                best = len;
                break;
            }
        }
    }
    best
}
