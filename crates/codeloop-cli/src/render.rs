//! Terminal rendering of agent events.

use std::io::{self, Write};

use codeloop_agent::AgentEvent;

const RESET: &str = "\x1b[0m";
const DIM: &str = "\x1b[2m";
const GRAY: &str = "\x1b[90m";
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const CLEAR_LINE: &str = "\r\x1b[2K";

/// Longest tool result echoed to the terminal.
const RESULT_PREVIEW_CHARS: usize = 160;

pub struct Renderer<W: Write> {
    out: W,
    color: bool,
    /// A waiting tick is on the current line.
    ticking: bool,
    in_reasoning: bool,
    at_line_start: bool,
}

impl<W: Write> Renderer<W> {
    pub fn new(out: W, color: bool) -> Self {
        Self {
            out,
            color,
            ticking: false,
            in_reasoning: false,
            at_line_start: true,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn paint(&self, code: &'static str) -> &'static str {
        if self.color { code } else { "" }
    }

    fn clear_tick(&mut self) -> io::Result<()> {
        if self.ticking {
            let clear = if self.color { CLEAR_LINE } else { "\n" };
            write!(self.out, "{clear}")?;
            self.ticking = false;
        }
        Ok(())
    }

    fn end_reasoning(&mut self) -> io::Result<()> {
        if self.in_reasoning {
            let reset = self.paint(RESET);
            write!(self.out, "{reset}")?;
            self.in_reasoning = false;
        }
        Ok(())
    }

    fn line(&mut self, color: &'static str, text: &str) -> io::Result<()> {
        self.end_reasoning()?;
        if !self.at_line_start {
            writeln!(self.out)?;
        }
        let (on, off) = (self.paint(color), self.paint(RESET));
        writeln!(self.out, "{on}{text}{off}")?;
        self.at_line_start = true;
        Ok(())
    }

    fn text(&mut self, text: &str) -> io::Result<()> {
        if text.is_empty() {
            return Ok(());
        }
        write!(self.out, "{text}")?;
        self.at_line_start = text.ends_with('\n');
        Ok(())
    }

    pub fn render(&mut self, event: &AgentEvent) -> io::Result<()> {
        if !matches!(event, AgentEvent::Waiting { .. }) {
            self.clear_tick()?;
        }

        match event {
            AgentEvent::AwaitingInput => {
                self.end_reasoning()?;
                if !self.at_line_start {
                    writeln!(self.out)?;
                }
                write!(self.out, "> ")?;
                self.at_line_start = true;
            }
            AgentEvent::Waiting { elapsed_ms } => {
                let prefix = if self.color { "\r" } else { "" };
                let (on, off) = (self.paint(DIM), self.paint(RESET));
                let seconds = *elapsed_ms as f64 / 1000.0;
                write!(self.out, "{prefix}{on}waiting {seconds:.1}s{off}")?;
                self.ticking = true;
            }
            AgentEvent::ContentDelta { text } => {
                self.end_reasoning()?;
                self.text(text)?;
            }
            AgentEvent::ReasoningDelta { text } => {
                if !self.in_reasoning {
                    let gray = self.paint(GRAY);
                    write!(self.out, "{gray}")?;
                    self.in_reasoning = true;
                }
                self.text(text)?;
            }
            AgentEvent::ToolCall { name, arguments, .. } => {
                self.line(CYAN, &format!("-> {name}({arguments})"))?;
            }
            AgentEvent::ToolResult {
                name,
                content,
                is_error,
            } => {
                let status = if *is_error { "FAILED" } else { "ok" };
                let color = if *is_error { RED } else { DIM };
                self.line(color, &format!("<- {name} {status}: {}", preview(content)))?;
            }
            AgentEvent::DuplicateToolCall { name } => {
                self.line(YELLOW, &format!("repeated call to {name} answered from history"))?;
            }
            AgentEvent::TokenUsage { snapshot } => {
                self.line(DIM, &snapshot.report_line())?;
            }
            AgentEvent::Eviction { role, tokens } => {
                self.line(YELLOW, &format!("evicted oldest {role} message ({tokens} tokens)"))?;
            }
            AgentEvent::Error { kind, message } => {
                self.line(RED, &format!("{kind} error: {message}"))?;
            }
            AgentEvent::TurnComplete { .. } => {
                self.end_reasoning()?;
                if !self.at_line_start {
                    writeln!(self.out)?;
                    self.at_line_start = true;
                }
            }
        }
        self.out.flush()
    }
}

fn preview(content: &str) -> String {
    let single_line = content.replace('\n', " ");
    if single_line.chars().count() <= RESULT_PREVIEW_CHARS {
        return single_line;
    }
    let cut: String = single_line.chars().take(RESULT_PREVIEW_CHARS).collect();
    format!("{cut}...")
}
