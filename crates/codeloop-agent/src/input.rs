//! Sources of user input.
//!
//! The loop pulls one line at a time; `Ok(None)` means the source is
//! exhausted, which is the only way a run ends cleanly.

use std::collections::VecDeque;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

#[async_trait]
pub trait UserInput: Send {
    /// Next line of input, or `None` when there is no more.
    async fn next_input(&mut self) -> anyhow::Result<Option<String>>;
}

/// Reads lines from the process's standard input.
pub struct StdinInput {
    lines: Lines<BufReader<Stdin>>,
}

impl StdinInput {
    pub fn new() -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
        }
    }
}

impl Default for StdinInput {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UserInput for StdinInput {
    async fn next_input(&mut self) -> anyhow::Result<Option<String>> {
        Ok(self.lines.next_line().await?)
    }
}

/// A fixed list of lines, for tests and one-shot runs.
#[derive(Debug, Default, Clone)]
pub struct ScriptedInput {
    lines: VecDeque<String>,
}

impl ScriptedInput {
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.lines.len()
    }
}

#[async_trait]
impl UserInput for ScriptedInput {
    async fn next_input(&mut self) -> anyhow::Result<Option<String>> {
        Ok(self.lines.pop_front())
    }
}
