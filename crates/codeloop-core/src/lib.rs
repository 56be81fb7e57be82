//! Core types, config, and errors for codeloop.

pub mod config;
pub mod error;
pub mod message;

pub use error::{CodeloopError, Result};
pub use message::{Message, Role, ToolCallRequest, ToolSchema};
