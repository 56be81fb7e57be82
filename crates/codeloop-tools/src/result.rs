//! The `{status, data}` envelope every tool result is serialized into.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Returned in place of a result that could not be serialized.
pub const MARSHAL_FAILURE: &str =
    r#"{"status":"FAILED","data":{"error":"error marshaling tool response"}}"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ToolStatus {
    Success,
    Failed,
}

/// Structured outcome of a tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub status: ToolStatus,
    pub data: Value,
}

impl ToolResult {
    pub fn success(data: Value) -> Self {
        Self {
            status: ToolStatus::Success,
            data,
        }
    }

    /// A FAILED result carrying `error` as `data.error`.
    pub fn failed(error: impl fmt::Display) -> Self {
        Self {
            status: ToolStatus::Failed,
            data: json!({ "error": error.to_string() }),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ToolStatus::Success
    }

    /// Serialize for a `tool` message. Never fails.
    pub fn to_content(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| MARSHAL_FAILURE.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_envelope() {
        let content = ToolResult::success(json!({"files": ["a.go"]})).to_content();
        let parsed: Value = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed["status"], "SUCCESS");
        assert_eq!(parsed["data"]["files"][0], "a.go");
    }

    #[test]
    fn test_failed_envelope() {
        let result = ToolResult::failed("no such file");
        assert!(!result.is_success());
        let parsed: Value = serde_json::from_str(&result.to_content()).unwrap();
        assert_eq!(parsed["status"], "FAILED");
        assert_eq!(parsed["data"]["error"], "no such file");
    }

    #[test]
    fn test_marshal_failure_is_valid_envelope() {
        let parsed: ToolResult = serde_json::from_str(MARSHAL_FAILURE).unwrap();
        assert_eq!(parsed.status, ToolStatus::Failed);
    }
}
