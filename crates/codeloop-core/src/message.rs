//! Conversation message model.
//!
//! A [`Message`] is one turn in the conversation. Messages are created by the
//! agent loop and never mutated afterwards; the only way one leaves the
//! conversation is eviction by the context window manager.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Author of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One turn in the conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// Correlates a tool result with the request that produced it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(rename = "name", skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
}

impl Message {
    fn plain(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_call_id: None,
            tool_name: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain(Role::Assistant, content)
    }

    /// A `tool`-role message carrying a serialized result envelope.
    pub fn tool(
        tool_call_id: Option<String>,
        tool_name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_call_id,
            tool_name: Some(tool_name.into()),
        }
    }

    pub fn is_system(&self) -> bool {
        self.role == Role::System
    }
}

/// A model-issued request to invoke a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Correlation token from the endpoint. Some protocols never send one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

impl ToolCallRequest {
    pub fn new(id: Option<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id,
            name: name.into(),
            arguments,
        }
    }

    /// Arguments rendered with object keys in sorted order, so two requests
    /// with the same arguments always render identically.
    pub fn canonical_arguments(&self) -> String {
        canonical_json(&self.arguments)
    }

    /// Human-readable `name(args)` rendering used in logs and traces.
    pub fn signature(&self) -> String {
        format!("{}({})", self.name, self.canonical_arguments())
    }
}

/// A tool as advertised to the model on every request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    /// JSON Schema describing the tool's arguments.
    pub parameters: Value,
}

/// Serialize a JSON value with every object's keys sorted.
///
/// `Value::to_string` only sorts while serde_json's `preserve_order` feature
/// is off, and any crate in the build graph can switch it on. Sorting here
/// keeps call signatures stable either way.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        other => out.push_str(&other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tool_message_serializes_name_and_id() {
        let msg = Message::tool(Some("call_1".into()), "read_file", "{}");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "tool");
        assert_eq!(json["tool_call_id"], "call_1");
        assert_eq!(json["name"], "read_file");
    }

    #[test]
    fn test_plain_message_omits_tool_fields() {
        let json = serde_json::to_value(Message::user("hi")).unwrap();
        assert!(json.get("tool_call_id").is_none());
        assert!(json.get("name").is_none());
    }

    #[test]
    fn test_canonical_arguments_ignore_key_order() {
        let a = ToolCallRequest::new(None, "search_files", json!({"path": ".", "filter": "*.go"}));
        let b = ToolCallRequest::new(None, "search_files", json!({"filter": "*.go", "path": "."}));
        assert_eq!(a.canonical_arguments(), b.canonical_arguments());
        assert_eq!(a.canonical_arguments(), r#"{"filter":"*.go","path":"."}"#);
    }

    #[test]
    fn test_canonical_json_nested() {
        let v = json!({"b": [ {"z": 1, "a": 2} ], "a": null});
        assert_eq!(canonical_json(&v), r#"{"a":null,"b":[{"a":2,"z":1}]}"#);
    }

    #[test]
    fn test_signature() {
        let call = ToolCallRequest::new(None, "read_file", json!({"path": "main.go"}));
        assert_eq!(call.signature(), r#"read_file({"path":"main.go"})"#);
    }
}
