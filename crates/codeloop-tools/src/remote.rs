//! Tools hosted by an out-of-process server.
//!
//! The host receives `POST <url>` with `{"name": ..., "arguments": {...}}`
//! and answers with JSON. A body carrying a non-null `error` is a FAILED
//! result; otherwise its `data` field (or the whole body when there is no
//! `data`) becomes the SUCCESS payload.

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use codeloop_core::config::RemoteToolConfig;

use crate::{Tool, ToolContext, ToolResult};

pub struct RemoteTool {
    name: String,
    description: String,
    parameters: serde_json::Value,
    url: String,
    client: reqwest::Client,
}

impl RemoteTool {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
        url: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            url: url.into(),
            client: reqwest::Client::new(),
        }
    }

    pub fn from_config(config: &RemoteToolConfig) -> Self {
        Self::new(
            &config.name,
            &config.description,
            config.parameters.clone(),
            &config.url,
        )
    }
}

#[async_trait]
impl Tool for RemoteTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> serde_json::Value {
        self.parameters.clone()
    }

    async fn execute(
        &self,
        params: serde_json::Value,
        _context: &ToolContext,
    ) -> anyhow::Result<ToolResult> {
        debug!(tool = %self.name, url = %self.url, "Calling remote tool");

        let response = self
            .client
            .post(&self.url)
            .json(&json!({ "name": self.name, "arguments": params }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Ok(ToolResult::failed(format!("remote tool host returned {status}: {body}")));
        }

        let mut body: serde_json::Value = response.json().await?;

        if let Some(error) = body.get("error").filter(|e| !e.is_null()) {
            let message = error
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| error.to_string());
            return Ok(ToolResult::failed(message));
        }

        let data = match body.get_mut("data").map(serde_json::Value::take) {
            Some(data) => data,
            None => body,
        };
        Ok(ToolResult::success(data))
    }
}
