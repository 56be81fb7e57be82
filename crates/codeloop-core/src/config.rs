//! Configuration loading and validation.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_ENDPOINT_URL: &str = "http://localhost:11434/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "gpt-oss:latest";
pub const DEFAULT_CONTEXT_WINDOW: usize = 1024 * 8;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_READ_MAX_WORDS: usize = 4096;
pub const DEFAULT_SEARCH_MAX_RESULTS: usize = 1000;

/// Environment variable that overrides the configured context window.
pub const CONTEXT_LENGTH_ENV: &str = "OLLAMA_CONTEXT_LENGTH";

/// Top-level codeloop configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<ModelConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent: Option<AgentSection>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<ToolsConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
}

/// Model endpoint settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Full chat-completions URL of an OpenAI-compatible server.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,

    /// Token budget for the whole conversation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_window: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,

    #[serde(default)]
    pub sampling: SamplingParams,
}

impl ModelConfig {
    /// Resolve the API key: check `api_key` field first, then `api_key_env` environment variable.
    pub fn resolve_api_key(&self) -> Option<String> {
        resolve_secret_field(&self.api_key, &self.api_key_env)
    }
}

/// Sampling parameters forwarded to the model on every call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplingParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,

    /// Not part of the OpenAI API; Ollama honours it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            temperature: Some(0.0),
            top_p: Some(0.1),
            top_k: Some(1),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace: Option<String>,

    /// Replaces the built-in system prompt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    #[serde(default = "default_true")]
    pub restrict_to_workspace: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Maximum number of words `read_file` returns.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_max_words: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_max_results: Option<usize>,

    /// Directory names `search_files` never descends into.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_exclude: Option<Vec<String>>,

    /// Tools hosted out of process.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remote: Vec<RemoteToolConfig>,
}

/// A tool served by an external host over HTTP.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteToolConfig {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub description: String,
    /// JSON Schema for the tool's arguments.
    #[serde(default = "default_parameters")]
    pub parameters: serde_json::Value,
}

fn default_parameters() -> serde_json::Value {
    serde_json::json!({ "type": "object", "properties": {} })
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log format: "plain" (default) or "json".
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Log level override (trace/debug/info/warn/error).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,

    /// Per-crate log level overrides (e.g. "codeloop_agent=debug").
    #[serde(default)]
    pub filters: Vec<String>,

    /// Output target: "stderr" (default) or "stdout".
    #[serde(default = "default_log_output")]
    pub output: String,
}

fn default_log_format() -> String {
    "plain".into()
}

fn default_log_output() -> String {
    "stderr".into()
}

const DEFAULT_SEARCH_EXCLUDE: &[&str] = &[
    ".git",
    "vendor",
    "target",
    "node_modules",
    ".venv",
    ".idea",
    ".vscode",
];

/// Resolve a secret: check the direct value first, then the env-var reference.
pub fn resolve_secret_field(direct: &Option<String>, env_var: &Option<String>) -> Option<String> {
    if let Some(val) = direct {
        if !val.is_empty() {
            return Some(val.clone());
        }
    }
    if let Some(env) = env_var {
        if let Ok(val) = std::env::var(env) {
            if !val.is_empty() {
                return Some(val);
            }
        }
    }
    None
}

/// Substitute `${ENV_VAR}` patterns in a string with their environment variable values.
fn substitute_env_vars(input: &str) -> String {
    let re = regex::Regex::new(r"\$\{([^}]+)\}").expect("static regex");
    re.replace_all(input, |caps: &regex::Captures| {
        let var_name = &caps[1];
        std::env::var(var_name).unwrap_or_default()
    })
    .into_owned()
}

impl Config {
    /// Load config from a JSON5 file, substituting `${ENV_VAR}` references.
    pub fn load(path: &Path) -> crate::error::Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path).map_err(crate::error::CodeloopError::Io)?;
        Self::parse(&raw)
    }

    /// Parse config text (JSON5), substituting `${ENV_VAR}` references first.
    pub fn parse(raw: &str) -> crate::error::Result<Self> {
        let substituted = substitute_env_vars(raw);

        json5::from_str(&substituted).map_err(|e| crate::error::CodeloopError::Config(e.to_string()))
    }

    /// Default config file location.
    pub fn default_path() -> PathBuf {
        data_dir().join("config.json5")
    }

    pub fn endpoint_url(&self) -> String {
        self.model
            .as_ref()
            .and_then(|m| m.endpoint_url.clone())
            .unwrap_or_else(|| DEFAULT_ENDPOINT_URL.to_string())
    }

    pub fn model_name(&self) -> String {
        self.model
            .as_ref()
            .and_then(|m| m.name.clone())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string())
    }

    pub fn api_key(&self) -> Option<String> {
        self.model.as_ref().and_then(|m| m.resolve_api_key())
    }

    /// Context window budget in tokens. `OLLAMA_CONTEXT_LENGTH` wins over the file.
    pub fn context_window(&self) -> usize {
        if let Some(from_env) = std::env::var(CONTEXT_LENGTH_ENV)
            .ok()
            .and_then(|v| v.trim().parse::<usize>().ok())
        {
            return from_env;
        }
        self.model
            .as_ref()
            .and_then(|m| m.context_window)
            .unwrap_or(DEFAULT_CONTEXT_WINDOW)
    }

    pub fn request_timeout(&self) -> Duration {
        let secs = self
            .model
            .as_ref()
            .and_then(|m| m.request_timeout_secs)
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS);
        Duration::from_secs(secs)
    }

    pub fn sampling(&self) -> SamplingParams {
        self.model
            .as_ref()
            .map(|m| m.sampling.clone())
            .unwrap_or_default()
    }

    /// Resolve the workspace directory tools operate in.
    pub fn workspace_dir(&self) -> PathBuf {
        self.agent
            .as_ref()
            .and_then(|a| a.workspace.as_ref())
            .map(|w| {
                let expanded = shellexpand::tilde(w);
                PathBuf::from(expanded.as_ref())
            })
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn system_prompt(&self) -> Option<&str> {
        self.agent.as_ref().and_then(|a| a.system_prompt.as_deref())
    }

    pub fn restrict_to_workspace(&self) -> bool {
        self.agent
            .as_ref()
            .map(|a| a.restrict_to_workspace)
            .unwrap_or(true)
    }

    pub fn read_max_words(&self) -> usize {
        self.tools
            .as_ref()
            .and_then(|t| t.read_max_words)
            .unwrap_or(DEFAULT_READ_MAX_WORDS)
    }

    pub fn search_max_results(&self) -> usize {
        self.tools
            .as_ref()
            .and_then(|t| t.search_max_results)
            .unwrap_or(DEFAULT_SEARCH_MAX_RESULTS)
    }

    pub fn search_exclude(&self) -> Vec<String> {
        self.tools
            .as_ref()
            .and_then(|t| t.search_exclude.clone())
            .unwrap_or_else(|| DEFAULT_SEARCH_EXCLUDE.iter().map(|s| s.to_string()).collect())
    }

    pub fn remote_tools(&self) -> &[RemoteToolConfig] {
        self.tools.as_ref().map(|t| t.remote.as_slice()).unwrap_or(&[])
    }

    /// Validate config, returning (warnings, errors).
    pub fn validate(&self) -> (Vec<String>, Vec<String>) {
        let mut warnings = Vec::new();
        let mut errors = Vec::new();

        if self.endpoint_url().trim().is_empty() {
            errors.push("Model endpoint URL cannot be empty".to_string());
        }

        if self.context_window() == 0 {
            errors.push("Context window cannot be 0".to_string());
        }

        if self.request_timeout().is_zero() {
            errors.push("Request timeout cannot be 0".to_string());
        }

        let endpoint = self.endpoint_url();
        let local = endpoint.contains("localhost") || endpoint.contains("127.0.0.1");
        if !local && self.api_key().is_none() {
            warnings.push(format!("Endpoint '{endpoint}' is remote but no API key is configured"));
        }

        let mut seen = std::collections::HashSet::new();
        for remote in self.remote_tools() {
            if remote.url.trim().is_empty() {
                errors.push(format!("Remote tool '{}' has no url", remote.name));
            }
            if !seen.insert(remote.name.as_str()) {
                errors.push(format!("Remote tool '{}' is declared twice", remote.name));
            }
        }

        (warnings, errors)
    }
}

/// Base directory for codeloop data: `~/.codeloop/`
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".codeloop")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_var_substitution() {
        // SAFETY: test-only, single-threaded test runner
        unsafe { std::env::set_var("TEST_CL_KEY", "sk-test-123") };
        let input = r#"{"key": "${TEST_CL_KEY}", "other": "plain"}"#;
        let result = substitute_env_vars(input);
        assert!(result.contains("sk-test-123"));
        assert!(result.contains("plain"));
        unsafe { std::env::remove_var("TEST_CL_KEY") };
    }

    #[test]
    fn test_env_var_missing() {
        let input = r#"{"key": "${NONEXISTENT_VAR_CL_TEST}"}"#;
        let result = substitute_env_vars(input);
        assert!(result.contains(r#""""#));
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.endpoint_url(), DEFAULT_ENDPOINT_URL);
        assert_eq!(config.model_name(), "gpt-oss:latest");
        assert_eq!(config.request_timeout(), Duration::from_secs(300));
        assert_eq!(config.read_max_words(), 4096);
        assert!(config.restrict_to_workspace());
        assert!(config.search_exclude().contains(&".git".to_string()));
        let sampling = config.sampling();
        assert_eq!(sampling.temperature, Some(0.0));
        assert_eq!(sampling.top_k, Some(1));
    }

    #[test]
    fn test_parse_json5() {
        let config = Config::parse(
            r#"{
                // comments are allowed
                model: {
                    name: "qwen3:8b",
                    context_window: 32768,
                    sampling: { temperature: 0.2 },
                },
                agent: { workspace: "/tmp/ws", restrict_to_workspace: false },
                tools: {
                    remote: [{ name: "lookup", url: "http://localhost:9000/lookup" }],
                },
            }"#,
        )
        .unwrap();
        assert_eq!(config.model_name(), "qwen3:8b");
        assert_eq!(config.sampling().temperature, Some(0.2));
        assert_eq!(config.sampling().top_p, None);
        assert_eq!(config.workspace_dir(), PathBuf::from("/tmp/ws"));
        assert!(!config.restrict_to_workspace());
        assert_eq!(config.remote_tools().len(), 1);
        assert_eq!(config.remote_tools()[0].parameters["type"], "object");
    }

    #[test]
    fn test_load_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("absent.json5")).unwrap();
        assert!(config.model.is_none());
    }

    #[test]
    fn test_load_invalid_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json5");
        std::fs::write(&path, "{ model: ").unwrap();
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn test_model_resolve_api_key() {
        // SAFETY: test-only, single-threaded test runner
        unsafe { std::env::set_var("TEST_CL_API_KEY", "from-env") };
        let model = ModelConfig {
            api_key_env: Some("TEST_CL_API_KEY".into()),
            ..ModelConfig::default()
        };
        assert_eq!(model.resolve_api_key(), Some("from-env".into()));

        let direct = ModelConfig {
            api_key: Some("direct-key".into()),
            api_key_env: Some("TEST_CL_API_KEY".into()),
            ..ModelConfig::default()
        };
        assert_eq!(direct.resolve_api_key(), Some("direct-key".into()));
        unsafe { std::env::remove_var("TEST_CL_API_KEY") };
    }

    #[test]
    fn test_context_window_env_override() {
        let config = Config {
            model: Some(ModelConfig {
                context_window: Some(4096),
                ..ModelConfig::default()
            }),
            ..Config::default()
        };
        // SAFETY: test-only, single-threaded test runner
        unsafe { std::env::set_var(CONTEXT_LENGTH_ENV, "65536") };
        assert_eq!(config.context_window(), 65536);
        unsafe { std::env::remove_var(CONTEXT_LENGTH_ENV) };
        assert_eq!(config.context_window(), 4096);
    }

    #[test]
    fn test_logging_config_defaults() {
        let config = Config::parse(r#"{ "logging": {} }"#).unwrap();
        let logging = config.logging.expect("logging should be present");
        assert_eq!(logging.format, "plain");
        assert!(logging.level.is_none());
        assert_eq!(logging.output, "stderr");
        assert!(logging.filters.is_empty());
    }

    #[test]
    fn test_validate_zero_timeout_errors() {
        let config = Config {
            model: Some(ModelConfig {
                request_timeout_secs: Some(0),
                ..ModelConfig::default()
            }),
            ..Config::default()
        };
        let (_warnings, errors) = config.validate();
        assert!(errors.iter().any(|e| e.contains("timeout")), "got: {errors:?}");
    }

    #[test]
    fn test_validate_remote_endpoint_without_key_warns() {
        let config = Config {
            model: Some(ModelConfig {
                endpoint_url: Some("https://api.openai.com/v1/chat/completions".into()),
                ..ModelConfig::default()
            }),
            ..Config::default()
        };
        let (warnings, errors) = config.validate();
        assert!(errors.is_empty());
        assert!(warnings.iter().any(|w| w.contains("API key")), "got: {warnings:?}");
    }

    #[test]
    fn test_validate_duplicate_remote_tool() {
        let remote = RemoteToolConfig {
            name: "lookup".into(),
            url: "http://localhost:9000".into(),
            description: String::new(),
            parameters: default_parameters(),
        };
        let config = Config {
            tools: Some(ToolsConfig {
                remote: vec![remote.clone(), remote],
                ..ToolsConfig::default()
            }),
            ..Config::default()
        };
        let (_warnings, errors) = config.validate();
        assert!(errors.iter().any(|e| e.contains("twice")));
    }
}
