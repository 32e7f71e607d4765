//! Configuration management for Bender.
//!
//! Configuration is read from `~/.bender/config.json` when present and then
//! overridden by environment variables.
//!
//! # Configuration Priority
//!
//! 1. Environment variables
//! 2. Explicit config file values
//! 3. Default values
//!
//! # Environment Variable Mapping
//!
//! - `SLACK_BOT_TOKEN` → slack.bot_token
//! - `SLACK_APP_TOKEN` → slack.app_token
//! - `ANTHROPIC_API_KEY` → claude.anthropic_api_key
//! - `CLAUDE_CODE_OAUTH_TOKEN` → claude.oauth_token
//! - `BENDER_CLAUDE_BINARY` → claude.binary
//! - `BENDER_CLAUDE_TIMEOUT` → claude.timeout_secs
//! - `BENDER_WORKSPACE` → workspace
//! - `BENDER_API_HOST` → api.host
//! - `BENDER_API_PORT` → api.port
//! - `BENDER_API_KEY` → api.api_key
//! - `LOG_LEVEL` → observability.log_level
//! - `LOG_FORMAT` → observability.log_format

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Error;

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".bender"),
        |dirs| dirs.home_dir().join(".bender"),
    )
}

/// Get the configuration file path.
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Slack credentials
    #[serde(default)]
    pub slack: SlackConfig,

    /// Claude Code CLI invocation settings
    #[serde(default)]
    pub claude: ClaudeConfig,

    /// HTTP API settings
    #[serde(default)]
    pub api: ApiConfig,

    /// Working directory the assistant runs in
    #[serde(default = "default_workspace")]
    pub workspace: PathBuf,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            slack: SlackConfig::default(),
            claude: ClaudeConfig::default(),
            api: ApiConfig::default(),
            workspace: default_workspace(),
            observability: ObservabilityConfig::default(),
        }
    }
}

/// Slack app credentials.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SlackConfig {
    /// Bot token (`xoxb-...`) used for the Web API
    #[serde(default)]
    pub bot_token: Option<String>,

    /// App-level token (`xapp-...`) used for Socket Mode
    #[serde(default)]
    pub app_token: Option<String>,
}

/// Claude Code CLI configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaudeConfig {
    /// Executable name or path
    #[serde(default = "default_claude_binary")]
    pub binary: String,

    /// Invocation timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Passed to the CLI as `ANTHROPIC_API_KEY`
    #[serde(default)]
    pub anthropic_api_key: Option<String>,

    /// Passed to the CLI as `CLAUDE_CODE_OAUTH_TOKEN`
    #[serde(default)]
    pub oauth_token: Option<String>,
}

impl Default for ClaudeConfig {
    fn default() -> Self {
        Self {
            binary: default_claude_binary(),
            timeout_secs: default_timeout(),
            anthropic_api_key: None,
            oauth_token: None,
        }
    }
}

impl ClaudeConfig {
    /// Invocation timeout as a duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// HTTP API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Bearer key required by `/api/invoke`; the endpoint answers 503 when unset
    #[serde(default)]
    pub api_key: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            api_key: None,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level", alias = "level")]
    pub log_level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format", alias = "format")]
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from the default path.
    pub fn load() -> Result<Self> {
        let path = config_path();
        if !path.exists() {
            tracing::info!("Config file not found, using defaults");
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Load configuration with environment variable overrides.
    pub fn load_with_env() -> Result<Self> {
        let mut config = Self::load()?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(token) = lookup("SLACK_BOT_TOKEN") {
            self.slack.bot_token = Some(token);
        }
        if let Some(token) = lookup("SLACK_APP_TOKEN") {
            self.slack.app_token = Some(token);
        }
        if let Some(key) = lookup("ANTHROPIC_API_KEY") {
            self.claude.anthropic_api_key = Some(key);
        }
        if let Some(token) = lookup("CLAUDE_CODE_OAUTH_TOKEN") {
            self.claude.oauth_token = Some(token);
        }
        if let Some(binary) = lookup("BENDER_CLAUDE_BINARY") {
            self.claude.binary = binary;
        }
        if let Some(timeout) = lookup("BENDER_CLAUDE_TIMEOUT") {
            match timeout.parse() {
                Ok(secs) => self.claude.timeout_secs = secs,
                Err(_) => tracing::warn!(value = %timeout, "Ignoring invalid BENDER_CLAUDE_TIMEOUT"),
            }
        }
        if let Some(workspace) = lookup("BENDER_WORKSPACE") {
            self.workspace = PathBuf::from(workspace);
        }
        if let Some(host) = lookup("BENDER_API_HOST") {
            self.api.host = host;
        }
        if let Some(port) = lookup("BENDER_API_PORT") {
            match port.parse() {
                Ok(p) => self.api.port = p,
                Err(_) => tracing::warn!(value = %port, "Ignoring invalid BENDER_API_PORT"),
            }
        }
        if let Some(key) = lookup("BENDER_API_KEY") {
            self.api.api_key = Some(key);
        }
        if let Some(level) = lookup("LOG_LEVEL") {
            self.observability.log_level = level;
        }
        if let Some(format) = lookup("LOG_FORMAT") {
            self.observability.log_format = format;
        }
    }

    /// Check that the credentials required at startup are present.
    pub fn validate(&self) -> crate::Result<()> {
        self.validate_slack()?;
        self.validate_auth()
    }

    /// Both Slack tokens must be configured.
    pub fn validate_slack(&self) -> crate::Result<()> {
        if is_blank(&self.slack.bot_token) {
            return Err(Error::Config("SLACK_BOT_TOKEN is required".into()));
        }
        if is_blank(&self.slack.app_token) {
            return Err(Error::Config("SLACK_APP_TOKEN is required".into()));
        }
        Ok(())
    }

    /// At least one Claude Code authentication method must be configured.
    pub fn validate_auth(&self) -> crate::Result<()> {
        if is_blank(&self.claude.anthropic_api_key) && is_blank(&self.claude.oauth_token) {
            return Err(Error::Config(
                "At least one authentication method must be configured: \
                 ANTHROPIC_API_KEY or CLAUDE_CODE_OAUTH_TOKEN"
                    .into(),
            ));
        }
        Ok(())
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |v| v.trim().is_empty())
}

fn default_workspace() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

fn default_claude_binary() -> String {
    "claude".into()
}

fn default_timeout() -> u64 {
    300
}

fn default_host() -> String {
    "0.0.0.0".into()
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "pretty".into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn configured() -> Config {
        let mut config = Config::default();
        config.slack.bot_token = Some("xoxb-test".into());
        config.slack.app_token = Some("xapp-test".into());
        config
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.claude.binary, "claude");
        assert_eq!(config.claude.timeout_secs, 300);
        assert_eq!(config.api.port, 8080);
        assert!(config.api.api_key.is_none());
        assert_eq!(config.observability.log_level, "info");
        assert_eq!(config.workspace, std::env::current_dir().unwrap());
    }

    #[test]
    fn test_parse_partial_json_uses_defaults() {
        let config: Config = serde_json::from_str(
            r#"{"slack": {"bot_token": "xoxb-file"}, "api": {"port": 9090}}"#,
        )
        .unwrap();
        assert_eq!(config.slack.bot_token.as_deref(), Some("xoxb-file"));
        assert!(config.slack.app_token.is_none());
        assert_eq!(config.api.port, 9090);
        assert_eq!(config.api.host, "0.0.0.0");
        assert_eq!(config.claude.timeout(), Duration::from_secs(300));
    }

    #[test]
    fn test_observability_aliases() {
        let config: Config =
            serde_json::from_str(r#"{"observability": {"level": "debug", "format": "json"}}"#)
                .unwrap();
        assert_eq!(config.observability.log_level, "debug");
        assert_eq!(config.observability.log_format, "json");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"workspace": "/srv/repo", "claude": {"binary": "/opt/claude"}}"#)
            .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.workspace, PathBuf::from("/srv/repo"));
        assert_eq!(config.claude.binary, "/opt/claude");
    }

    #[test]
    fn test_load_from_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "not json").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config"));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_overrides(lookup_from(&[
            ("SLACK_BOT_TOKEN", "xoxb-from-env"),
            ("SLACK_APP_TOKEN", "xapp-from-env"),
            ("ANTHROPIC_API_KEY", "sk-ant-from-env"),
            ("BENDER_API_PORT", "3000"),
            ("BENDER_CLAUDE_TIMEOUT", "60"),
            ("BENDER_WORKSPACE", "/tmp/work"),
            ("LOG_LEVEL", "warning"),
        ]));

        assert_eq!(config.slack.bot_token.as_deref(), Some("xoxb-from-env"));
        assert_eq!(config.slack.app_token.as_deref(), Some("xapp-from-env"));
        assert_eq!(config.claude.anthropic_api_key.as_deref(), Some("sk-ant-from-env"));
        assert_eq!(config.api.port, 3000);
        assert_eq!(config.claude.timeout_secs, 60);
        assert_eq!(config.workspace, PathBuf::from("/tmp/work"));
        assert_eq!(config.observability.log_level, "warning");
    }

    #[test]
    fn test_invalid_numeric_override_is_ignored() {
        let mut config = Config::default();
        config.apply_overrides(lookup_from(&[
            ("BENDER_API_PORT", "not-a-port"),
            ("BENDER_CLAUDE_TIMEOUT", "soon"),
        ]));
        assert_eq!(config.api.port, 8080);
        assert_eq!(config.claude.timeout_secs, 300);
    }

    #[test]
    fn test_auth_with_api_key() {
        let mut config = configured();
        config.claude.anthropic_api_key = Some("sk-ant-test".into());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_auth_with_oauth_token() {
        let mut config = configured();
        config.claude.oauth_token = Some("oauth-test-token".into());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_auth_with_both() {
        let mut config = configured();
        config.claude.anthropic_api_key = Some("sk-ant-test".into());
        config.claude.oauth_token = Some("oauth-test-token".into());
        assert!(config.validate_auth().is_ok());
    }

    #[test]
    fn test_auth_missing() {
        let config = configured();
        let err = config.validate().unwrap_err();
        assert!(err.is_config());
        assert!(err
            .to_string()
            .contains("At least one authentication method"));
    }

    #[test]
    fn test_blank_auth_counts_as_missing() {
        let mut config = configured();
        config.claude.anthropic_api_key = Some("   ".into());
        assert!(config.validate_auth().is_err());
    }

    #[test]
    fn test_missing_slack_tokens() {
        let mut config = Config::default();
        config.claude.anthropic_api_key = Some("sk-ant-test".into());
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("SLACK_BOT_TOKEN"));

        config.slack.bot_token = Some("xoxb-test".into());
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("SLACK_APP_TOKEN"));
    }
}
