//! Configuration management for lexigen.
//!
//! Handles loading configuration from TOML files and environment variables:
//! the projects root, server bind address, and LLM provider defaults.

use crate::error::{LexigenError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure for lexigen.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// LLM provider defaults, overridable per project.
    #[serde(default)]
    pub llm: LlmConfig,

    /// Root directory holding per-project databases.
    #[serde(default)]
    pub projects_root: Option<PathBuf>,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address for the API server.
    #[serde(default = "default_addr")]
    pub addr: String,
}

fn default_addr() -> String {
    "127.0.0.1:8600".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: default_addr(),
        }
    }
}

/// LLM provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// LLM provider: "ollama", "openai", or "mock".
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Model name (e.g., "qwen2.5:14b", "gpt-4o-mini").
    #[serde(default = "default_model")]
    pub model: String,

    /// Base URL; empty means the provider default.
    #[serde(default)]
    pub base_url: String,

    /// Per-call timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_provider() -> String {
    "ollama".to_string()
}

fn default_model() -> String {
    "qwen2.5:14b".to_string()
}

fn default_timeout_secs() -> u64 {
    120
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: String::new(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Config {
    /// Returns the default config file path for the current platform.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("lexigen")
            .join("config.toml")
    }

    /// Returns the default projects root for the current platform.
    pub fn default_projects_root() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("lexigen")
            .join("projects")
    }

    /// Loads configuration from a TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| LexigenError::config(format!("Failed to read config file: {e}")))?;

        Self::parse_toml(&content, path)
    }

    /// Parses configuration from a TOML string.
    fn parse_toml(content: &str, path: &Path) -> Result<Self> {
        toml::from_str(content).map_err(|e| {
            LexigenError::config(format!(
                "Configuration error in {}:\n  {}",
                path.display(),
                e
            ))
        })
    }

    /// Resolves the projects root: config value, else platform default.
    pub fn resolve_projects_root(&self) -> PathBuf {
        self.projects_root
            .clone()
            .unwrap_or_else(Self::default_projects_root)
    }

    /// Returns true when the LLM debug sink should be enabled.
    ///
    /// The `LLM_DEBUG` environment variable is the single switch; any
    /// non-empty value other than "0" or "false" turns the sink on.
    pub fn llm_debug_enabled() -> bool {
        match std::env::var("LLM_DEBUG") {
            Ok(v) => !v.is_empty() && v != "0" && !v.eq_ignore_ascii_case("false"),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_config() {
        let toml = r#"
projects_root = "/data/glossaries"

[server]
addr = "0.0.0.0:9000"

[llm]
provider = "openai"
model = "gpt-4o-mini"
base_url = "http://localhost:8080/v1"
timeout_secs = 60
"#;
        let config: Config = toml::from_str(toml).unwrap();

        assert_eq!(config.server.addr, "0.0.0.0:9000");
        assert_eq!(config.llm.provider, "openai");
        assert_eq!(config.llm.model, "gpt-4o-mini");
        assert_eq!(config.llm.timeout_secs, 60);
        assert_eq!(
            config.projects_root,
            Some(PathBuf::from("/data/glossaries"))
        );
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.llm.provider, "ollama");
        assert_eq!(config.llm.timeout_secs, 120);
        assert_eq!(config.server.addr, "127.0.0.1:8600");
        assert!(config.projects_root.is_none());
    }

    #[test]
    fn test_missing_sections_use_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.llm.provider, "ollama");
        assert_eq!(config.server.addr, "127.0.0.1:8600");
    }

    #[test]
    fn test_resolve_projects_root_prefers_config() {
        let config = Config {
            projects_root: Some(PathBuf::from("/tmp/p")),
            ..Default::default()
        };
        assert_eq!(config.resolve_projects_root(), PathBuf::from("/tmp/p"));
    }
}
