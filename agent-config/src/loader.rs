//! Configuration loader implementations.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

use crate::schema::HostConfig;

/// Environment variable overriding the web search API key.
pub const WEB_API_KEY_ENV: &str = "AGENT_HOST_WEB_API_KEY";

/// Environment variable overriding the Semantic Scholar API key.
pub const SEMANTIC_SCHOLAR_API_KEY_ENV: &str = "AGENT_HOST_SEMANTIC_SCHOLAR_API_KEY";

impl HostConfig {
    /// Parses and validates a JSON configuration document.
    ///
    /// # Errors
    ///
    /// Returns an error when the document is not valid JSON, does not match
    /// the schema, or fails validation.
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(raw).context("failed to parse host configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a JSON configuration file and applies environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let mut config = Self::from_json_str(&raw)
            .with_context(|| format!("invalid configuration in {}", path.display()))?;
        config.apply_env_overrides();
        debug!(
            path = %path.display(),
            servers = config.mcp_servers.len(),
            "host configuration loaded"
        );
        Ok(config)
    }

    /// Replaces secrets with values from the process environment when set.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup(WEB_API_KEY_ENV).filter(|value| !value.is_empty()) {
            self.research.web_api_key = Some(key);
        }
        if let Some(key) = lookup(SEMANTIC_SCHOLAR_API_KEY_ENV).filter(|value| !value.is_empty()) {
            self.research.semantic_scholar_api_key = Some(key);
        }
    }
}
