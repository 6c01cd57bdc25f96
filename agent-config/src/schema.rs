//! Strongly typed configuration schemas.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::time::Duration;

use agent_primitives::AcademicProvider;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const DEFAULT_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_MAX_RETRIES: u32 = 3;

/// Errors raised while validating configuration values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A required field was blank.
    #[error("{field} must not be empty")]
    EmptyField {
        /// Name of the offending field.
        field: &'static str,
    },

    /// An endpoint did not match the configured transport.
    #[error("MCP server `{server}` has invalid endpoint: {reason}")]
    InvalidEndpoint {
        /// Server name.
        server: String,
        /// Why the endpoint was rejected.
        reason: String,
    },

    /// The configured timeout was zero.
    #[error("MCP server `{server}` timeout must be greater than zero")]
    ZeroTimeout {
        /// Server name.
        server: String,
    },

    /// Two servers share a name.
    #[error("MCP server `{0}` is configured more than once")]
    DuplicateServer(String),

    /// Research settings were inconsistent.
    #[error("invalid research settings: {0}")]
    InvalidResearch(&'static str),
}

/// Wire transport used to reach an MCP server.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum McpTransportKind {
    /// Spawned child process speaking over stdin/stdout.
    Stdio,
    /// Persistent WebSocket connection.
    Websocket,
    /// One HTTP POST per message.
    Http,
}

impl fmt::Display for McpTransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Stdio => "stdio",
            Self::Websocket => "websocket",
            Self::Http => "http",
        })
    }
}

/// Connection settings for one MCP server.
///
/// Values are validated on construction and immutable afterwards. For the
/// `stdio` transport the endpoint names the program to spawn.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawMcpServerConfig", rename_all = "camelCase")]
pub struct McpServerConfig {
    name: String,
    transport: McpTransportKind,
    endpoint: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    args: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    env: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    auth_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    max_retries: Option<u32>,
}

impl fmt::Debug for McpServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("McpServerConfig")
            .field("name", &self.name)
            .field("transport", &self.transport)
            .field("endpoint", &self.endpoint)
            .field("args", &self.args)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "<redacted>"))
            .field("timeout_ms", &self.timeout_ms)
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

impl McpServerConfig {
    /// Creates a configuration for the given server.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the name or endpoint is blank or the
    /// endpoint scheme does not fit the transport.
    pub fn new(
        name: impl Into<String>,
        transport: McpTransportKind,
        endpoint: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let name = name.into().trim().to_owned();
        if name.is_empty() {
            return Err(ConfigError::EmptyField {
                field: "server name",
            });
        }

        let endpoint = endpoint.into().trim().to_owned();
        if endpoint.is_empty() {
            return Err(ConfigError::EmptyField {
                field: "server endpoint",
            });
        }
        validate_endpoint(&name, transport, &endpoint)?;

        Ok(Self {
            name,
            transport,
            endpoint,
            args: Vec::new(),
            env: BTreeMap::new(),
            auth_token: None,
            timeout_ms: None,
            max_retries: None,
        })
    }

    /// Sets command-line arguments passed to a `stdio` server.
    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Sets environment variables passed to a `stdio` server.
    #[must_use]
    pub fn with_env(mut self, env: impl IntoIterator<Item = (String, String)>) -> Self {
        self.env = env.into_iter().collect();
        self
    }

    /// Sets the bearer token presented to the server.
    #[must_use]
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Sets the per-request timeout in milliseconds.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ZeroTimeout`] when `timeout_ms` is zero.
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Result<Self, ConfigError> {
        if timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout { server: self.name });
        }
        self.timeout_ms = Some(timeout_ms);
        Ok(self)
    }

    /// Sets the retry budget for transport-level failures.
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Server name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Transport flavour.
    #[must_use]
    pub const fn transport(&self) -> McpTransportKind {
        self.transport
    }

    /// URL or program path, depending on the transport.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Arguments for a spawned `stdio` server.
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Extra environment for a spawned `stdio` server.
    #[must_use]
    pub const fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// Optional bearer token.
    #[must_use]
    pub fn auth_token(&self) -> Option<&str> {
        self.auth_token.as_deref()
    }

    /// Effective per-request timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS))
    }

    /// Effective retry budget.
    #[must_use]
    pub fn max_retries(&self) -> u32 {
        self.max_retries.unwrap_or(DEFAULT_MAX_RETRIES)
    }
}

fn validate_endpoint(
    server: &str,
    transport: McpTransportKind,
    endpoint: &str,
) -> Result<(), ConfigError> {
    let schemes: &[&str] = match transport {
        McpTransportKind::Stdio => return Ok(()),
        McpTransportKind::Http => &["http://", "https://"],
        McpTransportKind::Websocket => &["ws://", "wss://"],
    };

    if schemes.iter().any(|scheme| endpoint.starts_with(scheme)) {
        Ok(())
    } else {
        Err(ConfigError::InvalidEndpoint {
            server: server.to_owned(),
            reason: format!("{transport} endpoint must start with {}", schemes.join(" or ")),
        })
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMcpServerConfig {
    name: String,
    transport: McpTransportKind,
    endpoint: String,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    env: BTreeMap<String, String>,
    #[serde(default)]
    auth_token: Option<String>,
    #[serde(default)]
    timeout_ms: Option<u64>,
    #[serde(default)]
    max_retries: Option<u32>,
}

impl TryFrom<RawMcpServerConfig> for McpServerConfig {
    type Error = ConfigError;

    fn try_from(raw: RawMcpServerConfig) -> Result<Self, Self::Error> {
        let mut config = Self::new(raw.name, raw.transport, raw.endpoint)?
            .with_args(raw.args)
            .with_env(raw.env);
        if let Some(token) = raw.auth_token {
            config = config.with_auth_token(token);
        }
        if let Some(timeout_ms) = raw.timeout_ms {
            config = config.with_timeout_ms(timeout_ms)?;
        }
        if let Some(max_retries) = raw.max_retries {
            config = config.with_max_retries(max_retries);
        }
        Ok(config)
    }
}

/// Settings for the multi-source research pipeline.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ResearchSettings {
    /// Final result budget applied after merge, dedupe, and rerank.
    pub max_sources: usize,
    /// Academic indices queried, in order.
    pub academic_providers: Vec<AcademicProvider>,
    /// Working budget requested from the academic connector.
    pub academic_budget: usize,
    /// Working budget requested from the web connector.
    pub web_budget: usize,
    /// Web search API key; the web connector is disabled without one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub web_api_key: Option<String>,
    /// Optional Semantic Scholar API key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub semantic_scholar_api_key: Option<String>,
    /// Earliest publication year for academic results.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year_from: Option<i32>,
    /// Latest publication year for academic results.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year_to: Option<i32>,
    /// Venue allow-list for academic results.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub venues: Vec<String>,
    /// Domain allow-list for web results.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub domain_filters: Vec<String>,
}

impl fmt::Debug for ResearchSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResearchSettings")
            .field("max_sources", &self.max_sources)
            .field("academic_providers", &self.academic_providers)
            .field("academic_budget", &self.academic_budget)
            .field("web_budget", &self.web_budget)
            .field("web_api_key", &self.web_api_key.as_ref().map(|_| "<redacted>"))
            .field("year_from", &self.year_from)
            .field("year_to", &self.year_to)
            .field("venues", &self.venues)
            .field("domain_filters", &self.domain_filters)
            .finish_non_exhaustive()
    }
}

impl Default for ResearchSettings {
    fn default() -> Self {
        Self {
            max_sources: 15,
            academic_providers: vec![AcademicProvider::SemanticScholar, AcademicProvider::Arxiv],
            academic_budget: 20,
            web_budget: 10,
            web_api_key: None,
            semantic_scholar_api_key: None,
            year_from: None,
            year_to: None,
            venues: Vec::new(),
            domain_filters: Vec::new(),
        }
    }
}

impl ResearchSettings {
    /// Validates budget and year-range consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidResearch`] when a working budget is zero
    /// or the year range is inverted.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.academic_budget == 0 || self.web_budget == 0 {
            return Err(ConfigError::InvalidResearch(
                "connector budgets must be greater than zero",
            ));
        }
        if let (Some(from), Some(to)) = (self.year_from, self.year_to) {
            if from > to {
                return Err(ConfigError::InvalidResearch(
                    "yearFrom cannot be later than yearTo",
                ));
            }
        }
        Ok(())
    }
}

/// Top-level host configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HostConfig {
    /// MCP servers bridged into the tool registry at startup.
    pub mcp_servers: Vec<McpServerConfig>,
    /// Research pipeline settings.
    pub research: ResearchSettings,
}

impl HostConfig {
    /// Validates cross-field invariants.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::DuplicateServer`] when two MCP servers share a
    /// name, or research validation errors.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for server in &self.mcp_servers {
            if !seen.insert(server.name()) {
                return Err(ConfigError::DuplicateServer(server.name().to_owned()));
            }
        }
        self.research.validate()
    }
}
