//! Capability classification shared across the agent host.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Trust exposure of a tool, ordered from least to most exposed.
///
/// The ordering is meaningful: a runtime that permits `Network` tools in a
/// given context also permits `Local` and `Sandboxed` ones.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityLevel {
    /// Runs in-process with no external access.
    #[default]
    Local,
    /// Runs inside an isolation boundary.
    Sandboxed,
    /// Reaches out over the network.
    Network,
    /// Delegates to a third-party cloud service.
    Cloud,
}

impl SecurityLevel {
    /// All levels in increasing order of exposure.
    pub const ALL: [Self; 4] = [Self::Local, Self::Sandboxed, Self::Network, Self::Cloud];

    /// Returns `true` when a tool at this level may run under `ceiling`.
    #[must_use]
    pub fn permits(self, ceiling: Self) -> bool {
        self <= ceiling
    }

    /// Returns the canonical lowercase label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Sandboxed => "sandboxed",
            Self::Network => "network",
            Self::Cloud => "cloud",
        }
    }
}

impl fmt::Display for SecurityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SecurityLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|level| level.as_str() == s)
            .ok_or_else(|| Error::unknown("security level", s))
    }
}

/// Discovery label attached to a tool.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolTag {
    /// General web access.
    Web,
    /// Scholarly literature search.
    Academic,
    /// Legal document tooling.
    Legal,
    /// Optical character recognition.
    Ocr,
    /// Embedding generation.
    Embedding,
    /// Tool bridged from a remote MCP server.
    Mcp,
    /// Code analysis or execution.
    Code,
    /// Structured data access.
    Data,
}

impl ToolTag {
    /// All known tags.
    pub const ALL: [Self; 8] = [
        Self::Web,
        Self::Academic,
        Self::Legal,
        Self::Ocr,
        Self::Embedding,
        Self::Mcp,
        Self::Code,
        Self::Data,
    ];

    /// Returns the canonical lowercase label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Web => "web",
            Self::Academic => "academic",
            Self::Legal => "legal",
            Self::Ocr => "ocr",
            Self::Embedding => "embedding",
            Self::Mcp => "mcp",
            Self::Code => "code",
            Self::Data => "data",
        }
    }
}

impl fmt::Display for ToolTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolTag {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|tag| tag.as_str() == s)
            .ok_or_else(|| Error::unknown("tool tag", s))
    }
}
