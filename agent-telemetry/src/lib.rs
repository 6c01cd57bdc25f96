//! Observability utilities for the agent host.

#![warn(missing_docs, clippy::pedantic)]

pub mod tracing_support {
    //! Structured tracing helpers.

    use anyhow::{Context, Result};
    use tracing_subscriber::EnvFilter;

    /// Installs a global `fmt` subscriber filtered by `RUST_LOG`, falling
    /// back to `default_directive` (for example `info` or
    /// `agent_adapters=debug`) when the variable is unset or invalid.
    ///
    /// # Errors
    ///
    /// Returns an error if `default_directive` does not parse or a global
    /// subscriber is already installed.
    pub fn init(default_directive: &str) -> Result<()> {
        let filter = env_filter(default_directive)?;
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_level(true)
            .try_init()
            .map_err(|err| anyhow::anyhow!("failed to install tracing subscriber: {err}"))
    }

    /// Installs a test-writer subscriber, ignoring an already installed one.
    pub fn try_init_for_tests() {
        let Ok(filter) = env_filter("debug") else {
            return;
        };
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    }

    fn env_filter(default_directive: &str) -> Result<EnvFilter> {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return Ok(filter);
        }
        EnvFilter::try_new(default_directive)
            .with_context(|| format!("invalid log directive `{default_directive}`"))
    }

}
