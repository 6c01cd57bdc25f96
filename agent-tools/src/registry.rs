//! Runtime registry for tool descriptors and execution.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use agent_primitives::{SecurityLevel, ToolTag};
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::schema::ToolSchema;

/// Result alias for tool operations.
pub type ToolResult<T> = Result<T, ToolError>;

/// Trait implemented by tool executors.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Invokes the tool with the given JSON input, returning JSON output.
    async fn invoke(&self, input: Value) -> ToolResult<Value>;
}

#[async_trait]
impl<F, Fut> Tool for F
where
    F: Send + Sync + Fn(Value) -> Fut,
    Fut: Future<Output = ToolResult<Value>> + Send,
{
    async fn invoke(&self, input: Value) -> ToolResult<Value> {
        (self)(input).await
    }
}

/// Uniform contract every invocable capability satisfies, whatever its
/// origin.
#[derive(Clone)]
pub struct ToolDescriptor {
    name: String,
    description: String,
    version: String,
    tags: BTreeSet<ToolTag>,
    security_level: SecurityLevel,
    input_schema: ToolSchema,
    output_schema: ToolSchema,
    timeout: Option<Duration>,
    max_retries: Option<u32>,
    executor: Arc<dyn Tool>,
}

impl fmt::Debug for ToolDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolDescriptor")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("tags", &self.tags)
            .field("security_level", &self.security_level)
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

impl ToolDescriptor {
    /// Starts building a descriptor for the supplied name and version.
    #[must_use]
    pub fn builder(name: impl Into<String>, version: impl Into<String>) -> ToolDescriptorBuilder {
        ToolDescriptorBuilder {
            name: name.into(),
            version: version.into(),
            description: String::new(),
            tags: BTreeSet::new(),
            security_level: SecurityLevel::default(),
            input_schema: ToolSchema::unconstrained(),
            output_schema: ToolSchema::unconstrained(),
            timeout: None,
            max_retries: None,
        }
    }

    /// Returns the unique tool name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the human-readable description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns the version string.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Returns the discovery tags.
    #[must_use]
    pub const fn tags(&self) -> &BTreeSet<ToolTag> {
        &self.tags
    }

    /// Returns `true` when the descriptor carries `tag`.
    #[must_use]
    pub fn has_tag(&self, tag: ToolTag) -> bool {
        self.tags.contains(&tag)
    }

    /// Returns the security classification.
    #[must_use]
    pub const fn security_level(&self) -> SecurityLevel {
        self.security_level
    }

    /// Returns the input schema.
    #[must_use]
    pub const fn input_schema(&self) -> &ToolSchema {
        &self.input_schema
    }

    /// Returns the output schema.
    #[must_use]
    pub const fn output_schema(&self) -> &ToolSchema {
        &self.output_schema
    }

    /// Returns the per-attempt timeout, if any.
    #[must_use]
    pub const fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Returns the retry budget, if any.
    #[must_use]
    pub const fn max_retries(&self) -> Option<u32> {
        self.max_retries
    }

    /// Runs the executor once with no validation, timeout, or retry.
    ///
    /// # Errors
    ///
    /// Propagates whatever the executor returns.
    pub async fn execute(&self, input: Value) -> ToolResult<Value> {
        self.executor.invoke(input).await
    }

    /// Runs the executor under the descriptor's full contract.
    ///
    /// The input is validated against the input schema, each attempt is
    /// bounded by [`timeout`](Self::timeout), execution failures and timeouts
    /// are retried up to [`max_retries`](Self::max_retries) times, and the
    /// final output is validated against the output schema.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::InvalidInput`] or [`ToolError::InvalidOutput`] on
    /// schema violations, and the last attempt's error once retries are
    /// exhausted.
    pub async fn invoke(&self, input: Value) -> ToolResult<Value> {
        self.input_schema
            .validate(&input)
            .map_err(|reason| ToolError::InvalidInput {
                name: self.name.clone(),
                reason,
            })?;

        let attempts = self.max_retries.unwrap_or(0).saturating_add(1);
        let mut attempt = 0;
        let output = loop {
            attempt += 1;
            match self.run_once(input.clone()).await {
                Ok(output) => break output,
                Err(err) if err.is_retryable() && attempt < attempts => {
                    warn!(tool = %self.name, attempt, error = %err, "tool invocation failed; retrying");
                }
                Err(err) => return Err(err),
            }
        };

        self.output_schema
            .validate(&output)
            .map_err(|reason| ToolError::InvalidOutput {
                name: self.name.clone(),
                reason,
            })?;
        Ok(output)
    }

    async fn run_once(&self, input: Value) -> ToolResult<Value> {
        let Some(limit) = self.timeout else {
            return self.executor.invoke(input).await;
        };

        tokio::time::timeout(limit, self.executor.invoke(input))
            .await
            .map_err(|_| ToolError::Timeout {
                name: self.name.clone(),
                timeout: limit,
            })?
    }
}

/// Builder for [`ToolDescriptor`].
pub struct ToolDescriptorBuilder {
    name: String,
    version: String,
    description: String,
    tags: BTreeSet<ToolTag>,
    security_level: SecurityLevel,
    input_schema: ToolSchema,
    output_schema: ToolSchema,
    timeout: Option<Duration>,
    max_retries: Option<u32>,
}

impl ToolDescriptorBuilder {
    /// Sets the human-readable description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Adds a discovery tag.
    #[must_use]
    pub fn tag(mut self, tag: ToolTag) -> Self {
        self.tags.insert(tag);
        self
    }

    /// Adds several discovery tags.
    #[must_use]
    pub fn tags(mut self, tags: impl IntoIterator<Item = ToolTag>) -> Self {
        self.tags.extend(tags);
        self
    }

    /// Sets the security classification.
    #[must_use]
    pub fn security_level(mut self, level: SecurityLevel) -> Self {
        self.security_level = level;
        self
    }

    /// Sets the input schema.
    #[must_use]
    pub fn input_schema(mut self, schema: ToolSchema) -> Self {
        self.input_schema = schema;
        self
    }

    /// Sets the output schema.
    #[must_use]
    pub fn output_schema(mut self, schema: ToolSchema) -> Self {
        self.output_schema = schema;
        self
    }

    /// Bounds each invocation attempt.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets how many times a failed attempt is retried.
    #[must_use]
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Finalises the descriptor with its executor.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::InvalidDescriptor`] if the name or version is
    /// blank.
    pub fn build<T>(self, executor: T) -> ToolResult<ToolDescriptor>
    where
        T: Tool + 'static,
    {
        self.build_shared(Arc::new(executor))
    }

    /// Finalises the descriptor with an already shared executor.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::InvalidDescriptor`] if the name or version is
    /// blank.
    pub fn build_shared(self, executor: Arc<dyn Tool>) -> ToolResult<ToolDescriptor> {
        if self.name.trim().is_empty() {
            return Err(ToolError::InvalidDescriptor {
                reason: "tool name cannot be empty".into(),
            });
        }
        if self.version.trim().is_empty() {
            return Err(ToolError::InvalidDescriptor {
                reason: "tool version cannot be empty".into(),
            });
        }

        Ok(ToolDescriptor {
            name: self.name,
            description: self.description,
            version: self.version,
            tags: self.tags,
            security_level: self.security_level,
            input_schema: self.input_schema,
            output_schema: self.output_schema,
            timeout: self.timeout,
            max_retries: self.max_retries,
            executor,
        })
    }
}

#[derive(Default)]
struct RegistryInner {
    order: Vec<String>,
    tools: HashMap<String, Arc<ToolDescriptor>>,
}

impl RegistryInner {
    fn ordered(&self) -> impl Iterator<Item = &Arc<ToolDescriptor>> {
        self.order.iter().filter_map(|name| self.tools.get(name))
    }
}

/// Registry that stores tool descriptors keyed by name.
///
/// Registration is last-write-wins: re-registering a name replaces the
/// descriptor but keeps its original position in registration order. All
/// reads return snapshots.
#[derive(Default)]
pub struct ToolRegistry {
    inner: RwLock<RegistryInner>,
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("registered", &self.names())
            .finish()
    }
}

impl ToolRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, RegistryInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RegistryInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Inserts or replaces the descriptor keyed by its name.
    ///
    /// Returns the descriptor that was replaced, if any.
    pub fn register(&self, descriptor: ToolDescriptor) -> Option<Arc<ToolDescriptor>> {
        let mut inner = self.write();
        let name = descriptor.name().to_owned();
        let previous = inner.tools.insert(name.clone(), Arc::new(descriptor));
        if previous.is_some() {
            debug!(tool = %name, "tool descriptor replaced");
        } else {
            inner.order.push(name);
        }
        previous
    }

    /// Returns the descriptor registered under `name`.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<Arc<ToolDescriptor>> {
        self.read().tools.get(name).cloned()
    }

    /// Returns every descriptor carrying `tag`, in registration order.
    #[must_use]
    pub fn find_by_tag(&self, tag: ToolTag) -> Vec<Arc<ToolDescriptor>> {
        self.filtered(|descriptor| descriptor.has_tag(tag))
    }

    /// Returns every descriptor at exactly `level`, in registration order.
    #[must_use]
    pub fn find_by_security(&self, level: SecurityLevel) -> Vec<Arc<ToolDescriptor>> {
        self.filtered(|descriptor| descriptor.security_level() == level)
    }

    /// Returns the descriptors that may be offered under `ceiling`.
    #[must_use]
    pub fn permitted(&self, ceiling: SecurityLevel) -> Vec<Arc<ToolDescriptor>> {
        self.filtered(|descriptor| descriptor.security_level().permits(ceiling))
    }

    /// Returns all descriptors in registration order.
    #[must_use]
    pub fn list(&self) -> Vec<Arc<ToolDescriptor>> {
        self.filtered(|_| true)
    }

    /// Returns registered names in registration order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.read().order.clone()
    }

    /// Number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().tools.len()
    }

    /// Returns `true` when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Invokes a registered tool under its descriptor contract.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::UnknownTool`] when the tool is not found, or any
    /// error from [`ToolDescriptor::invoke`].
    pub async fn invoke(&self, name: &str, input: Value) -> ToolResult<Value> {
        let descriptor = self.find(name).ok_or_else(|| ToolError::UnknownTool {
            name: name.to_owned(),
        })?;
        descriptor.invoke(input).await
    }

    fn filtered(&self, keep: impl Fn(&ToolDescriptor) -> bool) -> Vec<Arc<ToolDescriptor>> {
        self.read()
            .ordered()
            .filter(|descriptor| keep(descriptor))
            .cloned()
            .collect()
    }
}

/// Errors produced by tool registration and invocation.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Descriptor failed validation.
    #[error("invalid tool descriptor: {reason}")]
    InvalidDescriptor {
        /// Human-readable reason for rejection.
        reason: String,
    },

    /// Requested tool does not exist.
    #[error("tool `{name}` is not registered")]
    UnknownTool {
        /// Name of the missing tool.
        name: String,
    },

    /// Input was rejected by the input schema.
    #[error("invalid input for tool `{name}`: {reason}")]
    InvalidInput {
        /// Tool name.
        name: String,
        /// Validator output.
        reason: String,
    },

    /// Output was rejected by the output schema.
    #[error("invalid output from tool `{name}`: {reason}")]
    InvalidOutput {
        /// Tool name.
        name: String,
        /// Validator output.
        reason: String,
    },

    /// An attempt exceeded the descriptor timeout.
    #[error("tool `{name}` timed out after {timeout:?}")]
    Timeout {
        /// Tool name.
        name: String,
        /// Configured per-attempt limit.
        timeout: Duration,
    },

    /// Tool execution failed.
    #[error("tool execution failed: {reason}")]
    Execution {
        /// Human-readable error returned by the tool implementation.
        reason: String,
    },
}

impl ToolError {
    /// Creates an execution error from the supplied reason.
    #[must_use]
    pub fn execution(reason: impl Into<String>) -> Self {
        Self::Execution {
            reason: reason.into(),
        }
    }

    /// Returns `true` for failures a retry might fix.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Execution { .. } | Self::Timeout { .. })
    }
}
