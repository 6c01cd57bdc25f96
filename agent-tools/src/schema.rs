//! Structural schemas attached to tool descriptors.
//!
//! Schemas of remote tools are not statically known, so a [`ToolSchema`] is a
//! tagged payload: the raw JSON document as advertised, plus an optional
//! validator that enforces it. A schema without a validator is pass-through.

use std::fmt;
use std::sync::Arc;

use jsonschema::JSONSchema;
use serde_json::Value;

use crate::registry::{ToolError, ToolResult};

/// Pluggable validator applied at the registry boundary.
pub trait SchemaValidator: Send + Sync {
    /// Checks `value`, returning a human-readable reason on rejection.
    ///
    /// # Errors
    ///
    /// Returns the violation description when `value` does not conform.
    fn validate(&self, value: &Value) -> Result<(), String>;
}

/// Validator backed by a compiled JSON Schema document.
pub struct JsonSchemaValidator {
    compiled: JSONSchema,
}

impl fmt::Debug for JsonSchemaValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonSchemaValidator").finish_non_exhaustive()
    }
}

impl JsonSchemaValidator {
    /// Compiles the supplied JSON Schema document.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::InvalidDescriptor`] when the document is not a
    /// valid schema.
    pub fn compile(schema: &Value) -> ToolResult<Self> {
        let compiled = JSONSchema::compile(schema).map_err(|err| ToolError::InvalidDescriptor {
            reason: format!("invalid JSON schema: {err}"),
        })?;
        Ok(Self { compiled })
    }
}

impl SchemaValidator for JsonSchemaValidator {
    fn validate(&self, value: &Value) -> Result<(), String> {
        self.compiled.validate(value).map_err(|errors| {
            errors
                .map(|err| {
                    let path = err.instance_path.to_string();
                    if path.is_empty() {
                        err.to_string()
                    } else {
                        format!("{path}: {err}")
                    }
                })
                .collect::<Vec<_>>()
                .join("; ")
        })
    }
}

/// Raw schema document plus an optional validator handle.
#[derive(Clone)]
pub struct ToolSchema {
    raw: Value,
    validator: Option<Arc<dyn SchemaValidator>>,
}

impl fmt::Debug for ToolSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolSchema")
            .field("raw", &self.raw)
            .field("validated", &self.validator.is_some())
            .finish()
    }
}

impl Default for ToolSchema {
    fn default() -> Self {
        Self::unconstrained()
    }
}

impl ToolSchema {
    /// Accepts any value.
    #[must_use]
    pub fn unconstrained() -> Self {
        Self {
            raw: Value::Object(serde_json::Map::new()),
            validator: None,
        }
    }

    /// Keeps `raw` for discovery but never validates against it.
    #[must_use]
    pub fn opaque(raw: Value) -> Self {
        Self {
            raw,
            validator: None,
        }
    }

    /// Compiles `raw` as JSON Schema and validates against it.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::InvalidDescriptor`] when `raw` is not a valid
    /// schema.
    pub fn json_schema(raw: Value) -> ToolResult<Self> {
        let validator = JsonSchemaValidator::compile(&raw)?;
        Ok(Self {
            raw,
            validator: Some(Arc::new(validator)),
        })
    }

    /// Pairs `raw` with a custom validator.
    #[must_use]
    pub fn with_validator(raw: Value, validator: Arc<dyn SchemaValidator>) -> Self {
        Self {
            raw,
            validator: Some(validator),
        }
    }

    /// Returns the raw schema document.
    #[must_use]
    pub const fn raw(&self) -> &Value {
        &self.raw
    }

    /// Returns `true` when a validator is attached.
    #[must_use]
    pub fn is_enforced(&self) -> bool {
        self.validator.is_some()
    }

    /// Validates `value` if a validator is attached.
    ///
    /// # Errors
    ///
    /// Returns the validator's rejection reason.
    pub fn validate(&self, value: &Value) -> Result<(), String> {
        match &self.validator {
            Some(validator) => validator.validate(value),
            None => Ok(()),
        }
    }
}
