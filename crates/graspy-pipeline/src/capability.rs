//! The model capability contract.
//!
//! The pipeline never talks to a model provider directly. Embedders supply
//! an implementation of [`ModelCapability`] that knows how to invoke,
//! authenticate and select a model; the pipeline only sees two calls:
//!
//! - [`ModelCapability::structured_generate`] returns JSON conforming to an
//!   [`OutputShape`]
//! - [`ModelCapability::orchestrated_generate`] runs a coordinating agent
//!   that may call the tools exposed by a [`ToolInvoker`] before returning
//!   raw text
//!
//! Implementations report a truncated generation as
//! [`ModelErrorKind::BudgetExceeded`](crate::error::ModelErrorKind) and an
//! unreachable provider as `Unavailable`; everything else is up to them.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{PipelineError, Result};

// ============================================================================
// Call Options
// ============================================================================

/// Per-call sampling options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationOptions {
    /// Sampling temperature; `None` uses the capability's default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Output token budget; `None` uses the capability's default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl GenerationOptions {
    /// Options with only a token budget.
    #[must_use]
    pub const fn with_budget(max_tokens: Option<u32>) -> Self {
        Self {
            temperature: None,
            max_tokens,
        }
    }

    /// Sets the temperature.
    #[must_use]
    pub const fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// Named JSON schema a structured call must conform to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputShape {
    /// Shape name, used in error messages and by providers that name tools.
    pub name: &'static str,
    /// JSON schema of the expected object.
    pub schema: Value,
}

/// A type that can be requested from [`ModelCapability::structured_generate`].
pub trait StructuredOutput: DeserializeOwned + Send {
    /// Shape name.
    const NAME: &'static str;

    /// JSON schema describing the wire form of this type.
    fn schema() -> Value;

    /// Builds the [`OutputShape`] for this type.
    fn shape() -> OutputShape {
        OutputShape {
            name: Self::NAME,
            schema: Self::schema(),
        }
    }
}

// ============================================================================
// Tools
// ============================================================================

/// Description of a tool offered to a coordinating agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    /// Tool name (`snake_case`).
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// JSON schema for the tool's arguments.
    pub parameters: Value,
}

impl ToolSpec {
    /// Creates a tool taking a single JSON-string argument.
    #[must_use]
    pub fn json_string_tool(name: &str, description: &str, argument: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    argument: {
                        "type": "string",
                        "description": "JSON-encoded argument"
                    }
                },
                "required": [argument]
            }),
        }
    }
}

/// Table of callable tools handed to [`ModelCapability::orchestrated_generate`].
#[async_trait]
pub trait ToolInvoker: Send + Sync {
    /// Tools the agent may call.
    fn specs(&self) -> Vec<ToolSpec>;

    /// Invokes a tool by name with its JSON-string argument.
    ///
    /// Returns the tool output as a JSON string.
    async fn invoke(&self, name: &str, argument: &str) -> Result<String>;
}

// ============================================================================
// Capability
// ============================================================================

/// Opaque generative capability consumed by the pipeline.
///
/// Implementations must be reentrant: concurrent calls for unrelated
/// requests share nothing.
#[async_trait]
pub trait ModelCapability: Send + Sync {
    /// Generates a JSON value conforming to `shape`.
    ///
    /// # Errors
    ///
    /// `InvalidOutput` when the raw output cannot be coerced into `shape`,
    /// `BudgetExceeded` when generation was truncated by `max_tokens`.
    async fn structured_generate(
        &self,
        shape: &OutputShape,
        prompt: &str,
        system: &str,
        options: GenerationOptions,
    ) -> Result<Value>;

    /// Runs a coordinating agent that may call `tools` and returns its final text.
    async fn orchestrated_generate(
        &self,
        prompt: &str,
        system: &str,
        tools: &dyn ToolInvoker,
        options: GenerationOptions,
    ) -> Result<String>;
}

/// Requests a `T` from the capability and decodes it.
///
/// # Errors
///
/// Propagates capability errors; a value that does not decode into `T` is
/// an `InvalidOutput` model error.
pub async fn generate<T: StructuredOutput>(
    model: &dyn ModelCapability,
    prompt: &str,
    system: &str,
    options: GenerationOptions,
) -> Result<T> {
    let shape = T::shape();
    let value = model
        .structured_generate(&shape, prompt, system, options)
        .await?;
    serde_json::from_value(value).map_err(|e| {
        PipelineError::invalid_output(format!("{} did not match its schema: {e}", shape.name))
    })
}
