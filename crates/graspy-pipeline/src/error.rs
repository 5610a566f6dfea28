//! Error types for the Graspy generation pipeline.
//!
//! This module defines the error hierarchy for every pipeline operation:
//! configuration loading, model-capability calls, content contracts,
//! orchestration, and streaming sessions.

use std::path::PathBuf;

use graspy_content::ContentError;

/// A specialized `Result` type for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors that can occur while generating learning content.
///
/// Error variants are organized by subsystem and include actionable
/// suggestions where possible.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Invalid JSON syntax in the settings file.
    #[error("Invalid JSON in settings file '{path}': {message}\n\nSuggestion: Validate your graspy.json with a JSON linter")]
    ConfigParseError {
        /// Path to the settings file.
        path: PathBuf,
        /// Description of the parse error.
        message: String,
    },

    /// Settings validation failed.
    #[error("Invalid configuration: {message}\n\nSuggestion: {suggestion}")]
    ConfigValidationError {
        /// Description of the validation failure.
        message: String,
        /// Actionable suggestion for the user.
        suggestion: String,
    },

    // ========================================================================
    // Model Capability Errors
    // ========================================================================
    /// The model capability failed.
    #[error("Model error ({kind}): {message}\n\nSuggestion: {suggestion}")]
    Model {
        /// Failure category.
        kind: ModelErrorKind,
        /// Detailed message from the capability.
        message: String,
        /// Actionable suggestion for the user.
        suggestion: String,
    },

    // ========================================================================
    // Content Errors
    // ========================================================================
    /// Generated content failed its structural contract.
    #[error("Generated content violates its contract: {reason}\n\nSuggestion: Regenerate the content; the model output did not match the required structure")]
    ContractViolation {
        /// Which rule was violated.
        reason: String,
    },

    /// The request is missing required fields.
    #[error("Invalid request: {message}")]
    InvalidRequest {
        /// Which fields are missing.
        message: String,
    },

    // ========================================================================
    // Orchestration Errors
    // ========================================================================
    /// The coordinating agent path failed.
    #[error("Lesson orchestration failed: {reason}")]
    OrchestrationFailure {
        /// Why the coordinated result was rejected.
        reason: String,
    },

    /// A direct stage call failed.
    #[error("{stage} stage failed: {source}")]
    StageFailed {
        /// Which stage failed.
        stage: Stage,
        /// Underlying failure.
        #[source]
        source: Box<PipelineError>,
    },

    // ========================================================================
    // Streaming Errors
    // ========================================================================
    /// The streaming session was cancelled before completion.
    #[error("Streaming session cancelled")]
    Cancelled,

    /// Invalid session phase transition attempted.
    #[error("Invalid phase transition: cannot go from {from} to {to}")]
    InvalidPhaseTransition {
        /// The current phase.
        from: String,
        /// The attempted target phase.
        to: String,
    },

    // ========================================================================
    // Serialization Errors
    // ========================================================================
    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Generation stages, used to tag failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Slide design.
    Slides,
    /// Practice authoring.
    Practice,
    /// Subject list generation.
    Subjects,
    /// Topic list generation.
    Topics,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Slides => write!(f, "slide design"),
            Self::Practice => write!(f, "practice authoring"),
            Self::Subjects => write!(f, "subject listing"),
            Self::Topics => write!(f, "topic mapping"),
        }
    }
}

/// Categories of model-capability failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelErrorKind {
    /// Output was truncated by the token budget.
    BudgetExceeded,
    /// Output could not be coerced into the requested shape.
    InvalidOutput,
    /// The capability is unreachable or misconfigured.
    Unavailable,
    /// Any other provider failure.
    Provider,
}

impl std::fmt::Display for ModelErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BudgetExceeded => write!(f, "budget_exceeded"),
            Self::InvalidOutput => write!(f, "invalid_output"),
            Self::Unavailable => write!(f, "unavailable"),
            Self::Provider => write!(f, "provider"),
        }
    }
}

impl ModelErrorKind {
    /// Returns a suggestion message for this error kind.
    #[must_use]
    pub const fn suggestion(&self) -> &'static str {
        match self {
            Self::BudgetExceeded => "Raise the stage token budget in graspy.json",
            Self::InvalidOutput => "Retry; the model returned output that does not match the schema",
            Self::Unavailable => "Check model credentials, region and model id",
            Self::Provider => "Check the model provider's status page",
        }
    }

    /// Classifies a raw provider message.
    ///
    /// Messages mentioning `max_tokens` or a token limit are budget failures.
    #[must_use]
    pub fn from_message(message: &str) -> Self {
        let lower = message.to_lowercase();
        if lower.contains("max_tokens")
            || lower.contains("max tokens")
            || lower.contains("token limit")
        {
            Self::BudgetExceeded
        } else if lower.contains("credential")
            || lower.contains("unauthorized")
            || lower.contains("access denied")
            || lower.contains("could not connect")
            || lower.contains("unavailable")
        {
            Self::Unavailable
        } else if lower.contains("validation") || lower.contains("schema") {
            Self::InvalidOutput
        } else {
            Self::Provider
        }
    }
}

impl From<ContentError> for PipelineError {
    fn from(err: ContentError) -> Self {
        match err {
            ContentError::ContractViolation { reason } => Self::ContractViolation { reason },
            ContentError::InvalidRequest { message } => Self::InvalidRequest { message },
        }
    }
}

impl PipelineError {
    /// Creates a new `ConfigParseError` with the given path and message.
    #[must_use]
    pub fn config_parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ConfigParseError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a new `ConfigValidationError` with the given message and suggestion.
    #[must_use]
    pub fn config_validation(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::ConfigValidationError {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Creates a new `Model` error with the suggestion for its kind.
    #[must_use]
    pub fn model(kind: ModelErrorKind, message: impl Into<String>) -> Self {
        Self::Model {
            kind,
            message: message.into(),
            suggestion: kind.suggestion().to_string(),
        }
    }

    /// Creates a `Model` error classified from a raw provider message.
    #[must_use]
    pub fn from_provider_message(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::model(ModelErrorKind::from_message(&message), message)
    }

    /// Creates a `BudgetExceeded` model error.
    #[must_use]
    pub fn budget_exceeded(message: impl Into<String>) -> Self {
        Self::model(ModelErrorKind::BudgetExceeded, message)
    }

    /// Creates an `InvalidOutput` model error.
    #[must_use]
    pub fn invalid_output(message: impl Into<String>) -> Self {
        Self::model(ModelErrorKind::InvalidOutput, message)
    }

    /// Creates an `Unavailable` model error.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::model(ModelErrorKind::Unavailable, message)
    }

    /// Creates a new `ContractViolation` error.
    #[must_use]
    pub fn contract_violation(reason: impl Into<String>) -> Self {
        Self::ContractViolation {
            reason: reason.into(),
        }
    }

    /// Creates a new `InvalidRequest` error.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Creates a new `OrchestrationFailure` error.
    #[must_use]
    pub fn orchestration(reason: impl Into<String>) -> Self {
        Self::OrchestrationFailure {
            reason: reason.into(),
        }
    }

    /// Wraps an error with the stage it came from.
    #[must_use]
    pub fn stage_failed(stage: Stage, source: Self) -> Self {
        Self::StageFailed {
            stage,
            source: Box::new(source),
        }
    }

    /// Creates a new `InvalidPhaseTransition` error.
    #[must_use]
    pub fn invalid_transition(from: impl std::fmt::Display, to: impl std::fmt::Display) -> Self {
        Self::InvalidPhaseTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Returns the stage-tag-free root of this error.
    #[must_use]
    pub fn root(&self) -> &Self {
        match self {
            Self::StageFailed { source, .. } => source.root(),
            other => other,
        }
    }

    /// Returns the failed stage, if this error is stage-tagged.
    #[must_use]
    pub const fn stage(&self) -> Option<Stage> {
        match self {
            Self::StageFailed { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// Returns `true` if generation was truncated by the token budget.
    #[must_use]
    pub fn is_budget_exceeded(&self) -> bool {
        matches!(
            self.root(),
            Self::Model {
                kind: ModelErrorKind::BudgetExceeded,
                ..
            }
        )
    }

    /// Returns `true` if the model capability itself is unreachable.
    #[must_use]
    pub fn is_upstream_unavailable(&self) -> bool {
        matches!(
            self.root(),
            Self::Model {
                kind: ModelErrorKind::Unavailable,
                ..
            }
        )
    }

    /// Returns `true` if this error is fatal and must never be absorbed by a fallback.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.root(),
            Self::ConfigParseError { .. }
                | Self::ConfigValidationError { .. }
                | Self::InvalidRequest { .. }
                | Self::Cancelled
                | Self::Model {
                    kind: ModelErrorKind::Unavailable,
                    ..
                }
        )
    }
}
