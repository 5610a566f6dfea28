//! Graspy Learning Content
//!
//! This crate holds the data model for generated learning assets and the
//! rules every generated payload must pass before it reaches a learner.
//! It is pure and performs no I/O.
//!
//! # Modules
//!
//! - [`request`] - The inbound [`ContentRequest`] and grade descriptions
//! - [`model`] - Draft (raw) and validated lesson types
//! - [`normalize`] - Text cleanup applied to every generated string
//! - [`validate`] - Structural contracts for slide sets and practice items
//! - [`slug`] - Subject identity normalization
//! - [`lesson`] - Assembly of the lesson response returned to callers
//!
//! # Example
//!
//! ```rust
//! use graspy_content::slug::normalize_subjects;
//!
//! let subjects = normalize_subjects(&["Biology".to_string(), "biology!".to_string()]);
//! assert_eq!(subjects[0].slug, "biology");
//! assert_eq!(subjects[1].slug, "biology-2");
//! ```

pub mod lesson;
pub mod model;
pub mod normalize;
pub mod request;
pub mod slug;
pub mod validate;

pub use lesson::{
    LessonMetadata, LessonPayload, LessonPracticeView, LessonProgress, LessonResponse,
    LessonSession, LESSON_GENERATOR,
};
pub use model::{
    Assessment, AssessmentDraft, LessonAssets, Practice, PracticeDraft, Slide, SlideDraft,
    SlideSet, SlideSetDraft, SlideType, Subject, TopicMap, OBJECTIVE_COUNT, OPTION_COUNT,
    SLIDE_COUNT,
};
pub use normalize::normalize;
pub use request::{describe_grade_level, ContentRequest, LessonTopic, DEFAULT_LESSON_GRADE};
pub use slug::{dedupe_by_slug, normalize_subjects, sanitize_sequence, slugify, FALLBACK_SLUG};
pub use validate::{attach_practice, repair_answer_index, validate_practice, validate_slide_set};

use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Errors raised by content rules.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContentError {
    /// A generated payload failed its structural contract after normalization.
    #[error("Generated content violates its contract: {reason}\n\nSuggestion: Regenerate the content; the model output did not match the required structure")]
    ContractViolation {
        /// Human-readable description of the violated rule.
        reason: String,
    },

    /// The inbound request is missing required fields.
    #[error("Invalid content request: {message}")]
    InvalidRequest {
        /// Which fields are missing or malformed.
        message: String,
    },
}

impl ContentError {
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
}

/// Result type for content operations.
pub type Result<T> = std::result::Result<T, ContentError>;
