//! Lesson data model.
//!
//! Two families of types live here:
//!
//! - **Drafts** ([`SlideSetDraft`], [`PracticeDraft`]) mirror whatever a
//!   model returned. Every field is lenient so that a malformed payload
//!   reaches the validator instead of failing inside serde.
//! - **Validated** types ([`SlideSet`], [`Practice`], [`LessonAssets`])
//!   encode the structural contract in their shape: fixed-size arrays for
//!   objectives, slides and options, and a clamped answer index.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Number of learning objectives in a slide set.
pub const OBJECTIVE_COUNT: usize = 3;

/// Number of slides in a slide set.
pub const SLIDE_COUNT: usize = 5;

/// Number of options in every multiple-choice item.
pub const OPTION_COUNT: usize = 3;

// ============================================================================
// Slide Types
// ============================================================================

/// Pedagogical role of a slide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlideType {
    /// Introduces the core concept.
    ConceptIntroduction,
    /// Walks through an annotated example.
    WorkedExample,
    /// Three mini tasks of increasing difficulty.
    ScaffoldedProblem,
    /// Quotes and debunks a common misconception.
    Misconception,
    /// Ties the lesson together and previews the next topic.
    Synthesis,
}

impl SlideType {
    /// All slide types in lesson order.
    pub const ALL: [Self; 5] = [
        Self::ConceptIntroduction,
        Self::WorkedExample,
        Self::ScaffoldedProblem,
        Self::Misconception,
        Self::Synthesis,
    ];

    /// Returns the wire name of this slide type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ConceptIntroduction => "concept_introduction",
            Self::WorkedExample => "worked_example",
            Self::ScaffoldedProblem => "scaffolded_problem",
            Self::Misconception => "misconception",
            Self::Synthesis => "synthesis",
        }
    }
}

impl std::fmt::Display for SlideType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Drafts
// ============================================================================

/// Slide set as returned by the slide stage, before validation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlideSetDraft {
    /// Lesson overview paragraph.
    #[serde(default)]
    pub overview: String,

    /// Learning objectives, in order.
    #[serde(default)]
    pub learning_objectives: Vec<String>,

    /// Slides, in order.
    #[serde(default)]
    pub slides: Vec<SlideDraft>,
}

/// A single slide before validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlideDraft {
    /// Pedagogical role.
    #[serde(alias = "type")]
    pub slide_type: SlideType,

    /// Slide title.
    #[serde(default)]
    pub title: String,

    /// Markdown body.
    #[serde(default, alias = "bodyText")]
    pub body_md: String,

    /// Checkpoint question, if the model supplied one.
    #[serde(default)]
    pub assessment: Option<AssessmentDraft>,
}

/// Checkpoint question before validation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentDraft {
    /// Question text.
    #[serde(default)]
    pub prompt: String,

    /// Answer options.
    #[serde(default)]
    pub options: Vec<String>,

    /// Raw answer index; anything other than an integer is repaired to 0.
    #[serde(default)]
    pub answer_index: Option<Value>,

    /// Feedback for a correct answer.
    #[serde(default)]
    pub correct_feedback: String,

    /// Feedback for an incorrect answer.
    #[serde(default)]
    pub incorrect_feedback: String,
}

/// Practice item as returned by the practice stage, before validation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PracticeDraft {
    /// Question text.
    #[serde(default)]
    pub question: String,

    /// Answer options.
    #[serde(default)]
    pub options: Vec<String>,

    /// Raw index of the correct option.
    #[serde(default, alias = "correct_option_index")]
    pub correct_option_index: Option<Value>,

    /// Feedback for a correct answer.
    #[serde(default, alias = "correct_feedback")]
    pub correct_feedback: String,

    /// Feedback for an incorrect answer.
    #[serde(default, alias = "incorrect_feedback")]
    pub incorrect_feedback: String,
}

// ============================================================================
// Validated Types
// ============================================================================

/// Multiple-choice checkpoint attached to a slide.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assessment {
    /// Question kind; always `"choice"`.
    #[serde(rename = "type", default = "choice_kind")]
    pub kind: String,

    /// Question text.
    pub prompt: String,

    /// Exactly three options.
    pub options: [String; OPTION_COUNT],

    /// Index of the correct option, in `0..OPTION_COUNT`.
    pub answer_index: usize,

    /// Feedback for a correct answer.
    pub correct_feedback: String,

    /// Feedback for an incorrect answer.
    pub incorrect_feedback: String,
}

fn choice_kind() -> String {
    "choice".to_string()
}

impl Assessment {
    /// Creates a choice assessment.
    #[must_use]
    pub fn choice(
        prompt: String,
        options: [String; OPTION_COUNT],
        answer_index: usize,
        correct_feedback: String,
        incorrect_feedback: String,
    ) -> Self {
        Self {
            kind: choice_kind(),
            prompt,
            options,
            answer_index,
            correct_feedback,
            incorrect_feedback,
        }
    }
}

/// A validated slide.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Slide {
    /// Pedagogical role.
    pub slide_type: SlideType,
    /// Slide title.
    pub title: String,
    /// Markdown body, non-blank.
    pub body_md: String,
    /// Checkpoint question.
    pub assessment: Assessment,
}

/// A validated five-slide lesson.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlideSet {
    /// Lesson overview, non-blank.
    pub overview: String,
    /// Exactly three objectives.
    pub learning_objectives: [String; OBJECTIVE_COUNT],
    /// Exactly five slides.
    pub slides: [Slide; SLIDE_COUNT],
}

impl SlideSet {
    /// Returns the final slide, which carries the lesson practice item.
    #[must_use]
    pub const fn final_slide(&self) -> &Slide {
        &self.slides[SLIDE_COUNT - 1]
    }
}

/// A validated practice question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Practice {
    /// Question text, non-blank.
    pub question: String,
    /// Exactly three options.
    pub options: [String; OPTION_COUNT],
    /// Index of the correct option, in `0..OPTION_COUNT`.
    pub correct_option_index: usize,
    /// Feedback for a correct answer.
    pub correct_feedback: String,
    /// Feedback for an incorrect answer.
    pub incorrect_feedback: String,
}

/// Slide set whose final slide carries the practice item, plus the practice itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonAssets {
    /// Slides with the practice spliced into the final checkpoint.
    pub slides: SlideSet,
    /// The practice item.
    pub practice: Practice,
}

// ============================================================================
// Curriculum Types
// ============================================================================

/// A subject with its stable identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Subject {
    /// Display name.
    #[serde(alias = "displayName")]
    pub name: String,
    /// Lowercase hyphenated identifier, unique within its list.
    pub slug: String,
}

/// Ordered topic titles keyed by subject slug.
pub type TopicMap = BTreeMap<String, Vec<String>>;
