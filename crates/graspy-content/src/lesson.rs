//! Lesson response assembly.
//!
//! Turns validated [`LessonAssets`] plus the originating request into the
//! payload handed back to callers: a session record the client keeps for
//! tutoring, and a lesson view it renders directly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{LessonAssets, Practice, Slide, OPTION_COUNT};
use crate::request::ContentRequest;
use crate::Result;

/// Generator identifier recorded in lesson metadata.
pub const LESSON_GENERATOR: &str = "graspy_lesson_v1";

/// Session phase a freshly generated lesson starts in.
const INITIAL_PHASE: &str = "explanation";

// ============================================================================
// Response Types
// ============================================================================

/// Practice question as presented to the learner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonPracticeView {
    /// Question text.
    pub question: String,
    /// Exactly three options.
    pub options: [String; OPTION_COUNT],
    /// Index of the correct option.
    pub answer_index: usize,
    /// Feedback for a correct answer.
    pub correct_feedback: String,
    /// Feedback for an incorrect answer.
    pub incorrect_feedback: String,
}

impl From<&Practice> for LessonPracticeView {
    fn from(practice: &Practice) -> Self {
        Self {
            question: practice.question.clone(),
            options: practice.options.clone(),
            answer_index: practice.correct_option_index,
            correct_feedback: practice.correct_feedback.clone(),
            incorrect_feedback: practice.incorrect_feedback.clone(),
        }
    }
}

/// Position of this topic within its subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LessonProgress {
    /// One-based topic number.
    pub current: u32,
    /// Total topics in the subject.
    pub total: u32,
}

/// Provenance of a generated lesson.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonMetadata {
    /// Learner country.
    pub country: String,
    /// Content language.
    pub language: String,
    /// Grade level as requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grade_level: Option<String>,
    /// Generator identifier.
    pub generator: String,
    /// Objectives of the lesson.
    pub learning_objectives: Vec<String>,
    /// When the lesson was assembled.
    pub generated_at: DateTime<Utc>,
}

/// Session record for a generated lesson.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonSession {
    /// Stable session identifier derived from subject and topic index.
    pub id: String,
    /// Subject display name.
    pub subject: String,
    /// Topic title.
    pub topic: String,
    /// Zero-based topic index.
    pub topic_index: u32,
    /// Total topics, at least 1.
    pub total_topics: u32,
    /// Lesson overview.
    pub explanation: String,
    /// Practice item.
    pub practice: LessonPracticeView,
    /// Slides with the practice spliced into the last checkpoint.
    pub slides: Vec<Slide>,
    /// Current session phase.
    pub phase: String,
    /// Provenance.
    pub metadata: LessonMetadata,
}

/// Render-ready lesson view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonPayload {
    /// Topic title.
    pub title: String,
    /// Lesson overview.
    pub content: String,
    /// Learning objectives.
    pub key_points: Vec<String>,
    /// Slides.
    pub slides: Vec<Slide>,
    /// Practice options labelled `A. `, `B. `, `C. `.
    pub examples: Vec<String>,
    /// Practice item.
    pub practice: LessonPracticeView,
    /// Topic progress.
    pub progress: LessonProgress,
}

/// Complete lesson response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LessonResponse {
    /// Always `true` for an assembled lesson.
    pub success: bool,
    /// Session record.
    pub session: LessonSession,
    /// Lesson view.
    pub lesson: LessonPayload,
}

// ============================================================================
// Assembly
// ============================================================================

impl LessonResponse {
    /// Assembles the response for a validated lesson.
    ///
    /// # Errors
    ///
    /// Returns `ContentError::InvalidRequest` if the request lacks the
    /// fields a lesson needs.
    pub fn assemble(
        request: &ContentRequest,
        assets: &LessonAssets,
        generated_at: DateTime<Utc>,
    ) -> Result<Self> {
        let topic = request.lesson_topic()?;
        let total_topics = request.topic_total();
        let practice = LessonPracticeView::from(&assets.practice);
        let slides = assets.slides.slides.to_vec();
        let objectives = assets.slides.learning_objectives.to_vec();

        let session = LessonSession {
            id: session_id(topic.subject, request.topic_index),
            subject: topic.subject.to_string(),
            topic: topic.topic.to_string(),
            topic_index: request.topic_index,
            total_topics,
            explanation: assets.slides.overview.clone(),
            practice: practice.clone(),
            slides: slides.clone(),
            phase: INITIAL_PHASE.to_string(),
            metadata: LessonMetadata {
                country: topic.country.to_string(),
                language: topic.language.to_string(),
                grade_level: request.grade_level.clone(),
                generator: LESSON_GENERATOR.to_string(),
                learning_objectives: objectives.clone(),
                generated_at,
            },
        };

        let lesson = LessonPayload {
            title: topic.topic.to_string(),
            content: assets.slides.overview.clone(),
            key_points: objectives,
            slides,
            examples: label_options(&practice.options),
            practice,
            progress: LessonProgress {
                current: request.topic_index.saturating_add(1),
                total: total_topics,
            },
        };

        Ok(Self {
            success: true,
            session,
            lesson,
        })
    }
}

/// Builds `lesson-<subject>-<index>` with spaces in the subject hyphenated.
#[must_use]
pub fn session_id(subject: &str, topic_index: u32) -> String {
    format!(
        "lesson-{}-{topic_index}",
        subject.to_lowercase().replace(' ', "-")
    )
}

fn label_options(options: &[String]) -> Vec<String> {
    options
        .iter()
        .zip('A'..='Z')
        .map(|(option, label)| format!("{label}. {option}"))
        .collect()
}
