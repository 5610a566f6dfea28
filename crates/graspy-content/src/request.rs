//! Inbound content requests.
//!
//! A [`ContentRequest`] carries everything a generation run needs to know
//! about the learner: where they are, what language they read, and which
//! subject and topic they are working on. It is deserialized from the
//! HTTP boundary and then only ever borrowed by the pipeline.

use serde::{Deserialize, Serialize};

use crate::{ContentError, Result};

/// Grade phrase used in lesson prompts when the request has none.
pub const DEFAULT_LESSON_GRADE: &str = "middle school";

/// Learner description used in curriculum prompts when the request has no grade.
const DEFAULT_LEARNER_DESCRIPTION: &str = "middle school learners";

// ============================================================================
// Request
// ============================================================================

/// Learner context for a lesson or curriculum generation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentRequest {
    /// Country the learner studies in.
    pub country: String,

    /// Language the content must be written in.
    pub language: String,

    /// Subject display name (required for lessons).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,

    /// Topic title (required for lessons).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,

    /// Free-form grade level such as "beginner" or "Form 2".
    #[serde(default, alias = "grade", skip_serializing_if = "Option::is_none")]
    pub grade_level: Option<String>,

    /// Zero-based position of the topic within its subject.
    #[serde(default)]
    pub topic_index: u32,

    /// Number of topics in the subject.
    #[serde(default = "default_total_topics")]
    pub total_topics: u32,

    /// Learner-supplied subject preferences for curriculum planning.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subjects: Vec<String>,
}

const fn default_total_topics() -> u32 {
    1
}

/// Borrowed view of a request that has passed lesson validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LessonTopic<'a> {
    /// Learner country.
    pub country: &'a str,
    /// Content language.
    pub language: &'a str,
    /// Subject display name.
    pub subject: &'a str,
    /// Topic title.
    pub topic: &'a str,
    /// Grade phrase for prompts.
    pub grade: &'a str,
}

impl ContentRequest {
    /// Creates a request for the given country and language.
    #[must_use]
    pub fn new(country: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            country: country.into(),
            language: language.into(),
            subject: None,
            topic: None,
            grade_level: None,
            topic_index: 0,
            total_topics: default_total_topics(),
            subjects: Vec::new(),
        }
    }

    /// Sets the subject.
    #[must_use]
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Sets the topic.
    #[must_use]
    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    /// Sets the grade level.
    #[must_use]
    pub fn with_grade_level(mut self, grade_level: impl Into<String>) -> Self {
        self.grade_level = Some(grade_level.into());
        self
    }

    /// Sets the topic position within the subject.
    #[must_use]
    pub const fn with_topic_position(mut self, topic_index: u32, total_topics: u32) -> Self {
        self.topic_index = topic_index;
        self.total_topics = total_topics;
        self
    }

    /// Sets the learner's subject preferences.
    #[must_use]
    pub fn with_subject_preferences(mut self, subjects: Vec<String>) -> Self {
        self.subjects = subjects;
        self
    }

    /// Checks that country and language are present.
    pub fn ensure_locale(&self) -> Result<()> {
        if self.country.trim().is_empty() || self.language.trim().is_empty() {
            return Err(ContentError::invalid_request(
                "country and language are required",
            ));
        }
        Ok(())
    }

    /// Validates the fields a lesson needs and returns a borrowed view.
    ///
    /// # Errors
    ///
    /// Returns `ContentError::InvalidRequest` naming every missing field.
    pub fn lesson_topic(&self) -> Result<LessonTopic<'_>> {
        let subject = non_blank(self.subject.as_deref());
        let topic = non_blank(self.topic.as_deref());

        let mut missing = Vec::new();
        if self.country.trim().is_empty() {
            missing.push("country");
        }
        if self.language.trim().is_empty() {
            missing.push("language");
        }
        if subject.is_none() {
            missing.push("subject");
        }
        if topic.is_none() {
            missing.push("topic");
        }

        match (subject, topic) {
            (Some(subject), Some(topic)) if missing.is_empty() => Ok(LessonTopic {
                country: self.country.trim(),
                language: self.language.trim(),
                subject,
                topic,
                grade: self.lesson_grade(),
            }),
            _ => Err(ContentError::invalid_request(format!(
                "{} required to generate a lesson",
                missing.join(", ")
            ))),
        }
    }

    /// Grade phrase for lesson prompts.
    #[must_use]
    pub fn lesson_grade(&self) -> &str {
        non_blank(self.grade_level.as_deref()).unwrap_or(DEFAULT_LESSON_GRADE)
    }

    /// Learner description for curriculum prompts.
    #[must_use]
    pub fn learner_description(&self) -> String {
        describe_grade_level(self.grade_level.as_deref())
    }

    /// Clamped topic total used in progress reporting.
    #[must_use]
    pub fn topic_total(&self) -> u32 {
        self.total_topics.max(1)
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Maps the well-known grade bands to a learner description.
///
/// Unknown values pass through unchanged; an absent grade yields a
/// middle-school default.
#[must_use]
pub fn describe_grade_level(grade_level: Option<&str>) -> String {
    let Some(grade) = non_blank(grade_level) else {
        return DEFAULT_LEARNER_DESCRIPTION.to_string();
    };
    match grade.to_lowercase().as_str() {
        "beginner" => "early primary learners (ages 6-8)".to_string(),
        "elementary" => "upper primary learners (ages 9-11)".to_string(),
        "middle" => "middle school learners (ages 12-14)".to_string(),
        "high" => "secondary school learners (ages 15-17)".to_string(),
        _ => grade.to_string(),
    }
}
