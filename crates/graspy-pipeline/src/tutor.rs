//! Tutoring chat replies.

use std::sync::Arc;

use graspy_content::DEFAULT_LESSON_GRADE;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use crate::capability::{generate, GenerationOptions, ModelCapability, StructuredOutput};
use crate::error::{PipelineError, Result};

/// System instruction for the tutor.
pub const TUTOR_SYSTEM_PROMPT: &str = "You are Graspy, a warm and encouraging AI tutor. You \
always respond in the learner's language and keep answers concise, practical, and supportive. \
If you reference other topics, make the connection explicit.";

/// Number of most recent turns included in the prompt.
pub const HISTORY_WINDOW: usize = 8;

/// Sampling temperature for tutor replies.
pub const TUTOR_TEMPERATURE: f32 = 0.5;

const UNSPECIFIED_COUNTRY: &str = "unspecified";

// ============================================================================
// Request / Reply
// ============================================================================

/// Who said a history turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    /// The learner.
    User,
    /// The tutor.
    Assistant,
}

/// One earlier turn of the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    /// Speaker.
    pub role: ChatRole,
    /// What was said.
    pub content: String,
}

/// A learner message with its context.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TutorRequest {
    /// The learner's message.
    pub message: String,
    /// Subject being studied.
    pub subject: String,
    /// Current topic, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    /// Neighbouring topics the tutor may point to.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related_topics: Vec<String>,
    /// Reply language.
    pub language: String,
    /// Learner's country.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    /// Learner's grade.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grade_level: Option<String>,
    /// Earlier turns, oldest first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<ChatTurn>,
}

impl TutorRequest {
    fn validate(&self) -> Result<()> {
        let missing: Vec<&str> = [
            ("message", &self.message),
            ("subject", &self.subject),
            ("language", &self.language),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(PipelineError::invalid_request(format!(
                "{} required for a tutor reply",
                missing.join(", ")
            )))
        }
    }
}

/// The tutor's answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TutorReply {
    /// Main reply.
    pub answer: String,
    /// Up to three suggestions to continue the conversation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub follow_ups: Option<Vec<String>>,
    /// Pointer to another topic worth exploring.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub navigation_tip: Option<String>,
}

/// Raw reply as generated.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TutorDraft {
    /// Main reply.
    pub answer: String,
    /// Suggestions, unsanitized.
    #[serde(alias = "follow_ups")]
    pub follow_ups: Option<Vec<String>>,
    /// Navigation tip, unsanitized.
    #[serde(alias = "navigation_tip")]
    pub navigation_tip: Option<String>,
}

impl StructuredOutput for TutorDraft {
    const NAME: &'static str = "TutorAgentPayload";

    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "answer": {
                    "type": "string",
                    "description": "Primary response for the learner."
                },
                "followUps": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Optional short suggestions to continue the conversation."
                },
                "navigationTip": {
                    "type": "string",
                    "description": "Optional guidance for which topic to explore next."
                }
            },
            "required": ["answer"]
        })
    }
}

impl From<TutorDraft> for TutorReply {
    fn from(draft: TutorDraft) -> Self {
        let follow_ups = draft
            .follow_ups
            .map(|items| {
                items
                    .iter()
                    .map(|item| item.trim())
                    .filter(|item| !item.is_empty())
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            })
            .filter(|items| !items.is_empty());
        let navigation_tip = draft
            .navigation_tip
            .map(|tip| tip.trim().to_string())
            .filter(|tip| !tip.is_empty());

        Self {
            answer: draft.answer.trim().to_string(),
            follow_ups,
            navigation_tip,
        }
    }
}

// ============================================================================
// Prompt
// ============================================================================

/// Renders the last [`HISTORY_WINDOW`] turns, or `None`.
#[must_use]
pub fn history_text(history: &[ChatTurn]) -> String {
    let start = history.len().saturating_sub(HISTORY_WINDOW);
    let lines: Vec<String> = history[start..]
        .iter()
        .map(|turn| {
            let speaker = match turn.role {
                ChatRole::Assistant => "Graspy",
                ChatRole::User => "Learner",
            };
            format!("{speaker}: {}", turn.content.trim())
        })
        .collect();

    if lines.is_empty() {
        "None".to_string()
    } else {
        lines.join("\n")
    }
}

/// Builds the tutor prompt.
#[must_use]
pub fn tutor_prompt(request: &TutorRequest) -> String {
    let related = if request.related_topics.is_empty() {
        "None".to_string()
    } else {
        request.related_topics.join(", ")
    };
    let grade = request
        .grade_level
        .as_deref()
        .filter(|g| !g.trim().is_empty())
        .unwrap_or(DEFAULT_LESSON_GRADE);
    let country = request
        .country
        .as_deref()
        .filter(|c| !c.trim().is_empty())
        .unwrap_or(UNSPECIFIED_COUNTRY);
    let topic = request.topic.as_deref().unwrap_or("Not specified");
    let language = request.language.trim();

    format!(
        "Learner profile:\n\
         - Country: {country}\n\
         - Language: {language}\n\
         - Grade Level: {grade}\n\
         - Subject: {subject}\n\
         - Current topic: {topic}\n\
         - Related topics to consider: {related}\n\n\
         Recent conversation:\n\
         {history}\n\n\
         Current learner message:\n\
         \"\"\"{message}\"\"\"\n\n\
         Guidelines:\n\
         - Provide a clear, encouraging explanation or answer in {language}.\n\
         - Mention the current topic or subject when possible.\n\
         - Offer up to three concise follow-up suggestions that keep the learner engaged.\n\
         - Include a navigationTip only if it genuinely helps the learner move to another relevant topic.",
        subject = request.subject.trim(),
        history = history_text(&request.history),
        message = request.message,
    )
}

// ============================================================================
// Tutor
// ============================================================================

/// Answers learner questions in context.
#[derive(Clone)]
pub struct Tutor {
    model: Arc<dyn ModelCapability>,
}

impl std::fmt::Debug for Tutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tutor").finish_non_exhaustive()
    }
}

impl Tutor {
    /// Creates a tutor backed by `model`.
    #[must_use]
    pub fn new(model: Arc<dyn ModelCapability>) -> Self {
        Self { model }
    }

    /// Generates a reply to the learner's message.
    ///
    /// # Errors
    ///
    /// `InvalidRequest` if message, subject or language is blank; model
    /// errors otherwise.
    pub async fn reply(&self, request: &TutorRequest) -> Result<TutorReply> {
        request.validate()?;
        info!(subject = %request.subject, turns = request.history.len(), "Generating tutor reply");

        let options = GenerationOptions::default().temperature(TUTOR_TEMPERATURE);
        let draft: TutorDraft = generate(
            self.model.as_ref(),
            &tutor_prompt(request),
            TUTOR_SYSTEM_PROMPT,
            options,
        )
        .await?;

        Ok(draft.into())
    }
}
