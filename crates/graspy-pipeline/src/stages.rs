//! Stage generators: slide design and practice authoring.
//!
//! Each stage builds a prompt, calls the model capability, and validates the
//! result. A generation truncated by the token budget is retried exactly once
//! with a compact prompt; any other failure propagates untouched.

use std::future::Future;
use std::sync::Arc;

use graspy_content::{
    validate_practice, validate_slide_set, ContentRequest, LessonTopic, Practice, PracticeDraft,
    SlideSet, SlideSetDraft,
};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::capability::{generate, GenerationOptions, ModelCapability, StructuredOutput};
use crate::error::{Result, Stage};

/// System instruction for slide design.
pub const LESSON_SYSTEM_PROMPT: &str = "You are a supportive instructional designer crafting \
culturally-aware slide lessons for learners. Always respond in the learner's language, deliver \
rich yet concise instruction, ensure every checkpoint connects directly to slide content, and \
output valid JSON only.";

/// System instruction for practice authoring.
pub const PRACTICE_SYSTEM_PROMPT: &str = "You create a single multiple-choice practice question \
with detailed feedback based strictly on the provided lesson explanation and objectives. Output \
well-formed JSON only.";

// ============================================================================
// Output Shapes
// ============================================================================

fn choice_schema(prompt_field: &str, index_field: &str) -> Value {
    json!({
        "type": "object",
        "properties": {
            prompt_field: { "type": "string" },
            "options": {
                "type": "array",
                "items": { "type": "string" },
                "minItems": 3,
                "maxItems": 3
            },
            index_field: { "type": "integer", "minimum": 0, "maximum": 2 },
            "correctFeedback": { "type": "string" },
            "incorrectFeedback": { "type": "string" }
        },
        "required": [prompt_field, "options", index_field, "correctFeedback", "incorrectFeedback"]
    })
}

impl StructuredOutput for SlideSetDraft {
    const NAME: &'static str = "LessonSlidesPayload";

    fn schema() -> Value {
        let mut assessment = choice_schema("prompt", "answerIndex");
        assessment["properties"]["type"] = json!({ "const": "choice" });
        json!({
            "type": "object",
            "properties": {
                "overview": { "type": "string" },
                "learningObjectives": {
                    "type": "array",
                    "items": { "type": "string" },
                    "minItems": 3,
                    "maxItems": 3
                },
                "slides": {
                    "type": "array",
                    "minItems": 5,
                    "maxItems": 5,
                    "items": {
                        "type": "object",
                        "properties": {
                            "slideType": {
                                "enum": [
                                    "concept_introduction",
                                    "worked_example",
                                    "scaffolded_problem",
                                    "misconception",
                                    "synthesis"
                                ]
                            },
                            "title": { "type": "string" },
                            "bodyMd": { "type": "string" },
                            "assessment": assessment
                        },
                        "required": ["slideType", "title", "bodyMd", "assessment"]
                    }
                }
            },
            "required": ["overview", "learningObjectives", "slides"]
        })
    }
}

impl StructuredOutput for PracticeDraft {
    const NAME: &'static str = "LessonPracticePayload";

    fn schema() -> Value {
        choice_schema("question", "correctOptionIndex")
    }
}

// ============================================================================
// Prompts
// ============================================================================

/// Builds the slide-design prompt.
#[must_use]
pub fn slide_prompt(topic: &LessonTopic<'_>, compact: bool) -> String {
    let body_range = if compact { "110-150" } else { "160-210" };
    let planning = if compact {
        "Before writing, take a brief moment to plan the learning arc. Keep responses concise to avoid running out of tokens."
    } else {
        "Before writing, silently plan the learning arc so each slide builds on the previous one."
    };
    let compact_guidance = if compact {
        "Trim optional anecdotes and keep wording tight so the full JSON fits within the token limit."
    } else {
        ""
    };

    format!(
        "Create exactly five lesson slides for {subject} on the topic {title}.\n\
         Learner country: {country}. Learner language: {language}. Grade level: {grade}.\n\
         {planning}\n\
         Use the slide types concept_introduction, worked_example, scaffolded_problem, misconception and synthesis, in that order.\n\
         Instructional requirements:\n\
         1. Begin each slide body by recalling the previous idea or explaining why this slide matters next.\n\
         2. Worked examples must show annotated reasoning steps; typeset mathematics with LaTeX using $ ... $ for inline math or $$ ... $$ for display math when appropriate.\n\
         3. Scaffolded problems must contain three mini tasks of increasing complexity within the body text.\n\
         4. Misconception slides must quote the misconception, debunk it, and provide an everyday-life example.\n\
         5. Synthesis slides must connect back to at least one previous slide, preview the next topic, and use a choice assessment with correctFeedback and incorrectFeedback.\n\
         Checkpoint rules:\n\
         - Every assessment prompt must reference details from the slide body.\n\
         - Choice checkpoints must provide exactly three options labelled in plain text and set the correct answerIndex.\n\
         - Mention the \"tutor\" or \"chat\" to encourage the learner to share their response.\n\
         Each slide body should contain approximately {body_range} words using paragraphs and, when helpful, bullet or numbered lists. \
         The overview must contain 3-4 sentences, and learning objectives should be three concise, action-oriented statements. \
         Respond concisely so the output fits within the schema. {compact_guidance}",
        subject = topic.subject,
        title = topic.topic,
        country = topic.country,
        language = topic.language,
        grade = topic.grade,
    )
}

/// Summarizes slides as `Slide n (type - title):\nbody`, separated by blank lines.
#[must_use]
pub fn slide_summaries(slides: &SlideSet) -> String {
    slides
        .slides
        .iter()
        .enumerate()
        .map(|(idx, slide)| {
            format!(
                "Slide {} ({} - {}):\n{}",
                idx + 1,
                slide.slide_type,
                slide.title,
                slide.body_md
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Builds the practice-authoring prompt, grounded in the validated slides.
#[must_use]
pub fn practice_prompt(topic: &LessonTopic<'_>, slides: &SlideSet, compact: bool) -> String {
    let concise_guidance = if compact {
        "Keep the question and feedback succinct (ideally under 80 tokens total) while remaining specific."
    } else {
        ""
    };

    format!(
        "Generate one formative assessment MCQ for {subject} on the topic {title}.\n\
         Learner country: {country}. Learner language: {language}. Grade level: {grade}.\n\
         Base it on this lesson overview:\n\
         {overview}\n\
         Learning objectives:\n\
         {objectives}\n\
         Slide details:\n\
         {summaries}\n\n\
         Write the question and options in the learner's language. Provide three concise options, mark the correct option, \
         and craft specific feedback for both correct and incorrect answers. \
         Keep the wording culturally relevant to the learner's country. {concise_guidance}",
        subject = topic.subject,
        title = topic.topic,
        country = topic.country,
        language = topic.language,
        grade = topic.grade,
        overview = slides.overview,
        objectives = slides.learning_objectives.join("\n"),
        summaries = slide_summaries(slides),
    )
}

// ============================================================================
// Retry
// ============================================================================

/// Runs `attempt(false)`, and once more with `attempt(true)` if the first
/// call was truncated by the token budget.
pub async fn with_compact_retry<T, F, Fut>(stage: Stage, attempt: F) -> Result<T>
where
    F: Fn(bool) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    match attempt(false).await {
        Err(err) if err.is_budget_exceeded() => {
            warn!(%stage, error = %err, "Generation hit the token budget; retrying with compact prompt");
            attempt(true).await
        }
        other => other,
    }
}

// ============================================================================
// Generators
// ============================================================================

/// Runs the two lesson stages against a model capability.
#[derive(Clone)]
pub struct StageGenerator {
    model: Arc<dyn ModelCapability>,
    temperature: Option<f32>,
}

impl std::fmt::Debug for StageGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageGenerator")
            .field("temperature", &self.temperature)
            .finish_non_exhaustive()
    }
}

impl StageGenerator {
    /// Creates a generator backed by `model`.
    #[must_use]
    pub fn new(model: Arc<dyn ModelCapability>) -> Self {
        Self {
            model,
            temperature: None,
        }
    }

    /// Sets the sampling temperature sent with every stage call.
    #[must_use]
    pub const fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// The sampling temperature sent with every stage call, if any.
    #[must_use]
    pub const fn temperature(&self) -> Option<f32> {
        self.temperature
    }

    fn options(&self, budget: Option<u32>) -> GenerationOptions {
        let options = GenerationOptions::with_budget(budget);
        match self.temperature {
            Some(temperature) => options.temperature(temperature),
            None => options,
        }
    }

    /// Returns the underlying capability.
    #[must_use]
    pub fn model(&self) -> &Arc<dyn ModelCapability> {
        &self.model
    }

    /// Designs and validates the five-slide set.
    ///
    /// # Errors
    ///
    /// - `InvalidRequest` if the request lacks country, language, subject or topic
    /// - model errors other than a budget overrun absorbed by the retry
    /// - `ContractViolation` if the output fails validation
    pub async fn generate_slides(
        &self,
        request: &ContentRequest,
        budget: Option<u32>,
    ) -> Result<SlideSet> {
        let topic = request.lesson_topic()?;
        info!(subject = topic.subject, topic = topic.topic, ?budget, "Designing lesson slides");

        let options = self.options(budget);
        let draft: SlideSetDraft = with_compact_retry(Stage::Slides, |compact| {
            let prompt = slide_prompt(&topic, compact);
            async move {
                generate(self.model.as_ref(), &prompt, LESSON_SYSTEM_PROMPT, options).await
            }
        })
        .await?;

        Ok(validate_slide_set(draft)?)
    }

    /// Authors and validates the practice item for validated slides.
    ///
    /// # Errors
    ///
    /// Same as [`generate_slides`](Self::generate_slides).
    pub async fn generate_practice(
        &self,
        request: &ContentRequest,
        slides: &SlideSet,
        budget: Option<u32>,
    ) -> Result<Practice> {
        let topic = request.lesson_topic()?;
        info!(subject = topic.subject, topic = topic.topic, ?budget, "Authoring practice question");

        let options = self.options(budget);
        let draft: PracticeDraft = with_compact_retry(Stage::Practice, |compact| {
            let prompt = practice_prompt(&topic, slides, compact);
            async move {
                generate(self.model.as_ref(), &prompt, PRACTICE_SYSTEM_PROMPT, options).await
            }
        })
        .await?;

        Ok(validate_practice(draft)?)
    }
}
