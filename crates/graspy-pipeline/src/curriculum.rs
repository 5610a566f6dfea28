//! Curriculum planning: subject listing followed by topic mapping.
//!
//! An explicit subject preference list on the request always wins over
//! generation. Topic lists are requested one subject at a time; any
//! subject's failure aborts the whole map, on both the synchronous and the
//! streaming path.

use std::sync::Arc;

use graspy_content::{normalize_subjects, sanitize_sequence, ContentRequest, Subject, TopicMap};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::capability::{generate, GenerationOptions, ModelCapability, StructuredOutput};
use crate::config::Settings;
use crate::error::{PipelineError, Result, Stage};
use crate::session::{PipelineKind, ProgressReporter, SessionPhase, StreamSession};

/// System instruction for both curriculum stages.
pub const CURRICULUM_SYSTEM_PROMPT: &str = "You are a curriculum planner who knows every \
subject a country approves for each grade level. The subjects you name must match the \
learner's age or grade. Focus on concise, culturally aware, age-appropriate content in the \
requested language. Return only the fields required by the schema and nothing else.";

/// Cap on caller-supplied subject preferences.
pub const MAX_PREFERRED_SUBJECTS: usize = 20;

/// Cap on generated subjects.
pub const MAX_GENERATED_SUBJECTS: usize = 12;

/// Fewest topics accepted for one subject.
pub const MIN_TOPICS: usize = 5;

/// Most topics kept for one subject.
pub const MAX_TOPICS: usize = 7;

/// `currentStep` of a finished curriculum.
pub const TOPICS_GENERATED: &str = "topics_generated";

// ============================================================================
// Output Shapes
// ============================================================================

/// Raw subject names returned by the model.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubjectList {
    /// Subject names, unsanitized.
    #[serde(default)]
    pub subjects: Vec<String>,
}

impl StructuredOutput for SubjectList {
    const NAME: &'static str = "CurriculumSubjects";

    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "subjects": {
                    "type": "array",
                    "items": { "type": "string" },
                    "minItems": 3,
                    "maxItems": MAX_GENERATED_SUBJECTS
                }
            },
            "required": ["subjects"],
            "additionalProperties": false
        })
    }
}

/// Raw topic titles returned by the model.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TopicList {
    /// Topic titles, unsanitized.
    #[serde(default)]
    pub topics: Vec<String>,
}

impl StructuredOutput for TopicList {
    const NAME: &'static str = "CurriculumTopics";

    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "topics": {
                    "type": "array",
                    "items": { "type": "string" },
                    "minItems": MIN_TOPICS,
                    "maxItems": MAX_TOPICS
                }
            },
            "required": ["topics"],
            "additionalProperties": false
        })
    }
}

// ============================================================================
// Prompts
// ============================================================================

/// Builds the subject-listing prompt.
#[must_use]
pub fn subject_prompt(request: &ContentRequest) -> String {
    format!(
        "Generate a broad list of core school subjects for the learner.\n\
         Country: {country}\n\
         Language of instruction: {language}\n\
         Grade level: {grade}\n\n\
         Typical maximum number of subjects taken in common national exams:\n\
         - United States: 7\n\
         - United Kingdom (GCSEs): 11\n\
         - Singapore (O-Levels): 9\n\
         - South Africa (NSC): 7\n\
         - Nigeria (WASSCE): 9\n\
         - Ghana (WASSCE/SHS): 9\n\
         - India (CBSE Class 12): 6\n\
         - Germany (Gymnasiale Oberstufe intro phase): 12\n\
         - Kenya (CBC Senior School): 7\n\
         - Australia (NSW HSC/VCE): 6\n\n\
         Rules:\n\
         - Return between 8 and 12 distinct subjects\n\
         - Use official, ministry-recognised subject names (e.g., English, Mathematics, Science)\n\
         - Avoid electives, labs, or subtopics\n\
         - Respond strictly with the schema's 'subjects' array",
        country = request.country.trim(),
        language = request.language.trim(),
        grade = request.learner_description(),
    )
}

/// Builds the topic-mapping prompt for one subject.
#[must_use]
pub fn topic_prompt(request: &ContentRequest, subject: &Subject) -> String {
    format!(
        "Create a progressive list of teachable topics for the subject.\n\
         Subject: {subject}\n\
         Country: {country}\n\
         Language of instruction: {language}\n\
         Grade level: {grade}\n\n\
         Rules:\n\
         - Return {MIN_TOPICS} to {MAX_TOPICS} topics ordered from foundational to more advanced\n\
         - Keep titles short and student-friendly\n\
         - Avoid duplicates and overly granular sub-points\n\
         - Respond strictly with the schema's 'topics' array",
        subject = subject.name,
        country = request.country.trim(),
        language = request.language.trim(),
        grade = request.learner_description(),
    )
}

// ============================================================================
// Response
// ============================================================================

/// Subjects and their topic map, as returned to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurriculumResponse {
    /// Subjects with unique slugs.
    pub subjects: Vec<Subject>,
    /// Topics keyed by subject slug.
    #[serde(default)]
    pub topics: TopicMap,
    /// Last step reached.
    pub current_step: String,
    /// Failure description, if the plan is incomplete.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CurriculumResponse {
    /// A finished plan.
    #[must_use]
    pub fn completed(subjects: Vec<Subject>, topics: TopicMap) -> Self {
        Self {
            subjects,
            topics,
            current_step: TOPICS_GENERATED.to_string(),
            error: None,
        }
    }
}

// ============================================================================
// Planner
// ============================================================================

/// Lists subjects and maps their topics.
#[derive(Clone)]
pub struct CurriculumPlanner {
    model: Arc<dyn ModelCapability>,
    settings: Settings,
}

impl std::fmt::Debug for CurriculumPlanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CurriculumPlanner")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl CurriculumPlanner {
    /// Creates a planner with default settings.
    #[must_use]
    pub fn new(model: Arc<dyn ModelCapability>) -> Self {
        Self::with_settings(model, Settings::default())
    }

    /// Creates a planner with explicit settings.
    #[must_use]
    pub fn with_settings(model: Arc<dyn ModelCapability>, settings: Settings) -> Self {
        Self { model, settings }
    }

    fn options(&self) -> GenerationOptions {
        GenerationOptions::with_budget(self.settings.model.max_tokens)
            .temperature(self.settings.model.default_temperature)
    }

    /// Returns subjects with unique slugs.
    ///
    /// Preferences on the request are normalized and returned without
    /// calling the model.
    ///
    /// # Errors
    ///
    /// - `InvalidRequest` without country and language
    /// - model errors, tagged with the subject-listing stage
    /// - `ContractViolation` if no usable subject name comes back
    pub async fn list_subjects(&self, request: &ContentRequest) -> Result<Vec<Subject>> {
        request.ensure_locale()?;

        let preferred = sanitize_sequence(&request.subjects, MAX_PREFERRED_SUBJECTS);
        if !preferred.is_empty() {
            debug!(count = preferred.len(), "Using subject preferences");
            return Ok(normalize_subjects(&preferred));
        }

        info!(country = %request.country, language = %request.language, "Listing subjects");
        let list: SubjectList = generate(
            self.model.as_ref(),
            &subject_prompt(request),
            CURRICULUM_SYSTEM_PROMPT,
            self.options(),
        )
        .await
        .map_err(|e| PipelineError::stage_failed(Stage::Subjects, e))?;

        let names = sanitize_sequence(&list.subjects, MAX_GENERATED_SUBJECTS);
        if names.is_empty() {
            return Err(PipelineError::stage_failed(
                Stage::Subjects,
                PipelineError::contract_violation("subject list is empty"),
            ));
        }
        Ok(normalize_subjects(&names))
    }

    /// Maps each subject's slug to 5 to 7 ordered topics.
    ///
    /// # Errors
    ///
    /// The first subject whose topics cannot be generated fails the whole
    /// map, tagged with the topic-mapping stage.
    pub async fn map_topics(&self, request: &ContentRequest, subjects: &[Subject]) -> Result<TopicMap> {
        request.ensure_locale()?;

        let mut topics = TopicMap::new();
        for subject in subjects {
            let list = self
                .topics_for(request, subject)
                .await
                .map_err(|e| PipelineError::stage_failed(Stage::Topics, e))?;
            topics.insert(subject.slug.clone(), list);
        }
        Ok(topics)
    }

    async fn topics_for(&self, request: &ContentRequest, subject: &Subject) -> Result<Vec<String>> {
        debug!(subject = %subject.slug, "Mapping topics");
        let list: TopicList = generate(
            self.model.as_ref(),
            &topic_prompt(request, subject),
            CURRICULUM_SYSTEM_PROMPT,
            self.options(),
        )
        .await?;

        let topics = sanitize_sequence(&list.topics, MAX_TOPICS);
        if topics.len() < MIN_TOPICS {
            return Err(PipelineError::contract_violation(format!(
                "expected at least {MIN_TOPICS} topics for {}, found {}",
                subject.slug,
                topics.len()
            )));
        }
        Ok(topics)
    }

    /// Lists subjects and maps their topics.
    ///
    /// # Errors
    ///
    /// See [`list_subjects`](Self::list_subjects) and
    /// [`map_topics`](Self::map_topics).
    pub async fn plan_curriculum(&self, request: &ContentRequest) -> Result<(Vec<Subject>, TopicMap)> {
        let subjects = self.list_subjects(request).await?;
        let topics = self.map_topics(request, &subjects).await?;
        info!(subjects = subjects.len(), "Curriculum planned");
        Ok((subjects, topics))
    }

    /// Plans a curriculum and wraps it in the caller-facing response.
    ///
    /// # Errors
    ///
    /// Same as [`plan_curriculum`](Self::plan_curriculum).
    pub async fn generate_curriculum(&self, request: &ContentRequest) -> Result<CurriculumResponse> {
        let (subjects, topics) = self.plan_curriculum(request).await?;
        Ok(CurriculumResponse::completed(subjects, topics))
    }

    /// Plans a curriculum while streaming its progress.
    ///
    /// `subjects_generated` carries `{"subjects": [...]}`; the `complete`
    /// event carries the [`CurriculumResponse`]. If topic mapping fails, the
    /// `error` event still carries the listed subjects. A request without country
    /// and language yields a session that reports a single error.
    pub fn stream_curriculum(self: &Arc<Self>, request: ContentRequest) -> StreamSession {
        let settings = &self.settings.stream;
        if let Err(err) = request.ensure_locale() {
            return StreamSession::rejected(PipelineKind::Curriculum, settings, err.into());
        }

        let planner = Arc::clone(self);
        StreamSession::spawn(PipelineKind::Curriculum, settings, move |reporter| async move {
            planner.run_stream(&request, &reporter).await
        })
    }

    async fn run_stream(&self, request: &ContentRequest, reporter: &ProgressReporter) -> Result<Value> {
        reporter.advance(SessionPhase::StageOneRunning).await?;
        let subjects = self.list_subjects(request).await?;
        let listed = json!({ "subjects": subjects });
        reporter.keep_partial(listed.clone());

        reporter
            .advance_with(SessionPhase::StageOneDone, listed)
            .await?;

        reporter.advance(SessionPhase::StageTwoRunning).await?;
        let topics = self.map_topics(request, &subjects).await?;

        Ok(serde_json::to_value(CurriculumResponse::completed(
            subjects, topics,
        ))?)
    }
}
