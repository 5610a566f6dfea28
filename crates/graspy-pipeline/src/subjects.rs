//! Subject suggestions for onboarding.
//!
//! Unlike curriculum subjects, suggestions are de-duplicated by dropping
//! later entries whose slug was already seen; nothing is suffixed.
//!
//! [`SubjectAdvisor::stream_suggestions`] reveals the list in two batches:
//! recommended subjects first, then the rest.

use std::sync::Arc;

use graspy_content::{dedupe_by_slug, slugify};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use crate::capability::{generate, GenerationOptions, ModelCapability, StructuredOutput};
use crate::config::StreamSettings;
use crate::error::{PipelineError, Result};
use crate::session::{PipelineKind, ProgressReporter, SessionPhase, StreamSession};

/// System instruction for subject suggestions.
pub const SUBJECT_SYSTEM_PROMPT: &str = "You are an official ministry of education curriculum \
creator. You know the approved and appropriate subjects for each grade level and design \
uplifting, culturally relevant learning paths. Respond with concise subject names that can be \
shown in a UI list.";

/// Most suggestions returned.
pub const MAX_SUGGESTIONS: usize = 15;

/// Sampling temperature for suggestions.
pub const SUGGESTION_TEMPERATURE: f32 = 0.4;

/// Whether the learner attends school.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EducationStatus {
    /// Attends structured classes.
    InSchool,
    /// Learns independently.
    OutOfSchool,
}

impl EducationStatus {
    const fn audience(self) -> &'static str {
        match self {
            Self::InSchool => "students attending school with structured classes",
            Self::OutOfSchool => "independent learners outside formal school",
        }
    }
}

/// Learner profile used to suggest subjects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectRequest {
    /// Learner's country.
    pub country: String,
    /// Language of instruction.
    pub language: String,
    /// School attendance.
    pub education_status: EducationStatus,
    /// Grade band.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grade_level: Option<String>,
    /// Class or form name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub school_grade: Option<String>,
    /// Age range such as "12-14".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age_range: Option<String>,
    /// Prior interests.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub interests: Vec<String>,
}

/// One suggested subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectCandidate {
    /// Slug of the label.
    pub id: String,
    /// Display label.
    pub label: String,
    /// Whether the subject is a top recommendation.
    #[serde(default)]
    pub recommended: bool,
}

#[derive(Debug, Deserialize)]
struct SuggestionItem {
    #[serde(default)]
    name: String,
    #[serde(default)]
    recommended: bool,
}

#[derive(Debug, Deserialize)]
struct SuggestionList {
    #[serde(default)]
    subjects: Vec<SuggestionItem>,
}

impl StructuredOutput for SuggestionList {
    const NAME: &'static str = "SubjectAgentResponse";

    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "subjects": {
                    "type": "array",
                    "minItems": 6,
                    "maxItems": MAX_SUGGESTIONS,
                    "items": {
                        "type": "object",
                        "properties": {
                            "name": {
                                "type": "string",
                                "description": "Short subject title suitable for a navigation menu."
                            },
                            "recommended": {
                                "type": "boolean",
                                "description": "True if this subject is a top recommendation."
                            }
                        },
                        "required": ["name"]
                    }
                }
            },
            "required": ["subjects"]
        })
    }
}

/// Builds the suggestion prompt.
#[must_use]
pub fn suggestion_prompt(request: &SubjectRequest) -> String {
    let qualifiers: Vec<String> = [
        ("grade level", &request.grade_level),
        ("class", &request.school_grade),
        ("age range", &request.age_range),
    ]
    .into_iter()
    .filter_map(|(label, value)| {
        value
            .as_deref()
            .filter(|v| !v.trim().is_empty())
            .map(|v| format!("{label} '{v}'"))
    })
    .collect();
    let ability = if qualifiers.is_empty() {
        "mixed ability".to_string()
    } else {
        qualifiers.join(", ")
    };
    let interests = if request.interests.is_empty() {
        "unknown".to_string()
    } else {
        request.interests.join(", ")
    };

    format!(
        "Generate a list of approved subjects for {audience} in {country} who will learn in {language}.\n\n\
         Context:\n\
         - Ability profile: {ability}\n\
         - Prior learner interests: {interests}\n\n\
         Guidelines:\n\
         - Generate between 6 and 15 subjects\n\
         - Make names short (max 4 words) and concrete\n\
         - Mark exactly 2-3 subjects as recommended\n\
         - In most schools, mathematics is compulsory so it should be recommended",
        audience = request.education_status.audience(),
        country = request.country.trim(),
        language = request.language.trim(),
    )
}

/// Suggests subjects for a learner profile.
#[derive(Clone)]
pub struct SubjectAdvisor {
    model: Arc<dyn ModelCapability>,
    stream: StreamSettings,
}

impl std::fmt::Debug for SubjectAdvisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubjectAdvisor")
            .field("stream", &self.stream)
            .finish_non_exhaustive()
    }
}

impl SubjectAdvisor {
    /// Creates an advisor backed by `model`.
    #[must_use]
    pub fn new(model: Arc<dyn ModelCapability>) -> Self {
        Self::with_stream_settings(model, StreamSettings::default())
    }

    /// Creates an advisor whose streams use `stream` for heartbeat and
    /// buffering.
    #[must_use]
    pub fn with_stream_settings(model: Arc<dyn ModelCapability>, stream: StreamSettings) -> Self {
        Self { model, stream }
    }

    /// Returns up to [`MAX_SUGGESTIONS`] subjects with unique ids.
    ///
    /// # Errors
    ///
    /// `InvalidRequest` without country and language; model errors
    /// otherwise.
    pub async fn suggest(&self, request: &SubjectRequest) -> Result<Vec<SubjectCandidate>> {
        ensure_locale(request)?;
        info!(country = %request.country, status = ?request.education_status, "Suggesting subjects");

        let options = GenerationOptions::default().temperature(SUGGESTION_TEMPERATURE);
        let list: SuggestionList = generate(
            self.model.as_ref(),
            &suggestion_prompt(request),
            SUBJECT_SYSTEM_PROMPT,
            options,
        )
        .await?;

        let candidates: Vec<SubjectCandidate> = list
            .subjects
            .into_iter()
            .filter_map(|item| {
                let label = item.name.trim();
                (!label.is_empty()).then(|| SubjectCandidate {
                    id: slugify(label),
                    label: label.to_string(),
                    recommended: item.recommended,
                })
            })
            .collect();

        let mut candidates = dedupe_by_slug(candidates, |c| c.id.clone());
        candidates.truncate(MAX_SUGGESTIONS);
        Ok(candidates)
    }

    /// Suggests subjects while streaming them in two batches.
    ///
    /// `recommended_subjects` carries `{"subjects": [...]}` with the
    /// recommended subjects (possibly none), `more_subjects` carries the
    /// rest, and `complete` carries every suggestion in model order. An
    /// invalid request, a model failure or an empty list ends the stream
    /// with a single `error` event.
    pub fn stream_suggestions(self: &Arc<Self>, request: SubjectRequest) -> StreamSession {
        if let Err(err) = ensure_locale(&request) {
            return StreamSession::rejected(PipelineKind::Subjects, &self.stream, err);
        }

        let advisor = Arc::clone(self);
        StreamSession::spawn(PipelineKind::Subjects, &self.stream, move |reporter| async move {
            advisor.run_stream(&request, &reporter).await
        })
    }

    async fn run_stream(&self, request: &SubjectRequest, reporter: &ProgressReporter) -> Result<Value> {
        reporter.advance(SessionPhase::StageOneRunning).await?;
        let subjects = self.suggest(request).await?;
        if subjects.is_empty() {
            return Err(PipelineError::contract_violation(
                "the learning guide did not return any subjects",
            ));
        }

        let (recommended, others): (Vec<_>, Vec<_>) =
            subjects.iter().cloned().partition(|s| s.recommended);
        reporter
            .advance_with(SessionPhase::StageOneDone, json!({ "subjects": recommended }))
            .await?;
        reporter
            .advance_with(SessionPhase::StageTwoRunning, json!({ "subjects": others }))
            .await?;

        Ok(json!({ "subjects": subjects }))
    }
}

fn ensure_locale(request: &SubjectRequest) -> Result<()> {
    if request.country.trim().is_empty() || request.language.trim().is_empty() {
        return Err(PipelineError::invalid_request(
            "country and language are required",
        ));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::session::{ProgressEvent, StreamFrame};
    use crate::testing::ScriptedModel;
    use tokio_test::{assert_err, assert_ok};

    async fn stream_events(advisor: SubjectAdvisor, request: SubjectRequest) -> Vec<ProgressEvent> {
        let mut session = Arc::new(advisor).stream_suggestions(request);
        let mut events = Vec::new();
        while let Some(frame) = session.next().await {
            if let StreamFrame::Event(event) = frame {
                events.push(event);
            }
        }
        session.shutdown().await;
        events
    }

    fn ids(payload: &Value) -> Vec<&str> {
        payload["subjects"]
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s["id"].as_str().unwrap())
            .collect()
    }

    fn request(status: EducationStatus) -> SubjectRequest {
        SubjectRequest {
            country: "Ghana".to_string(),
            language: "English".to_string(),
            education_status: status,
            grade_level: Some("high".to_string()),
            school_grade: None,
            age_range: Some("15-17".to_string()),
            interests: vec![],
        }
    }

    #[test]
    fn test_prompt_audience_and_qualifiers() {
        let prompt = suggestion_prompt(&request(EducationStatus::OutOfSchool));
        assert!(prompt.contains("independent learners outside formal school in Ghana"));
        assert!(prompt.contains("grade level 'high', age range '15-17'"));
        assert!(prompt.contains("Prior learner interests: unknown"));
    }

    #[test]
    fn test_request_wire_format() {
        let request: SubjectRequest = serde_json::from_value(json!({
            "country": "Kenya",
            "language": "Swahili",
            "educationStatus": "in_school",
            "schoolGrade": "Form 2"
        }))
        .unwrap();
        assert_eq!(request.education_status, EducationStatus::InSchool);
        assert_eq!(request.school_grade.as_deref(), Some("Form 2"));
        assert!(suggestion_prompt(&request).contains("class 'Form 2'"));
    }

    #[tokio::test]
    async fn test_suggest_dedupes_and_drops_blanks() {
        let model = ScriptedModel::new().structured(Ok(json!({
            "subjects": [
                {"name": "Mathematics", "recommended": true},
                {"name": "  "},
                {"name": "English Language", "recommended": true},
                {"name": "mathematics!"},
                {"name": "Integrated Science"}
            ]
        })));
        let advisor = SubjectAdvisor::new(model.clone());

        let subjects = assert_ok!(advisor.suggest(&request(EducationStatus::InSchool)).await);
        let ids: Vec<_> = subjects.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["mathematics", "english-language", "integrated-science"]);
        assert!(subjects[0].recommended);
        assert!(!subjects[2].recommended);

        let calls = model.structured_calls();
        assert_eq!(calls[0].options.temperature, Some(SUGGESTION_TEMPERATURE));
    }

    #[tokio::test]
    async fn test_suggest_caps_at_fifteen() {
        let items: Vec<Value> = (1..=20).map(|i| json!({"name": format!("Subject {i}")})).collect();
        let model = ScriptedModel::new().structured(Ok(json!({ "subjects": items })));
        let advisor = SubjectAdvisor::new(model);

        let subjects = assert_ok!(advisor.suggest(&request(EducationStatus::InSchool)).await);
        assert_eq!(subjects.len(), MAX_SUGGESTIONS);
    }

    #[tokio::test]
    async fn test_suggest_requires_locale() {
        let advisor = SubjectAdvisor::new(ScriptedModel::new());
        let mut request = request(EducationStatus::InSchool);
        request.country = " ".to_string();

        let err = assert_err!(advisor.suggest(&request).await);
        assert!(matches!(err, PipelineError::InvalidRequest { .. }));
    }

    // ------------------------------------------------------------------------
    // Streaming
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_stream_reveals_recommended_first() {
        let model = ScriptedModel::new().structured(Ok(json!({
            "subjects": [
                {"name": "Geography"},
                {"name": "Mathematics", "recommended": true},
                {"name": "History"},
                {"name": "English Language", "recommended": true}
            ]
        })));
        let events = stream_events(
            SubjectAdvisor::new(model),
            request(EducationStatus::InSchool),
        )
        .await;

        let phases: Vec<_> = events.iter().map(ProgressEvent::phase).collect();
        assert_eq!(
            phases,
            vec![
                "initializing",
                "suggesting_subjects",
                "recommended_subjects",
                "more_subjects",
                "complete"
            ]
        );
        assert_eq!(
            events[0].message(),
            Some("Checking in with Graspy's learning guide")
        );
        assert_eq!(
            ids(events[2].payload().unwrap()),
            vec!["mathematics", "english-language"]
        );
        assert_eq!(ids(events[3].payload().unwrap()), vec!["geography", "history"]);
        assert_eq!(events[4].event_name(), "complete");
        assert_eq!(ids(events[4].payload().unwrap()).len(), 4);
    }

    #[tokio::test]
    async fn test_stream_without_recommendations_sends_empty_first_batch() {
        let model = ScriptedModel::new().structured(Ok(json!({
            "subjects": [{"name": "Art"}, {"name": "Music"}]
        })));
        let events = stream_events(
            SubjectAdvisor::new(model),
            request(EducationStatus::OutOfSchool),
        )
        .await;

        assert!(ids(events[2].payload().unwrap()).is_empty());
        assert_eq!(ids(events[3].payload().unwrap()), vec!["art", "music"]);
    }

    #[tokio::test]
    async fn test_stream_empty_list_is_single_error() {
        let model = ScriptedModel::new().structured(Ok(json!({
            "subjects": [{"name": "  "}]
        })));
        let events = stream_events(
            SubjectAdvisor::new(model),
            request(EducationStatus::InSchool),
        )
        .await;

        let terminal: Vec<_> = events.iter().filter(|e| e.is_terminal()).collect();
        assert_eq!(terminal.len(), 1);
        assert_eq!(terminal[0].event_name(), "error");
        assert!(terminal[0]
            .message()
            .unwrap()
            .contains("did not return any subjects"));
        assert!(events.iter().all(|e| e.phase() != "recommended_subjects"));
    }

    #[tokio::test]
    async fn test_stream_model_failure_is_single_error() {
        let model = ScriptedModel::new().structured(Err(PipelineError::unavailable("model offline")));
        let events = stream_events(
            SubjectAdvisor::new(model),
            request(EducationStatus::InSchool),
        )
        .await;

        assert_eq!(events.last().unwrap().event_name(), "error");
        assert!(events.last().unwrap().message().unwrap().contains("model offline"));
        assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
    }

    #[tokio::test]
    async fn test_stream_rejects_missing_locale() {
        let model = ScriptedModel::new();
        let mut request = request(EducationStatus::InSchool);
        request.language = String::new();

        let events = stream_events(SubjectAdvisor::new(model.clone()), request).await;
        let phases: Vec<_> = events.iter().map(ProgressEvent::phase).collect();
        assert_eq!(phases, vec!["initializing", "error"]);
        assert!(model.structured_calls().is_empty());
    }
}
