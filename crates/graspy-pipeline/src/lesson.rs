//! Lesson orchestration.
//!
//! [`LessonOrchestrator::build_lesson`] first hands both stages to a
//! coordinating agent as two tools. The agent's tool calls are checked
//! against the fixed sequence `slide_designer` then `practice_builder`, and
//! its final reply is parsed and validated like any other model output.
//!
//! When that path fails for any reason other than an unreachable model, the
//! orchestrator runs the two stages directly. Both paths end in the same
//! validation and splicing, so callers cannot tell which one produced a
//! lesson.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use graspy_content::{
    attach_practice, validate_practice, validate_slide_set, ContentRequest, LessonAssets,
    LessonResponse, Practice, PracticeDraft, SlideSet, SlideSetDraft,
};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::capability::{GenerationOptions, ModelCapability, ToolInvoker, ToolSpec};
use crate::config::Settings;
use crate::error::{PipelineError, Result, Stage};
use crate::session::{PipelineKind, ProgressReporter, SessionPhase, StreamSession};
use crate::stages::StageGenerator;

/// System instruction for the coordinating agent.
pub const ORCHESTRATOR_SYSTEM_PROMPT: &str = r#"You are the Lesson Director orchestrator. Coordinate specialised tool agents to build a lesson.

Available tools:
- slide_designer(request_json: str) -> JSON string describing the lesson slides.
- practice_builder(payload_json: str) -> JSON string describing the practice question.

Tool usage rules:
- Tool arguments must be valid JSON strings. Do not add commentary, Markdown, or extra quotations.
- Always call slide_designer first with the original request JSON.
- Then call practice_builder with a JSON object of the form {"request": <LessonRequest JSON>, "slides": <slides JSON>}.
- After both tools succeed, reply ONCE with a JSON object containing exactly two keys: "slides" and "practice". The values must be the tool outputs verbatim.
- If a tool call fails, report the error in your final JSON under an "error" key instead."#;

// ============================================================================
// Tools
// ============================================================================

/// The fixed set of tools offered to the coordinating agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LessonTool {
    /// Wraps slide design.
    SlideDesigner,
    /// Wraps practice authoring.
    PracticeBuilder,
}

impl LessonTool {
    /// The only accepted call order.
    pub const SEQUENCE: [Self; 2] = [Self::SlideDesigner, Self::PracticeBuilder];

    /// Tool name as seen by the agent.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::SlideDesigner => "slide_designer",
            Self::PracticeBuilder => "practice_builder",
        }
    }

    /// Looks a tool up by name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::SEQUENCE.into_iter().find(|tool| tool.name() == name)
    }

    fn spec(self) -> ToolSpec {
        match self {
            Self::SlideDesigner => ToolSpec::json_string_tool(
                self.name(),
                "Generate lesson slides for the provided request. Returns the slides as JSON.",
                "request_json",
            ),
            Self::PracticeBuilder => ToolSpec::json_string_tool(
                self.name(),
                "Generate a practice question from {\"request\", \"slides\"}. Returns the practice item as JSON.",
                "payload_json",
            ),
        }
    }
}

impl std::fmt::Display for LessonTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Deserialize)]
struct PracticeToolArgs {
    request: ContentRequest,
    slides: SlideSetDraft,
}

#[derive(Default)]
struct ToolLedger {
    calls: Vec<LessonTool>,
    slides: Option<SlideSet>,
}

/// Tool table bound to one lesson request.
///
/// Rejects calls outside [`LessonTool::SEQUENCE`] and arguments that do not
/// match the request or the slides it produced.
struct LessonToolbox<'a> {
    stages: &'a StageGenerator,
    request: &'a ContentRequest,
    slide_budget: Option<u32>,
    practice_budget: Option<u32>,
    ledger: Mutex<ToolLedger>,
}

impl<'a> LessonToolbox<'a> {
    fn new(
        stages: &'a StageGenerator,
        request: &'a ContentRequest,
        slide_budget: Option<u32>,
        practice_budget: Option<u32>,
    ) -> Self {
        Self {
            stages,
            request,
            slide_budget,
            practice_budget,
            ledger: Mutex::new(ToolLedger::default()),
        }
    }

    fn record(&self, tool: LessonTool) -> Result<()> {
        let mut ledger = self.ledger.lock().unwrap_or_else(PoisonError::into_inner);
        let expected = LessonTool::SEQUENCE.get(ledger.calls.len()).copied();
        if expected != Some(tool) {
            return Err(PipelineError::orchestration(format!(
                "tool {tool} called out of order after {:?}",
                ledger.calls
            )));
        }
        ledger.calls.push(tool);
        Ok(())
    }

    fn produced_slides(&self) -> Option<SlideSet> {
        self.ledger
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .slides
            .clone()
    }

    fn store_slides(&self, slides: SlideSet) {
        self.ledger
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .slides = Some(slides);
    }

    fn ensure_complete(&self) -> Result<()> {
        let ledger = self.ledger.lock().unwrap_or_else(PoisonError::into_inner);
        if ledger.calls[..] != LessonTool::SEQUENCE[..] {
            return Err(PipelineError::orchestration(format!(
                "agent finished after calling {:?}; expected {:?}",
                ledger.calls,
                LessonTool::SEQUENCE
            )));
        }
        Ok(())
    }

    fn ensure_same_request(&self, request: &ContentRequest) -> Result<()> {
        if request != self.request {
            return Err(PipelineError::orchestration(
                "tool called with a request that differs from the lesson request",
            ));
        }
        Ok(())
    }

    async fn design_slides(&self, argument: &str) -> Result<String> {
        let request: ContentRequest = serde_json::from_str(argument)
            .map_err(|e| PipelineError::orchestration(format!("invalid slide_designer argument: {e}")))?;
        self.ensure_same_request(&request)?;

        let slides = self
            .stages
            .generate_slides(self.request, self.slide_budget)
            .await?;
        let output = serde_json::to_string(&slides)?;
        self.store_slides(slides);
        Ok(output)
    }

    async fn build_practice(&self, argument: &str) -> Result<String> {
        let args: PracticeToolArgs = serde_json::from_str(argument)
            .map_err(|e| PipelineError::orchestration(format!("invalid practice_builder argument: {e}")))?;
        self.ensure_same_request(&args.request)?;

        let slides = validate_slide_set(args.slides)?;
        if self.produced_slides().as_ref() != Some(&slides) {
            return Err(PipelineError::orchestration(
                "practice_builder received slides that slide_designer did not produce",
            ));
        }

        let practice = self
            .stages
            .generate_practice(self.request, &slides, self.practice_budget)
            .await?;
        Ok(serde_json::to_string(&practice)?)
    }
}

#[async_trait]
impl ToolInvoker for LessonToolbox<'_> {
    fn specs(&self) -> Vec<ToolSpec> {
        LessonTool::SEQUENCE.into_iter().map(LessonTool::spec).collect()
    }

    async fn invoke(&self, name: &str, argument: &str) -> Result<String> {
        let tool = LessonTool::from_name(name)
            .ok_or_else(|| PipelineError::orchestration(format!("unknown tool '{name}'")))?;
        self.record(tool)?;
        debug!(%tool, "Agent invoked lesson tool");

        match tool {
            LessonTool::SlideDesigner => self.design_slides(argument).await,
            LessonTool::PracticeBuilder => self.build_practice(argument).await,
        }
    }
}

// ============================================================================
// Final Reply
// ============================================================================

#[derive(Deserialize)]
struct AgentReply {
    slides: SlideSetDraft,
    practice: PracticeDraft,
}

/// Extracts the outermost JSON object from agent text.
fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Parses and validates the agent's combined reply.
fn parse_agent_reply(text: &str) -> Result<(SlideSet, Practice)> {
    let object = extract_json_object(text)
        .ok_or_else(|| PipelineError::orchestration("agent reply contains no JSON object"))?;
    let value: Value = serde_json::from_str(object)
        .map_err(|e| PipelineError::orchestration(format!("agent reply is not valid JSON: {e}")))?;

    if let Some(error) = value.get("error") {
        return Err(PipelineError::orchestration(format!(
            "agent reported an error: {error}"
        )));
    }

    let reply: AgentReply = serde_json::from_value(value)
        .map_err(|e| PipelineError::orchestration(format!("agent reply has the wrong shape: {e}")))?;
    Ok((
        validate_slide_set(reply.slides)?,
        validate_practice(reply.practice)?,
    ))
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Composes the slide and practice stages into one lesson.
#[derive(Debug, Clone)]
pub struct LessonOrchestrator {
    stages: StageGenerator,
    settings: Settings,
}

impl LessonOrchestrator {
    /// Creates an orchestrator with default settings.
    #[must_use]
    pub fn new(model: Arc<dyn ModelCapability>) -> Self {
        Self::with_settings(model, Settings::default())
    }

    /// Creates an orchestrator with explicit settings.
    #[must_use]
    pub fn with_settings(model: Arc<dyn ModelCapability>, settings: Settings) -> Self {
        Self {
            stages: StageGenerator::new(model)
                .with_temperature(settings.model.default_temperature),
            settings,
        }
    }

    /// The stage generators used by both paths.
    #[must_use]
    pub const fn stages(&self) -> &StageGenerator {
        &self.stages
    }

    /// The settings in effect.
    #[must_use]
    pub const fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Builds a validated lesson with the practice spliced into the final slide.
    ///
    /// Budgets left as `None` fall back to the configured stage budgets.
    ///
    /// # Errors
    ///
    /// - `InvalidRequest` if the request lacks country, language, subject or topic
    /// - an `Unavailable` model error from the orchestrated path, unchanged
    /// - `StageFailed` tagged with the stage that failed on the direct path
    pub async fn build_lesson(
        &self,
        request: &ContentRequest,
        slide_budget: Option<u32>,
        practice_budget: Option<u32>,
    ) -> Result<LessonAssets> {
        let topic = request.lesson_topic()?;
        let slide_budget = slide_budget.or_else(|| self.settings.slide_budget());
        let practice_budget = practice_budget.or_else(|| self.settings.practice_budget());
        info!(subject = topic.subject, topic = topic.topic, "Building lesson");

        let (slides, practice) = match self
            .build_orchestrated(request, slide_budget, practice_budget)
            .await
        {
            Ok(pair) => {
                debug!("Orchestrated lesson completed");
                pair
            }
            Err(err) if err.is_upstream_unavailable() => return Err(err),
            Err(err) => {
                warn!(error = %err, "Lesson orchestration failed; falling back to direct stage calls");
                self.build_direct(request, slide_budget, practice_budget)
                    .await?
            }
        };

        Ok(attach_practice(slides, practice))
    }

    /// Builds a lesson and assembles the caller-facing response.
    ///
    /// # Errors
    ///
    /// Same as [`build_lesson`](Self::build_lesson).
    pub async fn generate_lesson(&self, request: &ContentRequest) -> Result<LessonResponse> {
        let assets = self.build_lesson(request, None, None).await?;
        Ok(LessonResponse::assemble(request, &assets, Utc::now())?)
    }

    /// Generates a lesson while streaming its progress.
    ///
    /// The stages run directly, one phase each, and the `complete` event
    /// carries the [`LessonResponse`].
    ///
    /// # Errors
    ///
    /// `InvalidRequest` if the request lacks country, language, subject or
    /// topic. Later failures arrive as an `error` event.
    pub fn stream_lesson(self: &Arc<Self>, request: ContentRequest) -> Result<StreamSession> {
        request.lesson_topic()?;
        let orchestrator = Arc::clone(self);
        Ok(StreamSession::spawn(
            PipelineKind::Lesson,
            &self.settings.stream,
            move |reporter| async move { orchestrator.run_stream(&request, &reporter).await },
        ))
    }

    async fn run_stream(&self, request: &ContentRequest, reporter: &ProgressReporter) -> Result<Value> {
        reporter.advance(SessionPhase::StageOneRunning).await?;
        let slides = self
            .stages
            .generate_slides(request, self.settings.slide_budget())
            .await
            .map_err(|e| PipelineError::stage_failed(Stage::Slides, e))?;
        reporter.advance(SessionPhase::StageOneDone).await?;

        reporter.advance(SessionPhase::StageTwoRunning).await?;
        let practice = self
            .stages
            .generate_practice(request, &slides, self.settings.practice_budget())
            .await
            .map_err(|e| PipelineError::stage_failed(Stage::Practice, e))?;

        let assets = attach_practice(slides, practice);
        let response = LessonResponse::assemble(request, &assets, Utc::now())?;
        Ok(serde_json::to_value(response)?)
    }

    async fn build_orchestrated(
        &self,
        request: &ContentRequest,
        slide_budget: Option<u32>,
        practice_budget: Option<u32>,
    ) -> Result<(SlideSet, Practice)> {
        let toolbox = LessonToolbox::new(&self.stages, request, slide_budget, practice_budget);
        let request_json = serde_json::to_string(request)?;
        let prompt = format!(
            "Lesson request JSON:\n{request_json}\nFollow the procedure above and return the final JSON."
        );
        let options = GenerationOptions::with_budget(Some(self.settings.lesson.orchestrator_max_tokens))
            .temperature(self.settings.lesson.orchestrator_temperature);

        let reply = self
            .stages
            .model()
            .orchestrated_generate(&prompt, ORCHESTRATOR_SYSTEM_PROMPT, &toolbox, options)
            .await?;

        toolbox.ensure_complete()?;
        parse_agent_reply(&reply)
    }

    async fn build_direct(
        &self,
        request: &ContentRequest,
        slide_budget: Option<u32>,
        practice_budget: Option<u32>,
    ) -> Result<(SlideSet, Practice)> {
        let slides = self
            .stages
            .generate_slides(request, slide_budget)
            .await
            .map_err(|e| PipelineError::stage_failed(Stage::Slides, e))?;
        let practice = self
            .stages
            .generate_practice(request, &slides, practice_budget)
            .await
            .map_err(|e| PipelineError::stage_failed(Stage::Practice, e))?;
        Ok((slides, practice))
    }
}
