//! Test support: a scripted model capability and canned payloads.
//!
//! Compiled for unit tests and, through the `test-support` feature, for the
//! integration test crate.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::missing_panics_doc)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::capability::{GenerationOptions, ModelCapability, OutputShape, ToolInvoker};
use crate::error::{PipelineError, Result};

/// Marker preceding the request JSON in the orchestrator prompt.
const REQUEST_MARKER: &str = "Lesson request JSON:\n";

// ============================================================================
// Scripted Model
// ============================================================================

/// One recorded structured call.
#[derive(Debug, Clone)]
pub struct StructuredCall {
    /// Requested shape name.
    pub shape: String,
    /// Prompt text.
    pub prompt: String,
    /// System instruction.
    pub system: String,
    /// Call options.
    pub options: GenerationOptions,
}

/// What the coordinating agent does when invoked.
#[derive(Debug)]
pub enum AgentScript {
    /// Fail the orchestrated call outright.
    Fail(PipelineError),
    /// Follow the lesson protocol: slides, then practice, then a combined reply.
    FollowProtocol,
    /// Run explicit steps, then reply with the given text.
    Steps(Vec<AgentStep>, String),
}

/// A single tool call in a custom agent script.
#[derive(Debug, Clone)]
pub struct AgentStep {
    /// Tool name.
    pub tool: String,
    /// Raw argument.
    pub argument: String,
}

/// A model capability that replays queued results and records every call.
#[derive(Debug, Default)]
pub struct ScriptedModel {
    structured: Mutex<VecDeque<Result<Value>>>,
    agents: Mutex<VecDeque<AgentScript>>,
    calls: Mutex<Vec<StructuredCall>>,
    agent_calls: Mutex<Vec<GenerationOptions>>,
    tool_names: Mutex<Vec<String>>,
    delay: Mutex<Option<Duration>>,
}

impl ScriptedModel {
    /// Creates an empty script.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queues a structured-call result.
    #[must_use]
    pub fn structured(self: Arc<Self>, result: Result<Value>) -> Arc<Self> {
        self.structured.lock().unwrap().push_back(result);
        self
    }

    /// Queues an agent script.
    #[must_use]
    pub fn agent(self: Arc<Self>, script: AgentScript) -> Arc<Self> {
        self.agents.lock().unwrap().push_back(script);
        self
    }

    /// Delays every structured call.
    #[must_use]
    pub fn delayed(self: Arc<Self>, delay: Duration) -> Arc<Self> {
        *self.delay.lock().unwrap() = Some(delay);
        self
    }

    /// Structured calls made so far.
    pub fn structured_calls(&self) -> Vec<StructuredCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Options of every orchestrated call made so far.
    pub fn agent_calls(&self) -> Vec<GenerationOptions> {
        self.agent_calls.lock().unwrap().clone()
    }

    /// Tool names offered to the most recent agent call.
    pub fn offered_tools(&self) -> Vec<String> {
        self.tool_names.lock().unwrap().clone()
    }

    /// Number of structured results still queued.
    pub fn remaining(&self) -> usize {
        self.structured.lock().unwrap().len()
    }

    async fn follow_protocol(prompt: &str, tools: &dyn ToolInvoker) -> Result<String> {
        let request_json = prompt
            .split_once(REQUEST_MARKER)
            .and_then(|(_, rest)| rest.lines().next())
            .ok_or_else(|| PipelineError::orchestration("prompt has no request JSON"))?
            .to_string();

        let slides = tools.invoke("slide_designer", &request_json).await?;
        let payload = json!({
            "request": serde_json::from_str::<Value>(&request_json)?,
            "slides": serde_json::from_str::<Value>(&slides)?,
        });
        let practice = tools
            .invoke("practice_builder", &payload.to_string())
            .await?;

        Ok(format!(
            "Both tools succeeded.\n{{\"slides\": {slides}, \"practice\": {practice}}}"
        ))
    }
}

#[async_trait]
impl ModelCapability for ScriptedModel {
    async fn structured_generate(
        &self,
        shape: &OutputShape,
        prompt: &str,
        system: &str,
        options: GenerationOptions,
    ) -> Result<Value> {
        self.calls.lock().unwrap().push(StructuredCall {
            shape: shape.name.to_string(),
            prompt: prompt.to_string(),
            system: system.to_string(),
            options,
        });
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.structured.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Err(PipelineError::unavailable("scripted model has no result queued")))
    }

    async fn orchestrated_generate(
        &self,
        prompt: &str,
        _system: &str,
        tools: &dyn ToolInvoker,
        options: GenerationOptions,
    ) -> Result<String> {
        self.agent_calls.lock().unwrap().push(options);
        *self.tool_names.lock().unwrap() = tools.specs().into_iter().map(|s| s.name).collect();

        let script = self.agents.lock().unwrap().pop_front();
        match script {
            None => Err(PipelineError::from_provider_message("agent runtime not configured")),
            Some(AgentScript::Fail(err)) => Err(err),
            Some(AgentScript::FollowProtocol) => Self::follow_protocol(prompt, tools).await,
            Some(AgentScript::Steps(steps, reply)) => {
                for step in steps {
                    tools.invoke(&step.tool, &step.argument).await?;
                }
                Ok(reply)
            }
        }
    }
}

// ============================================================================
// SSE Parsing
// ============================================================================

/// One event read back from an SSE body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseRecord {
    /// The `event:` field, if present.
    pub event: Option<String>,
    /// All `data:` lines joined with newlines.
    pub data: String,
}

/// Splits an SSE body into records, skipping comment lines.
pub fn parse_sse(body: &str) -> Vec<SseRecord> {
    body.split("\n\n")
        .filter_map(|block| {
            let mut event = None;
            let mut data: Vec<&str> = Vec::new();
            for line in block.lines() {
                if let Some(name) = line.strip_prefix("event:") {
                    event = Some(name.trim().to_string());
                } else if let Some(value) = line.strip_prefix("data:") {
                    data.push(value.strip_prefix(' ').unwrap_or(value));
                }
            }
            if event.is_none() && data.is_empty() {
                None
            } else {
                Some(SseRecord {
                    event,
                    data: data.join("\n"),
                })
            }
        })
        .collect()
}

// ============================================================================
// Fixtures
// ============================================================================

/// Canned payloads matching the lesson and curriculum shapes.
pub mod fixtures {
    use graspy_content::{validate_slide_set, SlideSet, SlideSetDraft};
    use serde_json::{json, Value};

    /// Overview used by [`slide_draft_json`].
    pub const OVERVIEW: &str = "Fractions name equal parts of a whole. We compare and add them. \
                                Market examples make them concrete.";

    /// Question used by [`practice_draft_json`].
    pub const PRACTICE_QUESTION: &str = "Amina eats 1/4 of a chapati and Baraka eats 2/4. How much did they eat together?";

    /// A valid slide-stage payload.
    pub fn slide_draft_json() -> Value {
        let types = [
            "concept_introduction",
            "worked_example",
            "scaffolded_problem",
            "misconception",
            "synthesis",
        ];
        let slides: Vec<Value> = types
            .iter()
            .enumerate()
            .map(|(i, slide_type)| {
                let n = i + 1;
                json!({
                    "slideType": slide_type,
                    "title": format!("Slide {n}"),
                    "bodyMd": format!("Body of slide {n}. Share your answer with the tutor in the chat."),
                    "assessment": {
                        "type": "choice",
                        "prompt": format!("Checkpoint {n}"),
                        "options": ["1/2", "1/3", "1/4"],
                        "answerIndex": i % 3,
                        "correctFeedback": "Correct!",
                        "incorrectFeedback": "Look at the denominator again."
                    }
                })
            })
            .collect();

        json!({
            "overview": OVERVIEW,
            "learningObjectives": [
                "Identify fractions of a whole",
                "Compare fractions with like denominators",
                "Add fractions with like denominators"
            ],
            "slides": slides
        })
    }

    /// A valid practice-stage payload.
    pub fn practice_draft_json() -> Value {
        json!({
            "question": PRACTICE_QUESTION,
            "options": ["3/4", "3/8", "1/2"],
            "correctOptionIndex": 0,
            "correctFeedback": "Yes, 1/4 + 2/4 = 3/4.",
            "incorrectFeedback": "Add the numerators and keep the denominator."
        })
    }

    /// The validated form of [`slide_draft_json`].
    pub fn slide_set() -> SlideSet {
        let draft: SlideSetDraft = serde_json::from_value(slide_draft_json()).unwrap();
        validate_slide_set(draft).unwrap()
    }

    /// A subject-list payload.
    pub fn subjects_json(names: &[&str]) -> Value {
        json!({ "subjects": names })
    }

    /// A topic-list payload.
    pub fn topics_json(topics: &[&str]) -> Value {
        json!({ "topics": topics })
    }

    /// Six ordered topics.
    pub const TOPICS: [&str; 6] = [
        "Whole numbers",
        "Fractions",
        "Decimals",
        "Percentages",
        "Ratios",
        "Algebraic expressions",
    ];
}
