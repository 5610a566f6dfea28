//! Graspy Generation Pipeline
//!
//! Turns content requests into validated lessons and curricula by calling
//! a generative model through the [`ModelCapability`] contract, and streams
//! pipeline progress to subscribers.
//!
//! # Modules
//!
//! - [`capability`] - The model contract consumed by every stage
//! - [`stages`] - Slide design and practice authoring with compact retry
//! - [`lesson`] - Orchestrated lesson generation with direct fallback
//! - [`curriculum`] - Subject listing and topic mapping
//! - [`session`] - Progress events, heartbeat and cancellation
//! - [`sse`] - Server-sent-events encoding of a session
//! - [`tutor`] / [`subjects`] - Tutoring replies and subject suggestions
//! - [`config`] / [`error`] / [`telemetry`] - Ambient plumbing

pub mod capability;
pub mod config;
pub mod curriculum;
pub mod error;
pub mod lesson;
pub mod session;
pub mod sse;
pub mod stages;
pub mod subjects;
pub mod telemetry;
pub mod tutor;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use capability::{
    generate, GenerationOptions, ModelCapability, OutputShape, StructuredOutput, ToolInvoker,
    ToolSpec,
};
pub use config::{LessonSettings, ModelSettings, Settings, StreamSettings};
pub use curriculum::{CurriculumPlanner, CurriculumResponse};
pub use error::{ModelErrorKind, PipelineError, Result, Stage};
pub use lesson::{LessonOrchestrator, LessonTool};
pub use session::{
    PipelineKind, ProgressEvent, ProgressReporter, SessionPhase, StreamFrame, StreamSession,
};
pub use sse::sse_response;
pub use stages::StageGenerator;
pub use subjects::{EducationStatus, SubjectAdvisor, SubjectCandidate, SubjectRequest};
pub use tutor::{ChatRole, ChatTurn, Tutor, TutorReply, TutorRequest};
