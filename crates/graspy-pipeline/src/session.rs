//! Progress streaming for long-running pipelines.
//!
//! A [`StreamSession`] runs one pipeline to completion while a subscriber
//! reads [`StreamFrame`]s from it. Two supervised workers feed a single
//! bounded channel:
//!
//! - the pipeline worker, which reports each phase change as a
//!   [`ProgressEvent`] and finishes with exactly one terminal event
//!   followed by [`StreamFrame::EndOfStream`]
//! - the heartbeat worker, which sends [`StreamFrame::Ping`] on a fixed
//!   interval until the session ends
//!
//! Both workers share one [`CancellationToken`]. [`StreamSession::shutdown`]
//! cancels it and waits for both workers to exit; dropping the session
//! cancels it and reaps the workers in the background.
//!
//! # Phases
//!
//! | Phase              | Lesson label          | Curriculum label      | Subjects label          |
//! |--------------------|-----------------------|-----------------------|-------------------------|
//! | `Initializing`     | `initializing`        | `initializing`        | `initializing`          |
//! | `StageOneRunning`  | `generating_slides`   | `generating_subjects` | `suggesting_subjects`   |
//! | `StageOneDone`     | `slides_ready`        | `subjects_generated`  | `recommended_subjects`  |
//! | `StageTwoRunning`  | `generating_practice` | `generating_topics`   | `more_subjects`         |
//! | `Complete`         | `complete`            | `topics_generated`    | `complete`              |
//! | `Error`            | `error`               | `error`               | `error`                 |
//!
//! An `error` event carries the partial result recorded with
//! [`ProgressReporter::keep_partial`], if any.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::StreamSettings;
use crate::error::{PipelineError, Result};

// ============================================================================
// Progress Events
// ============================================================================

/// One ordered notification about a pipeline's progress.
///
/// Serialized as a JSON object whose `type` field is `status`, `complete`
/// or `error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// The pipeline entered a non-terminal phase.
    Status {
        /// Phase label.
        phase: String,
        /// Human-readable progress note.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        /// Intermediate result, if the phase produced one.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },
    /// The pipeline finished successfully.
    Complete {
        /// Phase label.
        phase: String,
        /// Human-readable completion note.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        /// The pipeline's result.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },
    /// The pipeline failed.
    Error {
        /// Phase label.
        phase: String,
        /// What went wrong.
        message: String,
        /// What the pipeline produced before it failed.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },
}

impl ProgressEvent {
    /// Creates a `status` event.
    #[must_use]
    pub fn status(phase: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Status {
            phase: phase.into(),
            message: Some(message.into()),
            payload: None,
        }
    }

    /// Creates a `complete` event carrying the pipeline result.
    #[must_use]
    pub fn complete(phase: impl Into<String>, message: impl Into<String>, payload: Value) -> Self {
        Self::Complete {
            phase: phase.into(),
            message: Some(message.into()),
            payload: Some(payload),
        }
    }

    /// Creates an `error` event.
    #[must_use]
    pub fn error(phase: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error {
            phase: phase.into(),
            message: message.into(),
            payload: None,
        }
    }

    /// Attaches a payload to a `status` or `error` event.
    #[must_use]
    pub fn with_payload(mut self, value: Value) -> Self {
        if let Self::Status { payload, .. } | Self::Error { payload, .. } = &mut self {
            *payload = Some(value);
        }
        self
    }

    /// Returns the event type as it appears on the wire.
    #[must_use]
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::Status { .. } => "status",
            Self::Complete { .. } => "complete",
            Self::Error { .. } => "error",
        }
    }

    /// Returns the phase label.
    #[must_use]
    pub fn phase(&self) -> &str {
        match self {
            Self::Status { phase, .. } | Self::Complete { phase, .. } | Self::Error { phase, .. } => {
                phase
            }
        }
    }

    /// Returns the message, if any.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Status { message, .. } | Self::Complete { message, .. } => message.as_deref(),
            Self::Error { message, .. } => Some(message),
        }
    }

    /// Returns the payload, if any.
    #[must_use]
    pub const fn payload(&self) -> Option<&Value> {
        match self {
            Self::Status { payload, .. }
            | Self::Complete { payload, .. }
            | Self::Error { payload, .. } => payload.as_ref(),
        }
    }

    /// Returns `true` for `complete` and `error` events.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete { .. } | Self::Error { .. })
    }
}

// ============================================================================
// Phases
// ============================================================================

/// Lifecycle of a two-stage pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Request accepted, nothing generated yet.
    Initializing,
    /// First stage in progress.
    StageOneRunning,
    /// First stage produced its result.
    StageOneDone,
    /// Second stage in progress.
    StageTwoRunning,
    /// Terminal: the pipeline succeeded.
    Complete,
    /// Terminal: the pipeline failed.
    Error,
}

impl SessionPhase {
    /// Returns `true` if no further transition is allowed.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Error)
    }

    /// Returns `true` if the pipeline may move from `self` to `next`.
    ///
    /// Phases advance strictly in order; `Error` is reachable from any
    /// non-terminal phase.
    #[must_use]
    pub const fn can_advance_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Initializing, Self::StageOneRunning)
                | (Self::StageOneRunning, Self::StageOneDone)
                | (Self::StageOneDone, Self::StageTwoRunning)
                | (Self::StageTwoRunning, Self::Complete)
                | (
                    Self::Initializing
                        | Self::StageOneRunning
                        | Self::StageOneDone
                        | Self::StageTwoRunning,
                    Self::Error
                )
        )
    }
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Initializing => "initializing",
            Self::StageOneRunning => "stage_one_running",
            Self::StageOneDone => "stage_one_done",
            Self::StageTwoRunning => "stage_two_running",
            Self::Complete => "complete",
            Self::Error => "error",
        };
        write!(f, "{name}")
    }
}

/// Which pipeline a session runs; decides phase labels and messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineKind {
    /// Slide design followed by practice authoring.
    Lesson,
    /// Subject listing followed by topic mapping.
    Curriculum,
    /// Subject suggestions, recommended ones first.
    Subjects,
}

impl PipelineKind {
    /// Wire label for a phase.
    #[must_use]
    pub const fn label(self, phase: SessionPhase) -> &'static str {
        match (self, phase) {
            (_, SessionPhase::Initializing) => "initializing",
            (_, SessionPhase::Error) => "error",
            (Self::Lesson, SessionPhase::StageOneRunning) => "generating_slides",
            (Self::Lesson, SessionPhase::StageOneDone) => "slides_ready",
            (Self::Lesson, SessionPhase::StageTwoRunning) => "generating_practice",
            (Self::Lesson, SessionPhase::Complete) => "complete",
            (Self::Curriculum, SessionPhase::StageOneRunning) => "generating_subjects",
            (Self::Curriculum, SessionPhase::StageOneDone) => "subjects_generated",
            (Self::Curriculum, SessionPhase::StageTwoRunning) => "generating_topics",
            (Self::Curriculum, SessionPhase::Complete) => "topics_generated",
            (Self::Subjects, SessionPhase::StageOneRunning) => "suggesting_subjects",
            (Self::Subjects, SessionPhase::StageOneDone) => "recommended_subjects",
            (Self::Subjects, SessionPhase::StageTwoRunning) => "more_subjects",
            (Self::Subjects, SessionPhase::Complete) => "complete",
        }
    }

    /// Progress note for a phase.
    #[must_use]
    pub const fn message(self, phase: SessionPhase) -> &'static str {
        match (self, phase) {
            (Self::Lesson, SessionPhase::Initializing) => "Preparing lesson request",
            (Self::Lesson, SessionPhase::StageOneRunning) => "Designing lesson structure",
            (Self::Lesson, SessionPhase::StageOneDone) => "Slides drafted successfully",
            (Self::Lesson, SessionPhase::StageTwoRunning) => "Crafting practice question",
            (Self::Lesson, SessionPhase::Complete) => "Lesson ready",
            (Self::Lesson, SessionPhase::Error) => "Failed to generate lesson",
            (Self::Curriculum, SessionPhase::Initializing) => "Preparing curriculum request",
            (Self::Curriculum, SessionPhase::StageOneRunning) => "Listing subjects",
            (Self::Curriculum, SessionPhase::StageOneDone) => "Subjects ready",
            (Self::Curriculum, SessionPhase::StageTwoRunning) => "Mapping topics",
            (Self::Curriculum, SessionPhase::Complete) => "Curriculum ready",
            (Self::Curriculum, SessionPhase::Error) => "Failed to generate curriculum",
            (Self::Subjects, SessionPhase::Initializing) => "Checking in with Graspy's learning guide",
            (Self::Subjects, SessionPhase::StageOneRunning) => "Choosing subjects",
            (Self::Subjects, SessionPhase::StageOneDone) => "Here are the recommended starting points.",
            (Self::Subjects, SessionPhase::StageTwoRunning) => "More subjects you can explore.",
            (Self::Subjects, SessionPhase::Complete) => "Subject generation complete.",
            (Self::Subjects, SessionPhase::Error) => "Failed to suggest subjects",
        }
    }
}

// ============================================================================
// Frames
// ============================================================================

/// One item read from a [`StreamSession`].
#[derive(Debug, Clone, PartialEq)]
pub enum StreamFrame {
    /// A pipeline progress event.
    Event(ProgressEvent),
    /// Liveness ping; carries no pipeline state.
    Ping,
    /// End-of-stream marker; nothing follows it.
    EndOfStream,
}

impl StreamFrame {
    /// Returns the progress event, if this frame carries one.
    #[must_use]
    pub const fn as_event(&self) -> Option<&ProgressEvent> {
        match self {
            Self::Event(event) => Some(event),
            Self::Ping | Self::EndOfStream => None,
        }
    }
}

// ============================================================================
// Reporter
// ============================================================================

/// Handle a pipeline uses to report phase changes.
///
/// Every accepted transition sends exactly one event. Sends wait for room
/// in the bounded channel and fail with [`PipelineError::Cancelled`] once
/// the session is cancelled or its subscriber is gone.
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    kind: PipelineKind,
    tx: mpsc::Sender<StreamFrame>,
    cancel: CancellationToken,
    phase: Arc<Mutex<SessionPhase>>,
    partial: Arc<Mutex<Option<Value>>>,
}

impl ProgressReporter {
    fn new(kind: PipelineKind, tx: mpsc::Sender<StreamFrame>, cancel: CancellationToken) -> Self {
        Self {
            kind,
            tx,
            cancel,
            phase: Arc::new(Mutex::new(SessionPhase::Initializing)),
            partial: Arc::new(Mutex::new(None)),
        }
    }

    /// The pipeline this reporter belongs to.
    #[must_use]
    pub const fn kind(&self) -> PipelineKind {
        self.kind
    }

    /// The current phase.
    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Moves to a non-terminal phase and reports it.
    ///
    /// # Errors
    ///
    /// `InvalidPhaseTransition` if `next` does not follow the current phase
    /// or is terminal; `Cancelled` if the session is gone.
    pub async fn advance(&self, next: SessionPhase) -> Result<()> {
        self.advance_inner(next, None).await
    }

    /// Moves to a non-terminal phase and reports it with a payload.
    ///
    /// # Errors
    ///
    /// Same as [`advance`](Self::advance).
    pub async fn advance_with(&self, next: SessionPhase, payload: Value) -> Result<()> {
        self.advance_inner(next, Some(payload)).await
    }

    /// Records what has been produced so far.
    ///
    /// If the pipeline later fails, the `error` event carries the last
    /// recorded value as its payload.
    pub fn keep_partial(&self, value: Value) {
        *self.partial.lock().unwrap_or_else(PoisonError::into_inner) = Some(value);
    }

    async fn advance_inner(&self, next: SessionPhase, payload: Option<Value>) -> Result<()> {
        if next.is_terminal() {
            return Err(PipelineError::invalid_transition(self.phase(), next));
        }
        self.enter(next)?;
        let mut event = ProgressEvent::status(self.kind.label(next), self.kind.message(next));
        if let Some(payload) = payload {
            event = event.with_payload(payload);
        }
        self.send(StreamFrame::Event(event)).await
    }

    async fn announce(&self) -> Result<()> {
        let phase = SessionPhase::Initializing;
        let event = ProgressEvent::status(self.kind.label(phase), self.kind.message(phase));
        self.send(StreamFrame::Event(event)).await
    }

    async fn finish(&self, payload: Value) -> Result<()> {
        self.enter(SessionPhase::Complete)?;
        let phase = SessionPhase::Complete;
        let event =
            ProgressEvent::complete(self.kind.label(phase), self.kind.message(phase), payload);
        self.send(StreamFrame::Event(event)).await
    }

    async fn fail(&self, err: &PipelineError) -> Result<()> {
        self.enter(SessionPhase::Error)?;
        let mut message = err.to_string();
        if message.trim().is_empty() {
            message = self.kind.message(SessionPhase::Error).to_string();
        }
        let mut event = ProgressEvent::error(self.kind.label(SessionPhase::Error), message);
        let partial = self.partial.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(partial) = partial {
            event = event.with_payload(partial);
        }
        self.send(StreamFrame::Event(event)).await
    }

    fn enter(&self, next: SessionPhase) -> Result<()> {
        let mut phase = self.phase.lock().unwrap_or_else(PoisonError::into_inner);
        if !phase.can_advance_to(next) {
            return Err(PipelineError::invalid_transition(*phase, next));
        }
        *phase = next;
        Ok(())
    }

    async fn send(&self, frame: StreamFrame) -> Result<()> {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(PipelineError::Cancelled),
            sent = self.tx.send(frame) => sent.map_err(|_| PipelineError::Cancelled),
        }
    }
}

// ============================================================================
// Session
// ============================================================================

/// A running pipeline plus its heartbeat, read one frame at a time.
#[derive(Debug)]
pub struct StreamSession {
    kind: PipelineKind,
    rx: mpsc::Receiver<StreamFrame>,
    cancel: CancellationToken,
    pipeline: Option<JoinHandle<()>>,
    heartbeat: Option<JoinHandle<()>>,
    finished: bool,
}

impl StreamSession {
    /// Spawns `pipeline` and a heartbeat worker.
    ///
    /// The pipeline receives a [`ProgressReporter`] and returns the payload
    /// of the `complete` event. An `initializing` event is sent before it
    /// starts; an `error` event replaces `complete` if it fails. Must be
    /// called inside a Tokio runtime.
    pub fn spawn<F, Fut>(kind: PipelineKind, settings: &StreamSettings, pipeline: F) -> Self
    where
        F: FnOnce(ProgressReporter) -> Fut + Send + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(settings.event_buffer.max(1));
        let cancel = CancellationToken::new();

        let reporter = ProgressReporter::new(kind, tx.clone(), cancel.clone());
        let pipeline = tokio::spawn(run_pipeline(reporter, pipeline));
        let heartbeat = tokio::spawn(run_heartbeat(tx, cancel.clone(), settings.heartbeat()));
        info!(pipeline = ?kind, "Streaming session started");

        Self {
            kind,
            rx,
            cancel,
            pipeline: Some(pipeline),
            heartbeat: Some(heartbeat),
            finished: false,
        }
    }

    /// Creates a session that reports a single error and ends.
    ///
    /// Used when a request is rejected before any stage runs.
    pub fn rejected(kind: PipelineKind, settings: &StreamSettings, err: PipelineError) -> Self {
        Self::spawn(kind, settings, move |_reporter| async move { Err::<Value, _>(err) })
    }

    /// The pipeline this session runs.
    #[must_use]
    pub const fn kind(&self) -> PipelineKind {
        self.kind
    }

    /// Returns `true` once the end-of-stream marker has been read.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        self.finished
    }

    /// A token that cancels this session when triggered.
    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Number of workers that have not been reaped yet.
    #[must_use]
    pub fn active_workers(&self) -> usize {
        [&self.pipeline, &self.heartbeat]
            .into_iter()
            .flatten()
            .filter(|handle| !handle.is_finished())
            .count()
    }

    /// Waits for the next frame.
    ///
    /// Returns [`StreamFrame::EndOfStream`] once, then `None` forever. A
    /// cancelled session yields `None` without an end-of-stream marker.
    pub async fn next(&mut self) -> Option<StreamFrame> {
        if self.finished {
            return None;
        }
        match self.rx.recv().await {
            Some(StreamFrame::EndOfStream) => {
                self.finished = true;
                self.cancel.cancel();
                Some(StreamFrame::EndOfStream)
            }
            Some(frame) => Some(frame),
            None => {
                self.finished = true;
                None
            }
        }
    }

    /// Cancels both workers and waits until both have exited.
    pub async fn shutdown(&mut self) {
        self.cancel.cancel();
        self.finished = true;
        reap(self.pipeline.take(), self.heartbeat.take()).await;
        debug!(pipeline = ?self.kind, "Streaming session torn down");
    }

    /// Converts the session into a stream of frames ending after
    /// [`StreamFrame::EndOfStream`].
    ///
    /// The workers are shut down when the stream ends; dropping the stream
    /// early cancels them.
    pub fn into_frames(self) -> impl Stream<Item = StreamFrame> + Send {
        futures::stream::unfold(self, |mut session| async move {
            if let Some(frame) = session.next().await {
                Some((frame, session))
            } else {
                session.shutdown().await;
                None
            }
        })
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        self.cancel.cancel();
        let pipeline = self.pipeline.take();
        let heartbeat = self.heartbeat.take();
        if pipeline.is_none() && heartbeat.is_none() {
            return;
        }
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            let kind = self.kind;
            runtime.spawn(async move {
                reap(pipeline, heartbeat).await;
                debug!(pipeline = ?kind, "Dropped streaming session reaped");
            });
        }
    }
}

async fn reap(pipeline: Option<JoinHandle<()>>, heartbeat: Option<JoinHandle<()>>) {
    for (name, handle) in [("pipeline", pipeline), ("heartbeat", heartbeat)] {
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    warn!(worker = name, error = %e, "Streaming worker ended abnormally");
                }
            }
        }
    }
}

// ============================================================================
// Workers
// ============================================================================

async fn run_pipeline<F, Fut>(reporter: ProgressReporter, pipeline: F)
where
    F: FnOnce(ProgressReporter) -> Fut + Send,
    Fut: Future<Output = Result<Value>> + Send,
{
    let cancel = reporter.cancel.clone();
    let drive = async {
        reporter.announce().await?;
        match pipeline(reporter.clone()).await {
            Ok(payload) => reporter.finish(payload).await,
            Err(PipelineError::Cancelled) => Err(PipelineError::Cancelled),
            Err(err) => {
                warn!(pipeline = ?reporter.kind, error = %err, "Streamed pipeline failed");
                reporter.fail(&err).await
            }
        }
    };

    let outcome = tokio::select! {
        () = cancel.cancelled() => Err(PipelineError::Cancelled),
        outcome = drive => outcome,
    };

    match outcome {
        Ok(()) => {
            if reporter.send(StreamFrame::EndOfStream).await.is_ok() {
                info!(pipeline = ?reporter.kind, phase = %reporter.phase(), "Streaming pipeline finished");
            }
        }
        Err(PipelineError::Cancelled) => debug!(pipeline = ?reporter.kind, "Pipeline worker cancelled"),
        Err(err) => {
            // The terminal event itself was rejected; close the stream anyway.
            warn!(error = %err, "Could not report pipeline outcome");
            let _ = reporter.send(StreamFrame::EndOfStream).await;
        }
    }
}

async fn run_heartbeat(tx: mpsc::Sender<StreamFrame>, cancel: CancellationToken, period: Duration) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let sent = tokio::select! {
                    () = cancel.cancelled() => break,
                    sent = tx.send(StreamFrame::Ping) => sent,
                };
                if sent.is_err() {
                    break;
                }
                debug!("Heartbeat ping sent");
            }
        }
    }
    debug!("Heartbeat worker stopped");
}

// ============================================================================
// Tests
// ============================================================================
