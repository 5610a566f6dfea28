//! End-to-end tests for progress streaming over server-sent events.
//!
//! A small router mounts the streaming entry points the way an embedding
//! service would; requests go through `tower::ServiceExt::oneshot` so no
//! socket is opened.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::{Json, State};
use axum::http::{header, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use futures::StreamExt;
use graspy_content::ContentRequest;
use graspy_pipeline::testing::{fixtures, parse_sse, ScriptedModel, SseRecord};
use graspy_pipeline::{
    sse_response, CurriculumPlanner, LessonOrchestrator, PipelineKind, SessionPhase, StreamFrame,
    StreamSession, SubjectAdvisor, SubjectRequest,
};
use serde_json::{json, Value};
use tower::ServiceExt;

// ============================================================================
// Test Router
// ============================================================================

#[derive(Clone)]
struct AppState {
    lessons: Arc<LessonOrchestrator>,
    curricula: Arc<CurriculumPlanner>,
    subjects: Arc<SubjectAdvisor>,
}

async fn lesson_stream(
    State(state): State<AppState>,
    Json(request): Json<ContentRequest>,
) -> Response {
    match state.lessons.stream_lesson(request) {
        Ok(session) => sse_response(session),
        Err(err) => (StatusCode::BAD_REQUEST, err.to_string()).into_response(),
    }
}

async fn curriculum_stream(
    State(state): State<AppState>,
    Json(request): Json<ContentRequest>,
) -> Response {
    sse_response(state.curricula.stream_curriculum(request))
}

async fn subjects_stream(
    State(state): State<AppState>,
    Json(request): Json<SubjectRequest>,
) -> Response {
    sse_response(state.subjects.stream_suggestions(request))
}

fn router(lessons: Arc<LessonOrchestrator>, curricula: Arc<CurriculumPlanner>) -> Router {
    subjects_router(lessons, curricula, Arc::new(SubjectAdvisor::new(ScriptedModel::new())))
}

fn subjects_router(
    lessons: Arc<LessonOrchestrator>,
    curricula: Arc<CurriculumPlanner>,
    subjects: Arc<SubjectAdvisor>,
) -> Router {
    Router::new()
        .route("/lesson/stream", post(lesson_stream))
        .route("/curriculum/stream", post(curriculum_stream))
        .route("/subjects/stream", post(subjects_stream))
        .with_state(AppState {
            lessons,
            curricula,
            subjects,
        })
}

fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn read_records(response: Response) -> Vec<SseRecord> {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    parse_sse(std::str::from_utf8(&bytes).unwrap())
}

/// Progress events in arrival order, parsed from `message` records.
fn messages(records: &[SseRecord]) -> Vec<Value> {
    records
        .iter()
        .filter(|r| r.event.as_deref() == Some("message"))
        .map(|r| serde_json::from_str(&r.data).unwrap())
        .collect()
}

fn phases(events: &[Value]) -> Vec<&str> {
    events
        .iter()
        .map(|e| e["phase"].as_str().unwrap_or_default())
        .collect()
}

fn lesson_body() -> Value {
    json!({
        "country": "Kenya",
        "language": "Swahili",
        "subject": "Mathematics",
        "topic": "Fractions",
        "gradeLevel": "middle school"
    })
}

fn idle_planner() -> Arc<CurriculumPlanner> {
    Arc::new(CurriculumPlanner::new(ScriptedModel::new()))
}

fn idle_lessons() -> Arc<LessonOrchestrator> {
    Arc::new(LessonOrchestrator::new(ScriptedModel::new()))
}

// ============================================================================
// Lesson Stream
// ============================================================================

#[tokio::test]
async fn test_lesson_stream_over_sse() {
    let model = ScriptedModel::new()
        .structured(Ok(fixtures::slide_draft_json()))
        .structured(Ok(fixtures::practice_draft_json()));
    let app = router(Arc::new(LessonOrchestrator::new(model)), idle_planner());

    let response = app
        .oneshot(post_json("/lesson/stream", &lesson_body()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CACHE_CONTROL], "no-cache");
    assert_eq!(response.headers()["x-accel-buffering"], "no");

    let records = read_records(response).await;
    let last = records.last().unwrap();
    assert_eq!(last.event, None);
    assert_eq!(last.data, "[DONE]");
    // Nothing follows the end-of-stream marker.
    assert_eq!(records.iter().filter(|r| r.data == "[DONE]").count(), 1);

    let events = messages(&records);
    assert_eq!(
        phases(&events),
        vec![
            "initializing",
            "generating_slides",
            "slides_ready",
            "generating_practice",
            "complete"
        ]
    );
    assert!(events[..4].iter().all(|e| e["type"] == "status"));

    let payload = &events[4]["payload"];
    assert_eq!(events[4]["type"], "complete");
    assert_eq!(payload["success"], true);
    let final_slide = payload["lesson"]["slides"].as_array().unwrap().last().unwrap();
    assert_eq!(
        final_slide["assessment"]["prompt"],
        payload["session"]["practice"]["question"]
    );
    assert_eq!(
        payload["session"]["practice"]["question"],
        fixtures::PRACTICE_QUESTION
    );
}

#[tokio::test]
async fn test_lesson_stream_rejects_incomplete_request() {
    let model = ScriptedModel::new();
    let app = router(Arc::new(LessonOrchestrator::new(model.clone())), idle_planner());

    let body = json!({ "country": "Kenya", "language": "Swahili", "subject": "Mathematics" });
    let response = app.oneshot(post_json("/lesson/stream", &body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert!(String::from_utf8_lossy(&bytes).contains("topic"));
    assert!(model.structured_calls().is_empty());
}

#[tokio::test]
async fn test_lesson_stream_failure_is_single_error_event() {
    let model = ScriptedModel::new()
        .structured(Ok(fixtures::slide_draft_json()))
        .structured(Ok(json!({ "question": "", "options": [] })));
    let app = router(Arc::new(LessonOrchestrator::new(model)), idle_planner());

    let records = read_records(
        app.oneshot(post_json("/lesson/stream", &lesson_body()))
            .await
            .unwrap(),
    )
    .await;
    let events = messages(&records);

    let errors: Vec<_> = events.iter().filter(|e| e["type"] == "error").collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["phase"], "error");
    assert!(events.iter().all(|e| e["type"] != "complete"));
    assert_eq!(records.last().unwrap().data, "[DONE]");
}

// ============================================================================
// Curriculum Stream
// ============================================================================

#[tokio::test]
async fn test_curriculum_stream_with_preferences() {
    let model = ScriptedModel::new()
        .structured(Ok(fixtures::topics_json(&fixtures::TOPICS)))
        .structured(Ok(fixtures::topics_json(&fixtures::TOPICS)));
    let planner = Arc::new(CurriculumPlanner::new(model.clone()));
    let app = router(idle_lessons(), planner);

    let body = json!({
        "country": "Nigeria",
        "language": "English",
        "subjects": ["Biology", "biology!", "  "]
    });
    let records = read_records(
        app.oneshot(post_json("/curriculum/stream", &body))
            .await
            .unwrap(),
    )
    .await;
    let events = messages(&records);

    assert_eq!(
        phases(&events),
        vec![
            "initializing",
            "generating_subjects",
            "subjects_generated",
            "generating_topics",
            "topics_generated"
        ]
    );

    let listed = &events[2]["payload"]["subjects"];
    assert_eq!(listed[0]["slug"], "biology");
    assert_eq!(listed[1]["slug"], "biology-2");

    let done = &events[4];
    assert_eq!(done["type"], "complete");
    assert_eq!(done["payload"]["currentStep"], "topics_generated");
    assert_eq!(
        done["payload"]["topics"]["biology-2"].as_array().unwrap().len(),
        fixtures::TOPICS.len()
    );
    // Only the two topic maps reached the model.
    assert_eq!(model.structured_calls().len(), 2);
}

#[tokio::test]
async fn test_curriculum_stream_missing_locale_reports_error() {
    let app = router(idle_lessons(), idle_planner());

    let body = json!({ "country": "", "language": "English" });
    let response = app
        .oneshot(post_json("/curriculum/stream", &body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let records = read_records(response).await;
    let events = messages(&records);
    let terminal: Vec<_> = events
        .iter()
        .filter(|e| e["type"] != "status")
        .collect();
    assert_eq!(terminal.len(), 1);
    assert_eq!(terminal[0]["type"], "error");
    assert_eq!(records.last().unwrap().data, "[DONE]");
}

#[tokio::test]
async fn test_curriculum_topic_failure_keeps_subjects_in_error() {
    let model = ScriptedModel::new().structured(Ok(fixtures::topics_json(&["Just", "Two"])));
    let app = router(idle_lessons(), Arc::new(CurriculumPlanner::new(model)));

    let body = json!({
        "country": "Kenya",
        "language": "English",
        "subjects": ["Mathematics"]
    });
    let records = read_records(
        app.oneshot(post_json("/curriculum/stream", &body))
            .await
            .unwrap(),
    )
    .await;
    let events = messages(&records);

    let error = events.last().unwrap();
    assert_eq!(error["type"], "error");
    assert_eq!(error["payload"]["subjects"][0]["slug"], "mathematics");
    assert_eq!(records.last().unwrap().data, "[DONE]");
}

// ============================================================================
// Subject Suggestion Stream
// ============================================================================

#[tokio::test]
async fn test_subject_stream_recommended_batch_first() {
    let model = ScriptedModel::new().structured(Ok(json!({
        "subjects": [
            {"name": "Agriculture"},
            {"name": "Mathematics", "recommended": true},
            {"name": "Kiswahili", "recommended": true},
            {"name": "Mathematics"}
        ]
    })));
    let app = subjects_router(
        idle_lessons(),
        idle_planner(),
        Arc::new(SubjectAdvisor::new(model)),
    );

    let body = json!({
        "country": "Kenya",
        "language": "Swahili",
        "educationStatus": "in_school",
        "ageRange": "12-14"
    });
    let records = read_records(
        app.oneshot(post_json("/subjects/stream", &body))
            .await
            .unwrap(),
    )
    .await;
    let events = messages(&records);

    assert_eq!(
        phases(&events),
        vec![
            "initializing",
            "suggesting_subjects",
            "recommended_subjects",
            "more_subjects",
            "complete"
        ]
    );
    let batch_ids = |event: &Value| -> Vec<String> {
        event["payload"]["subjects"]
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s["id"].as_str().unwrap().to_string())
            .collect()
    };
    assert_eq!(batch_ids(&events[2]), vec!["mathematics", "kiswahili"]);
    assert_eq!(batch_ids(&events[3]), vec!["agriculture"]);
    assert_eq!(records.last().unwrap().data, "[DONE]");
}

#[tokio::test]
async fn test_subject_stream_empty_list_reports_error() {
    let model = ScriptedModel::new().structured(Ok(json!({ "subjects": [] })));
    let app = subjects_router(
        idle_lessons(),
        idle_planner(),
        Arc::new(SubjectAdvisor::new(model)),
    );

    let body = json!({
        "country": "Ghana",
        "language": "English",
        "educationStatus": "out_of_school"
    });
    let records = read_records(
        app.oneshot(post_json("/subjects/stream", &body))
            .await
            .unwrap(),
    )
    .await;
    let events = messages(&records);

    assert_eq!(
        phases(&events),
        vec!["initializing", "suggesting_subjects", "error"]
    );
    assert_eq!(records.last().unwrap().data, "[DONE]");
}

// ============================================================================
// Liveness and Teardown
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_slow_stage_emits_keepalive_pings() {
    let model = ScriptedModel::new()
        .delayed(Duration::from_secs(45))
        .structured(Ok(fixtures::topics_json(&fixtures::TOPICS)));
    let app = router(idle_lessons(), Arc::new(CurriculumPlanner::new(model)));

    let body = json!({
        "country": "Kenya",
        "language": "English",
        "subjects": ["Mathematics"]
    });
    let records = read_records(
        app.oneshot(post_json("/curriculum/stream", &body))
            .await
            .unwrap(),
    )
    .await;

    let pings: Vec<_> = records
        .iter()
        .filter(|r| r.event.as_deref() == Some("ping"))
        .collect();
    assert!(pings.len() >= 2, "expected pings, got {}", pings.len());
    assert!(pings.iter().all(|r| r.data == "keepalive"));

    let events = messages(&records);
    assert_eq!(events.last().unwrap()["type"], "complete");
    assert_eq!(records.last().unwrap().data, "[DONE]");
}

#[tokio::test(start_paused = true)]
async fn test_client_disconnect_releases_pipeline() {
    let model = ScriptedModel::new()
        .delayed(Duration::from_secs(300))
        .structured(Ok(fixtures::slide_draft_json()))
        .structured(Ok(fixtures::practice_draft_json()));
    let lessons = Arc::new(LessonOrchestrator::new(model.clone()));
    let app = router(Arc::clone(&lessons), idle_planner());

    let response = app
        .oneshot(post_json("/lesson/stream", &lesson_body()))
        .await
        .unwrap();
    let mut body = response.into_body().into_data_stream();
    let first = body.next().await.unwrap().unwrap();
    assert!(String::from_utf8_lossy(&first).contains("initializing"));

    // Client goes away while the slide stage is still waiting on the model.
    drop(body);

    let mut waited = 0;
    while Arc::strong_count(&lessons) > 1 && waited < 100 {
        tokio::time::sleep(Duration::from_millis(10)).await;
        waited += 1;
    }
    assert_eq!(Arc::strong_count(&lessons), 1);
    assert!(model.remaining() >= 1);
}

#[tokio::test]
async fn test_session_shutdown_reaps_workers() {
    let settings = graspy_pipeline::StreamSettings::default();
    let mut session = StreamSession::spawn(PipelineKind::Lesson, &settings, |reporter| async move {
        reporter.advance(SessionPhase::StageOneRunning).await?;
        std::future::pending::<()>().await;
        Ok::<Value, graspy_pipeline::PipelineError>(Value::Null)
    });

    let first = session.next().await.unwrap();
    assert_eq!(first.as_event().unwrap().phase(), "initializing");
    let second = session.next().await.unwrap();
    assert!(matches!(second, StreamFrame::Event(_)));

    session.shutdown().await;
    assert_eq!(session.active_workers(), 0);
    assert!(session.is_finished());
    assert!(session.next().await.is_none());
}
