//! End-to-end tests for the synchronous generation paths.
//!
//! A scripted model capability stands in for the generative model; each
//! test queues the payloads the model would return and checks what reaches
//! the caller.

use std::sync::Arc;

use graspy_content::{
    normalize_subjects, slugify, validate_slide_set, ContentRequest, SlideSetDraft, OPTION_COUNT,
    SLIDE_COUNT,
};
use graspy_pipeline::testing::{fixtures, AgentScript, ScriptedModel};
use graspy_pipeline::{
    CurriculumPlanner, LessonOrchestrator, PipelineError, Settings, Stage, StageGenerator,
};
use serde_json::json;
use tokio_test::{assert_err, assert_ok};

fn kenya_fractions() -> ContentRequest {
    ContentRequest::new("Kenya", "Swahili")
        .with_subject("Mathematics")
        .with_topic("Fractions")
        .with_grade_level("middle school")
}

/// The orchestrated path splices the independently produced practice into
/// the final slide.
#[tokio::test]
async fn test_kenya_lesson_final_slide_carries_practice() {
    let model = ScriptedModel::new()
        .agent(AgentScript::FollowProtocol)
        .structured(Ok(fixtures::slide_draft_json()))
        .structured(Ok(fixtures::practice_draft_json()));
    let orchestrator = LessonOrchestrator::new(model.clone());

    let assets = assert_ok!(orchestrator.build_lesson(&kenya_fractions(), None, None).await);

    let last = &assets.slides.final_slide().assessment;
    assert_eq!(last.prompt, assets.practice.question);
    assert_eq!(last.options, assets.practice.options);
    assert_eq!(last.answer_index, assets.practice.correct_option_index);

    // Earlier slides keep their own checkpoints.
    assert_eq!(assets.slides.slides[0].assessment.prompt, "Checkpoint 1");

    let calls = model.structured_calls();
    assert!(calls[0].prompt.contains("Swahili"));
    assert!(calls[0].prompt.contains("Kenya"));
}

/// Orchestration failure falls back to direct calls with the same result.
#[tokio::test]
async fn test_fallback_result_matches_primary() {
    let primary = ScriptedModel::new()
        .agent(AgentScript::FollowProtocol)
        .structured(Ok(fixtures::slide_draft_json()))
        .structured(Ok(fixtures::practice_draft_json()));
    let fallback = ScriptedModel::new()
        .agent(AgentScript::Fail(PipelineError::orchestration(
            "agent returned prose",
        )))
        .structured(Ok(fixtures::slide_draft_json()))
        .structured(Ok(fixtures::practice_draft_json()));

    let a = assert_ok!(
        LessonOrchestrator::new(primary)
            .build_lesson(&kenya_fractions(), None, None)
            .await
    );
    let b = assert_ok!(
        LessonOrchestrator::new(fallback)
            .build_lesson(&kenya_fractions(), None, None)
            .await
    );
    assert_eq!(a, b);
}

/// A budget overrun is retried once with the compact prompt and the caller
/// only sees the compact result.
#[tokio::test]
async fn test_budget_overrun_retried_with_compact_prompt() {
    let model = ScriptedModel::new()
        .structured(Err(PipelineError::from_provider_message(
            "MaxTokensReachedException: max_tokens reached",
        )))
        .structured(Ok(fixtures::slide_draft_json()));
    let stages = StageGenerator::new(model.clone());

    let slides = assert_ok!(stages.generate_slides(&kenya_fractions(), Some(800)).await);
    assert_eq!(slides.overview, fixtures::OVERVIEW);

    let calls = model.structured_calls();
    assert_eq!(calls.len(), 2);
    assert!(!calls[0].prompt.contains("Trim optional anecdotes"));
    assert!(calls[1].prompt.contains("Trim optional anecdotes"));
    assert_eq!(calls[1].options.max_tokens, Some(800));
}

/// Unreachable models surface unchanged, without a fallback attempt.
#[tokio::test]
async fn test_unavailable_model_surfaces() {
    let model = ScriptedModel::new().agent(AgentScript::Fail(PipelineError::from_provider_message(
        "Unable to locate credentials",
    )));
    let orchestrator = LessonOrchestrator::new(model.clone());

    let err = assert_err!(orchestrator.build_lesson(&kenya_fractions(), None, None).await);
    assert!(err.is_upstream_unavailable());
    assert!(err.is_fatal());
    assert!(model.structured_calls().is_empty());
}

/// Configured stage budgets reach the direct stage calls.
#[tokio::test]
async fn test_settings_budgets_reach_stages() {
    let mut settings = Settings::default();
    let env = |name: &str| match name {
        "LESSON_SLIDE_MAX_TOKENS" => Some("2400".to_string()),
        "STRANDS_MAX_TOKENS" => Some("900".to_string()),
        _ => None,
    };
    settings.apply_env(env).unwrap();
    settings.validate().unwrap();

    let model = ScriptedModel::new()
        .agent(AgentScript::Fail(PipelineError::orchestration("no tools")))
        .structured(Ok(fixtures::slide_draft_json()))
        .structured(Ok(fixtures::practice_draft_json()));
    let orchestrator = LessonOrchestrator::with_settings(model.clone(), settings);

    assert_ok!(orchestrator.build_lesson(&kenya_fractions(), None, None).await);
    let calls = model.structured_calls();
    assert_eq!(calls[0].options.max_tokens, Some(2400));
    assert_eq!(calls[1].options.max_tokens, Some(900));
}

/// Validated slide sets always have exact counts and in-range indices.
#[test]
fn test_validated_slide_sets_hold_their_counts() {
    for raw_index in [json!(-4), json!(0), json!(2), json!(9), json!("two"), json!(null)] {
        let mut draft = fixtures::slide_draft_json();
        for slide in draft["slides"].as_array_mut().unwrap() {
            slide["assessment"]["answerIndex"] = raw_index.clone();
        }
        draft["learningObjectives"]
            .as_array_mut()
            .unwrap()
            .push(json!("A fourth objective that gets dropped"));

        let draft: SlideSetDraft = serde_json::from_value(draft).unwrap();
        let slides = validate_slide_set(draft).unwrap();

        assert_eq!(slides.learning_objectives.len(), 3);
        assert_eq!(slides.slides.len(), SLIDE_COUNT);
        for slide in &slides.slides {
            assert_eq!(slide.assessment.options.len(), OPTION_COUNT);
            assert!(slide.assessment.answer_index < OPTION_COUNT);
        }
    }
}

/// Subject preferences drop blanks and suffix colliding slugs.
#[tokio::test]
async fn test_biology_preferences() {
    let planner = CurriculumPlanner::new(ScriptedModel::new());
    let request = ContentRequest::new("Nigeria", "English").with_subject_preferences(vec![
        "Biology".to_string(),
        "biology!".to_string(),
        "  ".to_string(),
    ]);

    let subjects = assert_ok!(planner.list_subjects(&request).await);
    let slugs: Vec<_> = subjects.iter().map(|s| s.slug.as_str()).collect();
    assert_eq!(slugs, vec!["biology", "biology-2"]);
}

/// Slugging is idempotent, and suffixes keep colliding slugs distinct.
#[test]
fn test_slug_properties() {
    let inputs = [
        "Mathematics",
        "  Social Studies & Civics ",
        "ICT / Computing",
        "!!!",
        "Français",
        "--Home--Economics--",
    ];
    for input in inputs {
        let once = slugify(input);
        assert_eq!(slugify(&once), once, "slug of {input:?} is not stable");
    }

    let subjects = normalize_subjects(&["Art", "ART", "art!", "Art."]);
    let slugs: Vec<_> = subjects.iter().map(|s| s.slug.as_str()).collect();
    assert_eq!(slugs, vec!["art", "art-2", "art-3", "art-4"]);
}

/// A topic map for one subject holds 5 to 7 non-empty topics.
#[tokio::test]
async fn test_topic_map_for_mathematics() {
    let model = ScriptedModel::new().structured(Ok(fixtures::topics_json(&fixtures::TOPICS)));
    let planner = CurriculumPlanner::new(model);
    let request = ContentRequest::new("Kenya", "English");
    let subjects = normalize_subjects(&["Mathematics"]);

    let map = assert_ok!(planner.map_topics(&request, &subjects).await);
    let topics = &map["mathematics"];
    assert!((5..=7).contains(&topics.len()));
    assert!(topics.iter().all(|t| !t.is_empty()));
}

/// A single failing subject aborts the whole plan.
#[tokio::test]
async fn test_curriculum_plan_aborts_on_topic_failure() {
    let model = Arc::new(ScriptedModel::default())
        .structured(Ok(fixtures::subjects_json(&["Mathematics", "English", "Science"])))
        .structured(Ok(fixtures::topics_json(&fixtures::TOPICS)))
        .structured(Ok(fixtures::topics_json(&["Only", "Three", "Topics"])));
    let planner = CurriculumPlanner::new(model.clone());

    let err = assert_err!(planner.plan_curriculum(&ContentRequest::new("Kenya", "English")).await);
    assert_eq!(err.stage(), Some(Stage::Topics));
    // Science was never requested.
    assert_eq!(model.structured_calls().len(), 3);
}
