//! Structural contracts for generated lessons.
//!
//! Validation normalizes every string, repairs what can be repaired (answer
//! indices) and rejects what cannot (option counts, missing checkpoints).
//! Extra objectives and slides are truncated; shortfalls are violations.

use serde_json::Value;

use crate::model::{
    Assessment, AssessmentDraft, LessonAssets, Practice, PracticeDraft, Slide, SlideDraft,
    SlideSet, SlideSetDraft, OBJECTIVE_COUNT, OPTION_COUNT, SLIDE_COUNT,
};
use crate::normalize::{is_blank, normalize};
use crate::{ContentError, Result};

// ============================================================================
// Slide Sets
// ============================================================================

/// Validates a slide draft and returns the normalized slide set.
///
/// # Errors
///
/// Returns `ContentError::ContractViolation` when:
/// - a slide has no assessment, or its options are not exactly three after
///   normalization, or its body is blank
/// - the overview is blank
/// - fewer than three non-blank objectives or fewer than five slides remain
pub fn validate_slide_set(draft: SlideSetDraft) -> Result<SlideSet> {
    let objectives: Vec<String> = draft
        .learning_objectives
        .iter()
        .filter(|item| !is_blank(item))
        .map(|item| normalize(item))
        .take(OBJECTIVE_COUNT)
        .collect();

    let slides = draft
        .slides
        .into_iter()
        .take(SLIDE_COUNT)
        .enumerate()
        .map(|(index, slide)| validate_slide(index + 1, slide))
        .collect::<Result<Vec<_>>>()?;

    let overview = normalize(&draft.overview);
    if overview.is_empty() {
        return Err(ContentError::contract_violation("lesson overview is blank"));
    }

    let learning_objectives: [String; OBJECTIVE_COUNT] =
        objectives.try_into().map_err(|found: Vec<String>| {
            ContentError::contract_violation(format!(
                "expected {OBJECTIVE_COUNT} learning objectives, found {}",
                found.len()
            ))
        })?;

    let slides: [Slide; SLIDE_COUNT] = slides.try_into().map_err(|found: Vec<Slide>| {
        ContentError::contract_violation(format!(
            "expected {SLIDE_COUNT} slides, found {}",
            found.len()
        ))
    })?;

    Ok(SlideSet {
        overview,
        learning_objectives,
        slides,
    })
}

fn validate_slide(position: usize, slide: SlideDraft) -> Result<Slide> {
    let body_md = normalize(&slide.body_md);
    if body_md.is_empty() {
        return Err(ContentError::contract_violation(format!(
            "slide {position} has a blank body"
        )));
    }

    let Some(assessment) = slide.assessment else {
        return Err(ContentError::contract_violation(format!(
            "slide {position} is missing its assessment"
        )));
    };

    Ok(Slide {
        slide_type: slide.slide_type,
        title: normalize(&slide.title),
        body_md,
        assessment: validate_assessment(position, assessment)?,
    })
}

fn validate_assessment(position: usize, draft: AssessmentDraft) -> Result<Assessment> {
    let options = collect_options(&draft.options).map_err(|found| {
        ContentError::contract_violation(format!(
            "slide {position} assessment must have {OPTION_COUNT} options, found {found}"
        ))
    })?;

    Ok(Assessment::choice(
        normalize(&draft.prompt),
        options,
        repair_answer_index(draft.answer_index.as_ref()),
        normalize(&draft.correct_feedback),
        normalize(&draft.incorrect_feedback),
    ))
}

// ============================================================================
// Practice
// ============================================================================

/// Validates a practice draft and returns the normalized practice item.
///
/// # Errors
///
/// Returns `ContentError::ContractViolation` when the draft has fewer than
/// three raw options, a blank question, or not exactly three non-blank
/// options after normalization.
pub fn validate_practice(draft: PracticeDraft) -> Result<Practice> {
    if draft.options.len() < OPTION_COUNT {
        return Err(ContentError::contract_violation(format!(
            "practice needs at least {OPTION_COUNT} options, found {}",
            draft.options.len()
        )));
    }
    if is_blank(&draft.question) {
        return Err(ContentError::contract_violation("practice question is blank"));
    }

    let options = collect_options(&draft.options).map_err(|found| {
        ContentError::contract_violation(format!(
            "practice must have {OPTION_COUNT} non-blank options, found {found}"
        ))
    })?;

    Ok(Practice {
        question: normalize(&draft.question),
        options,
        correct_option_index: repair_answer_index(draft.correct_option_index.as_ref()),
        correct_feedback: normalize(&draft.correct_feedback),
        incorrect_feedback: normalize(&draft.incorrect_feedback),
    })
}

/// Normalizes options, drops blanks and requires exactly [`OPTION_COUNT`].
///
/// On failure returns the number of options that survived.
fn collect_options(raw: &[String]) -> std::result::Result<[String; OPTION_COUNT], usize> {
    let options: Vec<String> = raw
        .iter()
        .filter(|option| !is_blank(option))
        .map(|option| normalize(option))
        .collect();
    options.try_into().map_err(|found: Vec<String>| found.len())
}

/// Clamps an integer index into `0..OPTION_COUNT`.
///
/// Integral floats (`2.0`) and numeric strings (`"2"`) count as integers;
/// anything else yields 0.
#[must_use]
pub fn repair_answer_index(raw: Option<&Value>) -> usize {
    let max = OPTION_COUNT - 1;
    let Some(raw) = raw else {
        return 0;
    };
    if let Some(index) = raw.as_u64() {
        return usize::try_from(index).map_or(max, |index| index.min(max));
    }
    let index = match raw {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().and_then(integral_f64)),
        Value::String(text) => parse_integer(text.trim()),
        _ => None,
    };
    // Anything left is negative, so it clamps to the first option.
    match index {
        Some(index) if index > 0 => usize::try_from(index).map_or(max, |index| index.min(max)),
        _ => 0,
    }
}

#[allow(clippy::cast_possible_truncation, clippy::float_cmp)]
fn integral_f64(value: f64) -> Option<i64> {
    if !value.is_finite() || value.fract() != 0.0 {
        return None;
    }
    // Saturating cast; out-of-range magnitudes clamp anyway.
    Some(value as i64)
}

fn parse_integer(text: &str) -> Option<i64> {
    text.parse::<i64>()
        .ok()
        .or_else(|| text.parse::<f64>().ok().and_then(integral_f64))
}

// ============================================================================
// Splicing
// ============================================================================

/// Replaces the final slide's checkpoint with the practice item.
///
/// The resulting checkpoint prompt, options, index and feedback equal the
/// practice's fields; every other slide is untouched.
#[must_use]
pub fn attach_practice(mut slides: SlideSet, practice: Practice) -> LessonAssets {
    let last = &mut slides.slides[SLIDE_COUNT - 1];
    last.assessment = Assessment::choice(
        practice.question.clone(),
        practice.options.clone(),
        practice.correct_option_index,
        practice.correct_feedback.clone(),
        practice.incorrect_feedback.clone(),
    );
    LessonAssets { slides, practice }
}
