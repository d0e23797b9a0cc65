//! The submit path: grade the answer, update the skill estimate, and
//! persist attempt + skill + history in one transaction.

use chrono::Utc;

use crate::constants::GRADING_TEMPERATURE;
use crate::engine::dedup::normalize_text;
use crate::engine::elo;
use crate::engine::grader;
use crate::response::AppError;
use crate::services::explainer;
use crate::services::generation::TurnDeps;
use crate::services::llm_json;
use crate::store::operations::attempts::Attempt;
use crate::store::operations::history::SkillSnapshot;
use crate::store::operations::items::ItemType;
use crate::store::operations::sessions::{CurrentItem, LastResult, Session};

const GRADING_SYSTEM_PROMPT: &str = r#"You are grading a learner's answer. Compare it to the correct answer.

Return ONLY valid JSON:
{
  "is_correct": true,
  "partial_score": 0.85,
  "feedback": "Explanation of what was right or wrong"
}

Be generous with partial credit for answers that show understanding.
Return ONLY the JSON, no other text."#;

#[derive(Debug, Clone)]
struct Graded {
    is_correct: bool,
    is_close: bool,
    partial_score: f64,
    feedback: Option<String>,
}

/// Grade, update the ELO estimate, and commit the attempt. The commit is a
/// single transaction; on conflict nothing is recorded and the error
/// surfaces to the caller.
pub async fn process_answer(
    deps: &TurnDeps<'_>,
    session: &Session,
    current: &CurrentItem,
    answer_given: &str,
    response_time_s: Option<f64>,
) -> Result<LastResult, AppError> {
    let learner_id = &session.learner_id;
    let graded = grade(deps, current, answer_given).await;

    // Correct-answer streak across all concepts feeds the K-factor bonus.
    let recent = deps
        .store
        .recent_enriched(learner_id, deps.config.recent_window)?;
    let streak = recent
        .iter()
        .take_while(|e| e.attempt.is_correct)
        .count() as u32;

    let skill_row = deps
        .store
        .get_skill_row(learner_id, &current.concept_id)?;
    let old_skill = skill_row
        .clone()
        .unwrap_or_else(|| elo::SkillState::initial(deps.config));

    let mut new_skill = elo::update(
        &old_skill,
        graded.is_correct,
        current.difficulty,
        streak,
        deps.config,
    );

    // Mastery blends the updated rating with recent accuracy on this
    // concept, this attempt included.
    let mut results: Vec<bool> = vec![graded.is_correct];
    results.extend(
        recent
            .iter()
            .filter(|e| e.attempt.concept_id == current.concept_id)
            .map(|e| e.attempt.is_correct),
    );
    let recent_accuracy = results.iter().filter(|r| **r).count() as f64 / results.len() as f64;
    new_skill.mastery = elo::mastery(new_skill.rating, recent_accuracy);

    let attempt = Attempt {
        id: uuid::Uuid::new_v4().to_string(),
        item_id: current.item_id.clone(),
        learner_id: learner_id.clone(),
        session_id: Some(session.id.clone()),
        concept_id: current.concept_id.clone(),
        answer_given: Some(answer_given.to_string()),
        is_correct: graded.is_correct,
        partial_score: Some(graded.partial_score),
        response_time_s,
        rating_before: old_skill.rating,
        rating_after: new_skill.rating,
        timestamp: Utc::now(),
    };
    let snapshot = SkillSnapshot {
        learner_id: learner_id.clone(),
        concept_id: current.concept_id.clone(),
        attempt_id: attempt.id.clone(),
        rating: new_skill.rating,
        uncertainty: new_skill.uncertainty,
        mastery: new_skill.mastery,
        timestamp: attempt.timestamp,
    };

    deps.store.record_attempt(
        &attempt,
        skill_row.as_ref(),
        &new_skill,
        &snapshot,
        &normalize_text(&current.content),
    )?;

    // Wrong answers get an explanation; failures degrade to a static
    // encouragement inside the explainer.
    let feedback = if graded.is_correct {
        graded.feedback
    } else {
        let explanation = explainer::explain(
            deps.llm,
            &current.content,
            &current.correct_answer,
            answer_given,
            &current.concept_name,
            "",
        )
        .await;
        Some(match graded.feedback {
            Some(grading_feedback) => format!("{grading_feedback} {}", explanation.as_feedback()),
            None => explanation.as_feedback(),
        })
    };

    Ok(LastResult {
        item_id: current.item_id.clone(),
        is_correct: graded.is_correct,
        is_close: graded.is_close,
        partial_score: graded.partial_score,
        rating_before: old_skill.rating,
        rating_after: new_skill.rating,
        mastery: new_skill.mastery,
        feedback,
    })
}

async fn grade(deps: &TurnDeps<'_>, current: &CurrentItem, answer_given: &str) -> Graded {
    match current.item_type {
        ItemType::Mcq | ItemType::ShortAnswer => {
            let (is_correct, is_close) = grader::check_answer(
                answer_given,
                &current.correct_answer,
                current.item_type,
                current.options.as_deref(),
            );
            Graded {
                is_correct,
                is_close,
                partial_score: if is_correct { 1.0 } else { 0.0 },
                feedback: None,
            }
        }
        ItemType::Problem => grade_with_llm(deps, current, answer_given).await,
    }
}

/// Open-ended problems go to the LLM for a structured verdict; any failure
/// falls back to local exact matching.
async fn grade_with_llm(deps: &TurnDeps<'_>, current: &CurrentItem, answer_given: &str) -> Graded {
    let user_prompt = format!(
        "Question: {question}\n\
         Correct answer: {correct}\n\
         Learner answer: {answer}\n\
         Topic context: {concept}\n\n\
         Grade this answer. Return JSON only.",
        question = current.content,
        correct = current.correct_answer,
        answer = answer_given,
        concept = current.concept_name,
    );

    let verdict = match deps
        .llm
        .chat(GRADING_SYSTEM_PROMPT, &user_prompt, GRADING_TEMPERATURE)
        .await
    {
        Ok(output) => llm_json::parse_object(&output.text),
        Err(e) => Err(e),
    };

    match verdict {
        Ok(map) => {
            let is_correct = map
                .get("is_correct")
                .and_then(|v| v.as_bool())
                .unwrap_or(false);
            let partial_score = map
                .get("partial_score")
                .and_then(|v| v.as_f64())
                .unwrap_or(if is_correct { 1.0 } else { 0.0 })
                .clamp(0.0, 1.0);
            let feedback = map
                .get("feedback")
                .and_then(|v| v.as_str())
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty());
            Graded {
                is_correct,
                is_close: false,
                partial_score,
                feedback,
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "LLM grading failed, falling back to exact match");
            let (is_correct, is_close) = grader::check_answer(
                answer_given,
                &current.correct_answer,
                ItemType::ShortAnswer,
                None,
            );
            Graded {
                is_correct,
                is_close,
                partial_score: if is_correct { 1.0 } else { 0.0 },
                feedback: None,
            }
        }
    }
}
