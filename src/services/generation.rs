//! The generation pipeline.
//!
//! Per turn: analyze recent history, pick the focus concept, compute a
//! calibrated target difficulty and question type, then produce a candidate
//! item — from a local generator when the concept supports one, otherwise
//! from the LLM under validation + dedup with bounded retries.

use std::collections::HashMap;

use chrono::Utc;

use crate::config::AdaptiveConfig;
use crate::constants::{GENERATION_TEMPERATURE, MAX_PROMPT_HINTS};
use crate::engine::analysis::{self, RecentAnalysis, RecentAttempt};
use crate::engine::dedup::{normalize_text, DedupRegistry};
use crate::engine::distractors;
use crate::engine::elo::{self, SkillState};
use crate::engine::generators;
use crate::engine::options::create_placeholder_options;
use crate::engine::policy::{self, FocusInput};
use crate::engine::validator::{self, Candidate, Verdict};
use crate::response::AppError;
use crate::services::llm::LlmClient;
use crate::services::llm_json;
use crate::store::operations::curriculum::Concept;
use crate::store::operations::items::{Item, ItemType};
use crate::store::operations::sessions::{CurrentItem, Session};
use crate::store::Store;

const GENERATION_SYSTEM_PROMPT: &str = r#"You are an expert tutor creating adaptive questions for a learner.

Return ONLY valid JSON:
{
  "question": "The question text",
  "options": ["A) ...", "B) ...", "C) ...", "D) ..."],
  "correct_answer": "The answer",
  "explanation": "Step-by-step solution",
  "estimated_difficulty": 0.65
}

Rules:
1. Match the target difficulty level precisely.
2. Never repeat a question from the recent-question list.
3. For mcq: exactly 4 options, and the correct answer must be one of the option letters (A, B, C, or D).
4. For short_answer: correct_answer must be a concise string. Omit the options field.
5. For problem: pose a multi-step problem with a worked solution in the explanation. Omit options.
6. The question must be self-contained text. Never reference pictures, images, graphs, figures, or diagrams.
7. Never use placeholder text like [shows ...] or [insert ...].
8. Never ask the learner to draw, sketch, graph, or shade anything.
9. Never include "all of the above" or "none of the above" style options.
10. Keep the correct answer under 200 characters.
11. Do not state the answer inside the question text.
12. End the question with proper punctuation.
13. Arithmetic in the explanation must be correct and must end at the stated answer.
14. Return ONLY the JSON, no other text."#;

/// Everything the policy needs for one turn, optionally overlaid with a
/// simulated outcome for speculative pre-generation.
#[derive(Debug)]
pub struct TurnContext {
    pub concepts: Vec<Concept>,
    pub skills: HashMap<String, SkillState>,
    pub attempts: Vec<RecentAttempt>,
    pub analysis: RecentAnalysis,
    pub current_concept_id: Option<String>,
    pub last_concept_id: Option<String>,
}

/// Assumed outcome of the current item for one pre-cache branch.
#[derive(Debug, Clone)]
pub struct SimulatedOutcome {
    pub concept_id: String,
    pub difficulty: f64,
    pub is_correct: bool,
}

pub struct TurnDeps<'a> {
    pub store: &'a Store,
    pub llm: &'a LlmClient,
    pub config: &'a AdaptiveConfig,
}

/// Build the policy context from stored history, applying the simulated
/// outcome on top when pre-generating a branch.
pub fn build_context(
    deps: &TurnDeps<'_>,
    learner_id: &str,
    topic_id: &str,
    session: &Session,
    sim: Option<&SimulatedOutcome>,
) -> Result<TurnContext, AppError> {
    let concepts = deps.store.list_concepts_by_topic(topic_id)?;
    let mut skills = deps.store.skills_for_learner(learner_id)?;
    let recent = deps
        .store
        .recent_enriched(learner_id, deps.config.recent_window)?;

    let mut attempts: Vec<RecentAttempt> = recent
        .iter()
        .map(|e| RecentAttempt {
            concept_id: e.attempt.concept_id.clone(),
            is_correct: e.attempt.is_correct,
        })
        .collect();

    if let Some(sim) = sim {
        let old = skills
            .get(&sim.concept_id)
            .cloned()
            .unwrap_or_else(|| SkillState::initial(deps.config));
        let streak = leading_streak(&attempts);
        let mut updated = elo::update(&old, sim.is_correct, sim.difficulty, streak, deps.config);

        let mut results: Vec<bool> = vec![sim.is_correct];
        results.extend(
            attempts
                .iter()
                .filter(|a| a.concept_id == sim.concept_id)
                .map(|a| a.is_correct),
        );
        let accuracy = results.iter().filter(|r| **r).count() as f64 / results.len() as f64;
        updated.mastery = elo::mastery(updated.rating, accuracy);
        skills.insert(sim.concept_id.clone(), updated);

        attempts.insert(
            0,
            RecentAttempt {
                concept_id: sim.concept_id.clone(),
                is_correct: sim.is_correct,
            },
        );
        attempts.truncate(deps.config.recent_window);
    }

    let analysis = analysis::analyze(&attempts);
    let current_concept_id = match sim {
        Some(sim) => Some(sim.concept_id.clone()),
        None => session.current_item.as_ref().map(|c| c.concept_id.clone()),
    };
    let last_concept_id = attempts.first().map(|a| a.concept_id.clone());

    Ok(TurnContext {
        concepts,
        skills,
        attempts,
        analysis,
        current_concept_id,
        last_concept_id,
    })
}

/// The concept the policy would pick for this context.
pub fn focus_of(ctx: &TurnContext, config: &AdaptiveConfig) -> Option<String> {
    policy::select_focus(
        &FocusInput {
            concepts: &ctx.concepts,
            skills: &ctx.skills,
            analysis: &ctx.analysis,
            current_concept_id: ctx.current_concept_id.as_deref(),
            last_concept_id: ctx.last_concept_id.as_deref(),
        },
        config,
    )
}

/// Pick a focus concept and produce the next item for it.
/// Returns `Ok(None)` when no concept qualifies or generation exhausts its
/// retry budget.
pub async fn generate_next(
    deps: &TurnDeps<'_>,
    learner_id: &str,
    topic_id: &str,
    session: &Session,
    sim: Option<&SimulatedOutcome>,
) -> Result<Option<CurrentItem>, AppError> {
    let ctx = build_context(deps, learner_id, topic_id, session, sim)?;
    generate_for_context(deps, &ctx, learner_id, topic_id, session).await
}

pub async fn generate_for_context(
    deps: &TurnDeps<'_>,
    ctx: &TurnContext,
    learner_id: &str,
    topic_id: &str,
    session: &Session,
) -> Result<Option<CurrentItem>, AppError> {
    let Some(focus_id) = focus_of(ctx, deps.config) else {
        return Ok(None);
    };
    let concept = deps.store.get_concept(&focus_id)?;
    let topic = deps.store.get_topic(topic_id)?;

    let skill = ctx
        .skills
        .get(&focus_id)
        .cloned()
        .unwrap_or_else(|| SkillState::initial(deps.config));

    let base_target = elo::target_difficulty(skill.rating, deps.config);
    let difficulty = match ctx.analysis.per_concept.get(&focus_id) {
        Some(stats) => elo::calibrate(base_target, stats.accuracy, stats.count, deps.config),
        None => base_target,
    };

    let mut item_type = item_type_for_mastery(skill.mastery);

    // Dedup sets: everything shown this session (the unanswered current
    // item included) plus everything ever answered correctly.
    let session_texts: Vec<String> = deps
        .store
        .attempts_for_session(&session.id)?
        .into_iter()
        .map(|e| e.content)
        .collect();
    let mut registry = DedupRegistry::new(session_texts, deps.store.correct_texts(learner_id)?);
    if let Some(current) = &session.current_item {
        registry.add_current(&current.content);
    }
    let hints = registry.prompt_hints(MAX_PROMPT_HINTS);

    // Local generators bypass the LLM entirely.
    if let Some(local) = try_local_generators(&concept, &hints) {
        item_type = ItemType::Mcq;
        let item = persist_item(
            deps,
            &concept,
            &local.question,
            item_type,
            Some(local.options),
            local.correct_answer,
            Some(local.explanation),
            difficulty,
            skill.rating,
            None,
            Some("local".to_string()),
            Some(local.svg),
        )?;
        return Ok(Some(item));
    }

    let norm_difficulty = normalized_difficulty(difficulty);
    let user_prompt = build_user_prompt(
        &topic.name,
        &concept,
        norm_difficulty,
        item_type,
        &hints,
    );

    for attempt_num in 0..deps.config.max_generation_attempts {
        let output = match deps
            .llm
            .chat(GENERATION_SYSTEM_PROMPT, &user_prompt, GENERATION_TEMPERATURE)
            .await
        {
            Ok(output) => output,
            Err(e) => {
                tracing::warn!(attempt_num, error = %e, "Generation call failed");
                continue;
            }
        };

        let parsed = match llm_json::parse_object(&output.text) {
            Ok(map) => map,
            Err(e) => {
                tracing::warn!(attempt_num, error = %e, "Generation returned malformed JSON");
                continue;
            }
        };

        let question = string_field(&parsed, "question");
        let correct_answer = string_field(&parsed, "correct_answer");
        if question.trim().is_empty() {
            tracing::warn!(attempt_num, "Generation returned an empty question");
            continue;
        }

        let mut options: Option<Vec<String>> = parsed.get("options").and_then(|v| {
            let list: Vec<String> = v
                .as_array()?
                .iter()
                .filter_map(|o| o.as_str().map(|s| s.to_string()))
                .collect();
            (!list.is_empty()).then_some(list)
        });
        let explanation = {
            let text = string_field(&parsed, "explanation");
            (!text.trim().is_empty()).then_some(text)
        };

        // MCQ candidates need options for the choice rules; build sanitized
        // placeholders that real distractors replace after acceptance.
        let mut used_placeholders = false;
        if item_type == ItemType::Mcq && options.is_none() {
            options = Some(create_placeholder_options(&correct_answer, attempt_num));
            used_placeholders = true;
        }

        let candidate = Candidate {
            question: question.clone(),
            correct_answer: correct_answer.clone(),
            options: options.clone(),
            explanation: explanation.clone(),
            item_type,
        };

        if let Verdict::Reject { rule, reason } = validator::validate(&candidate) {
            tracing::warn!(attempt_num, rule, reason = %reason, "Validator rejected candidate");
            continue;
        }

        if let Some(hit) = registry.check(&question) {
            tracing::warn!(attempt_num, layer = ?hit, "Dedup rejected candidate");
            continue;
        }

        // Accepted: swap placeholders for computed distractors.
        let (final_options, final_answer) = if used_placeholders {
            let (options, labeled) = distractors::insert_distractors(&correct_answer);
            (Some(options), labeled)
        } else {
            (options, correct_answer)
        };

        let item = persist_item(
            deps,
            &concept,
            &question,
            item_type,
            final_options,
            final_answer,
            explanation,
            difficulty,
            skill.rating,
            Some(output.full_prompt),
            Some(output.model),
            None,
        )?;
        return Ok(Some(item));
    }

    tracing::warn!(
        concept = %concept.name,
        attempts = deps.config.max_generation_attempts,
        "Generation exhausted its retry budget"
    );
    Ok(None)
}

/// Question type follows the mastery band: mcq early, short answers in the
/// middle, worked problems once the concept is nearly mastered.
pub fn item_type_for_mastery(mastery: f64) -> ItemType {
    if mastery < 0.3 {
        ItemType::Mcq
    } else if mastery < 0.6 {
        ItemType::ShortAnswer
    } else {
        ItemType::Problem
    }
}

/// ELO difficulty normalized into [0, 1] for prompts and display.
pub fn normalized_difficulty(difficulty: f64) -> f64 {
    ((difficulty - 400.0) / 800.0).clamp(0.0, 1.0)
}

pub fn difficulty_score(difficulty: f64) -> u8 {
    (normalized_difficulty(difficulty) * 9.0).round() as u8 + 1
}

fn leading_streak(attempts: &[RecentAttempt]) -> u32 {
    attempts.iter().take_while(|a| a.is_correct).count() as u32
}

fn string_field(map: &serde_json::Map<String, serde_json::Value>, key: &str) -> String {
    match map.get(key) {
        Some(serde_json::Value::String(s)) => s.trim().to_string(),
        Some(serde_json::Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

fn try_local_generators(concept: &Concept, hints: &[String]) -> Option<generators::LocalItem> {
    if generators::is_clock_concept(&concept.name, &concept.description) {
        let item = generators::generate_clock_item(&concept.name, &concept.description, hints);
        if item.is_some() {
            tracing::info!(concept = %concept.name, "Generated local clock item");
            return item;
        }
    }
    if generators::is_number_line_concept(&concept.name, &concept.description) {
        let item = generators::generate_number_line_item(hints);
        if item.is_some() {
            tracing::info!(concept = %concept.name, "Generated local number-line item");
            return item;
        }
    }
    None
}

#[allow(clippy::too_many_arguments)]
fn persist_item(
    deps: &TurnDeps<'_>,
    concept: &Concept,
    question: &str,
    item_type: ItemType,
    options: Option<Vec<String>>,
    correct_answer: String,
    explanation: Option<String>,
    difficulty: f64,
    rating: f64,
    prompt_used: Option<String>,
    model_used: Option<String>,
    svg: Option<String>,
) -> Result<CurrentItem, AppError> {
    let p_correct = elo::probability(rating, difficulty, deps.config);
    let item = Item {
        id: uuid::Uuid::new_v4().to_string(),
        concept_id: concept.id.clone(),
        content: question.to_string(),
        item_type,
        options: options.clone(),
        correct_answer: correct_answer.clone(),
        explanation: explanation.clone(),
        difficulty,
        estimated_p_correct: p_correct,
        prompt_used,
        model_used,
        svg: svg.clone(),
        created_at: Utc::now(),
    };
    deps.store.insert_item(&item)?;

    Ok(CurrentItem {
        item_id: item.id,
        concept_id: concept.id.clone(),
        concept_name: concept.name.clone(),
        content: question.to_string(),
        item_type,
        options,
        correct_answer,
        explanation,
        difficulty,
        difficulty_score: difficulty_score(difficulty),
        p_correct,
        svg,
    })
}

fn build_user_prompt(
    topic_name: &str,
    concept: &Concept,
    norm_difficulty: f64,
    item_type: ItemType,
    hints: &[String],
) -> String {
    let recent_list = if hints.is_empty() {
        "None".to_string()
    } else {
        hints
            .iter()
            .map(|h| format!("- {h}"))
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        "Generate a {qtype} question for:\n\
         - Topic: {topic_name}\n\
         - Concept: {concept_name}\n\
         - Concept description: {description}\n\
         - Difficulty: {norm_difficulty:.2} (0.0=easiest, 1.0=hardest)\n\
         - Recent questions (DO NOT repeat):\n{recent_list}\n\n\
         Return JSON only.",
        qtype = item_type.as_str(),
        concept_name = concept.name,
        description = concept.description,
    )
}
