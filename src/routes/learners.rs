use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::response::{created, ok, AppError};
use crate::state::AppState;
use crate::store::operations::learners::Learner;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/learners", post(create_or_get).get(list))
        .route("/learners/{learner_id}/skills", get(skills))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateLearnerRequest {
    name: String,
}

async fn create_or_get(
    State(state): State<AppState>,
    Json(req): Json<CreateLearnerRequest>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let learner = state.store().create_or_get_learner(&req.name)?;
    Ok(created(learner))
}

async fn list(
    State(state): State<AppState>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let learners: Vec<Learner> = state.store().list_learners()?;
    Ok(ok(learners))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SkillRow {
    concept_id: String,
    rating: f64,
    uncertainty: f64,
    mastery: f64,
    total_attempts: u32,
    correct_attempts: u32,
}

async fn skills(
    State(state): State<AppState>,
    Path(learner_id): Path<String>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    state.store().get_learner(&learner_id)?;
    let mut rows: Vec<SkillRow> = state
        .store()
        .skills_for_learner(&learner_id)?
        .into_iter()
        .map(|(concept_id, s)| SkillRow {
            concept_id,
            rating: s.rating,
            uncertainty: s.uncertainty,
            mastery: s.mastery,
            total_attempts: s.total_attempts,
            correct_attempts: s.correct_attempts,
        })
        .collect();
    rows.sort_by(|a, b| a.concept_id.cmp(&b.concept_id));
    Ok(ok(rows))
}
