use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use crate::response::{created, ok, AppError};
use crate::state::AppState;
use crate::store::operations::curriculum::{Concept, NewConcept};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/topics", post(create_topic).get(list_topics))
        .route("/topics/{topic_id}/concepts", get(list_concepts))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateTopicRequest {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    concepts: Vec<ConceptPayload>,
}

/// Prerequisites reference earlier entries in the same payload by index,
/// so a whole topic can be seeded in one request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConceptPayload {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    prerequisite_indices: Vec<usize>,
    #[serde(default)]
    mastery_threshold: Option<f64>,
    #[serde(default)]
    visual_required: bool,
}

async fn create_topic(
    State(state): State<AppState>,
    Json(req): Json<CreateTopicRequest>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let topic = state.store().create_topic(&req.name, &req.description)?;

    let default_threshold = state.config().adaptive.mastery_threshold;
    let mut created_ids: Vec<String> = Vec::with_capacity(req.concepts.len());
    for (order, payload) in req.concepts.iter().enumerate() {
        let prerequisites: Vec<String> = payload
            .prerequisite_indices
            .iter()
            .filter_map(|i| created_ids.get(*i).cloned())
            .collect();
        let concept = state.store().create_concept(
            &topic.id,
            &NewConcept {
                name: payload.name.clone(),
                description: payload.description.clone(),
                order_index: order as u32,
                prerequisites,
                mastery_threshold: payload.mastery_threshold,
                visual_required: payload.visual_required,
            },
            default_threshold,
        )?;
        created_ids.push(concept.id);
    }

    Ok(created(topic))
}

async fn list_topics(
    State(state): State<AppState>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    Ok(ok(state.store().list_topics()?))
}

async fn list_concepts(
    State(state): State<AppState>,
    Path(topic_id): Path<String>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let concepts: Vec<Concept> = state.store().list_concepts_by_topic(&topic_id)?;
    Ok(ok(concepts))
}
