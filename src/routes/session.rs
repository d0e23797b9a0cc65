use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::response::{created, ok, AppError};
use crate::state::AppState;
use crate::store::operations::sessions::{CurrentItem, Session};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/sessions", post(start))
        .route("/sessions/{session_id}/answers", post(submit))
        .route("/sessions/{session_id}/next", post(next))
        .route("/sessions/{session_id}/precache", post(precache))
        .route("/sessions/{session_id}/end", post(end))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartSessionRequest {
    learner_id: String,
    topic_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StartSessionResponse {
    session_id: String,
    item: Option<CurrentItem>,
}

async fn start(
    State(state): State<AppState>,
    Json(req): Json<StartSessionRequest>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let (session, item) = state.tutor().start(&req.learner_id, &req.topic_id).await?;
    Ok(created(StartSessionResponse {
        session_id: session.id,
        item,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitRequest {
    answer: String,
    #[serde(default)]
    response_time_s: Option<f64>,
}

async fn submit(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(req): Json<SubmitRequest>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let result = state
        .tutor()
        .submit(&session_id, &req.answer, req.response_time_s)
        .await?;
    Ok(ok(result))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct NextResponse {
    item: Option<CurrentItem>,
}

async fn next(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let item = state.tutor().next(&session_id).await?;
    Ok(ok(NextResponse { item }))
}

async fn precache(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.tutor().precache_trigger(&session_id)?;
    Ok(StatusCode::ACCEPTED)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EndResponse {
    session: Session,
}

async fn end(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let session = state.tutor().end(&session_id).await?;
    Ok(ok(EndResponse { session }))
}
