use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use serde::Serialize;

use crate::response::ok;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    llm_mock: bool,
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    ok(HealthResponse {
        status: "ok",
        uptime_secs: state.uptime_secs(),
        llm_mock: state.llm().is_mock(),
    })
}
