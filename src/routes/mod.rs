pub mod curriculum;
pub mod health;
pub mod learners;
pub mod session;

use axum::Router;

use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .merge(learners::router())
        .merge(curriculum::router())
        .merge(session::router());

    Router::new()
        .merge(health::router())
        .nest("/api", api)
        .with_state(state)
}
