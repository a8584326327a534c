mod revise;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::service::RevisionService;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<RevisionService>,
}

pub fn create_router(service: Arc<RevisionService>) -> Router {
    let state = AppState { service };

    Router::new()
        .route("/revise", post(revise::revise_question))
        .route("/revise-questions", post(revise::revise_questions))
        .route("/health", get(revise::health))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
