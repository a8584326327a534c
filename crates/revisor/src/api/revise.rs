use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use serde::Serialize;

use revisor_core::{RevisionError, RevisionRequest, RevisionResponse};

use super::AppState;

#[derive(Debug, Serialize)]
pub struct ReviseResponse {
    pub response: RevisionResponse,
}

#[derive(Debug, Serialize)]
pub struct ReviseBatchResponse {
    pub responses: Vec<RevisionResponse>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub agent: String,
}

pub async fn revise_question(
    State(state): State<AppState>,
    Json(request): Json<RevisionRequest>,
) -> Result<Json<ReviseResponse>, (StatusCode, String)> {
    let result = state
        .service
        .process(&request)
        .await
        .map_err(error_response)?;

    Ok(Json(ReviseResponse {
        response: result.response,
    }))
}

pub async fn revise_questions(
    State(state): State<AppState>,
    Json(requests): Json<Vec<RevisionRequest>>,
) -> Result<Json<ReviseBatchResponse>, (StatusCode, String)> {
    let results = state
        .service
        .process_batch(&requests)
        .await
        .map_err(error_response)?;

    Ok(Json(ReviseBatchResponse {
        responses: results.into_iter().map(|r| r.response).collect(),
    }))
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        agent: state.service.agent().name().to_string(),
    })
}

fn error_response(error: RevisionError) -> (StatusCode, String) {
    (status_for(&error), error.to_string())
}

fn status_for(error: &RevisionError) -> StatusCode {
    match error {
        e if e.is_upstream() => StatusCode::BAD_GATEWAY,
        RevisionError::RequestTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
