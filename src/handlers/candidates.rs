//! Candidate endpoints

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde::Deserialize;

use crate::error::Result;
use crate::models::{CreateCandidateRequest, EnrichedCandidate, SearchCandidate};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CandidateListParams {
    pub track_id: Option<String>,
}

pub async fn list_candidates_handler(
    State(state): State<AppState>,
    Query(params): Query<CandidateListParams>,
) -> Result<Json<Vec<SearchCandidate>>> {
    Ok(Json(
        state
            .catalog
            .list_candidates(params.track_id.as_deref())
            .await?,
    ))
}

pub async fn list_enriched_candidates_handler(
    State(state): State<AppState>,
) -> Result<Json<Vec<EnrichedCandidate>>> {
    Ok(Json(state.catalog.list_candidates_enriched().await?))
}

pub async fn create_candidate_handler(
    State(state): State<AppState>,
    Json(request): Json<CreateCandidateRequest>,
) -> Result<(StatusCode, Json<SearchCandidate>)> {
    let candidate = state.catalog.upsert_candidate(&request).await?;
    Ok((StatusCode::CREATED, Json(candidate)))
}

pub async fn get_candidate_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SearchCandidate>> {
    Ok(Json(state.catalog.get_candidate(&id).await?))
}

pub async fn delete_candidate_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    state.catalog.delete_candidate(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Atomic choose: the target becomes the track's unique chosen candidate.
pub async fn choose_candidate_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SearchCandidate>> {
    Ok(Json(state.catalog.choose_candidate(&id).await?))
}
