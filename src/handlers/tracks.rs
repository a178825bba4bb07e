//! Track endpoints

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::{
    CreateCandidateRequest, CreateTrackRequest, Provider, Track, TrackIdentity,
    TrackWithPlaylists, UpdateTrackRequest,
};
use crate::normalize::{normalize, Normalized};
use crate::ranking::{rank, RankQuery, ScoredCandidate};
use crate::services::extractor::SearchOptions;
use crate::AppState;

pub async fn list_tracks_handler(State(state): State<AppState>) -> Result<Json<Vec<Track>>> {
    Ok(Json(state.catalog.list_tracks().await?))
}

pub async fn create_track_handler(
    State(state): State<AppState>,
    Json(request): Json<CreateTrackRequest>,
) -> Result<(StatusCode, Json<Track>)> {
    if request.artists.trim().is_empty() || request.title.trim().is_empty() {
        return Err(AppError::validation("artists and title are required"));
    }
    let track = state.catalog.create_track(&request).await?;
    Ok((StatusCode::CREATED, Json(track)))
}

pub async fn get_track_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Track>> {
    Ok(Json(state.catalog.get_track(&id).await?))
}

pub async fn update_track_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<UpdateTrackRequest>,
) -> Result<Json<Track>> {
    Ok(Json(state.catalog.update_track(&id, &request).await?))
}

pub async fn delete_track_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    state.catalog.delete_track(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct NormalizePreviewParams {
    #[serde(default)]
    pub artists: String,
    #[serde(default)]
    pub title: String,
}

pub async fn normalize_preview_handler(
    Query(params): Query<NormalizePreviewParams>,
) -> Result<Json<Normalized>> {
    Ok(Json(normalize(&params.artists, &params.title)))
}

pub async fn identities_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<TrackIdentity>>> {
    state.catalog.get_track(&id).await?;
    Ok(Json(state.catalog.identities_for_track(&id).await?))
}

pub async fn with_playlist_info_handler(
    State(state): State<AppState>,
) -> Result<Json<Vec<TrackWithPlaylists>>> {
    Ok(Json(state.catalog.tracks_with_playlist_info().await?))
}

pub async fn ready_for_download_handler(
    State(state): State<AppState>,
) -> Result<Json<Vec<Track>>> {
    Ok(Json(state.catalog.tracks_ready_for_download().await?))
}

#[derive(Debug, Deserialize)]
pub struct YoutubeSearchParams {
    #[serde(default)]
    pub prefer_extended: bool,
    #[serde(default)]
    pub persist: bool,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct YoutubeSearchResponse {
    pub results: Vec<ScoredCandidate>,
    pub persisted: usize,
}

/// Search the extractor, rank, optionally persist the top results as
/// candidates and back-fill a missing cover from the best thumbnail.
pub async fn youtube_search_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<YoutubeSearchParams>,
) -> Result<Json<YoutubeSearchResponse>> {
    let track = state.catalog.get_track(&id).await?;

    let query = RankQuery {
        artists: track.artists.clone(),
        title: track.title.clone(),
        duration_ms: track.duration_ms,
    };
    let mut options = SearchOptions::from_settings(&state.config.extractor);
    if let Some(limit) = params.limit {
        options.limit = limit.clamp(1, 50);
    }
    if params.prefer_extended {
        options.query_suffix = Some("extended".to_string());
    }

    let raw = state.extractor.search(&query, &options).await?;
    let ranked = rank(&query, &raw, &state.ranking);

    let mut persisted = 0;
    if params.persist {
        for scored in &ranked {
            let request = CreateCandidateRequest {
                track_id: track.id.clone(),
                provider: Provider::Youtube,
                external_id: scored.candidate.id.clone(),
                url: format!("https://www.youtube.com/watch?v={}", scored.candidate.id),
                title: scored.candidate.title.clone(),
                channel: scored.candidate.channel.clone(),
                duration_sec: scored.candidate.duration_sec,
                score: scored.score,
                score_breakdown: serde_json::to_string(&scored.details).ok(),
            };
            state.catalog.upsert_candidate(&request).await?;
            persisted += 1;
        }
        if track.cover_url.is_none() {
            if let Some(best) = ranked.first() {
                let thumbnail =
                    format!("https://i.ytimg.com/vi/{}/hqdefault.jpg", best.candidate.id);
                state.catalog.set_cover_url(&track.id, &thumbnail).await?;
            }
        }
    }

    Ok(Json(YoutubeSearchResponse {
        results: ranked,
        persisted,
    }))
}

/// Refresh the track cover: the Spotify album art wins when the track has a
/// Spotify identity and a connected account; the chosen candidate's
/// thumbnail is the fallback.
pub async fn cover_refresh_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Track>> {
    let track = state.catalog.get_track(&id).await?;

    let spotify_identity = state
        .catalog
        .identities_for_track(&id)
        .await?
        .into_iter()
        .find(|identity| identity.provider == Provider::Spotify);

    if let (Some(identity), Some(client)) = (&spotify_identity, &state.spotify) {
        let accounts = state
            .catalog
            .list_accounts(Some(Provider::Spotify))
            .await?;
        if let Some(account) = accounts.first() {
            match state.tokens.access_token(&account.id).await {
                Ok(token) => {
                    if let Some(cover) = client
                        .track_cover_url(&token, &identity.provider_track_id)
                        .await?
                    {
                        state.catalog.set_cover_url(&id, &cover).await?;
                        return Ok(Json(state.catalog.get_track(&id).await?));
                    }
                }
                Err(err) => {
                    tracing::warn!(track_id = %id, error = %err, "spotify cover lookup unavailable");
                }
            }
        }
    }

    if let Some(chosen) = state.catalog.chosen_candidate_for_track(&id).await? {
        let thumbnail = format!("https://i.ytimg.com/vi/{}/hqdefault.jpg", chosen.external_id);
        state.catalog.set_cover_url(&id, &thumbnail).await?;
        return Ok(Json(state.catalog.get_track(&id).await?));
    }

    Ok(Json(track))
}

#[derive(Debug, Serialize)]
pub struct ImportReport {
    pub created: usize,
    pub skipped: usize,
}

/// JSON import: an array of track payloads, de-duplicated by the
/// normalized pair (and ISRC when present).
pub async fn import_tracks_handler(
    State(state): State<AppState>,
    Json(requests): Json<Vec<CreateTrackRequest>>,
) -> Result<Json<ImportReport>> {
    let mut report = ImportReport {
        created: 0,
        skipped: 0,
    };
    for request in &requests {
        if request.artists.trim().is_empty() || request.title.trim().is_empty() {
            report.skipped += 1;
            continue;
        }
        let (_, created, _) = state.catalog.upsert_track(request).await?;
        if created {
            report.created += 1;
        } else {
            report.skipped += 1;
        }
    }
    Ok(Json(report))
}

/// JSON export of the import-supported subset.
pub async fn export_tracks_handler(
    State(state): State<AppState>,
) -> Result<Json<Vec<CreateTrackRequest>>> {
    let tracks = state.catalog.list_tracks().await?;
    Ok(Json(tracks.iter().map(CreateTrackRequest::from).collect()))
}
