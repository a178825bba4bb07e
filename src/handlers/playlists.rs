//! Playlist and sync endpoints

use axum::extract::{Path, Query, State};
use axum::response::Json;
use serde::Deserialize;

use crate::error::{AppError, Result};
use crate::models::{
    AutoDownloadAccepted, DiscoveredPlaylist, MembershipRequest, Playlist, PlaylistEntry,
    PlaylistStats, Provider, SelectPlaylistsRequest, SyncReport, SyncRequest, TrackMemberships,
};
use crate::AppState;

pub async fn list_playlists_handler(
    State(state): State<AppState>,
) -> Result<Json<Vec<Playlist>>> {
    Ok(Json(state.catalog.list_playlists().await?))
}

pub async fn playlist_entries_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<PlaylistEntry>>> {
    Ok(Json(state.catalog.playlist_entries(&id).await?))
}

pub async fn auto_download_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<AutoDownloadAccepted>> {
    Ok(Json(state.scheduler.auto_download(&id).await?))
}

pub async fn retry_not_found_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<AutoDownloadAccepted>> {
    Ok(Json(state.scheduler.retry_not_found(&id).await?))
}

#[derive(Debug, Deserialize)]
pub struct StatsParams {
    #[serde(default)]
    pub selected_only: bool,
}

pub async fn playlist_stats_handler(
    State(state): State<AppState>,
    Query(params): Query<StatsParams>,
) -> Result<Json<Vec<PlaylistStats>>> {
    Ok(Json(state.catalog.playlist_stats(params.selected_only).await?))
}

pub async fn memberships_handler(
    State(state): State<AppState>,
    Json(request): Json<MembershipRequest>,
) -> Result<Json<Vec<TrackMemberships>>> {
    Ok(Json(state.catalog.track_memberships(&request.track_ids).await?))
}

#[derive(Debug, Deserialize)]
pub struct DiscoverParams {
    pub account_id: Option<String>,
    #[serde(default)]
    pub persist: bool,
}

/// Resolve the target account: explicit id, or the single connected
/// Spotify account.
async fn resolve_account_id(state: &AppState, account_id: Option<String>) -> Result<String> {
    if let Some(account_id) = account_id {
        state.catalog.get_account(&account_id).await?;
        return Ok(account_id);
    }
    let accounts = state.catalog.list_accounts(Some(Provider::Spotify)).await?;
    accounts
        .first()
        .map(|a| a.id.clone())
        .ok_or(AppError::NotConnected)
}

pub async fn spotify_discover_handler(
    State(state): State<AppState>,
    Query(params): Query<DiscoverParams>,
) -> Result<Json<Vec<DiscoveredPlaylist>>> {
    let account_id = resolve_account_id(&state, params.account_id).await?;
    Ok(Json(state.sync.discover(&account_id, params.persist).await?))
}

pub async fn spotify_select_handler(
    State(state): State<AppState>,
    Json(request): Json<SelectPlaylistsRequest>,
) -> Result<Json<serde_json::Value>> {
    state.catalog.get_account(&request.account_id).await?;
    state
        .catalog
        .select_playlists(&request.account_id, &request.playlist_ids)
        .await?;
    Ok(Json(serde_json::json!({
        "selected": request.playlist_ids.len()
    })))
}

pub async fn spotify_sync_handler(
    State(state): State<AppState>,
    Json(request): Json<SyncRequest>,
) -> Result<Json<SyncReport>> {
    let account_id = resolve_account_id(&state, request.account_id).await?;
    Ok(Json(state.sync.sync_account(&account_id, request.force).await?))
}
