//! Playlist and playlist-link models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::track::Track;
use super::Provider;

/// A playlist, either provider-sourced or local.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Playlist {
    pub id: String,
    pub provider: Provider,
    pub provider_playlist_id: Option<String>,
    pub name: String,
    pub owner: Option<String>,
    /// Opaque provider change token; unchanged snapshot means unchanged
    /// content.
    pub snapshot: Option<String>,
    pub source_account_id: Option<String>,
    pub selected: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Link record between a playlist and a track. Deleting a link never
/// cascades to the track.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PlaylistTrack {
    pub playlist_id: String,
    pub track_id: String,
    pub position: Option<i64>,
    pub added_at: Option<DateTime<Utc>>,
}

/// One playlist entry with its full track.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct PlaylistEntry {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub track: Track,
    pub position: Option<i64>,
    pub added_at: Option<DateTime<Utc>>,
}

/// Compact membership record used by enriched-track DTOs.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct PlaylistMembership {
    pub playlist_id: String,
    pub playlist_name: String,
    pub position: Option<i64>,
}

/// Acquisition progress per playlist.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct PlaylistStats {
    pub playlist_id: String,
    pub name: String,
    pub total_tracks: i64,
    pub downloaded: i64,
    pub with_chosen_candidate: i64,
    pub not_found: i64,
}

/// Batched membership lookup request.
#[derive(Debug, Clone, Deserialize)]
pub struct MembershipRequest {
    pub track_ids: Vec<String>,
}

/// Membership lookup response entry.
#[derive(Debug, Clone, Serialize)]
pub struct TrackMemberships {
    pub track_id: String,
    pub playlists: Vec<PlaylistMembership>,
}
