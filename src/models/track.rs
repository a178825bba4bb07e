//! Track and track identity models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::playlist::PlaylistMembership;
use super::Provider;

/// A curated reference track. `(normalized_artists, normalized_title)` is
/// the de-duplication key for manual imports.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Track {
    pub id: String,
    pub artists: String,
    pub title: String,
    pub normalized_artists: String,
    pub normalized_title: String,
    pub duration_ms: Option<i64>,
    pub isrc: Option<String>,
    pub album: Option<String>,
    pub cover_url: Option<String>,
    pub genre: Option<String>,
    pub bpm: Option<f64>,
    /// `YYYY-MM-DD` or bare `YYYY` as delivered by the provider.
    pub release_date: Option<String>,
    pub spotify_added_at: Option<DateTime<Utc>>,
    pub explicit: bool,
    /// Bulk-acquisition annotation, e.g. `searched_not_found`.
    pub search_status: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Annotation written when an automatic search found nothing usable.
pub const SEARCH_STATUS_NOT_FOUND: &str = "searched_not_found";

/// A stable reference to this track in an external catalog. Every track has
/// at least the auto-created manual identity.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TrackIdentity {
    pub id: String,
    pub track_id: String,
    pub provider: Provider,
    pub provider_track_id: String,
    pub provider_url: Option<String>,
    pub fingerprint: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Payload for manual creation and JSON import.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTrackRequest {
    pub artists: String,
    pub title: String,
    #[serde(default)]
    pub duration_ms: Option<i64>,
    #[serde(default)]
    pub isrc: Option<String>,
    #[serde(default)]
    pub album: Option<String>,
    #[serde(default)]
    pub cover_url: Option<String>,
    #[serde(default)]
    pub genre: Option<String>,
    #[serde(default)]
    pub bpm: Option<f64>,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub spotify_added_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub explicit: bool,
}

/// Partial update; absent fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateTrackRequest {
    pub artists: Option<String>,
    pub title: Option<String>,
    pub duration_ms: Option<i64>,
    pub isrc: Option<String>,
    pub album: Option<String>,
    pub cover_url: Option<String>,
    pub genre: Option<String>,
    pub bpm: Option<f64>,
    pub release_date: Option<String>,
    pub explicit: Option<bool>,
}

/// Track enriched with playlist membership and acquisition state.
#[derive(Debug, Clone, Serialize)]
pub struct TrackWithPlaylists {
    #[serde(flatten)]
    pub track: Track,
    pub playlists: Vec<PlaylistMembership>,
    pub has_library_file: bool,
    pub has_chosen_candidate: bool,
}

impl From<&Track> for CreateTrackRequest {
    fn from(track: &Track) -> Self {
        Self {
            artists: track.artists.clone(),
            title: track.title.clone(),
            duration_ms: track.duration_ms,
            isrc: track.isrc.clone(),
            album: track.album.clone(),
            cover_url: track.cover_url.clone(),
            genre: track.genre.clone(),
            bpm: track.bpm,
            release_date: track.release_date.clone(),
            spotify_added_at: track.spotify_added_at,
            explicit: track.explicit,
        }
    }
}
