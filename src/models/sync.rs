//! Sync ingestor DTOs

use serde::{Deserialize, Serialize};

/// A provider playlist as discovered via the provider API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveredPlaylist {
    pub provider_playlist_id: String,
    pub name: String,
    pub owner: Option<String>,
    pub snapshot: Option<String>,
    pub track_count: Option<i64>,
    /// Set when the playlist is already persisted in the catalog.
    pub playlist_id: Option<String>,
    pub selected: bool,
}

/// Selection request: exactly these playlists become selected for the
/// account; everything else is cleared.
#[derive(Debug, Clone, Deserialize)]
pub struct SelectPlaylistsRequest {
    pub account_id: String,
    pub playlist_ids: Vec<String>,
}

/// Sync request parameters.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SyncRequest {
    #[serde(default)]
    pub account_id: Option<String>,
    /// Re-sync even when the snapshot is unchanged.
    #[serde(default)]
    pub force: bool,
}

/// Per-playlist sync outcome.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PlaylistSyncSummary {
    pub playlist_id: String,
    pub name: String,
    pub skipped: bool,
    pub tracks_created: usize,
    pub tracks_updated: usize,
    pub links_created: usize,
    pub links_removed: usize,
}

/// Whole-run sync outcome.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    pub playlists: Vec<PlaylistSyncSummary>,
    pub total_tracks_created: usize,
    pub total_tracks_updated: usize,
    pub total_links_created: usize,
    pub total_links_removed: usize,
    pub playlists_skipped: usize,
}

impl SyncReport {
    pub fn push(&mut self, summary: PlaylistSyncSummary) {
        self.total_tracks_created += summary.tracks_created;
        self.total_tracks_updated += summary.tracks_updated;
        self.total_links_created += summary.links_created;
        self.total_links_removed += summary.links_removed;
        if summary.skipped {
            self.playlists_skipped += 1;
        }
        self.playlists.push(summary);
    }
}
