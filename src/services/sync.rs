//! Playlist sync ingestor
//!
//! Pulls playlists and tracks from the connected provider account and
//! reconciles them into the catalog. Sync is incremental and idempotent:
//! the provider's opaque `snapshot` token gates work per playlist, track
//! upserts de-duplicate by ISRC then the normalized pair, and link
//! reconciliation reports additions/removals. A 401 from the provider is
//! retried exactly once after a forced token refresh.

use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::models::{
    CreateTrackRequest, DiscoveredPlaylist, PlaylistSyncSummary, Provider, SyncReport,
};
use crate::services::spotify::{MusicCatalogProvider, ProviderTrack, TokenBroker};
use crate::services::CatalogService;

pub struct SyncIngestor {
    catalog: CatalogService,
    provider: Arc<dyn MusicCatalogProvider>,
    tokens: Arc<TokenBroker>,
}

impl SyncIngestor {
    pub fn new(
        catalog: CatalogService,
        provider: Arc<dyn MusicCatalogProvider>,
        tokens: Arc<TokenBroker>,
    ) -> Self {
        Self {
            catalog,
            provider,
            tokens,
        }
    }

    /// List the account's provider playlists; `persist` upserts them into
    /// the catalog so they can be selected.
    pub async fn discover(
        &self,
        account_id: &str,
        persist: bool,
    ) -> Result<Vec<DiscoveredPlaylist>> {
        let playlists = self
            .with_token_retry(account_id, |token| {
                let provider = self.provider.clone();
                async move { provider.playlists(&token).await }
            })
            .await?;

        let mut out = Vec::with_capacity(playlists.len());
        for discovered in playlists {
            let persisted = if persist {
                Some(
                    self.catalog
                        .upsert_playlist(
                            Provider::Spotify,
                            &discovered.provider_playlist_id,
                            &discovered.name,
                            discovered.owner.as_deref(),
                            Some(account_id),
                        )
                        .await?,
                )
            } else {
                sqlx::query_as::<sqlx::Sqlite, crate::models::Playlist>(
                    "SELECT * FROM playlists WHERE provider = ? AND provider_playlist_id = ?",
                )
                .bind(Provider::Spotify)
                .bind(&discovered.provider_playlist_id)
                .fetch_optional(self.catalog.pool())
                .await?
            };
            out.push(DiscoveredPlaylist {
                provider_playlist_id: discovered.provider_playlist_id,
                name: discovered.name,
                owner: discovered.owner,
                snapshot: discovered.snapshot,
                track_count: discovered.track_count,
                playlist_id: persisted.as_ref().map(|p| p.id.clone()),
                selected: persisted.map(|p| p.selected).unwrap_or(false),
            });
        }
        Ok(out)
    }

    /// Sync every selected playlist of the account.
    pub async fn sync_account(&self, account_id: &str, force: bool) -> Result<SyncReport> {
        let playlists = self
            .catalog
            .list_selected_playlists(Some(account_id))
            .await?;
        let mut report = SyncReport::default();
        if playlists.is_empty() {
            return Ok(report);
        }

        // One provider listing serves every playlist's snapshot check.
        let remote = self
            .with_token_retry(account_id, |token| {
                let provider = self.provider.clone();
                async move { provider.playlists(&token).await }
            })
            .await?;

        for playlist in playlists {
            let Some(provider_playlist_id) = playlist.provider_playlist_id.clone() else {
                continue;
            };

            let remote_snapshot = remote
                .iter()
                .find(|p| p.provider_playlist_id == provider_playlist_id)
                .and_then(|p| p.snapshot.clone());

            let unchanged = !force
                && remote_snapshot.is_some()
                && playlist.snapshot == remote_snapshot;
            if unchanged {
                report.push(PlaylistSyncSummary {
                    playlist_id: playlist.id.clone(),
                    name: playlist.name.clone(),
                    skipped: true,
                    ..Default::default()
                });
                continue;
            }

            let summary = self
                .sync_playlist(account_id, &playlist.id, &provider_playlist_id, remote_snapshot)
                .await?;
            report.push(summary);
        }
        Ok(report)
    }

    /// Fetch one playlist's tracks and reconcile catalog state.
    async fn sync_playlist(
        &self,
        account_id: &str,
        playlist_id: &str,
        provider_playlist_id: &str,
        remote_snapshot: Option<String>,
    ) -> Result<PlaylistSyncSummary> {
        let playlist = self.catalog.get_playlist(playlist_id).await?;
        let mut summary = PlaylistSyncSummary {
            playlist_id: playlist_id.to_string(),
            name: playlist.name.clone(),
            ..Default::default()
        };

        let provider_playlist_id = provider_playlist_id.to_string();
        let tracks = self
            .with_token_retry(account_id, |token| {
                let provider = self.provider.clone();
                let playlist = provider_playlist_id.clone();
                async move { provider.playlist_tracks(&token, &playlist).await }
            })
            .await?;

        let mut current_track_ids = Vec::with_capacity(tracks.len());
        for item in &tracks {
            let (track, created, updated) = self.upsert_provider_track(item).await?;
            if created {
                summary.tracks_created += 1;
            } else if updated {
                summary.tracks_updated += 1;
            }

            let link_created = self
                .catalog
                .upsert_playlist_link(playlist_id, &track.id, Some(item.position), item.added_at)
                .await?;
            if link_created {
                summary.links_created += 1;
            }
            current_track_ids.push(track.id);
        }

        summary.links_removed = self
            .catalog
            .remove_playlist_links_not_in(playlist_id, &current_track_ids)
            .await?;

        // Only advance the snapshot once the playlist fully reconciled.
        if let Some(snapshot) = remote_snapshot {
            self.catalog
                .set_playlist_snapshot(playlist_id, &snapshot)
                .await?;
        }
        Ok(summary)
    }

    async fn upsert_provider_track(
        &self,
        item: &ProviderTrack,
    ) -> Result<(crate::models::Track, bool, bool)> {
        // A known provider identity wins over any fuzzy matching.
        if let Some(track) = self
            .catalog
            .find_track_by_identity(Provider::Spotify, &item.provider_track_id)
            .await?
        {
            return Ok((track, false, false));
        }

        let request = CreateTrackRequest {
            artists: item.artists.clone(),
            title: item.title.clone(),
            duration_ms: item.duration_ms,
            isrc: item.isrc.clone(),
            album: item.album.clone(),
            cover_url: item.cover_url.clone(),
            genre: None,
            bpm: None,
            release_date: item.release_date.clone(),
            spotify_added_at: item.added_at,
            explicit: item.explicit,
        };
        let (track, created, updated) = self.catalog.upsert_track(&request).await?;
        self.catalog
            .ensure_identity(
                &track.id,
                Provider::Spotify,
                &item.provider_track_id,
                Some(&format!(
                    "https://open.spotify.com/track/{}",
                    item.provider_track_id
                )),
            )
            .await?;
        Ok((track, created, updated))
    }

    /// Run a provider call, refreshing the token and retrying exactly once
    /// when the provider says the token expired.
    async fn with_token_retry<T, F, Fut>(&self, account_id: &str, call: F) -> Result<T>
    where
        F: Fn(String) -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let token = self.tokens.access_token(account_id).await?;
        match call(token).await {
            Err(AppError::AuthExpired) => {
                tracing::info!(account_id, "access token rejected, refreshing once");
                let token = self.tokens.force_refresh(account_id).await?;
                call(token).await
            }
            other => other,
        }
    }
}
