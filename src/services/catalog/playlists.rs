//! Playlist and playlist-link repository

use chrono::{DateTime, Utc};
use sqlx::Sqlite;

use super::{new_id, CatalogService};
use crate::error::{AppError, Result};
use crate::models::{
    Playlist, PlaylistEntry, PlaylistMembership, PlaylistStats, PlaylistTrack, Provider,
    TrackMemberships,
};

impl CatalogService {
    pub async fn get_playlist(&self, id: &str) -> Result<Playlist> {
        sqlx::query_as::<Sqlite, Playlist>("SELECT * FROM playlists WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| AppError::not_found("Playlist"))
    }

    pub async fn list_playlists(&self) -> Result<Vec<Playlist>> {
        Ok(
            sqlx::query_as::<Sqlite, Playlist>("SELECT * FROM playlists ORDER BY name")
                .fetch_all(self.pool())
                .await?,
        )
    }

    pub async fn list_selected_playlists(&self, account_id: Option<&str>) -> Result<Vec<Playlist>> {
        let rows = match account_id {
            Some(account_id) => {
                sqlx::query_as::<Sqlite, Playlist>(
                    "SELECT * FROM playlists WHERE selected = 1 AND source_account_id = ? ORDER BY name",
                )
                .bind(account_id)
                .fetch_all(self.pool())
                .await?
            }
            None => {
                sqlx::query_as::<Sqlite, Playlist>(
                    "SELECT * FROM playlists WHERE selected = 1 ORDER BY name",
                )
                .fetch_all(self.pool())
                .await?
            }
        };
        Ok(rows)
    }

    /// Upsert a provider-sourced playlist on `(provider,
    /// provider_playlist_id)`; the snapshot is deliberately not written
    /// here, it only advances once a sync completed (see
    /// [`CatalogService::set_playlist_snapshot`]).
    pub async fn upsert_playlist(
        &self,
        provider: Provider,
        provider_playlist_id: &str,
        name: &str,
        owner: Option<&str>,
        source_account_id: Option<&str>,
    ) -> Result<Playlist> {
        let now = Utc::now();
        sqlx::query(
            r#"INSERT INTO playlists
               (id, provider, provider_playlist_id, name, owner, snapshot, source_account_id,
                selected, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, NULL, ?, 0, ?, ?)
               ON CONFLICT (provider, provider_playlist_id) DO UPDATE SET
                 name = excluded.name,
                 owner = excluded.owner,
                 source_account_id = excluded.source_account_id,
                 updated_at = excluded.updated_at"#,
        )
        .bind(new_id())
        .bind(provider)
        .bind(provider_playlist_id)
        .bind(name)
        .bind(owner)
        .bind(source_account_id)
        .bind(now)
        .bind(now)
        .execute(self.pool())
        .await?;

        sqlx::query_as::<Sqlite, Playlist>(
            "SELECT * FROM playlists WHERE provider = ? AND provider_playlist_id = ?",
        )
        .bind(provider)
        .bind(provider_playlist_id)
        .fetch_optional(self.pool())
        .await?
        .ok_or_else(|| AppError::not_found("Playlist"))
    }

    pub async fn set_playlist_snapshot(&self, id: &str, snapshot: &str) -> Result<()> {
        sqlx::query("UPDATE playlists SET snapshot = ?, updated_at = ? WHERE id = ?")
            .bind(snapshot)
            .bind(Utc::now())
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Selection is a set operation: exactly the given playlists become
    /// selected for the account, all others are cleared.
    pub async fn select_playlists(&self, account_id: &str, playlist_ids: &[String]) -> Result<()> {
        let mut tx = self.pool().begin().await?;
        sqlx::query("UPDATE playlists SET selected = 0 WHERE source_account_id = ?")
            .bind(account_id)
            .execute(&mut *tx)
            .await?;
        for playlist_id in playlist_ids {
            sqlx::query("UPDATE playlists SET selected = 1 WHERE id = ? AND source_account_id = ?")
                .bind(playlist_id)
                .bind(account_id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn playlist_entries(&self, playlist_id: &str) -> Result<Vec<PlaylistEntry>> {
        self.get_playlist(playlist_id).await?;
        Ok(sqlx::query_as::<Sqlite, PlaylistEntry>(
            r#"SELECT t.*, pt.position, pt.added_at
               FROM playlist_tracks pt
               JOIN tracks t ON t.id = pt.track_id
               WHERE pt.playlist_id = ?
               ORDER BY pt.position, t.created_at"#,
        )
        .bind(playlist_id)
        .fetch_all(self.pool())
        .await?)
    }

    pub async fn playlist_links(&self, playlist_id: &str) -> Result<Vec<PlaylistTrack>> {
        Ok(sqlx::query_as::<Sqlite, PlaylistTrack>(
            "SELECT * FROM playlist_tracks WHERE playlist_id = ? ORDER BY position",
        )
        .bind(playlist_id)
        .fetch_all(self.pool())
        .await?)
    }

    /// Create or update one link; returns true when a row was created.
    pub async fn upsert_playlist_link(
        &self,
        playlist_id: &str,
        track_id: &str,
        position: Option<i64>,
        added_at: Option<DateTime<Utc>>,
    ) -> Result<bool> {
        let existing: Option<PlaylistTrack> = sqlx::query_as::<Sqlite, PlaylistTrack>(
            "SELECT * FROM playlist_tracks WHERE playlist_id = ? AND track_id = ?",
        )
        .bind(playlist_id)
        .bind(track_id)
        .fetch_optional(self.pool())
        .await?;

        match existing {
            None => {
                sqlx::query(
                    r#"INSERT INTO playlist_tracks (playlist_id, track_id, position, added_at)
                       VALUES (?, ?, ?, ?)"#,
                )
                .bind(playlist_id)
                .bind(track_id)
                .bind(position)
                .bind(added_at)
                .execute(self.pool())
                .await?;
                Ok(true)
            }
            Some(_) => {
                sqlx::query(
                    r#"UPDATE playlist_tracks SET position = ?, added_at = ?
                       WHERE playlist_id = ? AND track_id = ?"#,
                )
                .bind(position)
                .bind(added_at)
                .bind(playlist_id)
                .bind(track_id)
                .execute(self.pool())
                .await?;
                Ok(false)
            }
        }
    }

    /// Remove links not present in the provider's current track set.
    /// Remove-only: the tracks themselves stay.
    pub async fn remove_playlist_links_not_in(
        &self,
        playlist_id: &str,
        keep_track_ids: &[String],
    ) -> Result<usize> {
        let links = self.playlist_links(playlist_id).await?;
        let mut removed = 0;
        for link in links {
            if !keep_track_ids.contains(&link.track_id) {
                sqlx::query("DELETE FROM playlist_tracks WHERE playlist_id = ? AND track_id = ?")
                    .bind(playlist_id)
                    .bind(&link.track_id)
                    .execute(self.pool())
                    .await?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    pub async fn playlist_stats(&self, selected_only: bool) -> Result<Vec<PlaylistStats>> {
        let filter = if selected_only { "WHERE p.selected = 1" } else { "" };
        Ok(sqlx::query_as::<Sqlite, PlaylistStats>(&format!(
            r#"SELECT p.id AS playlist_id, p.name,
                 COUNT(pt.track_id) AS total_tracks,
                 COALESCE(SUM(EXISTS (SELECT 1 FROM library_files f
                                      WHERE f.track_id = pt.track_id)), 0) AS downloaded,
                 COALESCE(SUM(EXISTS (SELECT 1 FROM search_candidates c
                                      WHERE c.track_id = pt.track_id AND c.chosen = 1)), 0)
                   AS with_chosen_candidate,
                 COALESCE(SUM(COALESCE((SELECT t.search_status FROM tracks t
                                        WHERE t.id = pt.track_id) = 'searched_not_found', 0)), 0)
                   AS not_found
               FROM playlists p
               LEFT JOIN playlist_tracks pt ON pt.playlist_id = p.id
               {filter}
               GROUP BY p.id
               ORDER BY p.name"#
        ))
        .fetch_all(self.pool())
        .await?)
    }

    /// Batched membership lookup for a set of tracks.
    pub async fn track_memberships(&self, track_ids: &[String]) -> Result<Vec<TrackMemberships>> {
        let mut out = Vec::with_capacity(track_ids.len());
        for track_id in track_ids {
            let playlists = sqlx::query_as::<Sqlite, PlaylistMembership>(
                r#"SELECT pt.playlist_id, p.name AS playlist_name, pt.position
                   FROM playlist_tracks pt
                   JOIN playlists p ON p.id = pt.playlist_id
                   WHERE pt.track_id = ?
                   ORDER BY p.name"#,
            )
            .bind(track_id)
            .fetch_all(self.pool())
            .await?;
            out.push(TrackMemberships {
                track_id: track_id.clone(),
                playlists,
            });
        }
        Ok(out)
    }

    /// Newest `added_at` across the track's playlist links; feeds the file
    /// timestamp fallback chain.
    pub async fn latest_added_at(&self, track_id: &str) -> Result<Option<DateTime<Utc>>> {
        Ok(sqlx::query_scalar(
            "SELECT MAX(added_at) FROM playlist_tracks WHERE track_id = ? AND added_at IS NOT NULL",
        )
        .bind(track_id)
        .fetch_one(self.pool())
        .await?)
    }
}
