//! Track repository

use chrono::Utc;
use sqlx::Sqlite;

use super::{new_id, CatalogService};
use crate::error::{AppError, Result};
use crate::models::{
    CreateTrackRequest, PlaylistMembership, Provider, Track, TrackIdentity, TrackWithPlaylists,
    UpdateTrackRequest,
};
use crate::normalize::normalize;

impl CatalogService {
    /// Create a track from a manual entry. The `(normalized_artists,
    /// normalized_title)` pair is the de-duplication key; a duplicate is a
    /// conflict. The manual identity is created in the same transaction.
    pub async fn create_track(&self, request: &CreateTrackRequest) -> Result<Track> {
        let normalized = normalize(&request.artists, &request.title);
        if self
            .find_track_by_normalized(&normalized.clean_artists, &normalized.clean_title)
            .await?
            .is_some()
        {
            return Err(AppError::conflict(format!(
                "track already exists: {} - {}",
                request.artists, request.title
            )));
        }
        self.insert_track(request).await
    }

    /// Insert without the duplicate check. Callers are expected to have
    /// resolved de-duplication already (sync, import).
    pub async fn insert_track(&self, request: &CreateTrackRequest) -> Result<Track> {
        let normalized = normalize(&request.artists, &request.title);
        let id = new_id();
        let now = Utc::now();

        let mut tx = self.pool().begin().await?;
        sqlx::query(
            r#"INSERT INTO tracks
               (id, artists, title, normalized_artists, normalized_title, duration_ms, isrc,
                album, cover_url, genre, bpm, release_date, spotify_added_at, explicit,
                search_status, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, NULL, ?, ?)"#,
        )
        .bind(&id)
        .bind(&request.artists)
        .bind(&request.title)
        .bind(&normalized.clean_artists)
        .bind(&normalized.clean_title)
        .bind(request.duration_ms)
        .bind(&request.isrc)
        .bind(&request.album)
        .bind(&request.cover_url)
        .bind(&request.genre)
        .bind(request.bpm)
        .bind(&request.release_date)
        .bind(request.spotify_added_at)
        .bind(request.explicit)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        // Every track gets its manual identity up front.
        sqlx::query(
            r#"INSERT INTO track_identities
               (id, track_id, provider, provider_track_id, provider_url, fingerprint, created_at)
               VALUES (?, ?, ?, ?, NULL, NULL, ?)"#,
        )
        .bind(new_id())
        .bind(&id)
        .bind(Provider::Manual)
        .bind(format!("manual:{id}"))
        .bind(now)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        self.get_track(&id).await
    }

    pub async fn get_track(&self, id: &str) -> Result<Track> {
        sqlx::query_as::<Sqlite, Track>("SELECT * FROM tracks WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| AppError::not_found("Track"))
    }

    pub async fn list_tracks(&self) -> Result<Vec<Track>> {
        Ok(
            sqlx::query_as::<Sqlite, Track>("SELECT * FROM tracks ORDER BY created_at DESC")
                .fetch_all(self.pool())
                .await?,
        )
    }

    pub async fn find_track_by_normalized(
        &self,
        normalized_artists: &str,
        normalized_title: &str,
    ) -> Result<Option<Track>> {
        Ok(sqlx::query_as::<Sqlite, Track>(
            "SELECT * FROM tracks WHERE normalized_artists = ? AND normalized_title = ?",
        )
        .bind(normalized_artists)
        .bind(normalized_title)
        .fetch_optional(self.pool())
        .await?)
    }

    pub async fn find_track_by_isrc(&self, isrc: &str) -> Result<Option<Track>> {
        Ok(
            sqlx::query_as::<Sqlite, Track>("SELECT * FROM tracks WHERE isrc = ?")
                .bind(isrc)
                .fetch_optional(self.pool())
                .await?,
        )
    }

    /// Apply a partial update. Artists/title changes re-derive the
    /// normalized pair.
    pub async fn update_track(&self, id: &str, update: &UpdateTrackRequest) -> Result<Track> {
        let mut track = self.get_track(id).await?;

        if let Some(artists) = &update.artists {
            track.artists = artists.clone();
        }
        if let Some(title) = &update.title {
            track.title = title.clone();
        }
        let normalized = normalize(&track.artists, &track.title);

        if let Some(v) = update.duration_ms {
            track.duration_ms = Some(v);
        }
        if let Some(v) = &update.isrc {
            track.isrc = Some(v.clone());
        }
        if let Some(v) = &update.album {
            track.album = Some(v.clone());
        }
        if let Some(v) = &update.cover_url {
            track.cover_url = Some(v.clone());
        }
        if let Some(v) = &update.genre {
            track.genre = Some(v.clone());
        }
        if let Some(v) = update.bpm {
            track.bpm = Some(v);
        }
        if let Some(v) = &update.release_date {
            track.release_date = Some(v.clone());
        }
        if let Some(v) = update.explicit {
            track.explicit = v;
        }

        sqlx::query(
            r#"UPDATE tracks SET artists = ?, title = ?, normalized_artists = ?,
               normalized_title = ?, duration_ms = ?, isrc = ?, album = ?, cover_url = ?,
               genre = ?, bpm = ?, release_date = ?, explicit = ?, updated_at = ?
               WHERE id = ?"#,
        )
        .bind(&track.artists)
        .bind(&track.title)
        .bind(&normalized.clean_artists)
        .bind(&normalized.clean_title)
        .bind(track.duration_ms)
        .bind(&track.isrc)
        .bind(&track.album)
        .bind(&track.cover_url)
        .bind(&track.genre)
        .bind(track.bpm)
        .bind(&track.release_date)
        .bind(track.explicit)
        .bind(Utc::now())
        .bind(id)
        .execute(self.pool())
        .await?;

        self.get_track(id).await
    }

    /// Delete a track and everything it owns. The cascade is explicit and
    /// runs in one transaction; playlist links are removed but playlists
    /// themselves are untouched.
    pub async fn delete_track(&self, id: &str) -> Result<()> {
        self.get_track(id).await?;
        let mut tx = self.pool().begin().await?;
        for table in [
            "track_identities",
            "search_candidates",
            "downloads",
            "playlist_tracks",
            "library_files",
        ] {
            sqlx::query(&format!("DELETE FROM {table} WHERE track_id = ?"))
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }
        sqlx::query("DELETE FROM tracks WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Insert the provider identity if it is not already present.
    pub async fn ensure_identity(
        &self,
        track_id: &str,
        provider: Provider,
        provider_track_id: &str,
        provider_url: Option<&str>,
    ) -> Result<TrackIdentity> {
        sqlx::query(
            r#"INSERT INTO track_identities
               (id, track_id, provider, provider_track_id, provider_url, fingerprint, created_at)
               VALUES (?, ?, ?, ?, ?, NULL, ?)
               ON CONFLICT (provider, provider_track_id) DO NOTHING"#,
        )
        .bind(new_id())
        .bind(track_id)
        .bind(provider)
        .bind(provider_track_id)
        .bind(provider_url)
        .bind(Utc::now())
        .execute(self.pool())
        .await?;

        sqlx::query_as::<Sqlite, TrackIdentity>(
            "SELECT * FROM track_identities WHERE provider = ? AND provider_track_id = ?",
        )
        .bind(provider)
        .bind(provider_track_id)
        .fetch_optional(self.pool())
        .await?
        .ok_or_else(|| AppError::not_found("TrackIdentity"))
    }

    pub async fn identities_for_track(&self, track_id: &str) -> Result<Vec<TrackIdentity>> {
        Ok(sqlx::query_as::<Sqlite, TrackIdentity>(
            "SELECT * FROM track_identities WHERE track_id = ? ORDER BY created_at",
        )
        .bind(track_id)
        .fetch_all(self.pool())
        .await?)
    }

    pub async fn find_track_by_identity(
        &self,
        provider: Provider,
        provider_track_id: &str,
    ) -> Result<Option<Track>> {
        Ok(sqlx::query_as::<Sqlite, Track>(
            r#"SELECT t.* FROM tracks t
               JOIN track_identities i ON i.track_id = t.id
               WHERE i.provider = ? AND i.provider_track_id = ?"#,
        )
        .bind(provider)
        .bind(provider_track_id)
        .fetch_optional(self.pool())
        .await?)
    }

    pub async fn set_search_status(&self, track_id: &str, status: Option<&str>) -> Result<()> {
        sqlx::query("UPDATE tracks SET search_status = ?, updated_at = ? WHERE id = ?")
            .bind(status)
            .bind(Utc::now())
            .bind(track_id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn set_cover_url(&self, track_id: &str, cover_url: &str) -> Result<()> {
        sqlx::query("UPDATE tracks SET cover_url = ?, updated_at = ? WHERE id = ?")
            .bind(cover_url)
            .bind(Utc::now())
            .bind(track_id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Tracks that have a chosen candidate but no library file yet.
    pub async fn tracks_ready_for_download(&self) -> Result<Vec<Track>> {
        Ok(sqlx::query_as::<Sqlite, Track>(
            r#"SELECT t.* FROM tracks t
               WHERE EXISTS (SELECT 1 FROM search_candidates c
                             WHERE c.track_id = t.id AND c.chosen = 1)
                 AND NOT EXISTS (SELECT 1 FROM library_files f WHERE f.track_id = t.id)
               ORDER BY t.created_at"#,
        )
        .fetch_all(self.pool())
        .await?)
    }

    /// Every track with its playlist memberships and acquisition flags.
    pub async fn tracks_with_playlist_info(&self) -> Result<Vec<TrackWithPlaylists>> {
        let tracks = self.list_tracks().await?;
        let mut enriched = Vec::with_capacity(tracks.len());
        for track in tracks {
            let playlists = sqlx::query_as::<Sqlite, PlaylistMembership>(
                r#"SELECT pt.playlist_id, p.name AS playlist_name, pt.position
                   FROM playlist_tracks pt
                   JOIN playlists p ON p.id = pt.playlist_id
                   WHERE pt.track_id = ?
                   ORDER BY p.name"#,
            )
            .bind(&track.id)
            .fetch_all(self.pool())
            .await?;

            let has_library_file: bool = sqlx::query_scalar(
                "SELECT EXISTS (SELECT 1 FROM library_files WHERE track_id = ?)",
            )
            .bind(&track.id)
            .fetch_one(self.pool())
            .await?;
            let has_chosen_candidate: bool = sqlx::query_scalar(
                "SELECT EXISTS (SELECT 1 FROM search_candidates WHERE track_id = ? AND chosen = 1)",
            )
            .bind(&track.id)
            .fetch_one(self.pool())
            .await?;

            enriched.push(TrackWithPlaylists {
                track,
                playlists,
                has_library_file,
                has_chosen_candidate,
            });
        }
        Ok(enriched)
    }

    /// Sync/import upsert: de-duplicate by ISRC when present, then by the
    /// normalized pair. Returns `(track, created)`; existing tracks get
    /// missing metadata filled in and count as updated only when something
    /// changed.
    pub async fn upsert_track(&self, request: &CreateTrackRequest) -> Result<(Track, bool, bool)> {
        let existing = match &request.isrc {
            Some(isrc) if !isrc.is_empty() => match self.find_track_by_isrc(isrc).await? {
                Some(track) => Some(track),
                None => {
                    let normalized = normalize(&request.artists, &request.title);
                    self.find_track_by_normalized(&normalized.clean_artists, &normalized.clean_title)
                        .await?
                }
            },
            _ => {
                let normalized = normalize(&request.artists, &request.title);
                self.find_track_by_normalized(&normalized.clean_artists, &normalized.clean_title)
                    .await?
            }
        };

        match existing {
            None => {
                let track = self.insert_track(request).await?;
                Ok((track, true, false))
            }
            Some(track) => {
                let mut update = UpdateTrackRequest::default();
                if track.duration_ms.is_none() && request.duration_ms.is_some() {
                    update.duration_ms = request.duration_ms;
                }
                if track.isrc.is_none() && request.isrc.is_some() {
                    update.isrc = request.isrc.clone();
                }
                if track.album.is_none() && request.album.is_some() {
                    update.album = request.album.clone();
                }
                if track.cover_url.is_none() && request.cover_url.is_some() {
                    update.cover_url = request.cover_url.clone();
                }
                if track.release_date.is_none() && request.release_date.is_some() {
                    update.release_date = request.release_date.clone();
                }
                let changed = update.duration_ms.is_some()
                    || update.isrc.is_some()
                    || update.album.is_some()
                    || update.cover_url.is_some()
                    || update.release_date.is_some();
                let track = if changed {
                    self.update_track(&track.id, &update).await?
                } else {
                    track
                };
                Ok((track, false, changed))
            }
        }
    }
}
