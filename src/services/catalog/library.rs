//! Library file repository and disk reconciliation

use chrono::{DateTime, Utc};
use sqlx::Sqlite;
use std::path::Path;

use super::{new_id, CatalogService};
use crate::error::{AppError, Result};
use crate::models::{LibraryFile, LibraryFileWithTrack, LibraryScanReport};
use crate::normalize::normalize;

/// Extensions treated as audio during scans.
const AUDIO_EXTENSIONS: [&str; 7] = ["mp3", "m4a", "aac", "opus", "ogg", "flac", "webm"];

impl CatalogService {
    pub async fn get_library_file(&self, id: &str) -> Result<LibraryFile> {
        sqlx::query_as::<Sqlite, LibraryFile>("SELECT * FROM library_files WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| AppError::not_found("LibraryFile"))
    }

    pub async fn list_library_files(&self) -> Result<Vec<LibraryFileWithTrack>> {
        Ok(sqlx::query_as::<Sqlite, LibraryFileWithTrack>(
            r#"SELECT f.*, t.artists AS track_artists, t.title AS track_title
               FROM library_files f
               JOIN tracks t ON t.id = f.track_id
               ORDER BY f.created_at DESC"#,
        )
        .fetch_all(self.pool())
        .await?)
    }

    pub async fn library_file_for_track(&self, track_id: &str) -> Result<Option<LibraryFile>> {
        Ok(
            sqlx::query_as::<Sqlite, LibraryFile>(
                "SELECT * FROM library_files WHERE track_id = ?",
            )
            .bind(track_id)
            .fetch_optional(self.pool())
            .await?,
        )
    }

    pub async fn library_file_exists_for_track(&self, track_id: &str) -> Result<bool> {
        Ok(
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM library_files WHERE track_id = ?)")
                .bind(track_id)
                .fetch_one(self.pool())
                .await?,
        )
    }

    /// Upsert keyed by `filepath`; a re-download refreshes the existing row.
    #[allow(clippy::too_many_arguments)]
    pub async fn upsert_library_file(
        &self,
        track_id: &str,
        filepath: &str,
        file_size: Option<i64>,
        file_mtime: Option<DateTime<Utc>>,
        checksum: Option<&str>,
        container: &str,
    ) -> Result<LibraryFile> {
        sqlx::query(
            r#"INSERT INTO library_files
               (id, track_id, filepath, file_size, file_mtime, checksum, container, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT (filepath) DO UPDATE SET
                 track_id = excluded.track_id,
                 file_size = excluded.file_size,
                 file_mtime = excluded.file_mtime,
                 checksum = excluded.checksum,
                 container = excluded.container"#,
        )
        .bind(new_id())
        .bind(track_id)
        .bind(filepath)
        .bind(file_size)
        .bind(file_mtime)
        .bind(checksum)
        .bind(container)
        .bind(Utc::now())
        .execute(self.pool())
        .await?;

        sqlx::query_as::<Sqlite, LibraryFile>("SELECT * FROM library_files WHERE filepath = ?")
            .bind(filepath)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| AppError::not_found("LibraryFile"))
    }

    /// Delete the row; the caller decides what happens to the file itself.
    pub async fn delete_library_file(&self, id: &str) -> Result<LibraryFile> {
        let file = self.get_library_file(id).await?;
        sqlx::query("DELETE FROM library_files WHERE id = ?")
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(file)
    }

    /// Walk the library directory and adopt files named
    /// `"<artists> - <title>.<ext>"` whose track can be resolved through the
    /// normalizer. Known files get their size/mtime refreshed.
    pub async fn scan_library_dir(&self, dir: &Path) -> Result<LibraryScanReport> {
        let mut report = LibraryScanReport::default();
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(_) => return Ok(report),
        };

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
                continue;
            };
            if !AUDIO_EXTENSIONS.contains(&ext.to_lowercase().as_str()) {
                continue;
            }
            report.files_seen += 1;

            let filepath = path.to_string_lossy().to_string();
            let metadata = entry.metadata().await?;
            let size = metadata.len() as i64;
            let mtime: Option<DateTime<Utc>> = metadata.modified().ok().map(DateTime::from);

            let existing = sqlx::query_as::<Sqlite, LibraryFile>(
                "SELECT * FROM library_files WHERE filepath = ?",
            )
            .bind(&filepath)
            .fetch_optional(self.pool())
            .await?;

            if let Some(row) = existing {
                sqlx::query("UPDATE library_files SET file_size = ?, file_mtime = ? WHERE id = ?")
                    .bind(size)
                    .bind(mtime)
                    .bind(&row.id)
                    .execute(self.pool())
                    .await?;
                report.rows_updated += 1;
                continue;
            }

            // "<artists> - <title> (n).ext" -> track lookup via the
            // normalized pair.
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let base = strip_collision_suffix(stem);
            let Some((artists, title)) = base.split_once(" - ") else {
                continue;
            };
            let normalized = normalize(artists, title);
            if let Some(track) = self
                .find_track_by_normalized(&normalized.clean_artists, &normalized.clean_title)
                .await?
            {
                self.upsert_library_file(&track.id, &filepath, Some(size), mtime, None, ext)
                    .await?;
                report.rows_created += 1;
            }
        }
        Ok(report)
    }

    /// For each track without a library row, probe the expected filename on
    /// disk and adopt it when present.
    pub async fn reindex_from_tracks(&self, dir: &Path) -> Result<LibraryScanReport> {
        let mut report = LibraryScanReport::default();
        for track in self.list_tracks().await? {
            if self.library_file_exists_for_track(&track.id).await? {
                continue;
            }
            for ext in AUDIO_EXTENSIONS {
                let candidate = dir.join(format!(
                    "{}.{ext}",
                    crate::services::sanitize_filename(&format!(
                        "{} - {}",
                        track.artists, track.title
                    ))
                ));
                if let Ok(metadata) = tokio::fs::metadata(&candidate).await {
                    let mtime: Option<DateTime<Utc>> =
                        metadata.modified().ok().map(DateTime::from);
                    self.upsert_library_file(
                        &track.id,
                        &candidate.to_string_lossy(),
                        Some(metadata.len() as i64),
                        mtime,
                        None,
                        ext,
                    )
                    .await?;
                    report.rows_created += 1;
                    break;
                }
            }
        }
        Ok(report)
    }

    /// Drop rows whose file vanished, refresh size/mtime for the rest.
    pub async fn resync_library(&self) -> Result<LibraryScanReport> {
        let mut report = LibraryScanReport::default();
        let rows =
            sqlx::query_as::<Sqlite, LibraryFile>("SELECT * FROM library_files")
                .fetch_all(self.pool())
                .await?;
        for row in rows {
            report.files_seen += 1;
            match tokio::fs::metadata(&row.filepath).await {
                Err(_) => {
                    sqlx::query("DELETE FROM library_files WHERE id = ?")
                        .bind(&row.id)
                        .execute(self.pool())
                        .await?;
                    report.rows_removed += 1;
                }
                Ok(metadata) => {
                    let mtime: Option<DateTime<Utc>> =
                        metadata.modified().ok().map(DateTime::from);
                    sqlx::query(
                        "UPDATE library_files SET file_size = ?, file_mtime = ? WHERE id = ?",
                    )
                    .bind(metadata.len() as i64)
                    .bind(mtime)
                    .bind(&row.id)
                    .execute(self.pool())
                    .await?;
                    report.rows_updated += 1;
                }
            }
        }
        Ok(report)
    }
}

/// Strip a trailing `" (n)"` collision suffix from a file stem.
fn strip_collision_suffix(stem: &str) -> &str {
    if let Some(open) = stem.rfind(" (") {
        let tail = &stem[open + 2..];
        if let Some(inner) = tail.strip_suffix(')') {
            if !inner.is_empty() && inner.chars().all(|c| c.is_ascii_digit()) {
                return &stem[..open];
            }
        }
    }
    stem
}
