//! Download job repository
//!
//! All lifecycle transitions are single guarded UPDATE statements, so a
//! worker and a cancel request racing on the same row resolve through the
//! database, not through in-memory state.

use chrono::{DateTime, Utc};
use sqlx::Sqlite;

use super::{new_id, CatalogService};
use crate::error::{AppError, Result};
use crate::models::{Download, DownloadStatus, DownloadWithTrack, Provider};

impl CatalogService {
    pub async fn insert_download(
        &self,
        track_id: &str,
        candidate_id: Option<&str>,
        provider: Provider,
        status: DownloadStatus,
    ) -> Result<Download> {
        let id = new_id();
        sqlx::query(
            r#"INSERT INTO downloads
               (id, track_id, candidate_id, provider, status, created_at)
               VALUES (?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&id)
        .bind(track_id)
        .bind(candidate_id)
        .bind(provider)
        .bind(status)
        .bind(Utc::now())
        .execute(self.pool())
        .await?;
        self.get_download(&id).await
    }

    pub async fn get_download(&self, id: &str) -> Result<Download> {
        sqlx::query_as::<Sqlite, Download>("SELECT * FROM downloads WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| AppError::not_found("Download"))
    }

    pub async fn list_downloads(&self) -> Result<Vec<Download>> {
        Ok(
            sqlx::query_as::<Sqlite, Download>("SELECT * FROM downloads ORDER BY created_at DESC")
                .fetch_all(self.pool())
                .await?,
        )
    }

    pub async fn list_downloads_with_tracks(&self) -> Result<Vec<DownloadWithTrack>> {
        Ok(sqlx::query_as::<Sqlite, DownloadWithTrack>(
            r#"SELECT d.*, t.artists AS track_artists, t.title AS track_title
               FROM downloads d
               JOIN tracks t ON t.id = d.track_id
               ORDER BY d.created_at DESC"#,
        )
        .fetch_all(self.pool())
        .await?)
    }

    /// The queued-or-running row for a track, if any.
    pub async fn nonterminal_download_for_track(&self, track_id: &str) -> Result<Option<Download>> {
        Ok(sqlx::query_as::<Sqlite, Download>(
            "SELECT * FROM downloads WHERE track_id = ? AND status IN ('queued', 'running')",
        )
        .bind(track_id)
        .fetch_optional(self.pool())
        .await?)
    }

    pub async fn recent_failed_download_exists(
        &self,
        track_id: &str,
        since: DateTime<Utc>,
    ) -> Result<bool> {
        Ok(sqlx::query_scalar(
            r#"SELECT EXISTS (SELECT 1 FROM downloads
               WHERE track_id = ? AND status = 'failed' AND finished_at >= ?)"#,
        )
        .bind(track_id)
        .bind(since)
        .fetch_one(self.pool())
        .await?)
    }

    /// `queued -> running`. Returns false when the job was skipped (or
    /// otherwise moved on) before the worker got to it.
    pub async fn mark_download_running(&self, id: &str) -> Result<bool> {
        let affected = sqlx::query(
            "UPDATE downloads SET status = 'running', started_at = ? WHERE id = ? AND status = 'queued'",
        )
        .bind(Utc::now())
        .bind(id)
        .execute(self.pool())
        .await?
        .rows_affected();
        Ok(affected == 1)
    }

    /// `queued -> skipped`. Returns false when the job was not queued.
    pub async fn mark_download_skipped(&self, id: &str) -> Result<bool> {
        let affected = sqlx::query(
            "UPDATE downloads SET status = 'skipped', finished_at = ? WHERE id = ? AND status = 'queued'",
        )
        .bind(Utc::now())
        .bind(id)
        .execute(self.pool())
        .await?
        .rows_affected();
        Ok(affected == 1)
    }

    pub async fn complete_download(
        &self,
        id: &str,
        filepath: &str,
        format: &str,
        filesize_bytes: i64,
        checksum: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"UPDATE downloads SET status = 'done', filepath = ?, format = ?,
               filesize_bytes = ?, checksum = ?, error_message = NULL, finished_at = ?
               WHERE id = ?"#,
        )
        .bind(filepath)
        .bind(format)
        .bind(filesize_bytes)
        .bind(checksum)
        .bind(Utc::now())
        .bind(id)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn fail_download(&self, id: &str, error_message: &str) -> Result<()> {
        sqlx::query(
            "UPDATE downloads SET status = 'failed', error_message = ?, finished_at = ? WHERE id = ?",
        )
        .bind(error_message)
        .bind(Utc::now())
        .bind(id)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Trim terminal history down to `keep` rows, oldest first. Queued and
    /// running rows are never trimmed.
    pub async fn trim_download_history(&self, keep: usize) -> Result<u64> {
        let affected = sqlx::query(
            r#"DELETE FROM downloads WHERE id IN (
                 SELECT id FROM downloads
                 WHERE status IN ('done', 'failed', 'skipped', 'already')
                 ORDER BY created_at DESC
                 LIMIT -1 OFFSET ?
               )"#,
        )
        .bind(keep as i64)
        .execute(self.pool())
        .await?
        .rows_affected();
        Ok(affected)
    }
}
