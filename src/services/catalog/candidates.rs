//! Search candidate repository

use chrono::Utc;
use sqlx::Sqlite;

use super::{new_id, CatalogService};
use crate::error::{AppError, Result};
use crate::models::{CreateCandidateRequest, EnrichedCandidate, SearchCandidate};

impl CatalogService {
    pub async fn get_candidate(&self, id: &str) -> Result<SearchCandidate> {
        sqlx::query_as::<Sqlite, SearchCandidate>("SELECT * FROM search_candidates WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| AppError::not_found("Candidate"))
    }

    pub async fn list_candidates(&self, track_id: Option<&str>) -> Result<Vec<SearchCandidate>> {
        let rows = match track_id {
            Some(track_id) => {
                sqlx::query_as::<Sqlite, SearchCandidate>(
                    "SELECT * FROM search_candidates WHERE track_id = ? ORDER BY score DESC, created_at",
                )
                .bind(track_id)
                .fetch_all(self.pool())
                .await?
            }
            None => {
                sqlx::query_as::<Sqlite, SearchCandidate>(
                    "SELECT * FROM search_candidates ORDER BY created_at DESC",
                )
                .fetch_all(self.pool())
                .await?
            }
        };
        Ok(rows)
    }

    pub async fn list_candidates_enriched(&self) -> Result<Vec<EnrichedCandidate>> {
        Ok(sqlx::query_as::<Sqlite, EnrichedCandidate>(
            r#"SELECT c.*, t.artists AS track_artists, t.title AS track_title
               FROM search_candidates c
               JOIN tracks t ON t.id = c.track_id
               ORDER BY c.created_at DESC"#,
        )
        .fetch_all(self.pool())
        .await?)
    }

    /// Upsert on `(track_id, provider, external_id)`; a re-ranked candidate
    /// keeps its identity and refreshes its metadata and score.
    pub async fn upsert_candidate(
        &self,
        request: &CreateCandidateRequest,
    ) -> Result<SearchCandidate> {
        self.get_track(&request.track_id).await?;
        sqlx::query(
            r#"INSERT INTO search_candidates
               (id, track_id, provider, external_id, url, title, channel, duration_sec,
                score, chosen, score_breakdown, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?)
               ON CONFLICT (track_id, provider, external_id) DO UPDATE SET
                 url = excluded.url,
                 title = excluded.title,
                 channel = excluded.channel,
                 duration_sec = excluded.duration_sec,
                 score = excluded.score,
                 score_breakdown = excluded.score_breakdown"#,
        )
        .bind(new_id())
        .bind(&request.track_id)
        .bind(request.provider)
        .bind(&request.external_id)
        .bind(&request.url)
        .bind(&request.title)
        .bind(&request.channel)
        .bind(request.duration_sec)
        .bind(request.score)
        .bind(&request.score_breakdown)
        .bind(Utc::now())
        .execute(self.pool())
        .await?;

        sqlx::query_as::<Sqlite, SearchCandidate>(
            "SELECT * FROM search_candidates WHERE track_id = ? AND provider = ? AND external_id = ?",
        )
        .bind(&request.track_id)
        .bind(request.provider)
        .bind(&request.external_id)
        .fetch_optional(self.pool())
        .await?
        .ok_or_else(|| AppError::not_found("Candidate"))
    }

    pub async fn delete_candidate(&self, id: &str) -> Result<()> {
        let affected = sqlx::query("DELETE FROM search_candidates WHERE id = ?")
            .bind(id)
            .execute(self.pool())
            .await?
            .rows_affected();
        if affected == 0 {
            return Err(AppError::not_found("Candidate"));
        }
        Ok(())
    }

    /// Atomically choose one candidate: siblings are cleared and the target
    /// set in the same transaction, so observers never see two chosen rows.
    /// A successful choose also clears the track's not-found annotation.
    pub async fn choose_candidate(&self, id: &str) -> Result<SearchCandidate> {
        let candidate = self.get_candidate(id).await?;

        let mut tx = self.pool().begin().await?;
        sqlx::query("UPDATE search_candidates SET chosen = 0 WHERE track_id = ?")
            .bind(&candidate.track_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE search_candidates SET chosen = 1 WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE tracks SET search_status = NULL, updated_at = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(&candidate.track_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        self.get_candidate(id).await
    }

    pub async fn chosen_candidate_for_track(
        &self,
        track_id: &str,
    ) -> Result<Option<SearchCandidate>> {
        Ok(sqlx::query_as::<Sqlite, SearchCandidate>(
            "SELECT * FROM search_candidates WHERE track_id = ? AND chosen = 1",
        )
        .bind(track_id)
        .fetch_optional(self.pool())
        .await?)
    }
}
