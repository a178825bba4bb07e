//! Search candidate models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::Provider;

/// A potential audio source for a track, produced by a ranked extractor
/// search. At most one candidate per track carries `chosen = true`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SearchCandidate {
    pub id: String,
    pub track_id: String,
    pub provider: Provider,
    pub external_id: String,
    pub url: String,
    pub title: String,
    pub channel: Option<String>,
    pub duration_sec: Option<i64>,
    pub score: f64,
    pub chosen: bool,
    /// JSON-encoded per-rule score details, rendered verbatim by the UI.
    pub score_breakdown: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Payload for persisting a candidate (from a ranked search or manually).
#[derive(Debug, Clone, Deserialize)]
pub struct CreateCandidateRequest {
    pub track_id: String,
    #[serde(default = "default_candidate_provider")]
    pub provider: Provider,
    pub external_id: String,
    pub url: String,
    pub title: String,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub duration_sec: Option<i64>,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub score_breakdown: Option<String>,
}

fn default_candidate_provider() -> Provider {
    Provider::Youtube
}

/// Candidate joined with the owning track's display fields.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct EnrichedCandidate {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub candidate: SearchCandidate,
    pub track_artists: String,
    pub track_title: String,
}
