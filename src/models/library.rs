//! Library file models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// An acquired on-disk audio file. `filepath` is unique; the row is the
/// ground truth that the referenced track has been acquired.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LibraryFile {
    pub id: String,
    pub track_id: String,
    pub filepath: String,
    pub file_size: Option<i64>,
    pub file_mtime: Option<DateTime<Utc>>,
    pub checksum: Option<String>,
    /// Container/extension, e.g. `mp3`, `m4a`.
    pub container: String,
    pub created_at: DateTime<Utc>,
}

/// Library file joined with track display fields.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct LibraryFileWithTrack {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub file: LibraryFile,
    pub track_artists: String,
    pub track_title: String,
}

/// Result of a disk/DB reconciliation pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LibraryScanReport {
    pub files_seen: usize,
    pub rows_created: usize,
    pub rows_updated: usize,
    pub rows_removed: usize,
}
