//! Download job models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::Provider;

/// Download job lifecycle. Transitions form a DAG:
/// `queued -> running -> {done, failed}`, `queued -> skipped`, and
/// `already` recorded at enqueue time when duplicate prevention
/// short-circuits the job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum DownloadStatus {
    Queued,
    Running,
    Done,
    Failed,
    Skipped,
    Already,
}

impl DownloadStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DownloadStatus::Done
                | DownloadStatus::Failed
                | DownloadStatus::Skipped
                | DownloadStatus::Already
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DownloadStatus::Queued => "queued",
            DownloadStatus::Running => "running",
            DownloadStatus::Done => "done",
            DownloadStatus::Failed => "failed",
            DownloadStatus::Skipped => "skipped",
            DownloadStatus::Already => "already",
        }
    }
}

/// A download job row. At most one non-terminal row exists per track.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Download {
    pub id: String,
    pub track_id: String,
    pub candidate_id: Option<String>,
    pub provider: Provider,
    pub status: DownloadStatus,
    pub filepath: Option<String>,
    pub format: Option<String>,
    pub filesize_bytes: Option<i64>,
    pub checksum: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Download joined with the owning track's display fields.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct DownloadWithTrack {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub download: Download,
    pub track_artists: String,
    pub track_title: String,
}

/// Enqueue request parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct EnqueueRequest {
    pub track_id: String,
    #[serde(default)]
    pub candidate_id: Option<String>,
    #[serde(default)]
    pub force: bool,
}

/// Scheduler introspection surface.
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub worker_running: bool,
    pub queue_size: usize,
    pub active_tasks: usize,
    pub concurrency: usize,
}

/// One captured scheduler log line.
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerLogLine {
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub line: String,
}

/// Immediate response of the bulk auto-download endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct AutoDownloadAccepted {
    pub status: String,
    pub total_tracks: usize,
}
