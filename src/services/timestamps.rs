//! File timestamp capability
//!
//! Modification time is always set; creation time is best-effort and
//! OS-dependent. On Linux there is no API to set a file's birth time, so
//! that half degrades to a debug log. Failures here never fail a download
//! job.

use chrono::{DateTime, NaiveDate, Utc};
use filetime::FileTime;
use std::path::Path;

use crate::models::Track;

pub struct FileTimestamps;

impl FileTimestamps {
    /// Resolve the mtime for a freshly acquired file:
    /// newest playlist `added_at`, then `spotify_added_at`, then
    /// `release_date`, then now.
    pub fn resolve_mtime(
        track: &Track,
        latest_added_at: Option<DateTime<Utc>>,
    ) -> DateTime<Utc> {
        latest_added_at
            .or(track.spotify_added_at)
            .or_else(|| parse_release_date(track.release_date.as_deref()))
            .unwrap_or_else(Utc::now)
    }

    /// Resolve the creation time: `release_date`, falling back to the mtime.
    pub fn resolve_creation_time(track: &Track, mtime: DateTime<Utc>) -> DateTime<Utc> {
        parse_release_date(track.release_date.as_deref()).unwrap_or(mtime)
    }

    /// Set the file's mtime. This one is not best-effort.
    pub fn set_mtime(path: &Path, mtime: DateTime<Utc>) -> std::io::Result<()> {
        let ft = FileTime::from_unix_time(mtime.timestamp(), 0);
        filetime::set_file_mtime(path, ft)
    }

    /// Set the file's creation time where the platform allows it. Linux has
    /// no birth-time API, so this logs and returns; failure elsewhere is
    /// logged and swallowed too.
    pub fn set_creation_time_best_effort(path: &Path, created: DateTime<Utc>) {
        let _ = created;
        tracing::debug!(
            path = %path.display(),
            "creation time not settable on this platform"
        );
    }
}

/// `YYYY-MM-DD` (or bare `YYYY`) to midnight UTC.
fn parse_release_date(release_date: Option<&str>) -> Option<DateTime<Utc>> {
    let raw = release_date?;
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| {
            raw.get(..4)
                .and_then(|y| y.parse::<i32>().ok())
                .and_then(|y| NaiveDate::from_ymd_opt(y, 1, 1))
        })?;
    Some(DateTime::from_naive_utc_and_offset(
        date.and_hms_opt(0, 0, 0)?,
        Utc,
    ))
}
