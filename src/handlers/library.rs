//! Library file endpoints, including range-capable streaming
//!
//! The streaming byte contract: unranged requests get 200 with the full
//! body; a single `Range: bytes=start-end` gets 206 with an accurate
//! `Content-Range` and `Content-Length = end - start + 1`; unsatisfiable
//! ranges get 416 with `Content-Range: bytes */total`. `ETag` is a strong
//! digest of size+mtime, `Last-Modified` reflects the file mtime, and the
//! MIME type follows the container.

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;

use crate::error::{AppError, Result};
use crate::models::{LibraryFile, LibraryFileWithTrack, LibraryScanReport};
use crate::AppState;

pub async fn list_library_files_handler(
    State(state): State<AppState>,
) -> Result<Json<Vec<LibraryFileWithTrack>>> {
    Ok(Json(state.catalog.list_library_files().await?))
}

pub async fn get_library_file_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<LibraryFile>> {
    Ok(Json(state.catalog.get_library_file(&id).await?))
}

#[derive(Debug, Deserialize)]
pub struct DeleteParams {
    /// Also remove the file from disk, not just the row.
    #[serde(default)]
    pub remove_file: bool,
}

pub async fn delete_library_file_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<DeleteParams>,
) -> Result<StatusCode> {
    let file = state.catalog.delete_library_file(&id).await?;
    if params.remove_file {
        if let Err(err) = tokio::fs::remove_file(&file.filepath).await {
            tracing::warn!(filepath = %file.filepath, error = %err, "file removal failed");
        }
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn download_library_file_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response> {
    let file = state.catalog.get_library_file(&id).await?;
    let bytes = tokio::fs::read(&file.filepath)
        .await
        .map_err(|_| AppError::not_found("LibraryFile content"))?;

    let filename = std::path::Path::new(&file.filepath)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("audio")
        .to_string();

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(mime_for(&file.container)),
    );
    if let Ok(value) =
        HeaderValue::from_str(&format!("attachment; filename=\"{}\"", filename.replace('"', "")))
    {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    Ok((StatusCode::OK, headers, bytes).into_response())
}

/// Reveal the on-disk location without serving content.
pub async fn reveal_library_file_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    let file = state.catalog.get_library_file(&id).await?;
    let path = std::path::Path::new(&file.filepath);
    Ok(Json(json!({
        "filepath": file.filepath,
        "directory": path.parent().map(|p| p.to_string_lossy().to_string()),
        "exists": path.exists(),
    })))
}

pub async fn stream_library_file_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    request_headers: HeaderMap,
) -> Result<Response> {
    let file = state.catalog.get_library_file(&id).await?;
    let bytes = tokio::fs::read(&file.filepath)
        .await
        .map_err(|_| AppError::not_found("LibraryFile content"))?;
    let total = bytes.len() as u64;

    let metadata = tokio::fs::metadata(&file.filepath).await?;
    let mtime: DateTime<Utc> = metadata
        .modified()
        .map(DateTime::from)
        .unwrap_or_else(|_| Utc::now());

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(mime_for(&file.container)),
    );
    headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    if let Ok(value) = HeaderValue::from_str(&format!(
        "\"{:x}-{:x}\"",
        total,
        mtime.timestamp()
    )) {
        headers.insert(header::ETAG, value);
    }
    if let Ok(value) =
        HeaderValue::from_str(&mtime.format("%a, %d %b %Y %H:%M:%S GMT").to_string())
    {
        headers.insert(header::LAST_MODIFIED, value);
    }

    let range_header = request_headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok());
    let Some(raw_range) = range_header else {
        return Ok((StatusCode::OK, headers, bytes).into_response());
    };

    match parse_byte_range(raw_range, total) {
        None => {
            if let Ok(value) = HeaderValue::from_str(&format!("bytes */{total}")) {
                headers.insert(header::CONTENT_RANGE, value);
            }
            Ok((StatusCode::RANGE_NOT_SATISFIABLE, headers).into_response())
        }
        Some((start, end)) => {
            if let Ok(value) =
                HeaderValue::from_str(&format!("bytes {start}-{end}/{total}"))
            {
                headers.insert(header::CONTENT_RANGE, value);
            }
            let body = bytes[start as usize..=end as usize].to_vec();
            Ok((StatusCode::PARTIAL_CONTENT, headers, body).into_response())
        }
    }
}

pub async fn scan_library_handler(
    State(state): State<AppState>,
) -> Result<Json<LibraryScanReport>> {
    Ok(Json(
        state
            .catalog
            .scan_library_dir(&state.config.library.dir)
            .await?,
    ))
}

pub async fn reindex_from_tracks_handler(
    State(state): State<AppState>,
) -> Result<Json<LibraryScanReport>> {
    Ok(Json(
        state
            .catalog
            .reindex_from_tracks(&state.config.library.dir)
            .await?,
    ))
}

pub async fn resync_library_handler(
    State(state): State<AppState>,
) -> Result<Json<LibraryScanReport>> {
    Ok(Json(state.catalog.resync_library().await?))
}

/// Parse a single `bytes=start-end` range. `None` means unsatisfiable or
/// malformed (malformed ranges are treated as unsatisfiable rather than
/// silently serving the whole file).
fn parse_byte_range(raw: &str, total: u64) -> Option<(u64, u64)> {
    let spec = raw.strip_prefix("bytes=")?;
    let (start_str, end_str) = spec.split_once('-')?;

    if total == 0 {
        return None;
    }

    match (start_str.is_empty(), end_str.is_empty()) {
        // "bytes=-N": final N bytes.
        (true, false) => {
            let suffix: u64 = end_str.parse().ok()?;
            if suffix == 0 {
                return None;
            }
            let start = total.saturating_sub(suffix);
            Some((start, total - 1))
        }
        // "bytes=N-": from N to the end.
        (false, true) => {
            let start: u64 = start_str.parse().ok()?;
            if start >= total {
                return None;
            }
            Some((start, total - 1))
        }
        // "bytes=N-M"
        (false, false) => {
            let start: u64 = start_str.parse().ok()?;
            let end: u64 = end_str.parse().ok()?;
            if start > end || start >= total {
                return None;
            }
            Some((start, end.min(total - 1)))
        }
        (true, true) => None,
    }
}

fn mime_for(container: &str) -> &'static str {
    match container.to_lowercase().as_str() {
        "mp3" => "audio/mpeg",
        "m4a" | "mp4" | "aac" => "audio/mp4",
        "ogg" | "opus" => "audio/ogg",
        "flac" => "audio/flac",
        "webm" => "audio/webm",
        _ => "application/octet-stream",
    }
}
