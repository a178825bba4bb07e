//! Download scheduler endpoints

use axum::extract::{Path, Query, State};
use axum::response::Json;
use serde::Deserialize;
use serde_json::json;

use crate::error::Result;
use crate::models::{Download, DownloadWithTrack, EnqueueRequest, SchedulerLogLine, SchedulerStatus};
use crate::AppState;

pub async fn enqueue_handler(
    State(state): State<AppState>,
    Query(params): Query<EnqueueRequest>,
) -> Result<Json<Download>> {
    let download = state
        .scheduler
        .enqueue(&params.track_id, params.candidate_id.as_deref(), params.force)
        .await?;
    Ok(Json(download))
}

pub async fn cancel_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Download>> {
    Ok(Json(state.scheduler.cancel(&id).await?))
}

pub async fn stop_all_handler(State(state): State<AppState>) -> Result<Json<serde_json::Value>> {
    let skipped = state.scheduler.stop_all().await?;
    Ok(Json(json!({ "stopped": true, "skipped": skipped })))
}

pub async fn restart_worker_handler(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>> {
    state.scheduler.restart().await;
    Ok(Json(json!({ "restarted": true })))
}

pub async fn status_handler(State(state): State<AppState>) -> Result<Json<SchedulerStatus>> {
    Ok(Json(state.scheduler.status()))
}

#[derive(Debug, Deserialize)]
pub struct LogsParams {
    pub limit: Option<usize>,
}

pub async fn logs_handler(
    State(state): State<AppState>,
    Query(params): Query<LogsParams>,
) -> Result<Json<Vec<SchedulerLogLine>>> {
    Ok(Json(state.scheduler.logs(params.limit.unwrap_or(100))))
}

/// Cookie names age-restricted extraction is known to need.
const REQUIRED_COOKIE_NAMES: [&str; 4] = ["SID", "HSID", "SSID", "__Secure-3PSID"];

/// Report whether the configured cookie jar carries the cookies the
/// extractor needs for authenticated content. Names only, never values.
pub async fn cookies_status_handler(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>> {
    let Some(path) = &state.config.extractor.cookies_file else {
        return Ok(Json(json!({
            "configured": false,
            "present": [],
            "missing": REQUIRED_COOKIE_NAMES,
        })));
    };

    let mut present: Vec<&str> = Vec::new();
    if let Ok(contents) = tokio::fs::read_to_string(path).await {
        // Netscape jar format: 7 tab-separated fields, name in column 6.
        let names: Vec<&str> = contents
            .lines()
            .filter(|line| !line.starts_with('#') && !line.trim().is_empty())
            .filter_map(|line| line.split('\t').nth(5))
            .collect();
        for required in REQUIRED_COOKIE_NAMES {
            if names.contains(&required) {
                present.push(required);
            }
        }
    }
    let missing: Vec<&str> = REQUIRED_COOKIE_NAMES
        .into_iter()
        .filter(|name| !present.contains(name))
        .collect();

    Ok(Json(json!({
        "configured": true,
        "present": present,
        "missing": missing,
    })))
}

pub async fn list_downloads_handler(
    State(state): State<AppState>,
) -> Result<Json<Vec<Download>>> {
    Ok(Json(state.catalog.list_downloads().await?))
}

pub async fn list_downloads_with_tracks_handler(
    State(state): State<AppState>,
) -> Result<Json<Vec<DownloadWithTrack>>> {
    Ok(Json(state.catalog.list_downloads_with_tracks().await?))
}
