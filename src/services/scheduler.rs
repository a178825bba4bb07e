//! Download scheduler
//!
//! A single-process worker pool over a FIFO queue of download job ids. The
//! scheduler is an explicitly owned component: constructed at boot, handed
//! to handlers through state, started and stopped with the application.
//! The database is the single authority for job state; workers re-read the
//! row on pop so a cancellation that raced the queue always wins, and no
//! transaction is ever held across an extractor or network suspension
//! point.
//!
//! Lifecycle: `queued -> running -> {done, failed}`, `queued -> skipped`
//! via cancel/stop_all, and `already` recorded at enqueue time when
//! duplicate prevention short-circuits.

use chrono::Utc;
use std::collections::{HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{watch, Mutex as AsyncMutex, Notify, Semaphore};
use tokio::task::JoinHandle;

use crate::config::{DownloadSettings, ExtractorSettings};
use crate::error::{AppError, Result};
use crate::models::{
    AutoDownloadAccepted, CreateCandidateRequest, Download, DownloadStatus, Provider,
    SchedulerLogLine, SchedulerStatus, Track, SEARCH_STATUS_NOT_FOUND,
};
use crate::ranking::{rank, RankQuery, RankingConfig};
use crate::services::extractor::{DownloadRequest, ExtractorClient, SearchOptions};
use crate::services::timestamps::FileTimestamps;
use crate::services::{sanitize_filename, sha256_file, CatalogService, LogRingBuffer, Tagger};

/// How many ranked candidates the bulk search path persists per track.
const AUTO_SEARCH_PERSIST_TOP: usize = 5;

const LOG_BUFFER_CAPACITY: usize = 200;
const HISTORY_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Clone)]
pub struct DownloadScheduler {
    inner: Arc<Inner>,
}

struct Inner {
    catalog: CatalogService,
    extractor: Arc<dyn ExtractorClient>,
    tagger: Tagger,
    library_dir: PathBuf,
    settings: DownloadSettings,
    extractor_settings: ExtractorSettings,
    ranking: RankingConfig,

    queue: Mutex<VecDeque<String>>,
    active: Mutex<HashSet<String>>,
    queue_notify: Notify,
    accepting: AtomicBool,
    worker_running: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    workers: AsyncMutex<Vec<JoinHandle<()>>>,
    search_semaphore: Arc<Semaphore>,
    logs: LogRingBuffer,
}

impl DownloadScheduler {
    pub fn new(
        catalog: CatalogService,
        extractor: Arc<dyn ExtractorClient>,
        tagger: Tagger,
        library_dir: PathBuf,
        settings: DownloadSettings,
        extractor_settings: ExtractorSettings,
        ranking: RankingConfig,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let search_permits = settings.search_concurrency.max(1);
        Self {
            inner: Arc::new(Inner {
                catalog,
                extractor,
                tagger,
                library_dir,
                settings,
                extractor_settings,
                ranking,
                queue: Mutex::new(VecDeque::new()),
                active: Mutex::new(HashSet::new()),
                queue_notify: Notify::new(),
                accepting: AtomicBool::new(true),
                worker_running: AtomicBool::new(false),
                shutdown_tx,
                shutdown_rx,
                workers: AsyncMutex::new(Vec::new()),
                search_semaphore: Arc::new(Semaphore::new(search_permits)),
                logs: LogRingBuffer::new(LOG_BUFFER_CAPACITY),
            }),
        }
    }

    /// Spawn the worker pool and the history sweeper. Idempotent; a second
    /// call while workers are alive is a no-op.
    pub async fn start(&self) {
        if self.inner.settings.worker_disabled {
            self.inner.log("worker pool disabled by configuration");
            return;
        }
        let mut workers = self.inner.workers.lock().await;
        if !workers.is_empty() {
            return;
        }
        self.inner.worker_running.store(true, Ordering::SeqCst);
        for worker_id in 0..self.inner.settings.concurrency.max(1) {
            let inner = self.inner.clone();
            workers.push(tokio::spawn(async move {
                inner.worker_loop(worker_id).await;
            }));
        }
        let inner = self.inner.clone();
        workers.push(tokio::spawn(async move {
            inner.history_sweeper().await;
        }));
        self.inner.log(format!(
            "worker pool started (concurrency {})",
            self.inner.settings.concurrency.max(1)
        ));
    }

    /// Graceful shutdown: workers finish their current job and exit.
    pub async fn stop(&self) {
        let _ = self.inner.shutdown_tx.send(true);
        self.inner.queue_notify.notify_waiters();
        let mut workers = self.inner.workers.lock().await;
        for handle in workers.drain(..) {
            let _ = handle.await;
        }
        self.inner.worker_running.store(false, Ordering::SeqCst);
        self.inner.log("worker pool stopped");
    }

    /// Enqueue one track. Duplicate prevention records an `already` row
    /// instead of queuing; `force` bypasses the library check but refuses
    /// to race an in-flight job for the same track.
    pub async fn enqueue(
        &self,
        track_id: &str,
        candidate_id: Option<&str>,
        force: bool,
    ) -> Result<Download> {
        let inner = &self.inner;
        inner.catalog.get_track(track_id).await?;

        if let Some(existing) = inner.catalog.nonterminal_download_for_track(track_id).await? {
            if force {
                // Refuse until the in-flight job terminates.
                return Err(AppError::DownloadInFlight);
            }
            inner.log(format!(
                "enqueue short-circuited, job {} already {} for track {}",
                existing.id,
                existing.status.as_str(),
                track_id
            ));
            return inner
                .catalog
                .insert_download(track_id, None, Provider::Youtube, DownloadStatus::Already)
                .await;
        }

        if !force && inner.catalog.library_file_exists_for_track(track_id).await? {
            inner.log(format!(
                "enqueue short-circuited, track {track_id} already in library"
            ));
            return inner
                .catalog
                .insert_download(track_id, None, Provider::Youtube, DownloadStatus::Already)
                .await;
        }

        let candidate = match candidate_id {
            Some(candidate_id) => {
                let candidate = inner.catalog.get_candidate(candidate_id).await?;
                if candidate.track_id != track_id {
                    return Err(AppError::validation(
                        "candidate does not belong to the given track",
                    ));
                }
                candidate
            }
            None => inner
                .catalog
                .chosen_candidate_for_track(track_id)
                .await?
                .ok_or(AppError::NoCandidate)?,
        };

        if !inner.accepting.load(Ordering::SeqCst) {
            return Err(AppError::conflict(
                "scheduler is stopped; restart the worker to accept new jobs",
            ));
        }

        // The partial unique index on non-terminal rows is the authority
        // here; an enqueue racing this one surfaces as a constraint
        // violation, not as a second queued row.
        let download = match inner
            .catalog
            .insert_download(
                track_id,
                Some(&candidate.id),
                candidate.provider,
                DownloadStatus::Queued,
            )
            .await
        {
            Ok(download) => download,
            Err(AppError::ConstraintViolation(_)) => {
                if force {
                    return Err(AppError::DownloadInFlight);
                }
                inner.log(format!(
                    "enqueue short-circuited, concurrent job already queued for track {track_id}"
                ));
                return inner
                    .catalog
                    .insert_download(track_id, None, Provider::Youtube, DownloadStatus::Already)
                    .await;
            }
            Err(err) => return Err(err),
        };

        inner
            .queue
            .lock()
            .expect("queue poisoned")
            .push_back(download.id.clone());
        inner.queue_notify.notify_one();
        inner.log(format!(
            "queued download {} for track {track_id}",
            download.id
        ));
        Ok(download)
    }

    /// Cancel a queued job. Running jobs are refused; cancelling an
    /// already-cancelled (or otherwise terminal) job is a no-op.
    pub async fn cancel(&self, download_id: &str) -> Result<Download> {
        let download = self.inner.catalog.get_download(download_id).await?;
        match download.status {
            DownloadStatus::Queued => {
                self.inner.catalog.mark_download_skipped(download_id).await?;
                self.inner.log(format!("cancelled queued download {download_id}"));
                self.inner.catalog.get_download(download_id).await
            }
            DownloadStatus::Running => Err(AppError::CancelRunning),
            _ => Ok(download),
        }
    }

    /// Drain the queue (pending jobs become `skipped`) and stop accepting
    /// work until [`DownloadScheduler::restart`]. In-flight jobs finish
    /// their current step and terminate on their own.
    pub async fn stop_all(&self) -> Result<usize> {
        let inner = &self.inner;
        inner.accepting.store(false, Ordering::SeqCst);

        let drained: Vec<String> = {
            let mut queue = inner.queue.lock().expect("queue poisoned");
            queue.drain(..).collect()
        };
        let mut skipped = 0;
        for id in drained {
            if inner.catalog.mark_download_skipped(&id).await? {
                skipped += 1;
            }
        }
        inner.log(format!("stop_all drained {skipped} queued jobs"));
        Ok(skipped)
    }

    /// Resume intake (and the pool, if it was never started).
    pub async fn restart(&self) {
        self.inner.accepting.store(true, Ordering::SeqCst);
        self.start().await;
        self.inner.queue_notify.notify_waiters();
        self.inner.log("worker restarted, accepting new jobs");
    }

    pub fn status(&self) -> SchedulerStatus {
        SchedulerStatus {
            worker_running: self.inner.worker_running.load(Ordering::SeqCst)
                && self.inner.accepting.load(Ordering::SeqCst),
            queue_size: self.inner.queue.lock().expect("queue poisoned").len(),
            active_tasks: self.inner.active.lock().expect("active poisoned").len(),
            concurrency: self.inner.settings.concurrency.max(1),
        }
    }

    pub fn logs(&self, limit: usize) -> Vec<SchedulerLogLine> {
        self.inner.logs.snapshot(limit)
    }

    /// Bulk acquisition for a playlist. Returns immediately; search and
    /// enqueue work continues in a detached task with its own bounded
    /// search concurrency.
    pub async fn auto_download(&self, playlist_id: &str) -> Result<AutoDownloadAccepted> {
        let entries = self.inner.catalog.playlist_entries(playlist_id).await?;
        let total_tracks = entries.len();
        let scheduler = self.clone();
        let playlist_id = playlist_id.to_string();

        tokio::spawn(async move {
            scheduler.run_bulk(playlist_id, entries.into_iter().map(|e| e.track).collect()).await;
        });

        Ok(AutoDownloadAccepted {
            status: "processing".to_string(),
            total_tracks,
        })
    }

    /// Clear `searched_not_found` annotations in the playlist and re-run
    /// the bulk path for just those tracks.
    pub async fn retry_not_found(&self, playlist_id: &str) -> Result<AutoDownloadAccepted> {
        let entries = self.inner.catalog.playlist_entries(playlist_id).await?;
        let mut retry: Vec<Track> = Vec::new();
        for entry in entries {
            if entry.track.search_status.as_deref() == Some(SEARCH_STATUS_NOT_FOUND) {
                self.inner
                    .catalog
                    .set_search_status(&entry.track.id, None)
                    .await?;
                retry.push(entry.track);
            }
        }
        let total_tracks = retry.len();
        let scheduler = self.clone();
        let playlist_id = playlist_id.to_string();
        tokio::spawn(async move {
            scheduler.run_bulk(playlist_id, retry).await;
        });
        Ok(AutoDownloadAccepted {
            status: "processing".to_string(),
            total_tracks,
        })
    }

    async fn run_bulk(&self, playlist_id: String, tracks: Vec<Track>) {
        let inner = &self.inner;
        inner.log(format!(
            "auto-download started for playlist {playlist_id} ({} tracks)",
            tracks.len()
        ));
        let mut search_tasks = Vec::new();

        for track in tracks {
            match inner.catalog.library_file_exists_for_track(&track.id).await {
                Ok(true) => continue,
                Ok(false) => {}
                Err(err) => {
                    tracing::error!(track_id = %track.id, error = %err, "bulk pre-check failed");
                    continue;
                }
            }
            let since = Utc::now()
                - chrono::Duration::from_std(inner.settings.recent_failure_window)
                    .unwrap_or_else(|_| chrono::Duration::hours(24));
            match inner.catalog.recent_failed_download_exists(&track.id, since).await {
                Ok(true) => continue,
                Ok(false) => {}
                Err(err) => {
                    tracing::error!(track_id = %track.id, error = %err, "bulk pre-check failed");
                    continue;
                }
            }

            match inner.catalog.chosen_candidate_for_track(&track.id).await {
                Ok(Some(_)) => {
                    if let Err(err) = self.enqueue(&track.id, None, false).await {
                        inner.log(format!(
                            "bulk enqueue for track {} refused: {err}",
                            track.id
                        ));
                    }
                }
                Ok(None) => {
                    // Search concurrency is bounded independently of the
                    // download workers.
                    let scheduler = self.clone();
                    search_tasks.push(tokio::spawn(async move {
                        scheduler.search_and_enqueue(track).await;
                    }));
                }
                Err(err) => {
                    tracing::error!(track_id = %track.id, error = %err, "bulk candidate lookup failed");
                }
            }
        }

        for result in futures::future::join_all(search_tasks).await {
            if let Err(err) = result {
                tracing::error!(error = %err, "bulk search task panicked");
            }
        }
        inner.log(format!("auto-download drained for playlist {playlist_id}"));
    }

    async fn search_and_enqueue(&self, track: Track) {
        let inner = &self.inner;
        let Ok(_permit) = inner.search_semaphore.acquire().await else {
            return;
        };

        let query = RankQuery {
            artists: track.artists.clone(),
            title: track.title.clone(),
            duration_ms: track.duration_ms,
        };
        let options = SearchOptions::from_settings(&inner.extractor_settings);
        let raw = match inner.extractor.search(&query, &options).await {
            Ok(raw) => raw,
            Err(err) => {
                inner.log(format!("search failed for track {}: {err}", track.id));
                return;
            }
        };
        let ranked = rank(&query, &raw, &inner.ranking);

        let best_score = ranked.first().map(|c| c.score).unwrap_or(f64::NEG_INFINITY);
        if best_score < inner.settings.min_autochoose_score {
            inner.log(format!(
                "no candidate above auto-choose threshold for track {} (best {best_score:.1})",
                track.id
            ));
            if let Err(err) = inner
                .catalog
                .set_search_status(&track.id, Some(SEARCH_STATUS_NOT_FOUND))
                .await
            {
                tracing::error!(track_id = %track.id, error = %err, "annotation failed");
            }
            return;
        }

        let mut top_id = None;
        for scored in ranked.iter().take(AUTO_SEARCH_PERSIST_TOP) {
            let request = CreateCandidateRequest {
                track_id: track.id.clone(),
                provider: Provider::Youtube,
                external_id: scored.candidate.id.clone(),
                url: format!("https://www.youtube.com/watch?v={}", scored.candidate.id),
                title: scored.candidate.title.clone(),
                channel: scored.candidate.channel.clone(),
                duration_sec: scored.candidate.duration_sec,
                score: scored.score,
                score_breakdown: serde_json::to_string(&scored.details).ok(),
            };
            match inner.catalog.upsert_candidate(&request).await {
                Ok(candidate) => {
                    if top_id.is_none() {
                        top_id = Some(candidate.id);
                    }
                }
                Err(err) => {
                    tracing::error!(track_id = %track.id, error = %err, "candidate persist failed");
                }
            }
        }

        if let Some(candidate_id) = top_id {
            if let Err(err) = inner.catalog.choose_candidate(&candidate_id).await {
                tracing::error!(track_id = %track.id, error = %err, "auto-choose failed");
                return;
            }
            if let Err(err) = self.enqueue(&track.id, None, false).await {
                inner.log(format!("bulk enqueue for track {} refused: {err}", track.id));
            }
        }
    }
}

impl Inner {
    fn log(&self, line: impl Into<String>) {
        let line = line.into();
        tracing::info!("{line}");
        self.logs.push(line);
    }

    async fn worker_loop(self: Arc<Self>, worker_id: usize) {
        let mut shutdown = self.shutdown_rx.clone();
        tracing::debug!(worker_id, "download worker started");
        loop {
            if *shutdown.borrow() {
                break;
            }
            let next = if self.accepting.load(Ordering::SeqCst) {
                self.queue.lock().expect("queue poisoned").pop_front()
            } else {
                None
            };

            match next {
                Some(download_id) => self.process(worker_id, download_id).await,
                None => {
                    tokio::select! {
                        _ = self.queue_notify.notified() => {}
                        _ = shutdown.changed() => {}
                    }
                }
            }
        }
        tracing::debug!(worker_id, "download worker exited");
    }

    async fn process(self: &Arc<Self>, worker_id: usize, download_id: String) {
        // The row is the authority; a cancel that won the race shows up
        // here as a non-queued status.
        let download = match self.catalog.get_download(&download_id).await {
            Ok(download) => download,
            Err(err) => {
                tracing::error!(download_id, error = %err, "job vanished before start");
                return;
            }
        };
        if download.status != DownloadStatus::Queued {
            self.log(format!(
                "dropping job {download_id}, status is {}",
                download.status.as_str()
            ));
            return;
        }
        match self.catalog.mark_download_running(&download_id).await {
            Ok(true) => {}
            Ok(false) => return,
            Err(err) => {
                tracing::error!(download_id, error = %err, "transition to running failed");
                return;
            }
        }

        self.active
            .lock()
            .expect("active poisoned")
            .insert(download_id.clone());
        self.log(format!("worker {worker_id} picked up job {download_id}"));

        let outcome = self.run_job(&download).await;
        match outcome {
            Ok(filepath) => {
                self.log(format!("job {download_id} done -> {filepath}"));
            }
            Err(err) => {
                let message = truncate_error(&err.to_string(), self.settings.stderr_capture_lines);
                if let Err(db_err) = self.catalog.fail_download(&download_id, &message).await {
                    tracing::error!(download_id, error = %db_err, "failed to record failure");
                }
                self.log(format!("job {download_id} failed: {message}"));
            }
        }

        self.active
            .lock()
            .expect("active poisoned")
            .remove(&download_id);
    }

    /// The acquisition pipeline for one job. Every early return is turned
    /// into a `failed` row by the caller; nothing here can take the worker
    /// down.
    async fn run_job(&self, download: &Download) -> Result<String> {
        let track = self.catalog.get_track(&download.track_id).await?;
        let candidate = match &download.candidate_id {
            Some(candidate_id) => self.catalog.get_candidate(candidate_id).await?,
            None => self
                .catalog
                .chosen_candidate_for_track(&download.track_id)
                .await?
                .ok_or(AppError::NoCandidate)?,
        };

        if self.settings.simulate_seconds > 0 {
            tokio::time::sleep(Duration::from_secs(self.settings.simulate_seconds)).await;
        }

        // Extract into a per-job staging directory; the final name is
        // resolved only once the container is known.
        let staging = self.library_dir.join(".incoming").join(&download.id);
        let stem = sanitize_filename(&format!("{} - {}", track.artists, track.title));
        let downloaded = self
            .extractor
            .download(&DownloadRequest {
                url: candidate.url.clone(),
                output_dir: staging.clone(),
                file_stem: stem.clone(),
                preferred_format: self.extractor_settings.preferred_audio_format.clone(),
            })
            .await?;

        let final_path = self
            .resolve_target_path(&track, &stem, &downloaded.container)
            .await?;
        tokio::fs::create_dir_all(&self.library_dir).await?;
        tokio::fs::rename(&downloaded.filepath, &final_path).await?;
        let _ = tokio::fs::remove_dir(&staging).await;

        self.tagger.write_tags(&final_path, &track).await?;
        self.tagger.embed_cover(&final_path, &track).await;
        let checksum = sha256_file(&final_path).await?;
        let file_size = tokio::fs::metadata(&final_path).await?.len() as i64;

        let latest_added_at = self.catalog.latest_added_at(&track.id).await?;
        let mtime = FileTimestamps::resolve_mtime(&track, latest_added_at);
        if let Err(err) = FileTimestamps::set_mtime(&final_path, mtime) {
            tracing::warn!(path = %final_path.display(), error = %err, "mtime not set");
        }
        let created = FileTimestamps::resolve_creation_time(&track, mtime);
        FileTimestamps::set_creation_time_best_effort(&final_path, created);

        let filepath = final_path.to_string_lossy().to_string();
        self.catalog
            .upsert_library_file(
                &track.id,
                &filepath,
                Some(file_size),
                Some(mtime),
                Some(&checksum),
                &downloaded.container,
            )
            .await?;
        self.catalog
            .complete_download(
                &download.id,
                &filepath,
                &downloaded.container,
                file_size,
                &checksum,
            )
            .await?;
        Ok(filepath)
    }

    /// `"<artists> - <title>.<ext>"`, re-using the track's existing library
    /// path on re-download and suffixing `" (2)"`, `" (3)"`, ... when a
    /// foreign file already sits at the target.
    async fn resolve_target_path(
        &self,
        track: &Track,
        stem: &str,
        container: &str,
    ) -> Result<PathBuf> {
        if let Some(existing) = self.catalog.library_file_for_track(&track.id).await? {
            return Ok(PathBuf::from(existing.filepath));
        }

        let mut path = self.library_dir.join(format!("{stem}.{container}"));
        let mut counter = 2;
        while tokio::fs::try_exists(&path).await.unwrap_or(false) {
            path = self.library_dir.join(format!("{stem} ({counter}).{container}"));
            counter += 1;
        }
        Ok(path)
    }

    async fn history_sweeper(self: Arc<Self>) {
        let mut shutdown = self.shutdown_rx.clone();
        let mut interval = tokio::time::interval(HISTORY_SWEEP_INTERVAL);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.catalog.trim_download_history(self.settings.history_keep).await {
                        Ok(0) => {}
                        Ok(trimmed) => self.log(format!("trimmed {trimmed} old download rows")),
                        Err(err) => tracing::error!(error = %err, "history trim failed"),
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
    }
}

fn truncate_error(message: &str, max_lines: usize) -> String {
    message
        .lines()
        .take(max_lines.max(1))
        .collect::<Vec<_>>()
        .join("\n")
}
