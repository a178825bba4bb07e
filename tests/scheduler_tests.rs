//! Scheduler lifecycle: enqueue contract, cancellation, stop/restart,
//! the acquisition pipeline against the fake extractor, and the bulk
//! auto-download path.

mod common;

use std::sync::Arc;
use std::time::Duration;

use id3::TagLike;

use music_grabber_backend::{
    AppError, AppState, CreateCandidateRequest, DownloadStatus, FakeExtractor, Provider,
};

use common::{test_state, track_request, wait_until};

async fn track_with_chosen_candidate(state: &AppState, artists: &str, title: &str) -> String {
    let track = state
        .catalog
        .create_track(&track_request(artists, title, Some(240_000)))
        .await
        .unwrap();
    let candidate = state
        .catalog
        .upsert_candidate(&CreateCandidateRequest {
            track_id: track.id.clone(),
            provider: Provider::Youtube,
            external_id: format!("vid-{}", track.id),
            url: format!("https://www.youtube.com/watch?v=vid-{}", track.id),
            title: format!("{artists} - {title}"),
            channel: Some(format!("{artists} - Topic")),
            duration_sec: Some(240),
            score: 150.0,
            score_breakdown: None,
        })
        .await
        .unwrap();
    state.catalog.choose_candidate(&candidate.id).await.unwrap();
    track.id
}

#[tokio::test]
async fn happy_path_produces_a_tagged_library_file() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(Arc::new(FakeExtractor::default()), dir.path()).await;
    state.scheduler.start().await;

    let track_id = track_with_chosen_candidate(&state, "Block & Crown", "Lonely Heart").await;
    let download = state.scheduler.enqueue(&track_id, None, false).await.unwrap();
    assert_eq!(download.status, DownloadStatus::Queued);

    let finished = wait_until(Duration::from_secs(5), || {
        let state = state.clone();
        let id = download.id.clone();
        async move {
            state
                .catalog
                .get_download(&id)
                .await
                .map(|d| d.status.is_terminal())
                .unwrap_or(false)
        }
    })
    .await;
    assert!(finished, "download did not reach a terminal state");

    let done = state.catalog.get_download(&download.id).await.unwrap();
    assert_eq!(done.status, DownloadStatus::Done);
    assert!(done.finished_at.is_some());
    assert!(done.checksum.is_some());

    // Exactly one library row, pointing at a real file with real tags.
    let library = state
        .catalog
        .library_file_for_track(&track_id)
        .await
        .unwrap()
        .expect("library row written");
    assert_eq!(Some(library.filepath.clone()), done.filepath);
    let path = std::path::Path::new(&library.filepath);
    assert!(path.exists());
    assert!(path
        .file_name()
        .unwrap()
        .to_string_lossy()
        .starts_with("Block & Crown - Lonely Heart"));

    let tag = id3::Tag::read_from_path(path).unwrap();
    assert_eq!(tag.artist(), Some("Block & Crown"));
    assert_eq!(tag.title(), Some("Lonely Heart"));

    state.scheduler.stop().await;
}

#[tokio::test]
async fn second_enqueue_without_force_records_already() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = common::test_config(dir.path());
    config.download.worker_disabled = true;
    let pool = music_grabber_backend::create_test_pool().await;
    let state = AppState::build(config, pool, Arc::new(FakeExtractor::default()));

    let track_id = track_with_chosen_candidate(&state, "A", "B").await;

    let first = state.scheduler.enqueue(&track_id, None, false).await.unwrap();
    assert_eq!(first.status, DownloadStatus::Queued);

    let second = state.scheduler.enqueue(&track_id, None, false).await.unwrap();
    assert_eq!(second.status, DownloadStatus::Already);

    // force refuses while a job is in flight for the track
    let err = state.scheduler.enqueue(&track_id, None, true).await.unwrap_err();
    assert!(matches!(err, AppError::DownloadInFlight));
}

#[tokio::test]
async fn concurrent_enqueues_for_one_track_yield_one_queued_one_already() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = common::test_config(dir.path());
    config.download.worker_disabled = true;
    let pool = music_grabber_backend::create_test_pool().await;
    let state = AppState::build(config, pool, Arc::new(FakeExtractor::default()));

    let track_id = track_with_chosen_candidate(&state, "A", "B").await;

    // Whichever interleaving the runtime picks, exactly one job may enter
    // the queue; the loser records an `already` row.
    let (first, second) = tokio::join!(
        state.scheduler.enqueue(&track_id, None, false),
        state.scheduler.enqueue(&track_id, None, false),
    );
    let mut statuses = [first.unwrap().status, second.unwrap().status];
    statuses.sort_by_key(|s| s.as_str());
    assert_eq!(statuses, [DownloadStatus::Already, DownloadStatus::Queued]);

    assert_eq!(state.scheduler.status().queue_size, 1);
    let queued: Vec<_> = state
        .catalog
        .list_downloads()
        .await
        .unwrap()
        .into_iter()
        .filter(|d| !d.status.is_terminal())
        .collect();
    assert_eq!(queued.len(), 1);
}

#[tokio::test]
async fn enqueue_without_candidate_fails_with_no_candidate() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(Arc::new(FakeExtractor::default()), dir.path()).await;
    let track = state
        .catalog
        .create_track(&track_request("A", "B", None))
        .await
        .unwrap();

    let err = state.scheduler.enqueue(&track.id, None, false).await.unwrap_err();
    assert!(matches!(err, AppError::NoCandidate));
}

#[tokio::test]
async fn cancel_is_accepted_queued_refused_running_noop_after() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = common::test_config(dir.path());
    config.download.worker_disabled = true;
    let pool = music_grabber_backend::create_test_pool().await;
    let state = AppState::build(config, pool, Arc::new(FakeExtractor::default()));

    let track_id = track_with_chosen_candidate(&state, "A", "B").await;
    let download = state.scheduler.enqueue(&track_id, None, false).await.unwrap();

    let cancelled = state.scheduler.cancel(&download.id).await.unwrap();
    assert_eq!(cancelled.status, DownloadStatus::Skipped);

    // Second cancel is a no-op, not an error.
    let again = state.scheduler.cancel(&download.id).await.unwrap();
    assert_eq!(again.status, DownloadStatus::Skipped);

    // A running job refuses cancellation.
    let other_track = track_with_chosen_candidate(&state, "C", "D").await;
    let running = state.scheduler.enqueue(&other_track, None, false).await.unwrap();
    state.catalog.mark_download_running(&running.id).await.unwrap();
    let err = state.scheduler.cancel(&running.id).await.unwrap_err();
    assert!(matches!(err, AppError::CancelRunning));
}

#[tokio::test]
async fn stop_all_drains_the_queue_and_blocks_intake_until_restart() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = common::test_config(dir.path());
    config.download.worker_disabled = true;
    let pool = music_grabber_backend::create_test_pool().await;
    let state = AppState::build(config, pool, Arc::new(FakeExtractor::default()));

    let first = track_with_chosen_candidate(&state, "A", "B").await;
    let second = track_with_chosen_candidate(&state, "C", "D").await;
    let job_one = state.scheduler.enqueue(&first, None, false).await.unwrap();
    let job_two = state.scheduler.enqueue(&second, None, false).await.unwrap();

    let skipped = state.scheduler.stop_all().await.unwrap();
    assert_eq!(skipped, 2);
    for id in [&job_one.id, &job_two.id] {
        let row = state.catalog.get_download(id).await.unwrap();
        assert_eq!(row.status, DownloadStatus::Skipped);
    }

    // No job is queued and intake is closed.
    let third = track_with_chosen_candidate(&state, "E", "F").await;
    let err = state.scheduler.enqueue(&third, None, false).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict { .. }));

    state.scheduler.restart().await;
    let accepted = state.scheduler.enqueue(&third, None, false).await.unwrap();
    assert_eq!(accepted.status, DownloadStatus::Queued);
}

#[tokio::test]
async fn bulk_auto_download_handles_mixed_playlist() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(Arc::new(FakeExtractor::default()), dir.path()).await;
    state.scheduler.start().await;
    let catalog = &state.catalog;

    let playlist = catalog
        .upsert_playlist(Provider::Spotify, "pl-bulk", "Bulk", None, None)
        .await
        .unwrap();

    // Track 1: already acquired.
    let acquired = catalog
        .create_track(&track_request("Have", "It", Some(240_000)))
        .await
        .unwrap();
    catalog
        .upsert_library_file(&acquired.id, "/tmp/have - it.mp3", Some(1), None, None, "mp3")
        .await
        .unwrap();

    // Track 2: chosen candidate, ready to enqueue.
    let ready = track_with_chosen_candidate(&state, "Ready", "Steady").await;

    // Track 3: nothing yet; the fake search will find a perfect match.
    let fresh = catalog
        .create_track(&track_request("Fresh", "Find", Some(200_000)))
        .await
        .unwrap();

    for (position, id) in [(0i64, &acquired.id), (1, &ready), (2, &fresh.id)] {
        catalog
            .upsert_playlist_link(&playlist.id, id, Some(position), None)
            .await
            .unwrap();
    }

    let accepted = state.scheduler.auto_download(&playlist.id).await.unwrap();
    assert_eq!(accepted.status, "processing");
    assert_eq!(accepted.total_tracks, 3);

    let drained = wait_until(Duration::from_secs(10), || {
        let state = state.clone();
        let ready = ready.clone();
        let fresh_id = fresh.id.clone();
        async move {
            let ready_done = state
                .catalog
                .library_file_for_track(&ready)
                .await
                .unwrap()
                .is_some();
            let fresh_done = state
                .catalog
                .library_file_for_track(&fresh_id)
                .await
                .unwrap()
                .is_some();
            ready_done && fresh_done
        }
    })
    .await;
    assert!(drained, "bulk path did not acquire both tracks");

    // The fresh track got candidates persisted and one chosen.
    let chosen = catalog
        .chosen_candidate_for_track(&fresh.id)
        .await
        .unwrap()
        .expect("auto-chosen candidate");
    assert!(chosen.score >= 60.0);

    // The already-acquired track was left alone.
    let downloads = catalog.list_downloads().await.unwrap();
    assert!(!downloads.iter().any(|d| d.track_id == acquired.id));

    state.scheduler.stop().await;
}

#[tokio::test]
async fn bulk_search_miss_annotates_searched_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(Arc::new(FakeExtractor::empty()), dir.path()).await;
    state.scheduler.start().await;
    let catalog = &state.catalog;

    let playlist = catalog
        .upsert_playlist(Provider::Spotify, "pl-miss", "Misses", None, None)
        .await
        .unwrap();
    let track = catalog
        .create_track(&track_request("Obscure", "Tune", Some(180_000)))
        .await
        .unwrap();
    catalog
        .upsert_playlist_link(&playlist.id, &track.id, Some(0), None)
        .await
        .unwrap();

    state.scheduler.auto_download(&playlist.id).await.unwrap();

    let annotated = wait_until(Duration::from_secs(5), || {
        let state = state.clone();
        let id = track.id.clone();
        async move {
            state
                .catalog
                .get_track(&id)
                .await
                .map(|t| t.search_status.as_deref() == Some("searched_not_found"))
                .unwrap_or(false)
        }
    })
    .await;
    assert!(annotated, "missing search annotation");

    // retry_not_found clears the annotation and re-queues the search.
    let accepted = state.scheduler.retry_not_found(&playlist.id).await.unwrap();
    assert_eq!(accepted.total_tracks, 1);

    state.scheduler.stop().await;
}

#[tokio::test]
async fn history_trim_keeps_only_recent_terminal_rows() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(Arc::new(FakeExtractor::default()), dir.path()).await;

    let track = state
        .catalog
        .create_track(&track_request("A", "B", None))
        .await
        .unwrap();
    for _ in 0..40 {
        state
            .catalog
            .insert_download(&track.id, None, Provider::Youtube, DownloadStatus::Failed)
            .await
            .unwrap();
    }
    let queued = state
        .catalog
        .insert_download(&track.id, None, Provider::Youtube, DownloadStatus::Queued)
        .await
        .unwrap();

    let trimmed = state.catalog.trim_download_history(30).await.unwrap();
    assert_eq!(trimmed, 10);

    let remaining = state.catalog.list_downloads().await.unwrap();
    assert_eq!(remaining.len(), 31);
    // Non-terminal rows are never trimmed.
    assert!(remaining.iter().any(|d| d.id == queued.id));
}
