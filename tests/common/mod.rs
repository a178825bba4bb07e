//! Shared test fixtures: in-memory database, fake extractor, tiny config.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use music_grabber_backend::config::{
    AppConfig, DatabaseSettings, DownloadSettings, ExtractorSettings, LibrarySettings,
    ServerConfig, SpotifySettings,
};
use music_grabber_backend::services::ExtractorClient;
use music_grabber_backend::{create_test_pool, AppState, CreateTrackRequest};

pub fn test_config(library_dir: &Path) -> AppConfig {
    AppConfig {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            cors_origins: Vec::new(),
            log_level: "warn".to_string(),
        },
        database: DatabaseSettings {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            connection_timeout: Duration::from_secs(5),
        },
        spotify: SpotifySettings::from_env(),
        library: LibrarySettings {
            dir: library_dir.to_path_buf(),
        },
        extractor: ExtractorSettings {
            yt_dlp_bin: "yt-dlp".to_string(),
            ffmpeg_bin: "ffmpeg".to_string(),
            search_fake: true,
            search_fallback_fake: false,
            download_fake: true,
            search_limit: 10,
            search_timeout: Duration::from_secs(8),
            search_max_pages: 3,
            search_page_size: 10,
            search_page_stop_threshold: 140.0,
            extractor_args: None,
            cookies_file: None,
            preferred_audio_format: "mp3".to_string(),
            embed_thumbnail: false,
        },
        download: DownloadSettings {
            concurrency: 2,
            simulate_seconds: 0,
            worker_disabled: false,
            history_keep: 30,
            search_concurrency: 2,
            min_autochoose_score: 60.0,
            recent_failure_window: Duration::from_secs(24 * 3600),
            stderr_capture_lines: 10,
        },
        secret_key: "test-secret".to_string(),
    }
}

pub async fn test_state(extractor: Arc<dyn ExtractorClient>, library_dir: &Path) -> AppState {
    let pool = create_test_pool().await;
    AppState::build(test_config(library_dir), pool, extractor)
}

pub fn track_request(artists: &str, title: &str, duration_ms: Option<i64>) -> CreateTrackRequest {
    CreateTrackRequest {
        artists: artists.to_string(),
        title: title.to_string(),
        duration_ms,
        isrc: None,
        album: None,
        cover_url: None,
        genre: None,
        bpm: None,
        release_date: None,
        spotify_added_at: None,
        explicit: false,
    }
}

/// Poll until `predicate` returns true or the timeout elapses.
pub async fn wait_until<F, Fut>(timeout: Duration, mut predicate: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if predicate().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}
