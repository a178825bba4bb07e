//! Application configuration module
//!
//! Centralized, environment-driven configuration with validation. Every
//! recognized variable has a development default so a bare `cargo run`
//! works against a local SQLite file with fake extractor fixtures.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Complete application configuration
#[derive(Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseSettings,
    pub spotify: SpotifySettings,
    pub library: LibrarySettings,
    pub extractor: ExtractorSettings,
    pub download: DownloadSettings,
    pub secret_key: String,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            server: ServerConfig::from_env(),
            database: DatabaseSettings::from_env(),
            spotify: SpotifySettings::from_env(),
            library: LibrarySettings::from_env()?,
            extractor: ExtractorSettings::from_env(),
            download: DownloadSettings::from_env(),
            secret_key: std::env::var("SECRET_KEY")
                .unwrap_or_else(|_| "dev_secret_key_change_me".to_string()),
        })
    }
}

/// HTTP server configuration
#[derive(Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
    pub log_level: String,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env_parse("PORT", 8080),
            cors_origins: std::env::var("CORS_ORIGINS")
                .map(|v| {
                    v.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            log_level: std::env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Database settings
#[derive(Clone)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: u32,
    pub connection_timeout: Duration,
}

impl DatabaseSettings {
    pub fn from_env() -> Self {
        Self {
            url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://music_grabber.db?mode=rwc".to_string()),
            max_connections: env_parse("DB_MAX_CONNECTIONS", 10),
            connection_timeout: Duration::from_secs(env_parse("DB_CONNECTION_TIMEOUT_SECS", 30)),
        }
    }
}

/// Spotify provider credentials and endpoints
#[derive(Clone)]
pub struct SpotifySettings {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub auth_url: String,
    pub token_url: String,
    pub api_base: String,
}

impl SpotifySettings {
    pub fn from_env() -> Self {
        Self {
            client_id: std::env::var("SPOTIFY_CLIENT_ID").unwrap_or_default(),
            client_secret: std::env::var("SPOTIFY_CLIENT_SECRET").unwrap_or_default(),
            redirect_uri: std::env::var("SPOTIFY_REDIRECT_URI").unwrap_or_else(|_| {
                "http://localhost:8080/api/v1/oauth/spotify/callback".to_string()
            }),
            auth_url: "https://accounts.spotify.com/authorize".to_string(),
            token_url: "https://accounts.spotify.com/api/token".to_string(),
            api_base: std::env::var("SPOTIFY_API_BASE")
                .unwrap_or_else(|_| "https://api.spotify.com/v1".to_string()),
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.client_id.is_empty() && !self.client_secret.is_empty()
    }
}

/// Library directory settings
#[derive(Clone)]
pub struct LibrarySettings {
    pub dir: PathBuf,
}

impl LibrarySettings {
    pub fn from_env() -> Result<Self, ConfigError> {
        let dir = std::env::var("LIBRARY_DIR").unwrap_or_else(|_| "./library".to_string());
        if dir.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "LIBRARY_DIR".to_string(),
                message: "must not be empty".to_string(),
            });
        }
        Ok(Self {
            dir: PathBuf::from(dir),
        })
    }
}

/// External extractor (yt-dlp) settings
#[derive(Clone)]
pub struct ExtractorSettings {
    pub yt_dlp_bin: String,
    pub ffmpeg_bin: String,
    pub search_fake: bool,
    pub search_fallback_fake: bool,
    pub download_fake: bool,
    pub search_limit: usize,
    pub search_timeout: Duration,
    pub search_max_pages: usize,
    pub search_page_size: usize,
    pub search_page_stop_threshold: f64,
    pub extractor_args: Option<String>,
    pub cookies_file: Option<PathBuf>,
    pub preferred_audio_format: String,
    pub embed_thumbnail: bool,
}

impl ExtractorSettings {
    pub fn from_env() -> Self {
        Self {
            yt_dlp_bin: std::env::var("YT_DLP_BIN").unwrap_or_else(|_| "yt-dlp".to_string()),
            ffmpeg_bin: std::env::var("FFMPEG_BIN").unwrap_or_else(|_| "ffmpeg".to_string()),
            search_fake: env_bool("YOUTUBE_SEARCH_FAKE", false),
            search_fallback_fake: env_bool("YOUTUBE_SEARCH_FALLBACK_FAKE", false),
            download_fake: env_bool("DOWNLOAD_FAKE", false),
            search_limit: env_parse("YOUTUBE_SEARCH_LIMIT", 10),
            search_timeout: Duration::from_secs(env_parse("YOUTUBE_SEARCH_TIMEOUT", 8)),
            search_max_pages: env_parse("YOUTUBE_SEARCH_MAX_PAGES", 3),
            search_page_size: env_parse("YOUTUBE_SEARCH_PAGE_SIZE", 10),
            search_page_stop_threshold: env_parse("YOUTUBE_SEARCH_PAGE_STOP_THRESHOLD", 140.0),
            extractor_args: std::env::var("DOWNLOAD_YTDLP_EXTRACTOR_ARGS").ok(),
            cookies_file: std::env::var("COOKIES_FILE").ok().map(PathBuf::from),
            preferred_audio_format: std::env::var("PREFERRED_AUDIO_FORMAT")
                .unwrap_or_else(|_| "mp3".to_string()),
            embed_thumbnail: env_bool("DOWNLOAD_EMBED_THUMBNAIL", true),
        }
    }
}

/// Download scheduler settings
#[derive(Clone)]
pub struct DownloadSettings {
    pub concurrency: usize,
    pub simulate_seconds: u64,
    pub worker_disabled: bool,
    pub history_keep: usize,
    pub search_concurrency: usize,
    pub min_autochoose_score: f64,
    pub recent_failure_window: Duration,
    pub stderr_capture_lines: usize,
}

impl DownloadSettings {
    pub fn from_env() -> Self {
        Self {
            concurrency: env_parse("DOWNLOAD_CONCURRENCY", 2),
            simulate_seconds: env_parse("DOWNLOAD_SIMULATE_SECONDS", 0),
            worker_disabled: env_bool("DISABLE_DOWNLOAD_WORKER", false),
            history_keep: env_parse("DOWNLOAD_HISTORY_KEEP", 30),
            search_concurrency: env_parse("AUTO_DOWNLOAD_SEARCH_CONCURRENCY", 3),
            min_autochoose_score: env_parse("MIN_AUTOCHOOSE_SCORE", 60.0),
            recent_failure_window: Duration::from_secs(env_parse(
                "RECENT_FAILURE_WINDOW_SECS",
                24 * 3600,
            )),
            stderr_capture_lines: env_parse("DOWNLOAD_STDERR_CAPTURE_LINES", 10),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn download_defaults() {
        let settings = DownloadSettings {
            concurrency: 2,
            simulate_seconds: 0,
            worker_disabled: false,
            history_keep: 30,
            search_concurrency: 3,
            min_autochoose_score: 60.0,
            recent_failure_window: Duration::from_secs(86400),
            stderr_capture_lines: 10,
        };
        assert_eq!(settings.history_keep, 30);
        assert!(!settings.worker_disabled);
    }

    #[test]
    fn env_bool_accepts_common_truthy_values() {
        for v in ["1", "true", "YES", "On"] {
            std::env::set_var("MG_TEST_BOOL", v);
            assert!(env_bool("MG_TEST_BOOL", false), "{v} should be truthy");
        }
        std::env::set_var("MG_TEST_BOOL", "0");
        assert!(!env_bool("MG_TEST_BOOL", true));
        std::env::remove_var("MG_TEST_BOOL");
    }
}
