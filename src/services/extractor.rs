//! External extractor client
//!
//! Abstracts the "search a video platform + download audio" tool behind a
//! trait so the scheduler and handlers never touch the subprocess directly.
//! The real implementation shells out to yt-dlp; the fake implementation
//! returns canned data and writes placeholder files, and is what every
//! automated test runs against.

use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::Instant;

use crate::config::ExtractorSettings;
use crate::error::{AppError, Result};
use crate::ranking::{rank, RankCandidate, RankQuery, RankingConfig};

/// Search tuning passed per call.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub limit: usize,
    pub pages: usize,
    /// Stop paging once the best-so-far score crosses this.
    pub stop_score: Option<f64>,
    /// Extra words appended to the platform text query (not to the ranking
    /// reference), e.g. "extended".
    pub query_suffix: Option<String>,
}

impl SearchOptions {
    pub fn from_settings(settings: &ExtractorSettings) -> Self {
        Self {
            limit: settings.search_limit,
            pages: settings.search_max_pages,
            stop_score: Some(settings.search_page_stop_threshold),
            query_suffix: None,
        }
    }
}

/// A download order for one candidate.
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub url: String,
    pub output_dir: PathBuf,
    /// Target file name without extension.
    pub file_stem: String,
    pub preferred_format: String,
}

/// What came back from a successful download.
#[derive(Debug, Clone)]
pub struct DownloadedAudio {
    pub filepath: PathBuf,
    pub container: String,
    pub bytes: u64,
    pub checksum: String,
}

#[async_trait]
pub trait ExtractorClient: Send + Sync {
    /// Query the platform. Returns raw candidates in platform order; an
    /// expired search budget yields an empty list, not an error.
    async fn search(&self, query: &RankQuery, options: &SearchOptions)
        -> Result<Vec<RankCandidate>>;

    /// Produce an audio file in the target directory.
    async fn download(&self, request: &DownloadRequest) -> Result<DownloadedAudio>;
}

/// Build the configured client. Fake toggles win so tests and demo setups
/// never spawn subprocesses.
pub fn build_extractor(settings: &ExtractorSettings) -> Arc<dyn ExtractorClient> {
    if settings.search_fake || settings.download_fake {
        Arc::new(FakeExtractor::default())
    } else {
        Arc::new(YtDlpExtractor::new(settings.clone(), RankingConfig::default()))
    }
}

// ---------------------------------------------------------------------------
// yt-dlp implementation
// ---------------------------------------------------------------------------

pub struct YtDlpExtractor {
    settings: ExtractorSettings,
    ranking: RankingConfig,
}

impl YtDlpExtractor {
    pub fn new(settings: ExtractorSettings, ranking: RankingConfig) -> Self {
        Self { settings, ranking }
    }

    /// Startup probe; a missing binary outside fake mode is fatal.
    pub async fn verify_available(settings: &ExtractorSettings) -> Result<()> {
        let status = Command::new(&settings.yt_dlp_bin)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
        match status {
            Ok(status) if status.success() => Ok(()),
            _ => Err(AppError::internal(format!(
                "extractor binary not found or not runnable: {}",
                settings.yt_dlp_bin
            ))),
        }
    }

    /// One flat search of `count` results.
    async fn search_page(
        &self,
        text_query: &str,
        count: usize,
        budget: Duration,
    ) -> Result<Vec<RankCandidate>> {
        let mut command = Command::new(&self.settings.yt_dlp_bin);
        command
            .arg("--no-update")
            .arg("--flat-playlist")
            .arg("-j")
            .arg(format!("ytsearch{count}:{text_query}"))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cookies) = &self.settings.cookies_file {
            command.arg("--cookies").arg(cookies);
        }

        let output = match tokio::time::timeout(budget, command.output()).await {
            Err(_) => return Err(AppError::Extractor("search timed out".to_string())),
            Ok(result) => result.map_err(|e| AppError::Extractor(e.to_string()))?,
        };
        if !output.status.success() {
            return Err(AppError::Extractor(stderr_prefix(&output.stderr, 10)));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let mut candidates = Vec::new();
        for line in stdout.lines() {
            let Ok(json) = serde_json::from_str::<Value>(line) else {
                continue;
            };
            let id = json["id"].as_str().unwrap_or_default().to_string();
            let title = json["title"].as_str().unwrap_or_default().to_string();
            if id.is_empty() || title.is_empty() {
                continue;
            }
            let channel = json["channel"]
                .as_str()
                .or_else(|| json["uploader"].as_str())
                .map(|s| s.to_string());
            let duration_sec = json["duration"].as_f64().map(|d| d as i64);
            candidates.push(RankCandidate {
                id,
                title,
                channel,
                duration_sec,
            });
        }
        Ok(candidates)
    }
}

#[async_trait]
impl ExtractorClient for YtDlpExtractor {
    async fn search(
        &self,
        query: &RankQuery,
        options: &SearchOptions,
    ) -> Result<Vec<RankCandidate>> {
        let mut text_query = format!("{} {}", query.artists, query.title);
        if let Some(suffix) = &options.query_suffix {
            text_query.push(' ');
            text_query.push_str(suffix);
        }
        let deadline = Instant::now() + self.settings.search_timeout;
        let page_size = self.settings.search_page_size.max(1);
        let mut seen: Vec<RankCandidate> = Vec::new();
        let mut best_score = f64::NEG_INFINITY;

        for page in 1..=options.pages.max(1) {
            let budget = deadline.saturating_duration_since(Instant::now());
            if budget.is_zero() {
                tracing::warn!(query = %text_query, "search wall-clock budget exhausted");
                break;
            }
            let count = page * page_size;
            let page_results = match self.search_page(&text_query, count, budget).await {
                Ok(results) => results,
                Err(AppError::Extractor(message)) if message == "search timed out" => {
                    tracing::warn!(query = %text_query, "search timed out");
                    break;
                }
                Err(err) => return Err(err),
            };

            let fresh: Vec<RankCandidate> = page_results
                .into_iter()
                .filter(|c| !seen.iter().any(|s| s.id == c.id))
                .collect();
            if let Some(top) = rank(query, &fresh, &self.ranking).first() {
                best_score = best_score.max(top.score);
            }
            seen.extend(fresh);

            if seen.len() >= options.limit {
                break;
            }
            if let Some(stop) = options.stop_score {
                if best_score >= stop {
                    break;
                }
            }
        }

        if seen.is_empty() && self.settings.search_fallback_fake {
            tracing::warn!(query = %text_query, "empty search result, substituting canned fallback");
            return FakeExtractor::default().search(query, options).await;
        }

        seen.truncate(options.limit);
        Ok(seen)
    }

    async fn download(&self, request: &DownloadRequest) -> Result<DownloadedAudio> {
        tokio::fs::create_dir_all(&request.output_dir).await?;
        let template = request
            .output_dir
            .join(format!("{}.%(ext)s", request.file_stem));

        let mut command = Command::new(&self.settings.yt_dlp_bin);
        command
            .arg("--no-update")
            .arg("-x")
            .arg("--audio-format")
            .arg(&request.preferred_format)
            .arg("--audio-quality")
            .arg("0")
            .arg("--ffmpeg-location")
            .arg(&self.settings.ffmpeg_bin)
            .arg("-o")
            .arg(&template)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if self.settings.embed_thumbnail {
            command.arg("--embed-thumbnail");
        }
        if let Some(args) = &self.settings.extractor_args {
            command.arg("--extractor-args").arg(args);
        }
        if let Some(cookies) = &self.settings.cookies_file {
            command.arg("--cookies").arg(cookies);
        }
        command.arg(&request.url);

        let output = command
            .output()
            .await
            .map_err(|e| AppError::Extractor(e.to_string()))?;
        if !output.status.success() {
            return Err(AppError::Extractor(stderr_prefix(&output.stderr, 10)));
        }

        // The postprocessor decides the final extension; probe for it.
        let filepath = find_output_file(&request.output_dir, &request.file_stem)
            .await?
            .ok_or_else(|| {
                AppError::Extractor("download reported success but produced no file".to_string())
            })?;
        let container = filepath
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("bin")
            .to_string();
        let bytes = tokio::fs::metadata(&filepath).await?.len();
        let checksum = super::sha256_file(&filepath).await?;

        Ok(DownloadedAudio {
            filepath,
            container,
            bytes,
            checksum,
        })
    }
}

async fn find_output_file(dir: &std::path::Path, stem: &str) -> Result<Option<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.file_stem().and_then(|s| s.to_str()) == Some(stem) {
            return Ok(Some(path));
        }
    }
    Ok(None)
}

fn stderr_prefix(stderr: &[u8], lines: usize) -> String {
    String::from_utf8_lossy(stderr)
        .lines()
        .take(lines)
        .collect::<Vec<_>>()
        .join("\n")
}

// ---------------------------------------------------------------------------
// Fake implementation for tests and demo mode
// ---------------------------------------------------------------------------

/// Deterministic stand-in. By default every search yields one strong match
/// plus noise; construct with [`FakeExtractor::empty`] or
/// [`FakeExtractor::with_candidates`] to steer test scenarios.
#[derive(Default)]
pub struct FakeExtractor {
    canned: Option<Vec<RankCandidate>>,
}

impl FakeExtractor {
    pub fn empty() -> Self {
        Self {
            canned: Some(Vec::new()),
        }
    }

    pub fn with_candidates(candidates: Vec<RankCandidate>) -> Self {
        Self {
            canned: Some(candidates),
        }
    }
}

#[async_trait]
impl ExtractorClient for FakeExtractor {
    async fn search(
        &self,
        query: &RankQuery,
        options: &SearchOptions,
    ) -> Result<Vec<RankCandidate>> {
        if let Some(canned) = &self.canned {
            let mut out = canned.clone();
            out.truncate(options.limit);
            return Ok(out);
        }
        let mut out = vec![
            RankCandidate {
                id: "fake-perfect".to_string(),
                title: format!("{} - {}", query.artists, query.title),
                channel: Some(format!("{} - Topic", query.artists)),
                duration_sec: query.duration_ms.map(|ms| ms / 1000),
            },
            RankCandidate {
                id: "fake-cover".to_string(),
                title: format!("{} (Cover by Somebody Else)", query.title),
                channel: Some("Somebody Else".to_string()),
                duration_sec: query.duration_ms.map(|ms| ms / 1000 + 30),
            },
            RankCandidate {
                id: "fake-short".to_string(),
                title: format!("{} - {} (Preview)", query.artists, query.title),
                channel: Some("Previews".to_string()),
                duration_sec: query.duration_ms.map(|ms| (ms / 1000 / 2).max(10)),
            },
        ];
        out.truncate(options.limit);
        Ok(out)
    }

    async fn download(&self, request: &DownloadRequest) -> Result<DownloadedAudio> {
        tokio::fs::create_dir_all(&request.output_dir).await?;
        let filepath = request
            .output_dir
            .join(format!("{}.{}", request.file_stem, request.preferred_format));
        let body = format!("placeholder audio for {}\n", request.url);
        tokio::fs::write(&filepath, body.as_bytes()).await?;
        let checksum = super::sha256_file(&filepath).await?;
        Ok(DownloadedAudio {
            filepath,
            container: request.preferred_format.clone(),
            bytes: body.len() as u64,
            checksum,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query() -> RankQuery {
        RankQuery {
            artists: "Block & Crown".to_string(),
            title: "Lonely Heart".to_string(),
            duration_ms: Some(240_000),
        }
    }

    #[tokio::test]
    async fn fake_search_is_deterministic() {
        let fake = FakeExtractor::default();
        let options = SearchOptions {
            limit: 10,
            pages: 1,
            stop_score: None,
            query_suffix: None,
        };
        let first = fake.search(&query(), &options).await.unwrap();
        let second = fake.search(&query(), &options).await.unwrap();
        assert_eq!(first.len(), 3);
        assert_eq!(first[0].id, second[0].id);
        assert_eq!(first[0].title, "Block & Crown - Lonely Heart");
    }

    #[tokio::test]
    async fn fake_search_honors_limit() {
        let fake = FakeExtractor::default();
        let options = SearchOptions {
            limit: 1,
            pages: 1,
            stop_score: None,
            query_suffix: None,
        };
        let results = fake.search(&query(), &options).await.unwrap();
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn fake_download_writes_placeholder_file() {
        let dir = tempfile::tempdir().unwrap();
        let fake = FakeExtractor::default();
        let downloaded = fake
            .download(&DownloadRequest {
                url: "https://example.invalid/watch?v=abc".to_string(),
                output_dir: dir.path().to_path_buf(),
                file_stem: "Artist - Title".to_string(),
                preferred_format: "mp3".to_string(),
            })
            .await
            .unwrap();
        assert!(downloaded.filepath.exists());
        assert_eq!(downloaded.container, "mp3");
        assert!(downloaded.bytes > 0);
        assert_eq!(downloaded.checksum.len(), 64);
    }
}
