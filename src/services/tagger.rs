//! Audio post-processing: metadata and cover art
//!
//! After a successful extract the file carries whatever metadata the source
//! had. This module drops it and writes canonical tags from the catalog
//! track: ID3v2.3 with a v1 block appended for MPEG audio, ffmpeg
//! `-metadata` atoms for MP4-family containers. Cover art follows the
//! selection rule: a Spotify-origin cover URL wins over the extractor
//! thumbnail; embedding is best-effort and never fails the job.

use id3::TagLike;
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use crate::config::ExtractorSettings;
use crate::error::{AppError, Result};
use crate::models::Track;

/// Host pattern identifying Spotify-origin cover URLs.
const SPOTIFY_COVER_HOST: &str = "i.scdn.co";

const COVER_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

pub struct Tagger {
    settings: ExtractorSettings,
    http: reqwest::Client,
}

impl Tagger {
    pub fn new(settings: ExtractorSettings) -> Self {
        let http = reqwest::Client::builder()
            .timeout(COVER_FETCH_TIMEOUT)
            .build()
            .expect("reqwest client");
        Self { settings, http }
    }

    /// Strip source metadata and write canonical tags.
    pub async fn write_tags(&self, path: &Path, track: &Track) -> Result<()> {
        let container = extension_of(path);
        match container.as_str() {
            "mp3" => self.write_id3(path, track),
            _ if self.settings.download_fake => Ok(()),
            "m4a" | "mp4" | "aac" => self.remux_with_metadata(path, track).await,
            _ => self.remux_with_metadata(path, track).await,
        }
    }

    /// Embed cover art per the selection rule. Never fails the job.
    pub async fn embed_cover(&self, path: &Path, track: &Track) {
        let Some(url) = spotify_cover_url(track) else {
            // Without a Spotify cover the extractor thumbnail, carried
            // across the tag rewrite by write_tags, is the cover of record.
            return;
        };

        match self.fetch_cover(url).await {
            Err(err) => {
                tracing::warn!(track_id = %track.id, error = %err, "cover fetch failed, keeping file untouched");
            }
            Ok((mime, bytes)) => {
                if let Err(err) = self.attach_cover(path, &mime, bytes).await {
                    tracing::warn!(track_id = %track.id, error = %err, "cover embed failed");
                }
            }
        }
    }

    fn write_id3(&self, path: &Path, track: &Track) -> Result<()> {
        // The extractor-embedded thumbnail must survive the rewrite unless
        // a Spotify cover is going to replace it.
        let existing_pictures: Vec<id3::frame::Picture> = id3::Tag::read_from_path(path)
            .map(|tag| tag.pictures().cloned().collect())
            .unwrap_or_default();

        // Dropping the old tag is the "strip source metadata" step for MPEG.
        let _ = id3::Tag::remove_from_path(path);

        let mut tag = id3::Tag::new();
        tag.set_artist(track.artists.as_str());
        tag.set_title(track.title.as_str());
        if let Some(album) = &track.album {
            tag.set_album(album.as_str());
        }
        if let Some(genre) = &track.genre {
            tag.set_genre(genre.as_str());
        }
        if let Some(bpm) = track.bpm {
            tag.set_text("TBPM", format!("{}", bpm.round() as i64));
        }
        if let Some(date) = &track.release_date {
            // Release date rides in the grouping frame as-is, plus the
            // year/date frames both v2.3 and v2.4 readers look at.
            tag.set_text("TIT1", date.as_str());
            tag.set_text("GRP1", date.as_str());
            tag.set_text("TDRC", date.as_str());
            if let Some(year) = date.get(..4) {
                tag.set_text("TYER", year);
            }
        }

        if spotify_cover_url(track).is_none() {
            for picture in existing_pictures {
                tag.add_frame(picture);
            }
        }

        tag.write_to_path(path, id3::Version::Id3v23)
            .map_err(|e| AppError::internal(format!("id3 write failed: {e}")))?;
        append_id3v1(path, track)?;
        Ok(())
    }

    /// ffmpeg remux: drop all source metadata, write the generic atoms.
    async fn remux_with_metadata(&self, path: &Path, track: &Track) -> Result<()> {
        let container = extension_of(path);
        let temp = path.with_extension(format!("tagging.{container}"));

        let mut command = Command::new(&self.settings.ffmpeg_bin);
        command
            .arg("-y")
            .arg("-i")
            .arg(path)
            .arg("-map_metadata")
            .arg("-1")
            .arg("-c")
            .arg("copy")
            .arg("-metadata")
            .arg(format!("artist={}", track.artists))
            .arg("-metadata")
            .arg(format!("title={}", track.title));
        if let Some(album) = &track.album {
            command.arg("-metadata").arg(format!("album={album}"));
        }
        if let Some(genre) = &track.genre {
            command.arg("-metadata").arg(format!("genre={genre}"));
        }
        if let Some(date) = &track.release_date {
            command
                .arg("-metadata")
                .arg(format!("date={date}"))
                .arg("-metadata")
                .arg(format!("grouping={date}"));
        }
        command
            .arg(&temp)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        let output = command
            .output()
            .await
            .map_err(|e| AppError::internal(format!("ffmpeg spawn failed: {e}")))?;
        if !output.status.success() {
            let _ = tokio::fs::remove_file(&temp).await;
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AppError::internal(format!(
                "ffmpeg tagging failed: {}",
                stderr.lines().last().unwrap_or("unknown error")
            )));
        }
        tokio::fs::rename(&temp, path).await?;
        Ok(())
    }

    async fn fetch_cover(&self, url: &str) -> Result<(String, Vec<u8>)> {
        let response = self.http.get(url).send().await?;
        if !response.status().is_success() {
            return Err(AppError::ExternalService {
                service: SPOTIFY_COVER_HOST.to_string(),
                message: format!("cover fetch returned {}", response.status()),
            });
        }
        let bytes = response.bytes().await?.to_vec();
        let mime = if bytes.starts_with(&[0x89, 0x50, 0x4E]) {
            "image/png"
        } else {
            "image/jpeg"
        };
        Ok((mime.to_string(), bytes))
    }

    async fn attach_cover(&self, path: &Path, mime: &str, bytes: Vec<u8>) -> Result<()> {
        if extension_of(path) == "mp3" {
            let mut tag = id3::Tag::read_from_path(path).unwrap_or_default();
            // A Spotify cover disables any extractor-provided thumbnail.
            tag.remove("APIC");
            tag.add_frame(id3::frame::Picture {
                mime_type: mime.to_string(),
                picture_type: id3::frame::PictureType::CoverFront,
                description: "Cover".to_string(),
                data: bytes,
            });
            tag.write_to_path(path, id3::Version::Id3v23)
                .map_err(|e| AppError::internal(format!("id3 cover write failed: {e}")))?;
            return Ok(());
        }
        if self.settings.download_fake {
            return Ok(());
        }

        let container = extension_of(path);
        let cover_path = path.with_extension("cover.img");
        tokio::fs::write(&cover_path, &bytes).await?;
        let temp = path.with_extension(format!("cover.{container}"));

        let output = Command::new(&self.settings.ffmpeg_bin)
            .arg("-y")
            .arg("-i")
            .arg(path)
            .arg("-i")
            .arg(&cover_path)
            .arg("-map")
            .arg("0")
            .arg("-map")
            .arg("1")
            .arg("-c")
            .arg("copy")
            .arg("-disposition:v")
            .arg("attached_pic")
            .arg(&temp)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| AppError::internal(format!("ffmpeg spawn failed: {e}")))?;
        let _ = tokio::fs::remove_file(&cover_path).await;
        if !output.status.success() {
            let _ = tokio::fs::remove_file(&temp).await;
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AppError::internal(format!(
                "ffmpeg cover embed failed: {}",
                stderr.lines().last().unwrap_or("unknown error")
            )));
        }
        tokio::fs::rename(&temp, path).await?;
        Ok(())
    }
}

/// The track's cover URL when it is Spotify-origin; such a cover wins over
/// any extractor-provided thumbnail.
fn spotify_cover_url(track: &Track) -> Option<&str> {
    track
        .cover_url
        .as_deref()
        .filter(|url| url.contains(SPOTIFY_COVER_HOST))
}

/// Append an ID3v1 block so legacy readers see at least artist/title/album.
fn append_id3v1(path: &Path, track: &Track) -> Result<()> {
    fn field<const N: usize>(s: &str) -> [u8; N] {
        let mut out = [0u8; N];
        for (i, b) in s.bytes().take(N).enumerate() {
            out[i] = b;
        }
        out
    }

    let mut file = std::fs::OpenOptions::new().read(true).write(true).open(path)?;

    // Replace an existing trailer instead of stacking a second one.
    let len = file.metadata()?.len();
    if len >= 128 {
        use std::io::Read;
        file.seek(SeekFrom::End(-128))?;
        let mut marker = [0u8; 3];
        file.read_exact(&mut marker)?;
        if &marker == b"TAG" {
            file.set_len(len - 128)?;
        }
    }

    let mut block = Vec::with_capacity(128);
    block.extend_from_slice(b"TAG");
    block.extend_from_slice(&field::<30>(&track.title));
    block.extend_from_slice(&field::<30>(&track.artists));
    block.extend_from_slice(&field::<30>(track.album.as_deref().unwrap_or("")));
    let year = track
        .release_date
        .as_deref()
        .and_then(|d| d.get(..4))
        .unwrap_or("");
    block.extend_from_slice(&field::<4>(year));
    block.extend_from_slice(&[0u8; 30]);
    block.push(255);

    file.seek(SeekFrom::End(0))?;
    file.write_all(&block)?;
    Ok(())
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_lowercase()
}
