//! Service layer

pub mod catalog;
pub mod extractor;
pub mod logbuf;
pub mod scheduler;
pub mod spotify;
pub mod sync;
pub mod tagger;
pub mod timestamps;
pub mod token_vault;

pub use catalog::CatalogService;
pub use extractor::{
    build_extractor, DownloadRequest, DownloadedAudio, ExtractorClient, FakeExtractor,
    SearchOptions, YtDlpExtractor,
};
pub use logbuf::LogRingBuffer;
pub use scheduler::DownloadScheduler;
pub use spotify::SpotifyClient;
pub use sync::SyncIngestor;
pub use tagger::Tagger;
pub use timestamps::FileTimestamps;
pub use token_vault::TokenVault;

use sha2::{Digest, Sha256};
use std::path::Path;

/// Replace filesystem-hostile characters in a filename component.
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '-',
            _ => c,
        })
        .collect::<String>()
        .trim()
        .to_string()
}

/// Hex SHA-256 of a file's contents.
pub async fn sha256_file(path: &Path) -> std::io::Result<String> {
    let bytes = tokio::fs::read(path).await?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}
