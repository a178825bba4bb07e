//! Personal music acquisition service backend
//!
//! A curated track catalog, a deterministic candidate ranking engine over
//! extractor searches, a bounded-concurrency download scheduler, and the
//! post-processing pipeline that turns a download into a tagged library
//! file, fronted by a JSON API under `/api/v1`.

use axum::{
    extract::State,
    response::Json,
    routing::{delete, get, post, put},
    Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

pub mod config;
pub mod database;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod normalize;
pub mod ranking;
pub mod services;

// Re-export commonly used types
pub use config::{AppConfig, ConfigError, DownloadSettings, ExtractorSettings, SpotifySettings};
pub use database::{create_pool, create_test_pool, run_migrations};
pub use error::{AppError, ErrorResponse, Result};
pub use models::*;
pub use normalize::{normalize, normalize_text, Normalized};
pub use ranking::{rank, score_candidate, RankCandidate, RankQuery, RankingConfig, ScoredCandidate};
pub use services::{
    build_extractor, CatalogService, DownloadScheduler, ExtractorClient, FakeExtractor,
    SpotifyClient, SyncIngestor, Tagger, TokenVault,
};

use services::spotify::TokenBroker;

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub catalog: CatalogService,
    pub scheduler: DownloadScheduler,
    pub extractor: Arc<dyn ExtractorClient>,
    pub spotify: Option<Arc<SpotifyClient>>,
    pub tokens: Arc<TokenBroker>,
    pub sync: Arc<SyncIngestor>,
    pub ranking: RankingConfig,
}

impl AppState {
    /// Wire up the full service graph from configuration and a pool.
    pub fn build(
        config: AppConfig,
        pool: sqlx::SqlitePool,
        extractor: Arc<dyn ExtractorClient>,
    ) -> Self {
        let catalog = CatalogService::new(pool);
        let ranking = RankingConfig::default();
        let vault = Arc::new(TokenVault::new(&config.secret_key));

        let spotify = if config.spotify.is_configured() {
            SpotifyClient::new(config.spotify.clone())
                .map(Arc::new)
                .ok()
        } else {
            None
        };
        let tokens = Arc::new(TokenBroker::new(
            catalog.clone(),
            vault,
            spotify.clone(),
        ));

        let provider: Arc<dyn services::spotify::MusicCatalogProvider> = match &spotify {
            Some(client) => client.clone(),
            // Without credentials the sync endpoints answer 401 through the
            // broker before any provider call happens.
            None => Arc::new(UnconfiguredProvider),
        };
        let sync = Arc::new(SyncIngestor::new(
            catalog.clone(),
            provider,
            tokens.clone(),
        ));

        let tagger = Tagger::new(config.extractor.clone());
        let scheduler = DownloadScheduler::new(
            catalog.clone(),
            extractor.clone(),
            tagger,
            config.library.dir.clone(),
            config.download.clone(),
            config.extractor.clone(),
            ranking.clone(),
        );

        Self {
            config,
            catalog,
            scheduler,
            extractor,
            spotify,
            tokens,
            sync,
            ranking,
        }
    }
}

/// Provider stub used when Spotify credentials are absent.
struct UnconfiguredProvider;

#[async_trait::async_trait]
impl services::spotify::MusicCatalogProvider for UnconfiguredProvider {
    async fn playlists(
        &self,
        _access_token: &str,
    ) -> Result<Vec<services::spotify::ProviderPlaylist>> {
        Err(AppError::NotConnected)
    }

    async fn playlist_tracks(
        &self,
        _access_token: &str,
        _provider_playlist_id: &str,
    ) -> Result<Vec<services::spotify::ProviderTrack>> {
        Err(AppError::NotConnected)
    }
}

#[derive(Serialize)]
struct InfoResponse {
    name: &'static str,
    version: &'static str,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: chrono::DateTime<chrono::Utc>,
    database: bool,
}

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    use handlers::{candidates, downloads, library, oauth, playlists, tracks};

    let api = Router::new()
        // Tracks
        .route("/tracks", get(tracks::list_tracks_handler))
        .route("/tracks", post(tracks::create_track_handler))
        .route(
            "/tracks/normalize/preview",
            get(tracks::normalize_preview_handler),
        )
        .route(
            "/tracks/with_playlist_info",
            get(tracks::with_playlist_info_handler),
        )
        .route(
            "/tracks/ready_for_download",
            get(tracks::ready_for_download_handler),
        )
        .route("/tracks/import", post(tracks::import_tracks_handler))
        .route("/tracks/export", get(tracks::export_tracks_handler))
        .route("/tracks/:id", get(tracks::get_track_handler))
        .route("/tracks/:id", put(tracks::update_track_handler))
        .route("/tracks/:id", delete(tracks::delete_track_handler))
        .route(
            "/tracks/:id/youtube/search",
            get(tracks::youtube_search_handler),
        )
        .route(
            "/tracks/:id/cover/refresh",
            post(tracks::cover_refresh_handler),
        )
        .route("/tracks/:id/identities", get(tracks::identities_handler))
        // Candidates
        .route("/candidates", get(candidates::list_candidates_handler))
        .route("/candidates", post(candidates::create_candidate_handler))
        .route(
            "/candidates/enriched",
            get(candidates::list_enriched_candidates_handler),
        )
        .route("/candidates/:id", get(candidates::get_candidate_handler))
        .route(
            "/candidates/:id",
            delete(candidates::delete_candidate_handler),
        )
        .route(
            "/candidates/:id/choose",
            post(candidates::choose_candidate_handler),
        )
        // Downloads
        .route("/downloads", get(downloads::list_downloads_handler))
        .route(
            "/downloads/with_tracks",
            get(downloads::list_downloads_with_tracks_handler),
        )
        .route("/downloads/enqueue", post(downloads::enqueue_handler))
        .route("/downloads/cancel/:id", post(downloads::cancel_handler))
        .route("/downloads/stop_all", post(downloads::stop_all_handler))
        .route(
            "/downloads/restart_worker",
            post(downloads::restart_worker_handler),
        )
        .route("/downloads/status", get(downloads::status_handler))
        .route("/downloads/logs", get(downloads::logs_handler))
        .route(
            "/downloads/cookies/status",
            get(downloads::cookies_status_handler),
        )
        // Library
        .route("/library/files", get(library::list_library_files_handler))
        .route("/library/files/scan", post(library::scan_library_handler))
        .route(
            "/library/files/reindex_from_tracks",
            post(library::reindex_from_tracks_handler),
        )
        .route(
            "/library/files/resync",
            post(library::resync_library_handler),
        )
        .route("/library/files/:id", get(library::get_library_file_handler))
        .route(
            "/library/files/:id",
            delete(library::delete_library_file_handler),
        )
        .route(
            "/library/files/:id/download",
            get(library::download_library_file_handler),
        )
        .route(
            "/library/files/:id/stream",
            get(library::stream_library_file_handler),
        )
        .route(
            "/library/files/:id/reveal",
            post(library::reveal_library_file_handler),
        )
        // Playlists
        .route("/playlists", get(playlists::list_playlists_handler))
        .route("/playlists/stats", get(playlists::playlist_stats_handler))
        .route(
            "/playlists/memberships",
            post(playlists::memberships_handler),
        )
        .route(
            "/playlists/spotify/discover",
            get(playlists::spotify_discover_handler),
        )
        .route(
            "/playlists/spotify/select",
            post(playlists::spotify_select_handler),
        )
        .route(
            "/playlists/spotify/sync",
            post(playlists::spotify_sync_handler),
        )
        .route(
            "/playlists/:id/entries",
            get(playlists::playlist_entries_handler),
        )
        .route(
            "/playlists/:id/auto_download",
            post(playlists::auto_download_handler),
        )
        .route(
            "/playlists/:id/retry_not_found",
            post(playlists::retry_not_found_handler),
        )
        // Credentials
        .route("/oauth/tokens", get(oauth::list_tokens_handler))
        .route(
            "/oauth/spotify/authorize",
            get(oauth::spotify_authorize_handler),
        )
        .route(
            "/oauth/spotify/callback",
            get(oauth::spotify_callback_handler),
        )
        .route(
            "/oauth/spotify/refresh",
            post(oauth::spotify_refresh_handler),
        )
        .route(
            "/oauth/spotify/ensure_account",
            post(oauth::spotify_ensure_account_handler),
        );

    Router::new()
        .route("/health", get(health_handler))
        .route("/info", get(info_handler))
        .nest("/api/v1", api)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(middleware::create_cors_layer(
                    &state.config.server.cors_origins,
                )),
        )
        .with_state(state)
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let database = sqlx::query_scalar::<_, i64>("SELECT 1")
        .fetch_one(state.catalog.pool())
        .await
        .is_ok();
    Json(HealthResponse {
        status: if database { "ok" } else { "degraded" },
        timestamp: chrono::Utc::now(),
        database,
    })
}

async fn info_handler() -> Json<InfoResponse> {
    Json(InfoResponse {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
    })
}
