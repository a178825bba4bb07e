//! Spotify Web API client and OAuth PKCE flow
//!
//! The client owns the authorization-code + PKCE exchange (via the oauth2
//! crate) and the handful of Web API calls the sync ingestor needs. The
//! [`MusicCatalogProvider`] trait is the seam the ingestor consumes, so
//! tests run against a fake provider instead of the network.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use oauth2::basic::BasicClient;
use oauth2::reqwest::async_http_client;
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, PkceCodeChallenge,
    PkceCodeVerifier, RedirectUrl, RefreshToken, Scope, TokenResponse, TokenUrl,
};
use reqwest::StatusCode;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use crate::config::SpotifySettings;
use crate::error::{AppError, Result};
use crate::services::{CatalogService, TokenVault};

/// A playlist as the provider reports it.
#[derive(Debug, Clone)]
pub struct ProviderPlaylist {
    pub provider_playlist_id: String,
    pub name: String,
    pub owner: Option<String>,
    pub snapshot: Option<String>,
    pub track_count: Option<i64>,
}

/// A playlist entry as the provider reports it.
#[derive(Debug, Clone)]
pub struct ProviderTrack {
    pub provider_track_id: String,
    pub artists: String,
    pub title: String,
    pub duration_ms: Option<i64>,
    pub isrc: Option<String>,
    pub album: Option<String>,
    pub cover_url: Option<String>,
    pub release_date: Option<String>,
    pub explicit: bool,
    pub added_at: Option<DateTime<Utc>>,
    pub position: i64,
}

/// The catalog surface the sync ingestor depends on.
#[async_trait]
pub trait MusicCatalogProvider: Send + Sync {
    async fn playlists(&self, access_token: &str) -> Result<Vec<ProviderPlaylist>>;
    async fn playlist_tracks(
        &self,
        access_token: &str,
        provider_playlist_id: &str,
    ) -> Result<Vec<ProviderTrack>>;
}

/// Result of a token exchange or refresh.
#[derive(Debug, Clone)]
pub struct TokenSet {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub scope: Option<String>,
}

pub struct SpotifyClient {
    settings: SpotifySettings,
    oauth: BasicClient,
    http: reqwest::Client,
}

impl SpotifyClient {
    pub fn new(settings: SpotifySettings) -> Result<Self> {
        let oauth = BasicClient::new(
            ClientId::new(settings.client_id.clone()),
            Some(ClientSecret::new(settings.client_secret.clone())),
            AuthUrl::new(settings.auth_url.clone())
                .map_err(|e| AppError::internal(format!("invalid auth url: {e}")))?,
            Some(
                TokenUrl::new(settings.token_url.clone())
                    .map_err(|e| AppError::internal(format!("invalid token url: {e}")))?,
            ),
        )
        .set_redirect_uri(
            RedirectUrl::new(settings.redirect_uri.clone())
                .map_err(|e| AppError::internal(format!("invalid redirect uri: {e}")))?,
        );

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| AppError::internal(format!("http client: {e}")))?;

        Ok(Self {
            settings,
            oauth,
            http,
        })
    }

    /// Build the PKCE authorization URL. Returns `(url, state, verifier)`;
    /// the caller persists state/verifier for the callback.
    pub fn authorize_url(&self) -> (String, String, String) {
        let (challenge, verifier) = PkceCodeChallenge::new_random_sha256();
        let (url, csrf) = self
            .oauth
            .authorize_url(CsrfToken::new_random)
            .add_scope(Scope::new("playlist-read-private".to_string()))
            .add_scope(Scope::new("playlist-read-collaborative".to_string()))
            .add_scope(Scope::new("user-library-read".to_string()))
            .set_pkce_challenge(challenge)
            .url();
        (
            url.to_string(),
            csrf.secret().clone(),
            verifier.secret().clone(),
        )
    }

    pub async fn exchange_code(&self, code: &str, verifier: &str) -> Result<TokenSet> {
        let response = self
            .oauth
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .set_pkce_verifier(PkceCodeVerifier::new(verifier.to_string()))
            .request_async(async_http_client)
            .await
            .map_err(|e| AppError::ExternalService {
                service: "spotify".to_string(),
                message: format!("code exchange failed: {e}"),
            })?;
        Ok(Self::token_set_from(response))
    }

    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenSet> {
        let response = self
            .oauth
            .exchange_refresh_token(&RefreshToken::new(refresh_token.to_string()))
            .request_async(async_http_client)
            .await
            .map_err(|e| AppError::ExternalService {
                service: "spotify".to_string(),
                message: format!("token refresh failed: {e}"),
            })?;
        Ok(Self::token_set_from(response))
    }

    fn token_set_from(
        response: oauth2::basic::BasicTokenResponse,
    ) -> TokenSet {
        TokenSet {
            access_token: response.access_token().secret().clone(),
            refresh_token: response.refresh_token().map(|t| t.secret().clone()),
            expires_at: response
                .expires_in()
                .and_then(|d| ChronoDuration::from_std(d).ok())
                .map(|d| Utc::now() + d),
            scope: response
                .scopes()
                .map(|s| s.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(" ")),
        }
    }

    /// The authenticated user's profile.
    pub async fn current_user(&self, access_token: &str) -> Result<SpotifyUserProfile> {
        self.api_get(access_token, &format!("{}/me", self.settings.api_base))
            .await
    }

    /// The album cover URL for one provider track, if the catalog has one.
    pub async fn track_cover_url(
        &self,
        access_token: &str,
        provider_track_id: &str,
    ) -> Result<Option<String>> {
        let track: TrackObject = self
            .api_get(
                access_token,
                &format!(
                    "{}/tracks/{}",
                    self.settings.api_base,
                    urlencoding::encode(provider_track_id)
                ),
            )
            .await?;
        Ok(track
            .album
            .and_then(|a| a.images.first().map(|i| i.url.clone())))
    }

    async fn api_get<T: for<'de> Deserialize<'de>>(
        &self,
        access_token: &str,
        url: &str,
    ) -> Result<T> {
        let response = self
            .http
            .get(url)
            .bearer_auth(access_token)
            .send()
            .await?;
        match response.status() {
            StatusCode::UNAUTHORIZED => Err(AppError::AuthExpired),
            status if !status.is_success() => Err(AppError::ExternalService {
                service: "spotify".to_string(),
                message: format!("{url} returned {status}"),
            }),
            _ => Ok(response.json::<T>().await?),
        }
    }
}

#[async_trait]
impl MusicCatalogProvider for SpotifyClient {
    async fn playlists(&self, access_token: &str) -> Result<Vec<ProviderPlaylist>> {
        let mut out = Vec::new();
        let mut url = format!("{}/me/playlists?limit=50", self.settings.api_base);
        loop {
            let page: Paging<PlaylistObject> = self.api_get(access_token, &url).await?;
            for item in page.items {
                out.push(ProviderPlaylist {
                    provider_playlist_id: item.id,
                    name: item.name,
                    owner: item.owner.and_then(|o| o.display_name.or(Some(o.id))),
                    snapshot: item.snapshot_id,
                    track_count: item.tracks.map(|t| t.total),
                });
            }
            match page.next {
                Some(next) => url = next,
                None => break,
            }
        }
        Ok(out)
    }

    async fn playlist_tracks(
        &self,
        access_token: &str,
        provider_playlist_id: &str,
    ) -> Result<Vec<ProviderTrack>> {
        let mut out = Vec::new();
        let mut url = format!(
            "{}/playlists/{}/tracks?limit=100",
            self.settings.api_base,
            urlencoding::encode(provider_playlist_id)
        );
        let mut position: i64 = 0;
        loop {
            let page: Paging<PlaylistItem> = self.api_get(access_token, &url).await?;
            for item in page.items {
                let Some(track) = item.track else {
                    continue;
                };
                let Some(id) = track.id else {
                    // Local files have no catalog id; nothing to sync.
                    continue;
                };
                out.push(ProviderTrack {
                    provider_track_id: id,
                    artists: track
                        .artists
                        .iter()
                        .map(|a| a.name.clone())
                        .collect::<Vec<_>>()
                        .join(", "),
                    title: track.name,
                    duration_ms: track.duration_ms,
                    isrc: track.external_ids.and_then(|e| e.isrc),
                    album: track.album.as_ref().map(|a| a.name.clone()),
                    cover_url: track
                        .album
                        .as_ref()
                        .and_then(|a| a.images.first().map(|i| i.url.clone())),
                    release_date: track.album.and_then(|a| a.release_date),
                    explicit: track.explicit,
                    added_at: item.added_at,
                    position,
                });
                position += 1;
            }
            match page.next {
                Some(next) => url = next,
                None => break,
            }
        }
        Ok(out)
    }
}

/// Resolves a usable access token for an account, refreshing through the
/// vault-stored refresh token when the stored one is stale.
pub struct TokenBroker {
    catalog: CatalogService,
    vault: Arc<TokenVault>,
    client: Option<Arc<SpotifyClient>>,
}

impl TokenBroker {
    pub fn new(
        catalog: CatalogService,
        vault: Arc<TokenVault>,
        client: Option<Arc<SpotifyClient>>,
    ) -> Self {
        Self {
            catalog,
            vault,
            client,
        }
    }

    pub async fn access_token(&self, account_id: &str) -> Result<String> {
        let token = self
            .catalog
            .get_token(account_id)
            .await?
            .ok_or(AppError::NotConnected)?;
        if !token.is_expired(Utc::now()) {
            return Ok(token.access_token);
        }
        self.force_refresh(account_id).await
    }

    /// Refresh regardless of stored expiry; used for the single
    /// retry-after-401 pass.
    pub async fn force_refresh(&self, account_id: &str) -> Result<String> {
        let token = self
            .catalog
            .get_token(account_id)
            .await?
            .ok_or(AppError::NotConnected)?;
        let encrypted = token.refresh_token_encrypted.ok_or(AppError::AuthExpired)?;
        let client = self.client.as_ref().ok_or(AppError::NotConnected)?;

        let refresh_token = self.vault.decrypt(&encrypted)?;
        let fresh = client.refresh(&refresh_token).await?;
        let encrypted_refresh = match &fresh.refresh_token {
            Some(rotated) => Some(self.vault.encrypt(rotated)?),
            None => None,
        };
        self.catalog
            .store_token(
                account_id,
                &fresh.access_token,
                encrypted_refresh.as_deref(),
                fresh.expires_at,
                fresh.scope.as_deref(),
            )
            .await?;
        Ok(fresh.access_token)
    }

    /// Exchange-and-store path used by the OAuth callback: encrypts the
    /// refresh token and upserts the account's credentials.
    pub async fn store_token_set(&self, account_id: &str, tokens: &TokenSet) -> Result<()> {
        let encrypted_refresh = match &tokens.refresh_token {
            Some(refresh) => Some(self.vault.encrypt(refresh)?),
            None => None,
        };
        self.catalog
            .store_token(
                account_id,
                &tokens.access_token,
                encrypted_refresh.as_deref(),
                tokens.expires_at,
                tokens.scope.as_deref(),
            )
            .await?;
        Ok(())
    }
}

/// The provider's user profile (only what ensure_account needs).
#[derive(Debug, Clone, Deserialize)]
pub struct SpotifyUserProfile {
    pub id: String,
    pub display_name: Option<String>,
}

// Wire DTOs, private to this module.

#[derive(Deserialize)]
struct Paging<T> {
    items: Vec<T>,
    next: Option<String>,
}

#[derive(Deserialize)]
struct PlaylistObject {
    id: String,
    name: String,
    snapshot_id: Option<String>,
    owner: Option<OwnerObject>,
    tracks: Option<TracksRef>,
}

#[derive(Deserialize)]
struct OwnerObject {
    id: String,
    display_name: Option<String>,
}

#[derive(Deserialize)]
struct TracksRef {
    total: i64,
}

#[derive(Deserialize)]
struct PlaylistItem {
    added_at: Option<DateTime<Utc>>,
    track: Option<TrackObject>,
}

#[derive(Deserialize)]
struct TrackObject {
    id: Option<String>,
    name: String,
    duration_ms: Option<i64>,
    explicit: bool,
    artists: Vec<ArtistObject>,
    album: Option<AlbumObject>,
    external_ids: Option<ExternalIds>,
}

#[derive(Deserialize)]
struct ArtistObject {
    name: String,
}

#[derive(Deserialize)]
struct AlbumObject {
    name: String,
    release_date: Option<String>,
    #[serde(default)]
    images: Vec<ImageObject>,
}

#[derive(Deserialize)]
struct ImageObject {
    url: String,
}

#[derive(Deserialize)]
struct ExternalIds {
    isrc: Option<String>,
}
