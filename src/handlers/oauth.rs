//! Credential endpoints: Spotify OAuth PKCE flow and token listing
//!
//! Token material never leaves redacted: the listing exposes presence and
//! expiry only, and the callback response carries the account, not the
//! tokens.

use axum::extract::{Query, State};
use axum::response::Json;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::{OAuthTokenView, Provider, SourceAccount};
use crate::AppState;

pub async fn list_tokens_handler(
    State(state): State<AppState>,
) -> Result<Json<Vec<OAuthTokenView>>> {
    let tokens = state.catalog.list_tokens().await?;
    Ok(Json(tokens.iter().map(OAuthTokenView::from).collect()))
}

#[derive(Debug, Serialize)]
pub struct AuthorizeResponse {
    pub auth_url: String,
    pub state: String,
}

/// Start the PKCE flow: the verifier is persisted server-side keyed by the
/// state parameter, never handed to the browser.
pub async fn spotify_authorize_handler(
    State(state): State<AppState>,
) -> Result<Json<AuthorizeResponse>> {
    let client = state.spotify.as_ref().ok_or_else(|| {
        AppError::validation("spotify is not configured; set SPOTIFY_CLIENT_ID/SECRET")
    })?;
    let (auth_url, oauth_state, verifier) = client.authorize_url();
    state
        .catalog
        .insert_oauth_state(&oauth_state, &verifier)
        .await?;
    Ok(Json(AuthorizeResponse {
        auth_url,
        state: oauth_state,
    }))
}

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    pub code: String,
    pub state: String,
}

#[derive(Debug, Serialize)]
pub struct CallbackResponse {
    pub account: SourceAccount,
    pub connected: bool,
}

pub async fn spotify_callback_handler(
    State(state): State<AppState>,
    Query(params): Query<CallbackParams>,
) -> Result<Json<CallbackResponse>> {
    let client = state.spotify.as_ref().ok_or_else(|| {
        AppError::validation("spotify is not configured; set SPOTIFY_CLIENT_ID/SECRET")
    })?;

    let verifier = state.catalog.take_oauth_state(&params.state).await?;
    let tokens = client.exchange_code(&params.code, &verifier).await?;
    let profile = client.current_user(&tokens.access_token).await?;

    let account = state
        .catalog
        .upsert_account(
            Provider::Spotify,
            &profile.id,
            profile.display_name.as_deref(),
        )
        .await?;
    state.tokens.store_token_set(&account.id, &tokens).await?;

    Ok(Json(CallbackResponse {
        account,
        connected: true,
    }))
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub account_id: String,
}

pub async fn spotify_refresh_handler(
    State(state): State<AppState>,
    Json(request): Json<RefreshRequest>,
) -> Result<Json<OAuthTokenView>> {
    state.catalog.get_account(&request.account_id).await?;
    state.tokens.force_refresh(&request.account_id).await?;
    let token = state
        .catalog
        .get_token(&request.account_id)
        .await?
        .ok_or(AppError::NotConnected)?;
    Ok(Json(OAuthTokenView::from(&token)))
}

#[derive(Debug, Default, Deserialize)]
pub struct EnsureAccountRequest {
    #[serde(default)]
    pub account_id: Option<String>,
}

/// Verify a usable Spotify connection exists and return its account,
/// refreshing the token when the stored one is stale.
pub async fn spotify_ensure_account_handler(
    State(state): State<AppState>,
    Json(request): Json<EnsureAccountRequest>,
) -> Result<Json<SourceAccount>> {
    let account = match request.account_id {
        Some(account_id) => state.catalog.get_account(&account_id).await?,
        None => state
            .catalog
            .list_accounts(Some(Provider::Spotify))
            .await?
            .into_iter()
            .next()
            .ok_or(AppError::NotConnected)?,
    };
    state.tokens.access_token(&account.id).await?;
    Ok(Json(account))
}
