//! Provider account and credential models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::Provider;

/// A connected provider account (one per provider user).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SourceAccount {
    pub id: String,
    pub provider: Provider,
    pub provider_account_id: String,
    pub display_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Stored OAuth token pair. The refresh token is encrypted at rest with the
/// process key; it never leaves this struct unredacted.
#[derive(Debug, Clone, FromRow)]
pub struct OAuthToken {
    pub id: String,
    pub account_id: String,
    pub access_token: String,
    pub refresh_token_encrypted: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub scope: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OAuthToken {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|e| e <= now).unwrap_or(false)
    }
}

/// Redacted token view for the listing endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct OAuthTokenView {
    pub id: String,
    pub account_id: String,
    pub has_refresh_token: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub scope: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl From<&OAuthToken> for OAuthTokenView {
    fn from(token: &OAuthToken) -> Self {
        Self {
            id: token.id.clone(),
            account_id: token.account_id.clone(),
            has_refresh_token: token.refresh_token_encrypted.is_some(),
            expires_at: token.expires_at,
            scope: token.scope.clone(),
            updated_at: token.updated_at,
        }
    }
}

/// Persisted PKCE state; single-use, expired after a few minutes.
#[derive(Debug, Clone, FromRow)]
pub struct OAuthState {
    pub state: String,
    pub code_verifier: String,
    pub created_at: DateTime<Utc>,
}
