//! Provider account and OAuth credential repository

use chrono::{DateTime, Duration, Utc};
use sqlx::Sqlite;

use super::{new_id, CatalogService};
use crate::error::{AppError, Result};
use crate::models::{OAuthState, OAuthToken, Provider, SourceAccount};

/// PKCE states older than this are unusable.
const OAUTH_STATE_TTL_MINUTES: i64 = 10;

impl CatalogService {
    pub async fn upsert_account(
        &self,
        provider: Provider,
        provider_account_id: &str,
        display_name: Option<&str>,
    ) -> Result<SourceAccount> {
        sqlx::query(
            r#"INSERT INTO source_accounts
               (id, provider, provider_account_id, display_name, created_at)
               VALUES (?, ?, ?, ?, ?)
               ON CONFLICT (provider, provider_account_id) DO UPDATE SET
                 display_name = excluded.display_name"#,
        )
        .bind(new_id())
        .bind(provider)
        .bind(provider_account_id)
        .bind(display_name)
        .bind(Utc::now())
        .execute(self.pool())
        .await?;

        sqlx::query_as::<Sqlite, SourceAccount>(
            "SELECT * FROM source_accounts WHERE provider = ? AND provider_account_id = ?",
        )
        .bind(provider)
        .bind(provider_account_id)
        .fetch_optional(self.pool())
        .await?
        .ok_or_else(|| AppError::not_found("SourceAccount"))
    }

    pub async fn get_account(&self, id: &str) -> Result<SourceAccount> {
        sqlx::query_as::<Sqlite, SourceAccount>("SELECT * FROM source_accounts WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| AppError::not_found("SourceAccount"))
    }

    pub async fn list_accounts(&self, provider: Option<Provider>) -> Result<Vec<SourceAccount>> {
        let rows = match provider {
            Some(provider) => {
                sqlx::query_as::<Sqlite, SourceAccount>(
                    "SELECT * FROM source_accounts WHERE provider = ? ORDER BY created_at",
                )
                .bind(provider)
                .fetch_all(self.pool())
                .await?
            }
            None => {
                sqlx::query_as::<Sqlite, SourceAccount>(
                    "SELECT * FROM source_accounts ORDER BY created_at",
                )
                .fetch_all(self.pool())
                .await?
            }
        };
        Ok(rows)
    }

    /// Store or replace the token pair for an account. The refresh token
    /// must already be encrypted by the vault.
    pub async fn store_token(
        &self,
        account_id: &str,
        access_token: &str,
        refresh_token_encrypted: Option<&str>,
        expires_at: Option<DateTime<Utc>>,
        scope: Option<&str>,
    ) -> Result<OAuthToken> {
        let now = Utc::now();
        sqlx::query(
            r#"INSERT INTO oauth_tokens
               (id, account_id, access_token, refresh_token_encrypted, expires_at, scope,
                created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT (account_id) DO UPDATE SET
                 access_token = excluded.access_token,
                 refresh_token_encrypted =
                   COALESCE(excluded.refresh_token_encrypted, oauth_tokens.refresh_token_encrypted),
                 expires_at = excluded.expires_at,
                 scope = COALESCE(excluded.scope, oauth_tokens.scope),
                 updated_at = excluded.updated_at"#,
        )
        .bind(new_id())
        .bind(account_id)
        .bind(access_token)
        .bind(refresh_token_encrypted)
        .bind(expires_at)
        .bind(scope)
        .bind(now)
        .bind(now)
        .execute(self.pool())
        .await?;

        self.get_token(account_id)
            .await?
            .ok_or_else(|| AppError::not_found("OAuthToken"))
    }

    pub async fn get_token(&self, account_id: &str) -> Result<Option<OAuthToken>> {
        Ok(
            sqlx::query_as::<Sqlite, OAuthToken>(
                "SELECT * FROM oauth_tokens WHERE account_id = ?",
            )
            .bind(account_id)
            .fetch_optional(self.pool())
            .await?,
        )
    }

    pub async fn list_tokens(&self) -> Result<Vec<OAuthToken>> {
        Ok(
            sqlx::query_as::<Sqlite, OAuthToken>(
                "SELECT * FROM oauth_tokens ORDER BY created_at",
            )
            .fetch_all(self.pool())
            .await?,
        )
    }

    pub async fn insert_oauth_state(&self, state: &str, code_verifier: &str) -> Result<()> {
        sqlx::query("INSERT INTO oauth_states (state, code_verifier, created_at) VALUES (?, ?, ?)")
            .bind(state)
            .bind(code_verifier)
            .bind(Utc::now())
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Consume a PKCE state: return its verifier and delete the row. Stale
    /// states are rejected.
    pub async fn take_oauth_state(&self, state: &str) -> Result<String> {
        let row = sqlx::query_as::<Sqlite, OAuthState>(
            "SELECT * FROM oauth_states WHERE state = ?",
        )
        .bind(state)
        .fetch_optional(self.pool())
        .await?
        .ok_or_else(|| AppError::validation("unknown or already-used oauth state"))?;

        sqlx::query("DELETE FROM oauth_states WHERE state = ?")
            .bind(state)
            .execute(self.pool())
            .await?;

        if row.created_at < Utc::now() - Duration::minutes(OAUTH_STATE_TTL_MINUTES) {
            return Err(AppError::validation("oauth state expired"));
        }
        Ok(row.code_verifier)
    }
}
