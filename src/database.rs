//! Database pool and schema migrations
//!
//! SQLite via sqlx. Schema evolution runs through an explicit, versioned
//! migration runner: each step has a number and a batch of statements,
//! applied once and recorded in `schema_migrations`. Re-running the runner
//! against an up-to-date database is a no-op.

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;

use crate::config::DatabaseSettings;
use crate::error::Result;

/// Create the application connection pool.
pub async fn create_pool(settings: &DatabaseSettings) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(&settings.url)
        .map_err(sqlx::Error::from)?
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(settings.max_connections)
        .acquire_timeout(settings.connection_timeout)
        .connect_with(options)
        .await?;

    Ok(pool)
}

/// In-memory pool for tests. A single connection keeps the shared schema
/// alive for the pool's lifetime.
pub async fn create_test_pool() -> SqlitePool {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .expect("valid sqlite url")
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .expect("in-memory pool");
    run_migrations(&pool).await.expect("migrations");
    pool
}

struct Migration {
    version: i64,
    name: &'static str,
    statements: &'static [&'static str],
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "initial schema",
        statements: &[
            r#"CREATE TABLE IF NOT EXISTS tracks (
                id TEXT PRIMARY KEY,
                artists TEXT NOT NULL,
                title TEXT NOT NULL,
                normalized_artists TEXT NOT NULL,
                normalized_title TEXT NOT NULL,
                duration_ms INTEGER,
                isrc TEXT,
                album TEXT,
                cover_url TEXT,
                genre TEXT,
                bpm REAL,
                release_date TEXT,
                spotify_added_at TEXT,
                explicit INTEGER NOT NULL DEFAULT 0,
                search_status TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )"#,
            r#"CREATE INDEX IF NOT EXISTS idx_tracks_normalized
                ON tracks (normalized_artists, normalized_title)"#,
            r#"CREATE TABLE IF NOT EXISTS track_identities (
                id TEXT PRIMARY KEY,
                track_id TEXT NOT NULL REFERENCES tracks (id) ON DELETE CASCADE,
                provider TEXT NOT NULL,
                provider_track_id TEXT NOT NULL,
                provider_url TEXT,
                fingerprint TEXT,
                created_at TEXT NOT NULL,
                UNIQUE (provider, provider_track_id)
            )"#,
            r#"CREATE TABLE IF NOT EXISTS playlists (
                id TEXT PRIMARY KEY,
                provider TEXT NOT NULL,
                provider_playlist_id TEXT,
                name TEXT NOT NULL,
                owner TEXT,
                snapshot TEXT,
                source_account_id TEXT,
                selected INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE (provider, provider_playlist_id)
            )"#,
            r#"CREATE TABLE IF NOT EXISTS playlist_tracks (
                playlist_id TEXT NOT NULL REFERENCES playlists (id) ON DELETE CASCADE,
                track_id TEXT NOT NULL REFERENCES tracks (id) ON DELETE CASCADE,
                position INTEGER,
                added_at TEXT,
                PRIMARY KEY (playlist_id, track_id)
            )"#,
            r#"CREATE TABLE IF NOT EXISTS search_candidates (
                id TEXT PRIMARY KEY,
                track_id TEXT NOT NULL REFERENCES tracks (id) ON DELETE CASCADE,
                provider TEXT NOT NULL,
                external_id TEXT NOT NULL,
                url TEXT NOT NULL,
                title TEXT NOT NULL,
                channel TEXT,
                duration_sec INTEGER,
                score REAL NOT NULL DEFAULT 0,
                chosen INTEGER NOT NULL DEFAULT 0,
                score_breakdown TEXT,
                created_at TEXT NOT NULL,
                UNIQUE (track_id, provider, external_id)
            )"#,
            r#"CREATE TABLE IF NOT EXISTS downloads (
                id TEXT PRIMARY KEY,
                track_id TEXT NOT NULL REFERENCES tracks (id) ON DELETE CASCADE,
                candidate_id TEXT,
                provider TEXT NOT NULL,
                status TEXT NOT NULL,
                filepath TEXT,
                format TEXT,
                filesize_bytes INTEGER,
                checksum TEXT,
                error_message TEXT,
                created_at TEXT NOT NULL,
                started_at TEXT,
                finished_at TEXT
            )"#,
            r#"CREATE INDEX IF NOT EXISTS idx_downloads_track_status
                ON downloads (track_id, status)"#,
            // At most one queued-or-running row per track.
            r#"CREATE UNIQUE INDEX IF NOT EXISTS idx_downloads_nonterminal_unique
                ON downloads (track_id) WHERE status IN ('queued', 'running')"#,
            r#"CREATE TABLE IF NOT EXISTS library_files (
                id TEXT PRIMARY KEY,
                track_id TEXT NOT NULL REFERENCES tracks (id) ON DELETE CASCADE,
                filepath TEXT NOT NULL UNIQUE,
                file_size INTEGER,
                file_mtime TEXT,
                checksum TEXT,
                container TEXT NOT NULL,
                created_at TEXT NOT NULL
            )"#,
            r#"CREATE TABLE IF NOT EXISTS source_accounts (
                id TEXT PRIMARY KEY,
                provider TEXT NOT NULL,
                provider_account_id TEXT NOT NULL,
                display_name TEXT,
                created_at TEXT NOT NULL,
                UNIQUE (provider, provider_account_id)
            )"#,
            r#"CREATE TABLE IF NOT EXISTS oauth_tokens (
                id TEXT PRIMARY KEY,
                account_id TEXT NOT NULL REFERENCES source_accounts (id) ON DELETE CASCADE,
                access_token TEXT NOT NULL,
                refresh_token_encrypted TEXT,
                expires_at TEXT,
                scope TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE (account_id)
            )"#,
            r#"CREATE TABLE IF NOT EXISTS oauth_states (
                state TEXT PRIMARY KEY,
                code_verifier TEXT NOT NULL,
                created_at TEXT NOT NULL
            )"#,
        ],
    },
];

/// Apply all pending migrations. Idempotent; safe to call on every boot.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL
        )"#,
    )
    .execute(pool)
    .await?;

    let applied: Vec<i64> = sqlx::query_scalar("SELECT version FROM schema_migrations")
        .fetch_all(pool)
        .await?;

    for migration in MIGRATIONS {
        if applied.contains(&migration.version) {
            continue;
        }
        let mut tx = pool.begin().await?;
        for statement in migration.statements {
            sqlx::query(statement).execute(&mut *tx).await?;
        }
        sqlx::query("INSERT INTO schema_migrations (version, name, applied_at) VALUES (?, ?, ?)")
            .bind(migration.version)
            .bind(migration.name)
            .bind(chrono::Utc::now().to_rfc3339())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        tracing::info!(
            version = migration.version,
            name = migration.name,
            "Applied migration"
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let pool = create_test_pool().await;
        // A second run must be a clean no-op.
        run_migrations(&pool).await.unwrap();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM schema_migrations")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, MIGRATIONS.len() as i64);
    }
}
