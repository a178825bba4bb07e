//! Persistent catalog
//!
//! One service over the SQLite pool, split by entity. Invariants live here:
//! the auto-created manual identity, the single chosen candidate per track
//! and the explicit per-entity cascade on track deletion run inside short
//! transactions; the single non-terminal download per track is a partial
//! unique index, so concurrent enqueues fail closed as a constraint
//! violation.

mod accounts;
mod candidates;
mod downloads;
mod library;
mod playlists;
mod tracks;

use sqlx::SqlitePool;

#[derive(Clone)]
pub struct CatalogService {
    pool: SqlitePool,
}

impl CatalogService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
