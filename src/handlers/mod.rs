//! HTTP request handlers
//!
//! Thin adapters: parse the request, call one service, serialize the
//! result. Anything long-running is delegated to the scheduler or a
//! detached task; handlers never block on an external binary.

pub mod candidates;
pub mod downloads;
pub mod library;
pub mod oauth;
pub mod playlists;
pub mod tracks;
