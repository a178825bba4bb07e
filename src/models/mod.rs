//! Entity models and API DTOs
//!
//! Every persisted entity and every request/response body is an explicit
//! struct; nothing is shuttled through dynamic maps.

pub mod account;
pub mod candidate;
pub mod download;
pub mod library;
pub mod playlist;
pub mod sync;
pub mod track;

pub use account::*;
pub use candidate::*;
pub use download::*;
pub use library::*;
pub use playlist::*;
pub use sync::*;
pub use track::*;

use serde::{Deserialize, Serialize};

/// External catalog providers known to the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Provider {
    Manual,
    Spotify,
    Youtube,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Manual => "manual",
            Provider::Spotify => "spotify",
            Provider::Youtube => "youtube",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "manual" => Ok(Provider::Manual),
            "spotify" => Ok(Provider::Spotify),
            "youtube" => Ok(Provider::Youtube),
            other => Err(format!("unknown provider: {other}")),
        }
    }
}
