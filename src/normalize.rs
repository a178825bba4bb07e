//! Track text normalization
//!
//! Pure functions mapping raw `(artists, title)` strings to canonical,
//! lowercase token form. The ranking engine and the catalog de-duplication
//! key both consume this module, so the output must be deterministic:
//! identical input bytes always produce identical output bytes, and the
//! functions are idempotent.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Feature markers pulled out of titles and attributed to the artist list.
static FEAT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)[\(\[\s]*(?:feat\.?|ft\.?|featuring)\s+([^\)\]]+)[\)\]]?").unwrap());

static REMIX_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\b(remix|edit|rework|flip)\b").unwrap());
static LIVE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\blive\b").unwrap());
static REMASTER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bremaster(ed)?\b").unwrap());

static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Version/content flags extracted from the raw title.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TitleFlags {
    pub is_remix_or_edit: bool,
    pub is_live: bool,
    pub is_remaster: bool,
}

/// Canonical form of a `(artists, title)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Normalized {
    /// All artist credits, normalized, in credit order.
    pub artists: Vec<String>,
    /// First credit; what most matching starts from.
    pub primary_artist: String,
    /// Normalized artist string (credits joined with ", ").
    pub clean_artists: String,
    /// Normalized title with feature markers removed.
    pub clean_title: String,
    pub flags: TitleFlags,
}

/// Lowercase, strip punctuation (keeping `&`, which carries meaning in duo
/// names and inside titles), collapse whitespace.
pub fn normalize_text(raw: &str) -> String {
    let lowered = raw.to_lowercase();
    let stripped: String = lowered
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c.is_whitespace() || c == '&' {
                c
            } else {
                ' '
            }
        })
        .collect();
    WHITESPACE_RE.replace_all(stripped.trim(), " ").to_string()
}

/// Whitespace tokenization of an already-normalized string.
pub fn tokens(normalized: &str) -> Vec<&str> {
    normalized.split_whitespace().filter(|t| *t != "&").collect()
}

/// Split a raw multi-artist credit string into individual credits.
///
/// `,`, `×` and `/` always separate credits. A bare `&` between two names is
/// almost always a duo name ("Block & Crown"), so `&` only splits when the
/// string also contains a comma ("A, B & C" list form).
fn split_artist_credits(raw: &str) -> Vec<String> {
    let has_comma = raw.contains(',');
    let mut credits = Vec::new();
    for part in raw.split([',', '×', '/']) {
        if has_comma && part.contains('&') {
            for sub in part.split('&') {
                push_credit(&mut credits, sub);
            }
        } else {
            push_credit(&mut credits, part);
        }
    }
    credits
}

fn push_credit(credits: &mut Vec<String>, raw: &str) {
    let cleaned = normalize_text(raw);
    if !cleaned.is_empty() && !credits.contains(&cleaned) {
        credits.push(cleaned);
    }
}

/// Normalize a raw `(artists, title)` pair.
pub fn normalize(artists: &str, title: &str) -> Normalized {
    let flags = TitleFlags {
        is_remix_or_edit: REMIX_RE.is_match(title),
        is_live: LIVE_RE.is_match(title),
        is_remaster: REMASTER_RE.is_match(title),
    };

    // Pull feature credits out of the title and fold them into the artists.
    let mut featured: Vec<String> = Vec::new();
    let stripped_title = FEAT_RE
        .replace_all(title, |caps: &regex::Captures| {
            featured.extend(split_artist_credits(&caps[1]));
            String::new()
        })
        .to_string();

    // Feature markers may also live in the artist string itself.
    let stripped_artists = FEAT_RE
        .replace_all(artists, |caps: &regex::Captures| {
            featured.extend(split_artist_credits(&caps[1]));
            String::new()
        })
        .to_string();

    let mut credits = split_artist_credits(&stripped_artists);
    for feat in featured {
        if !credits.contains(&feat) {
            credits.push(feat);
        }
    }

    let primary_artist = credits.first().cloned().unwrap_or_default();
    let clean_artists = credits.join(", ");
    let clean_title = normalize_text(&stripped_title);

    Normalized {
        artists: credits,
        primary_artist,
        clean_artists,
        clean_title,
        flags,
    }
}
