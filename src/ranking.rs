//! Candidate ranking engine
//!
//! Scores extractor search results against a reference `(artists, title,
//! duration)` query. Scoring is deterministic and transparent: every applied
//! rule appends one [`ScoreDetail`] entry that consumers render verbatim,
//! and the final ordering is a stable descending sort (ties keep input
//! order). All constants live in [`RankingConfig`]; nothing is hardcoded in
//! the algorithm body.
//!
//! Four independent score families are summed:
//! - artist: each reference credit searched in the candidate title (with
//!   consumption from a working copy) and in the channel name (with
//!   well-known suffixes stripped)
//! - title: exact working-title match, else per-token match/miss, then a
//!   floored penalty for tokens left over in the working copy
//! - extended: a single large bonus when an extended/club/original-mix
//!   mention survives and the base match quality clears the gates
//! - duration: large negative for shorter candidates, proportional bonus up
//!   to a ratio cap for longer ones

use serde::{Deserialize, Serialize};

use crate::normalize::{normalize, normalize_text, tokens};

/// Channel name suffixes ignored when matching artists against the channel.
const CHANNEL_SUFFIXES: [&str; 6] = [
    " - topic",
    " - official",
    " - audio",
    "vevo",
    " official",
    " music",
];

/// Mentions eligible for the extended-version bonus.
const EXTENDED_KEYWORDS: [&str; 2] = ["extended", "club"];
const EXTENDED_PHRASE: [&str; 2] = ["original", "mix"];

/// Every tunable constant of the scoring algorithm.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingConfig {
    pub artist_bonus_per_match: f64,
    pub artist_penalty_per_miss: f64,
    pub title_exact_match_bonus: f64,
    pub title_token_bonus_per_match: f64,
    pub title_token_penalty_per_miss: f64,
    pub title_remaining_token_penalty: f64,
    /// Signed floor on the aggregate remaining-token contribution.
    pub title_remaining_token_penalty_max: f64,
    pub extended_large_bonus: f64,
    pub extended_max_remaining_penalty_allowed: f64,
    pub extended_min_artist_score: f64,
    pub extended_min_title_score: f64,
    pub duration_penalty_too_short: f64,
    pub duration_max_ratio: f64,
    pub duration_bonus_min: f64,
    pub duration_bonus_max: f64,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            artist_bonus_per_match: 50.0,
            artist_penalty_per_miss: 20.0,
            title_exact_match_bonus: 100.0,
            title_token_bonus_per_match: 15.0,
            title_token_penalty_per_miss: 10.0,
            title_remaining_token_penalty: 10.0,
            title_remaining_token_penalty_max: -30.0,
            extended_large_bonus: 40.0,
            extended_max_remaining_penalty_allowed: 20.0,
            extended_min_artist_score: 25.0,
            extended_min_title_score: 10.0,
            duration_penalty_too_short: -100.0,
            duration_max_ratio: 2.0,
            duration_bonus_min: 0.0,
            duration_bonus_max: 15.0,
        }
    }
}

/// Reference query the candidates are scored against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankQuery {
    pub artists: String,
    pub title: String,
    pub duration_ms: Option<i64>,
}

/// One raw search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankCandidate {
    pub id: String,
    pub title: String,
    pub channel: Option<String>,
    pub duration_sec: Option<i64>,
}

/// Score family a detail entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreFamily {
    Artist,
    Title,
    Extended,
    Duration,
}

/// One applied scoring rule, rendered verbatim by consumers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreDetail {
    pub key: String,
    pub value: f64,
    pub family: ScoreFamily,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl ScoreDetail {
    fn new(family: ScoreFamily, key: String, value: f64) -> Self {
        Self {
            key,
            value,
            family,
            note: None,
        }
    }

    fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

/// Per-family subtotals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreComponents {
    pub artist: f64,
    pub title: f64,
    pub extended: f64,
    pub duration: f64,
}

/// A candidate with its computed score attached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredCandidate {
    #[serde(flatten)]
    pub candidate: RankCandidate,
    pub score: f64,
    pub components: ScoreComponents,
    pub details: Vec<ScoreDetail>,
}

/// Score and order candidates for a query, best first. Equal scores keep
/// their input order.
pub fn rank(
    query: &RankQuery,
    candidates: &[RankCandidate],
    config: &RankingConfig,
) -> Vec<ScoredCandidate> {
    let mut scored: Vec<ScoredCandidate> = candidates
        .iter()
        .map(|c| score_candidate(query, c, config))
        .collect();
    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    scored
}

/// Score a single candidate against the query.
pub fn score_candidate(
    query: &RankQuery,
    candidate: &RankCandidate,
    config: &RankingConfig,
) -> ScoredCandidate {
    let reference = normalize(&query.artists, &query.title);
    let mut details = Vec::new();
    let mut components = ScoreComponents::default();

    // Working copy of the candidate title, consumed as matches are awarded
    // so the same span is never counted twice.
    let mut working = normalize_text(&candidate.title);
    let channel = candidate
        .channel
        .as_deref()
        .map(clean_channel)
        .unwrap_or_default();

    // Artist family: each reference credit against title then channel.
    // Matches are taken at word boundaries only.
    for credit in &reference.artists {
        if let Some(pos) = find_word_boundary(&working, credit) {
            working.replace_range(pos..pos + credit.len(), " ");
            working = collapse(&working);
            components.artist += config.artist_bonus_per_match;
            details.push(ScoreDetail::new(
                ScoreFamily::Artist,
                format!("artist.match:{credit}"),
                config.artist_bonus_per_match,
            ));
        } else if !channel.is_empty() && find_word_boundary(&channel, credit).is_some() {
            components.artist += config.artist_bonus_per_match;
            details.push(
                ScoreDetail::new(
                    ScoreFamily::Artist,
                    format!("artist.match:{credit}"),
                    config.artist_bonus_per_match,
                )
                .with_note("channel"),
            );
        } else {
            components.artist -= config.artist_penalty_per_miss;
            details.push(ScoreDetail::new(
                ScoreFamily::Artist,
                format!("artist.miss:{credit}"),
                -config.artist_penalty_per_miss,
            ));
        }
    }

    // Title family: exact working-title match wins, otherwise token by token.
    let mut title_match_score = 0.0;
    let mut working_tokens: Vec<String>;
    if !reference.clean_title.is_empty() && working == reference.clean_title {
        title_match_score += config.title_exact_match_bonus;
        details.push(ScoreDetail::new(
            ScoreFamily::Title,
            format!("title.exact:{}", reference.clean_title),
            config.title_exact_match_bonus,
        ));
        working_tokens = Vec::new();
    } else {
        working_tokens = working.split_whitespace().map(str::to_string).collect();
        for token in tokens(&reference.clean_title) {
            if let Some(pos) = working_tokens.iter().position(|t| t == token) {
                working_tokens.remove(pos);
                title_match_score += config.title_token_bonus_per_match;
                details.push(ScoreDetail::new(
                    ScoreFamily::Title,
                    format!("title.match:{token}"),
                    config.title_token_bonus_per_match,
                ));
            } else {
                title_match_score -= config.title_token_penalty_per_miss;
                details.push(ScoreDetail::new(
                    ScoreFamily::Title,
                    format!("title.miss:{token}"),
                    -config.title_token_penalty_per_miss,
                ));
            }
        }
    }

    // Extended mention detection, before the survivors are penalized: its
    // tokens do not count against the remaining-token penalty.
    let extended_mention = detect_extended(&mut working_tokens);

    // Remaining-token penalty with a signed floor.
    let mut remaining_penalty = 0.0;
    for token in working_tokens.iter().filter(|t| t.as_str() != "&") {
        let floored = (remaining_penalty - config.title_remaining_token_penalty)
            .max(config.title_remaining_token_penalty_max);
        let step = floored - remaining_penalty;
        if step == 0.0 {
            details.push(
                ScoreDetail::new(ScoreFamily::Title, format!("title.remaining:{token}"), 0.0)
                    .with_note("penalty floor reached"),
            );
        } else {
            details.push(ScoreDetail::new(
                ScoreFamily::Title,
                format!("title.remaining:{token}"),
                step,
            ));
        }
        remaining_penalty = floored;
    }
    components.title = title_match_score + remaining_penalty;

    // Extended family: the large bonus only lands on a solid base match.
    if let Some(mention) = extended_mention {
        let gates_pass = remaining_penalty.abs() <= config.extended_max_remaining_penalty_allowed
            && components.artist >= config.extended_min_artist_score
            && title_match_score >= config.extended_min_title_score;
        if gates_pass {
            components.extended = config.extended_large_bonus;
            details.push(ScoreDetail::new(
                ScoreFamily::Extended,
                format!("extended.bonus:{mention}"),
                config.extended_large_bonus,
            ));
        } else {
            details.push(
                ScoreDetail::new(ScoreFamily::Extended, format!("extended.skip:{mention}"), 0.0)
                    .with_note("base match below gates"),
            );
        }
    }

    // Duration family.
    if let (Some(reference_ms), Some(candidate_sec)) = (query.duration_ms, candidate.duration_sec) {
        let reference_sec = reference_ms as f64 / 1000.0;
        let delta = candidate_sec as f64 - reference_sec;
        if delta < 0.0 {
            components.duration = config.duration_penalty_too_short;
            details.push(ScoreDetail::new(
                ScoreFamily::Duration,
                format!("duration.too-short:{}", config.duration_penalty_too_short),
                config.duration_penalty_too_short,
            ));
        } else if delta > 0.0 {
            let span = (config.duration_max_ratio - 1.0) * reference_sec;
            let fraction = if span > 0.0 { (delta / span).min(1.0) } else { 1.0 };
            let bonus = config.duration_bonus_min
                + fraction * (config.duration_bonus_max - config.duration_bonus_min);
            components.duration = bonus;
            details.push(ScoreDetail::new(
                ScoreFamily::Duration,
                format!("duration.bonus:+{bonus:.1}"),
                bonus,
            ));
        }
    }

    let score = components.artist + components.title + components.extended + components.duration;

    ScoredCandidate {
        candidate: candidate.clone(),
        score,
        components,
        details,
    }
}

/// Strip well-known channel suffixes, then normalize.
fn clean_channel(raw: &str) -> String {
    let mut lowered = raw.to_lowercase();
    loop {
        let before = lowered.len();
        for suffix in CHANNEL_SUFFIXES {
            if let Some(stripped) = lowered.strip_suffix(suffix) {
                lowered = stripped.trim_end().to_string();
            }
        }
        if lowered.len() == before {
            break;
        }
    }
    normalize_text(&lowered)
}

/// Find an extended/club/original-mix mention in the surviving tokens and
/// remove the mention's own tokens so they escape the remaining penalty.
/// Returns the matched keyword for the detail entry.
fn detect_extended(working_tokens: &mut Vec<String>) -> Option<String> {
    for keyword in EXTENDED_KEYWORDS {
        if let Some(pos) = working_tokens.iter().position(|t| t == keyword) {
            working_tokens.remove(pos);
            return Some(keyword.to_string());
        }
    }
    // "original mix" only counts as an adjacent phrase.
    if let Some(pos) = working_tokens
        .windows(2)
        .position(|w| w[0] == EXTENDED_PHRASE[0] && w[1] == EXTENDED_PHRASE[1])
    {
        working_tokens.drain(pos..pos + 2);
        return Some("original mix".to_string());
    }
    None
}

fn collapse(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Byte offset of `needle` in `haystack` where both ends land on word
/// boundaries, so a short credit never matches inside a longer word.
fn find_word_boundary(haystack: &str, needle: &str) -> Option<usize> {
    if needle.is_empty() {
        return None;
    }
    let mut start = 0;
    while let Some(rel) = haystack[start..].find(needle) {
        let pos = start + rel;
        let end = pos + needle.len();
        let before_ok = pos == 0
            || haystack[..pos]
                .chars()
                .next_back()
                .is_some_and(|c| !c.is_alphanumeric());
        let after_ok = end == haystack.len()
            || haystack[end..].chars().next().is_some_and(|c| !c.is_alphanumeric());
        if before_ok && after_ok {
            return Some(pos);
        }
        start = pos + needle.len().max(1);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(title: &str, channel: &str, duration_sec: i64) -> RankCandidate {
        RankCandidate {
            id: "vid-1".to_string(),
            title: title.to_string(),
            channel: Some(channel.to_string()),
            duration_sec: Some(duration_sec),
        }
    }

    #[test]
    fn perfect_match_scores_150() {
        let query = RankQuery {
            artists: "Block & Crown".to_string(),
            title: "Lonely Heart".to_string(),
            duration_ms: Some(240_000),
        };
        let scored = score_candidate(
            &query,
            &candidate("Block & Crown - Lonely Heart", "Block & Crown - Topic", 240),
            &RankingConfig::default(),
        );
        assert_eq!(scored.components.artist, 50.0);
        assert_eq!(scored.components.title, 100.0);
        assert_eq!(scored.components.extended, 0.0);
        assert_eq!(scored.components.duration, 0.0);
        assert_eq!(scored.score, 150.0);
    }

    #[test]
    fn extended_bonus_applies_when_gates_pass() {
        let query = RankQuery {
            artists: "AUSMAX".to_string(),
            title: "Love".to_string(),
            duration_ms: Some(159_000),
        };
        let scored = score_candidate(
            &query,
            &candidate("AUSMAX - Love (Extended Mix)", "FOXsound Official", 324),
            &RankingConfig::default(),
        );
        assert_eq!(scored.components.artist, 50.0);
        // "love" token match +15, surviving "mix" -10
        assert_eq!(scored.components.title, 5.0);
        assert_eq!(scored.components.extended, 40.0);
        // 324s is past 2.0x of 159s, so the bonus is capped at its maximum.
        assert_eq!(scored.components.duration, 15.0);
        assert_eq!(scored.score, 110.0);
        assert!(scored
            .details
            .iter()
            .any(|d| d.key == "extended.bonus:extended"));
    }

    #[test]
    fn wrong_artist_is_demoted_below_perfect_match() {
        let config = RankingConfig::default();
        let query = RankQuery {
            artists: "Block & Crown".to_string(),
            title: "Lonely Heart".to_string(),
            duration_ms: Some(240_000),
        };
        let perfect = score_candidate(
            &query,
            &candidate("Block & Crown - Lonely Heart", "Block & Crown - Topic", 240),
            &config,
        );
        let wrong = score_candidate(
            &query,
            &candidate("Other Artist - Lonely Heart", "Other Artist", 240),
            &config,
        );
        assert_eq!(wrong.components.artist, -20.0);
        // two token matches +30, remaining "other"/"artist" -20
        assert_eq!(wrong.components.title, 10.0);
        assert!(wrong.score < perfect.score);
    }

    #[test]
    fn too_short_candidate_takes_large_penalty() {
        let config = RankingConfig::default();
        let query = RankQuery {
            artists: "Block & Crown".to_string(),
            title: "Lonely Heart".to_string(),
            duration_ms: Some(240_000),
        };
        let scored = score_candidate(
            &query,
            &candidate("Block & Crown - Lonely Heart", "Block & Crown - Topic", 120),
            &config,
        );
        assert_eq!(scored.components.duration, -100.0);
        assert!(scored.score < 150.0);
        assert!(scored
            .details
            .iter()
            .any(|d| d.key == "duration.too-short:-100"));
    }

    #[test]
    fn duration_exactly_equal_scores_zero() {
        let query = RankQuery {
            artists: "A".to_string(),
            title: "B".to_string(),
            duration_ms: Some(200_000),
        };
        let scored = score_candidate(
            &query,
            &candidate("A - B", "A", 200),
            &RankingConfig::default(),
        );
        assert_eq!(scored.components.duration, 0.0);
    }

    #[test]
    fn duration_at_max_ratio_hits_max_bonus_and_beyond_stays_capped() {
        let config = RankingConfig::default();
        let query = RankQuery {
            artists: "A".to_string(),
            title: "B".to_string(),
            duration_ms: Some(100_000),
        };
        let at_ratio = score_candidate(&query, &candidate("A - B", "A", 200), &config);
        assert_eq!(at_ratio.components.duration, config.duration_bonus_max);

        let beyond = score_candidate(&query, &candidate("A - B", "A", 400), &config);
        assert_eq!(beyond.components.duration, config.duration_bonus_max);
    }

    #[test]
    fn remaining_penalty_is_floored() {
        let config = RankingConfig::default();
        let query = RankQuery {
            artists: "A".to_string(),
            title: "B".to_string(),
            duration_ms: None,
        };
        // Six junk tokens would be -60 unfloored; the floor keeps it at -30.
        let scored = score_candidate(
            &query,
            &candidate("A - B one two three four five six", "A", 0),
            &config,
        );
        let remaining: f64 = scored
            .details
            .iter()
            .filter(|d| d.key.starts_with("title.remaining:"))
            .map(|d| d.value)
            .sum();
        assert_eq!(remaining, config.title_remaining_token_penalty_max);
    }

    #[test]
    fn ranking_is_stable_and_deterministic() {
        let config = RankingConfig::default();
        let query = RankQuery {
            artists: "Someone".to_string(),
            title: "Song".to_string(),
            duration_ms: None,
        };
        let candidates = vec![
            candidate("Someone - Song", "x", 0),
            RankCandidate {
                id: "vid-2".to_string(),
                ..candidate("Someone - Song", "x", 0)
            },
        ];
        let first = rank(&query, &candidates, &config);
        let second = rank(&query, &candidates, &config);
        assert_eq!(first[0].candidate.id, "vid-1");
        assert_eq!(first[1].candidate.id, "vid-2");
        assert_eq!(first[0].score, second[0].score);
        assert_eq!(first[1].candidate.id, second[1].candidate.id);
    }

    #[test]
    fn channel_suffixes_are_stripped_before_artist_match() {
        let config = RankingConfig::default();
        let query = RankQuery {
            artists: "Nightdrive".to_string(),
            title: "Neon".to_string(),
            duration_ms: None,
        };
        let scored = score_candidate(
            &query,
            &candidate("Neon (Official Video)", "Nightdrive - Topic", 0),
            &config,
        );
        assert_eq!(scored.components.artist, config.artist_bonus_per_match);
        let channel_match = scored
            .details
            .iter()
            .find(|d| d.key == "artist.match:nightdrive")
            .unwrap();
        assert_eq!(channel_match.note.as_deref(), Some("channel"));
    }

    #[test]
    fn original_mix_phrase_counts_as_extended_mention() {
        let config = RankingConfig::default();
        let query = RankQuery {
            artists: "Someone".to_string(),
            title: "Anthem".to_string(),
            duration_ms: None,
        };
        let scored = score_candidate(
            &query,
            &candidate("Someone - Anthem (Original Mix)", "Someone", 0),
            &config,
        );
        assert_eq!(scored.components.extended, config.extended_large_bonus);
        // neither "original" nor "mix" may leak into the remaining penalty
        assert!(!scored
            .details
            .iter()
            .any(|d| d.key.starts_with("title.remaining:")));
    }
}
