//! End-to-end ranking scenarios with literal expected values.

use music_grabber_backend::{rank, score_candidate, RankCandidate, RankQuery, RankingConfig};

fn candidate(id: &str, title: &str, channel: &str, duration_sec: i64) -> RankCandidate {
    RankCandidate {
        id: id.to_string(),
        title: title.to_string(),
        channel: Some(channel.to_string()),
        duration_sec: Some(duration_sec),
    }
}

#[test]
fn scenario_perfect_match_no_extended() {
    let query = RankQuery {
        artists: "Block & Crown".to_string(),
        title: "Lonely Heart".to_string(),
        duration_ms: Some(240_000),
    };
    let scored = score_candidate(
        &query,
        &candidate(
            "v1",
            "Block & Crown - Lonely Heart",
            "Block & Crown - Topic",
            240,
        ),
        &RankingConfig::default(),
    );

    assert_eq!(scored.components.artist, 50.0);
    assert_eq!(scored.components.title, 100.0);
    assert_eq!(scored.components.extended, 0.0);
    assert_eq!(scored.components.duration, 0.0);
    assert_eq!(scored.score, 150.0);
    assert!(scored
        .details
        .iter()
        .any(|d| d.key == "artist.match:block & crown"));
    assert!(scored
        .details
        .iter()
        .any(|d| d.key == "title.exact:lonely heart"));
}

#[test]
fn scenario_extended_bonus_applied() {
    let query = RankQuery {
        artists: "AUSMAX".to_string(),
        title: "Love".to_string(),
        duration_ms: Some(159_000),
    };
    let scored = score_candidate(
        &query,
        &candidate("v2", "AUSMAX - Love (Extended Mix)", "FOXsound Official", 324),
        &RankingConfig::default(),
    );

    assert_eq!(scored.components.artist, 50.0);
    assert_eq!(scored.components.extended, 40.0);
    assert_eq!(scored.components.duration, 15.0);
    // One reference token matched (+15), "mix" survives (-10).
    assert_eq!(scored.components.title, 5.0);
    assert_eq!(scored.score, 110.0);
    assert!(scored
        .details
        .iter()
        .any(|d| d.key == "title.remaining:mix" && d.value == -10.0));
}

#[test]
fn scenario_wrong_artist_is_demoted() {
    let config = RankingConfig::default();
    let query = RankQuery {
        artists: "Block & Crown".to_string(),
        title: "Lonely Heart".to_string(),
        duration_ms: Some(240_000),
    };
    let candidates = vec![
        candidate("wrong", "Other Artist - Lonely Heart", "Other Artist", 240),
        candidate(
            "right",
            "Block & Crown - Lonely Heart",
            "Block & Crown - Topic",
            240,
        ),
    ];
    let ranked = rank(&query, &candidates, &config);

    assert_eq!(ranked[0].candidate.id, "right");
    assert_eq!(ranked[1].candidate.id, "wrong");
    assert_eq!(ranked[1].components.artist, -20.0);
    let title_matches: f64 = ranked[1]
        .details
        .iter()
        .filter(|d| d.key.starts_with("title.match:"))
        .map(|d| d.value)
        .sum();
    assert_eq!(title_matches, 30.0);
    assert!(ranked[1].score < ranked[0].score);
}

#[test]
fn scenario_duration_too_short_takes_large_penalty() {
    let config = RankingConfig::default();
    let query = RankQuery {
        artists: "Block & Crown".to_string(),
        title: "Lonely Heart".to_string(),
        duration_ms: Some(240_000),
    };
    let perfect = score_candidate(
        &query,
        &candidate("long", "Block & Crown - Lonely Heart", "Block & Crown - Topic", 240),
        &config,
    );
    let short = score_candidate(
        &query,
        &candidate("short", "Block & Crown - Lonely Heart", "Block & Crown - Topic", 120),
        &config,
    );

    assert_eq!(short.components.duration, config.duration_penalty_too_short);
    assert!(short.score < perfect.score);
}

#[test]
fn boundary_duration_equal_is_exactly_zero() {
    let query = RankQuery {
        artists: "Someone".to_string(),
        title: "Anthem".to_string(),
        duration_ms: Some(200_000),
    };
    let scored = score_candidate(
        &query,
        &candidate("v", "Someone - Anthem", "Someone", 200),
        &RankingConfig::default(),
    );
    assert_eq!(scored.components.duration, 0.0);
}

#[test]
fn boundary_duration_bonus_caps_at_max_ratio() {
    let config = RankingConfig::default();
    let query = RankQuery {
        artists: "Someone".to_string(),
        title: "Anthem".to_string(),
        duration_ms: Some(120_000),
    };
    let at_ratio = score_candidate(
        &query,
        &candidate("a", "Someone - Anthem", "Someone", 240),
        &config,
    );
    let beyond_ratio = score_candidate(
        &query,
        &candidate("b", "Someone - Anthem", "Someone", 600),
        &config,
    );

    assert_eq!(at_ratio.components.duration, config.duration_bonus_max);
    assert_eq!(beyond_ratio.components.duration, config.duration_bonus_max);
}

#[test]
fn ranking_twice_is_byte_identical() {
    let config = RankingConfig::default();
    let query = RankQuery {
        artists: "Block & Crown".to_string(),
        title: "Lonely Heart".to_string(),
        duration_ms: Some(240_000),
    };
    let candidates = vec![
        candidate("a", "Block & Crown - Lonely Heart", "x", 240),
        candidate("b", "Lonely Heart (Club Edit)", "y", 250),
        candidate("c", "Block & Crown - Lonely Heart", "x", 240),
    ];

    let first = rank(&query, &candidates, &config);
    let second = rank(&query, &candidates, &config);
    let render = |r: &[music_grabber_backend::ScoredCandidate]| {
        serde_json::to_string(r).expect("serializable")
    };
    assert_eq!(render(&first), render(&second));
    // Equal-scored candidates keep input order.
    assert_eq!(first[0].candidate.id, "a");
    assert_eq!(first[1].candidate.id, "c");
}
