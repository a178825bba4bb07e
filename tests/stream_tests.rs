//! HTTP range streaming byte contract, exercised through the real router.

mod common;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use music_grabber_backend::{create_router, FakeExtractor};
use tower::util::ServiceExt;

use common::{test_state, track_request};

const BODY_LIMIT: usize = 1024 * 1024;

async fn fixture_with_file(
    dir: &std::path::Path,
    size: usize,
) -> (axum::Router, String) {
    let state = test_state(Arc::new(FakeExtractor::default()), dir).await;

    let track = state
        .catalog
        .create_track(&track_request("Streamer", "Bytes", None))
        .await
        .unwrap();

    let filepath = dir.join("Streamer - Bytes.mp3");
    let body: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
    std::fs::write(&filepath, &body).unwrap();

    let file = state
        .catalog
        .upsert_library_file(
            &track.id,
            &filepath.to_string_lossy(),
            Some(size as i64),
            None,
            None,
            "mp3",
        )
        .await
        .unwrap();

    (create_router(state), file.id)
}

fn stream_request(file_id: &str, range: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("GET")
        .uri(format!("/api/v1/library/files/{file_id}/stream"));
    if let Some(range) = range {
        builder = builder.header(header::RANGE, range);
    }
    builder.body(Body::empty()).unwrap()
}

#[tokio::test]
async fn unranged_request_returns_full_body_with_headers() {
    let dir = tempfile::tempdir().unwrap();
    let (router, file_id) = fixture_with_file(dir.path(), 10_000).await;

    let response = router
        .oneshot(stream_request(&file_id, None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::ACCEPT_RANGES).unwrap(),
        "bytes"
    );
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "audio/mpeg"
    );
    assert!(response.headers().contains_key(header::ETAG));
    assert!(response.headers().contains_key(header::LAST_MODIFIED));

    let body = axum::body::to_bytes(response.into_body(), BODY_LIMIT)
        .await
        .unwrap();
    assert_eq!(body.len(), 10_000);
}

#[tokio::test]
async fn range_request_returns_206_with_content_range() {
    let dir = tempfile::tempdir().unwrap();
    let (router, file_id) = fixture_with_file(dir.path(), 10_000).await;

    let response = router
        .oneshot(stream_request(&file_id, Some("bytes=0-99")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(
        response.headers().get(header::CONTENT_RANGE).unwrap(),
        "bytes 0-99/10000"
    );
    let body = axum::body::to_bytes(response.into_body(), BODY_LIMIT)
        .await
        .unwrap();
    assert_eq!(body.len(), 100);
}

#[tokio::test]
async fn concatenated_ranges_equal_the_full_body() {
    let dir = tempfile::tempdir().unwrap();
    let (router, file_id) = fixture_with_file(dir.path(), 10_000).await;

    let full = router
        .clone()
        .oneshot(stream_request(&file_id, None))
        .await
        .unwrap();
    let full_body = axum::body::to_bytes(full.into_body(), BODY_LIMIT)
        .await
        .unwrap();

    let mut stitched = Vec::new();
    for range in ["bytes=0-4999", "bytes=5000-9999"] {
        let part = router
            .clone()
            .oneshot(stream_request(&file_id, Some(range)))
            .await
            .unwrap();
        assert_eq!(part.status(), StatusCode::PARTIAL_CONTENT);
        stitched.extend_from_slice(
            &axum::body::to_bytes(part.into_body(), BODY_LIMIT)
                .await
                .unwrap(),
        );
    }

    assert_eq!(stitched, full_body.to_vec());
}

#[tokio::test]
async fn unsatisfiable_range_returns_416() {
    let dir = tempfile::tempdir().unwrap();
    let (router, file_id) = fixture_with_file(dir.path(), 10_000).await;

    let response = router
        .oneshot(stream_request(&file_id, Some("bytes=99999-100000")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
    assert_eq!(
        response.headers().get(header::CONTENT_RANGE).unwrap(),
        "bytes */10000"
    );
}

#[tokio::test]
async fn unknown_file_is_a_404() {
    let dir = tempfile::tempdir().unwrap();
    let (router, _) = fixture_with_file(dir.path(), 100).await;

    let response = router
        .oneshot(stream_request("no-such-id", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
