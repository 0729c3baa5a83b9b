//! Track Download Contract Tests
//!
//! Exercises `Retriever` against a local mock CDN:
//! - Successful downloads land at `<dir>/<stem>.mp3` with no `.part` left
//! - Non-2xx and slow responses leave nothing behind
//! - The stream URL is used when no final URL exists
//! - Collision handling against files already in the directory
//! - The download client identifies itself and follows CDN redirects

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use voice2music::api::{RawTrack, TaskHandle};
use voice2music::error::RetrievalError;
use voice2music::progress::{ProgressCallback, ProgressEvent};
use voice2music::retrieve::Retriever;
use voice2music::tracks::{Track, resolve_tracks};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const AUDIO: &[u8] = b"ID3\x04\x00fake-mp3-payload";

fn track(stream: Option<String>, final_url: Option<String>) -> Track {
    Track {
        index: 0,
        id: Some("t1".into()),
        title: "Sunny Morning".into(),
        stream_url: stream,
        final_url,
        tags: Some("acoustic".into()),
        duration: Some(122.0),
        file_stem: "Sunny_Morning".into(),
    }
}

fn leftovers(dir: &Path) -> Vec<String> {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default()
}

// ────────────────────────────────────────────────────────────────────────────
// Success paths
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_download_writes_file_and_reports_progress() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/audio/final.mp3"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(AUDIO))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("music");
    let retriever = Retriever::new(&target, Duration::from_secs(10));

    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let callback: ProgressCallback = Box::new(move |e| sink.lock().unwrap().push(e));

    let t = track(None, Some(format!("{}/audio/final.mp3", server.uri())));
    let file = retriever.download_track(&t, Some(&callback)).await.unwrap();

    assert_eq!(file.path, target.join("Sunny_Morning.mp3"));
    assert_eq!(file.bytes, AUDIO.len() as u64);
    assert_eq!(file.track, t);
    assert_eq!(std::fs::read(&file.path).unwrap(), AUDIO);
    assert_eq!(leftovers(&target), vec!["Sunny_Morning.mp3".to_owned()]);

    let events = events.lock().unwrap();
    assert!(matches!(events.first(), Some(ProgressEvent::DownloadStarted { .. })));
    assert!(matches!(
        events.last(),
        Some(ProgressEvent::DownloadComplete { bytes, .. }) if *bytes == AUDIO.len() as u64
    ));
}

#[tokio::test]
async fn test_stream_url_is_used_without_final_url() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/stream/1"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(AUDIO))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let retriever = Retriever::new(dir.path(), Duration::from_secs(10));
    let stream = format!("{}/stream/1", server.uri());

    let file = retriever
        .download_track(&track(Some(stream.clone()), None), None)
        .await
        .unwrap();
    assert_eq!(file.url, stream);
    assert!(file.path.exists());
}

#[tokio::test]
async fn test_final_url_wins_over_stream_url() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/final"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(AUDIO))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/stream"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let retriever = Retriever::new(dir.path(), Duration::from_secs(10));
    let t = track(
        Some(format!("{}/stream", server.uri())),
        Some(format!("{}/final", server.uri())),
    );
    retriever.download_track(&t, None).await.unwrap();
}

#[tokio::test]
async fn test_existing_file_gets_task_suffix() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(AUDIO))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("Sunny_Morning.mp3"), b"older").unwrap();

    let raw = vec![
        RawTrack {
            title: Some("Sunny Morning".into()),
            final_url: Some(format!("{}/a.mp3", server.uri())),
            ..RawTrack::default()
        },
        RawTrack {
            title: Some("Sunny Morning".into()),
            final_url: Some(format!("{}/b.mp3", server.uri())),
            ..RawTrack::default()
        },
    ];
    let tracks = resolve_tracks(&raw, &TaskHandle::new("abc123"), Some(dir.path()));
    let retriever = Retriever::new(dir.path(), Duration::from_secs(10));

    let mut names = Vec::new();
    for t in &tracks {
        let file = retriever.download_track(t, None).await.unwrap();
        names.push(file.path.file_name().unwrap().to_string_lossy().into_owned());
    }
    assert_eq!(
        names,
        vec!["Sunny_Morning_abc123.mp3", "Sunny_Morning_abc123_2.mp3"]
    );
    assert_eq!(
        std::fs::read(dir.path().join("Sunny_Morning.mp3")).unwrap(),
        b"older"
    );
}

#[tokio::test]
async fn test_download_client_sends_agent_and_follows_redirect() {
    let server = MockServer::start().await;
    let agent = concat!("voice2music/", env!("CARGO_PKG_VERSION"));
    Mock::given(method("GET"))
        .and(path("/short/t1"))
        .and(header("user-agent", agent))
        .respond_with(
            ResponseTemplate::new(302)
                .insert_header("location", format!("{}/cdn/t1.mp3", server.uri()).as_str()),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/cdn/t1.mp3"))
        .and(header("user-agent", agent))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(AUDIO))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let retriever = Retriever::new(dir.path(), Duration::from_secs(10));
    let file = retriever
        .download_track(&track(None, Some(format!("{}/short/t1", server.uri()))), None)
        .await
        .unwrap();
    assert_eq!(std::fs::read(&file.path).unwrap(), AUDIO);
}

// ────────────────────────────────────────────────────────────────────────────
// Failure paths
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_not_found_leaves_no_file() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404).set_body_string("gone"))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let retriever = Retriever::new(dir.path(), Duration::from_secs(10));
    let err = retriever
        .download_track(&track(None, Some(format!("{}/missing.mp3", server.uri()))), None)
        .await
        .unwrap_err();

    assert!(matches!(err, RetrievalError::HttpStatus { status: 404, .. }));
    assert!(leftovers(dir.path()).is_empty());
}

#[tokio::test]
async fn test_slow_server_times_out_and_cleans_up() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(AUDIO)
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let retriever = Retriever::new(dir.path(), Duration::from_millis(200));
    let err = retriever
        .download_track(&track(None, Some(format!("{}/slow.mp3", server.uri()))), None)
        .await
        .unwrap_err();

    assert!(matches!(err, RetrievalError::Timeout { .. }));
    assert!(leftovers(dir.path()).is_empty());
}

#[tokio::test]
async fn test_dropped_download_removes_part_file() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(AUDIO)
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let retriever = Retriever::new(dir.path(), Duration::from_secs(30));
    let t = track(None, Some(format!("{}/slow.mp3", server.uri())));

    let abandoned = tokio::time::timeout(
        Duration::from_millis(200),
        retriever.download_track(&t, None),
    )
    .await;
    assert!(abandoned.is_err());
    assert!(leftovers(dir.path()).is_empty());
}
