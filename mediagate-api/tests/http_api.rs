//! HTTP API integration tests
//!
//! Drives the router in-process against the in-memory extractor.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use mediagate_api::{create_router, AppState};
use mediagate_core::config::Config;
use mediagate_core::models::ChannelId;
use mediagate_core::provider::{StaticExtractor, StaticMedia};
use mediagate_session::ChannelMessage;
use serde_json::Value;
use tower::ServiceExt;

fn extractor() -> StaticExtractor {
    StaticExtractor::new()
        .with_media(
            "good-locator",
            StaticMedia::sample("Clip", Some(1_048_576)).with_chunks(["hello ", "world"]),
        )
        .with_media(
            "broken-locator",
            StaticMedia::sample("Clip", Some(100))
                .with_chunks(["partial"])
                .failing_with("connection reset by origin"),
        )
        .with_media(
            "unicode-locator",
            StaticMedia::sample("Café \"live\"", None).with_chunks(["x"]),
        )
        .with_failure("bad-locator", "Video unavailable")
}

fn app_state() -> AppState {
    AppState::new(Arc::new(extractor()), &Config::default())
}

fn app() -> Router {
    create_router(app_state())
}

async fn get(app: Router, uri: &str) -> axum::response::Response {
    app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_root_banner() {
    let response = get(app(), "/").await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["status"], "active");
    assert!(body["message"].is_string());
}

#[tokio::test]
async fn test_health_check() {
    let response = get(app(), "/api/health").await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["status"], "healthy");
    let timestamp = body["timestamp"].as_str().unwrap();
    assert!(chrono::DateTime::parse_from_rfc3339(timestamp).is_ok());
}

#[tokio::test]
async fn test_info_returns_metadata() {
    let response = get(app(), "/api/info?url=good-locator").await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["title"], "Clip");
    let formats = body["formats"].as_array().unwrap();
    assert_eq!(formats.len(), 2);
    let mp4 = formats.iter().find(|f| f["format_id"] == "18").unwrap();
    assert_eq!(mp4["filesize_fmt"], "1.00 MB");
    let audio = formats.iter().find(|f| f["format_id"] == "251").unwrap();
    assert_eq!(audio["filesize_fmt"], "N/A");
}

#[tokio::test]
async fn test_info_failure_is_bad_request() {
    let response = get(app(), "/api/info?url=bad-locator").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = json_body(response).await;
    assert_eq!(body["detail"], "Error getting video info: Video unavailable");
    assert_eq!(body["status"], 400);
}

#[tokio::test]
async fn test_info_requires_url() {
    let response = get(app(), "/api/info").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = json_body(response).await;
    assert_eq!(body["detail"], "url must not be empty");
}

#[tokio::test]
async fn test_download_streams_with_framing() {
    let response = get(app(), "/api/download?url=good-locator&format=best").await;
    assert_eq!(response.status(), StatusCode::OK);

    let headers = response.headers();
    assert_eq!(headers[header::CONTENT_TYPE], "video/mp4");
    assert_eq!(
        headers[header::CONTENT_DISPOSITION],
        "attachment; filename=\"Clip.mp4\""
    );
    assert_eq!(headers["x-video-title"], "Clip");

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], b"hello world");
}

#[tokio::test]
async fn test_download_non_ascii_title() {
    let response = get(app(), "/api/download?url=unicode-locator&format=251").await;
    assert_eq!(response.status(), StatusCode::OK);

    let headers = response.headers();
    assert_eq!(headers[header::CONTENT_TYPE], "application/octet-stream");
    assert_eq!(
        headers[header::CONTENT_DISPOSITION],
        "attachment; filename=\"Caf_ _live_.webm\"; filename*=UTF-8''Caf%C3%A9%20%22live%22.webm"
    );
    assert_eq!(headers["x-video-title"], "Caf%C3%A9%20%22live%22");
}

#[tokio::test]
async fn test_download_open_failure_sends_no_bytes() {
    let extractor = extractor();
    let state = AppState::new(Arc::new(extractor.clone()), &Config::default());
    let response = get(create_router(state), "/api/download?url=bad-locator").await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(response.headers().get(header::CONTENT_DISPOSITION).is_none());

    let body = json_body(response).await;
    assert_eq!(body["detail"], "Download error: Video unavailable");
    assert_eq!(extractor.open_calls(), 1);
}

#[tokio::test]
async fn test_download_mid_stream_failure_errors_the_body() {
    let response = get(app(), "/api/download?url=broken-locator").await;
    assert_eq!(response.status(), StatusCode::OK);

    // The body must not look complete
    let result = response.into_body().collect().await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_download_reports_progress_to_channel() {
    let state = app_state();
    let id = ChannelId::from("client-1");
    let mut sub = state.registry.connect(id).unwrap();

    let response = get(
        create_router(state.clone()),
        "/api/download?url=good-locator&format=18&client_id=client-1",
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    response.into_body().collect().await.unwrap();

    // Progress is forwarded from its own task; wait for the terminal frame
    let mut messages = Vec::new();
    loop {
        let message = tokio::time::timeout(Duration::from_secs(5), sub.receiver.recv())
            .await
            .unwrap()
            .unwrap();
        let terminal = !matches!(message, ChannelMessage::Progress { .. });
        messages.push(message);
        if terminal {
            break;
        }
    }
    assert!(matches!(
        messages.first(),
        Some(ChannelMessage::Progress { progress: 0, .. })
    ));
    assert!(matches!(messages.last(), Some(ChannelMessage::Complete { .. })));
}

#[tokio::test]
async fn test_download_with_unknown_client_id_still_streams() {
    let response = get(app(), "/api/download?url=good-locator&client_id=nobody").await;
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], b"hello world");
}

#[tokio::test]
async fn test_cors_allows_any_origin() {
    let response = app()
        .oneshot(
            Request::builder()
                .uri("/api/health")
                .header(header::ORIGIN, "https://somewhere.example")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
}
