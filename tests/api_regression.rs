//! API Regression Tests
//!
//! In-process tests that build the Axum app via `create_app()` and exercise
//! the JSON and static endpoints using `tower::ServiceExt::oneshot()`.
//! No binary spawn, no network port.

use lane_sorter::acquisition::SimulatedIo;
use lane_sorter::api::{create_app, DashboardState};
use lane_sorter::config::SorterConfig;
use lane_sorter::pipeline::{ClientHub, Frame, FrameSlot, SortingCoordinator};

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

fn create_test_state() -> DashboardState {
    let coordinator = SortingCoordinator::new(
        &SorterConfig::default(),
        Arc::new(SimulatedIo::new()),
        Arc::new(ClientHub::new(8)),
        CancellationToken::new(),
    );
    DashboardState::new(coordinator, Arc::new(FrameSlot::new()), Duration::from_millis(50))
}

async fn get_json(state: DashboardState, uri: &str) -> serde_json::Value {
    let resp = create_app(state)
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK, "GET {uri}");
    let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

/// /api/v1/state has the same shape as the WebSocket snapshot payload.
#[tokio::test]
async fn test_state_endpoint_returns_lane_board() {
    let json = get_json(create_test_state(), "/api/v1/state").await;

    let lanes = json["lanes"].as_array().unwrap();
    assert_eq!(lanes.len(), 3);
    assert_eq!(lanes[0]["name"], "Loai 1");
    assert_eq!(lanes[0]["status"], "ready");
    assert_eq!(lanes[0]["count"], 0);
    for key in ["sensor", "relay_grab", "relay_push"] {
        assert!(lanes[2][key].is_boolean(), "missing {key}");
    }
    assert_eq!(json["timing_config"]["cycle_delay"], 0.3);
}

/// State reflects lane transitions made through the coordinator.
#[tokio::test]
async fn test_state_endpoint_tracks_armed_lane() {
    let state = create_test_state();
    state.coordinator.trigger(2, "LOAI3").await.unwrap().abort();

    let json = get_json(state, "/api/v1/state").await;
    assert_eq!(json["lanes"][2]["status"], "awaiting_item");
    assert_eq!(json["lanes"][0]["status"], "ready");
}

#[tokio::test]
async fn test_health_reports_camera_and_clients() {
    let state = create_test_state();
    let json = get_json(state.clone(), "/api/v1/health").await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["camera_online"], false);
    assert_eq!(json["clients"], 0);
    assert_eq!(json["gpio_backend"], "simulated");

    state.frames.publish(Frame::payload(""));
    let (_id, _rx) = state.coordinator.hub().register();
    let json = get_json(state, "/api/v1/health").await;
    assert_eq!(json["camera_online"], true);
    assert_eq!(json["clients"], 1);
}

/// The dashboard page is served at / and as the fallback for unknown paths.
#[tokio::test]
async fn test_dashboard_is_served() {
    for uri in ["/", "/index.html", "/some/client/route"] {
        let resp = create_app(create_test_state())
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK, "GET {uri}");
        let content_type = resp.headers()[header::CONTENT_TYPE].to_str().unwrap().to_string();
        assert!(content_type.starts_with("text/html"), "GET {uri} -> {content_type}");
    }
}

/// The video feed answers with a multipart stream and ends on shutdown.
#[tokio::test]
async fn test_video_feed_headers_and_shutdown() {
    let state = create_test_state();
    let cancel = state.cancel.clone();
    let resp = create_app(state)
        .oneshot(Request::builder().uri("/video_feed").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let content_type = resp.headers()[header::CONTENT_TYPE].to_str().unwrap();
    assert_eq!(content_type, "multipart/x-mixed-replace; boundary=frame");

    cancel.cancel();
    let body = tokio::time::timeout(
        Duration::from_secs(2),
        axum::body::to_bytes(resp.into_body(), usize::MAX),
    )
    .await
    .expect("video feed should end after cancellation")
    .unwrap();
    assert!(body.is_empty());
}

/// A new viewer receives the frame already captured without waiting for the next one.
#[tokio::test]
async fn test_video_feed_starts_with_latest_frame() {
    let state = create_test_state();
    state.frames.publish(Frame::jpeg(vec![0xFF, 0xD8, 0xFF, 0xD9]));

    let resp = create_app(state.clone())
        .oneshot(Request::builder().uri("/video_feed").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let mut chunks = resp.into_body().into_data_stream();
    let first = tokio::time::timeout(Duration::from_secs(2), chunks.next())
        .await
        .expect("held frame should be sent immediately")
        .unwrap()
        .unwrap();
    assert!(first.starts_with(b"--frame\r\nContent-Type: image/jpeg\r\n"));
    assert!(first.ends_with(&[0xFF, 0xD8, 0xFF, 0xD9, b'\r', b'\n']));

    state.cancel.cancel();
}

/// /ws without an upgrade handshake is refused, not a 404.
#[tokio::test]
async fn test_ws_requires_upgrade() {
    let resp = create_app(create_test_state())
        .oneshot(Request::builder().uri("/ws").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_ne!(resp.status(), StatusCode::NOT_FOUND);
    assert!(resp.status().is_client_error());
}
