//! API route definitions
//!
//! - /api/v1/state  - Current lane board (same shape as the WebSocket snapshot)
//! - /api/v1/health - Uptime, connected clients, camera and GPIO status
//! - /ws            - Live snapshots and events
//! - /video_feed    - MJPEG camera stream

use axum::{routing::get, Router};

use super::handlers::{self, DashboardState};
use super::stream;

/// JSON API, nested under `/api/v1`
pub fn api_routes(state: DashboardState) -> Router {
    Router::new()
        .route("/state", get(handlers::get_state))
        .route("/health", get(handlers::get_health))
        .with_state(state)
}

/// Long-lived streaming endpoints at the root
pub fn stream_routes(state: DashboardState) -> Router {
    Router::new()
        .route("/ws", get(stream::ws_handler))
        .route("/video_feed", get(stream::video_feed))
        .with_state(state)
}
