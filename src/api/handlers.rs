//! API handlers for the sorter dashboard

use axum::extract::State;
use axum::Json;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::pipeline::{FrameSlot, LaneBoard, SortingCoordinator};

/// Shared state for every dashboard route.
#[derive(Clone)]
pub struct DashboardState {
    /// Lane board, actuators and connected clients
    pub coordinator: SortingCoordinator,
    /// Latest camera frame
    pub frames: Arc<FrameSlot>,
    /// Minimum gap between video frames sent to one viewer
    pub stream_period: Duration,
    pub started_at: Instant,
    /// Ends long-lived streams (video, WebSocket) on shutdown
    pub cancel: CancellationToken,
}

impl DashboardState {
    pub fn new(
        coordinator: SortingCoordinator,
        frames: Arc<FrameSlot>,
        stream_period: Duration,
    ) -> Self {
        let cancel = coordinator.cancel_token().clone();
        Self {
            coordinator,
            frames,
            stream_period,
            started_at: Instant::now(),
            cancel,
        }
    }
}

/// GET /api/v1/state - Current lane board
pub async fn get_state(State(state): State<DashboardState>) -> Json<LaneBoard> {
    Json(state.coordinator.snapshot().await)
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub uptime_secs: u64,
    pub clients: usize,
    pub camera_online: bool,
    pub gpio_backend: String,
}

/// GET /api/v1/health - Liveness and basic line status
pub async fn get_health(State(state): State<DashboardState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: state.started_at.elapsed().as_secs(),
        clients: state.coordinator.hub().client_count(),
        camera_online: state.frames.has_frame(),
        gpio_backend: state.coordinator.actuators().backend_name().to_string(),
    })
}
