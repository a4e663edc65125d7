//! Streaming endpoints: the dashboard WebSocket and the MJPEG camera feed.
//!
//! Both stay open until the client leaves or the server shuts down; each
//! watches the shutdown token so graceful shutdown is not held up by them.

use axum::body::Body;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use futures::{SinkExt, StreamExt};
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace};

use super::handlers::DashboardState;
use crate::pipeline::{Frame, FrameFormat, OutboundMessage};

const MJPEG_BOUNDARY: &str = "frame";

// ============================================================================
// WebSocket
// ============================================================================

/// GET /ws
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<DashboardState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_websocket(socket, state))
}

/// Send the current snapshot, then relay everything the hub broadcasts.
///
/// Inbound messages are ignored apart from close.
async fn handle_websocket(socket: WebSocket, state: DashboardState) {
    let (mut sender, mut receiver) = socket.split();
    let hub = state.coordinator.hub().clone();

    // Registering under the board lock means no snapshot is published
    // between the initial one and the first relayed message.
    let (conn_id, mut rx, initial) = {
        let board = state.coordinator.board().read().await;
        let (conn_id, rx) = hub.register();
        (conn_id, rx, OutboundMessage::StateUpdate { state: &*board }.to_json())
    };

    let initial = match initial {
        Ok(json) => json,
        Err(e) => {
            error!(connection_id = %conn_id, error = %e, "Failed to serialize initial snapshot");
            hub.unregister(&conn_id);
            return;
        }
    };
    if sender.send(Message::Text(initial)).await.is_err() {
        hub.unregister(&conn_id);
        return;
    }

    let cancel = state.cancel.clone();
    let mut send_task = tokio::spawn(async move {
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
                msg = rx.recv() => {
                    // None: the hub dropped this client
                    let Some(text) = msg else { break };
                    if sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = receiver.next().await {
            match result {
                Ok(Message::Close(_)) => break,
                Ok(other) => trace!(?other, "Ignoring inbound WebSocket message"),
                Err(e) => {
                    debug!(connection_id = %conn_id, error = %e, "WebSocket receive error");
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    hub.unregister(&conn_id);
}

// ============================================================================
// MJPEG
// ============================================================================

fn mjpeg_part(jpeg: &[u8]) -> Vec<u8> {
    let mut part = format!(
        "--{MJPEG_BOUNDARY}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
        jpeg.len()
    )
    .into_bytes();
    part.extend_from_slice(jpeg);
    part.extend_from_slice(b"\r\n");
    part
}

struct FeedState {
    frames: watch::Receiver<Option<std::sync::Arc<Frame>>>,
    cancel: CancellationToken,
    period: Duration,
    next_due: Instant,
}

/// Wait for the next JPEG frame, no sooner than one period after the last.
async fn next_part(mut feed: FeedState) -> Option<(Result<Vec<u8>, Infallible>, FeedState)> {
    tokio::select! {
        () = feed.cancel.cancelled() => return None,
        () = sleep_until(feed.next_due) => {}
    }
    loop {
        tokio::select! {
            () = feed.cancel.cancelled() => return None,
            changed = feed.frames.changed() => changed.ok()?,
        }
        let frame = feed.frames.borrow_and_update().clone();
        if let Some(frame) = frame.filter(|f| f.format == FrameFormat::Jpeg) {
            feed.next_due = Instant::now() + feed.period;
            return Some((Ok(mjpeg_part(&frame.data)), feed));
        }
    }
}

/// GET /video_feed - `multipart/x-mixed-replace` JPEG stream
pub async fn video_feed(State(state): State<DashboardState>) -> Response {
    // A new viewer starts with the frame already held, even if capture has stalled
    let mut frames = state.frames.subscribe();
    frames.mark_changed();
    let feed = FeedState {
        frames,
        cancel: state.cancel.clone(),
        period: state.stream_period,
        next_due: Instant::now(),
    };
    let body = Body::from_stream(futures::stream::unfold(feed, next_part));

    (
        [
            (
                header::CONTENT_TYPE,
                format!("multipart/x-mixed-replace; boundary={MJPEG_BOUNDARY}"),
            ),
            (header::CACHE_CONTROL, "no-cache".to_string()),
        ],
        body,
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mjpeg_part_framing() {
        let part = mjpeg_part(&[1, 2, 3]);
        let text = String::from_utf8_lossy(&part);
        assert!(text.starts_with("--frame\r\nContent-Type: image/jpeg\r\nContent-Length: 3\r\n\r\n"));
        assert!(part.ends_with(&[1, 2, 3, b'\r', b'\n']));
    }
}
