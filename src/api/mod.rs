//! Dashboard HTTP surface using Axum
//!
//! - JSON API under `/api/v1`
//! - `/ws` WebSocket with live snapshots and events
//! - `/video_feed` MJPEG camera stream
//! - Single-page dashboard served via `rust-embed` (compiled into the binary)

pub mod handlers;
mod routes;
pub mod stream;

pub use handlers::DashboardState;

use axum::http::{header, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use rust_embed::Embed;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Environment variable listing extra allowed CORS origins.
pub const CORS_ENV_VAR: &str = "SORTER_CORS_ORIGINS";

/// Dashboard assets from `dashboard/`.
#[derive(Embed)]
#[folder = "dashboard/"]
struct DashboardAssets;

/// Serve a static asset or fall back to `index.html`.
async fn serve_asset(uri: Uri) -> Response {
    let path = uri.path().trim_start_matches('/');

    if let Some(content) = DashboardAssets::get(path) {
        let mime = mime_guess::from_path(path).first_or_octet_stream();
        return (
            StatusCode::OK,
            [(header::CONTENT_TYPE, mime.as_ref())],
            content.data.into_owned(),
        )
            .into_response();
    }

    if let Some(index) = DashboardAssets::get("index.html") {
        return (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/html")],
            index.data.into_owned(),
        )
            .into_response();
    }

    (StatusCode::OK, "Lane sorter is running. Dashboard assets missing.").into_response()
}

/// Build a CORS layer that is restrictive by default (same-origin only).
///
/// Set `SORTER_CORS_ORIGINS` to a comma-separated list of allowed origins
/// to open the API to another host.
fn build_cors_layer() -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET])
        .allow_headers([header::CONTENT_TYPE]);
    match std::env::var(CORS_ENV_VAR) {
        Ok(origins) => {
            let allowed: Vec<_> = origins
                .split(',')
                .filter_map(|o| o.trim().parse().ok())
                .collect();
            tracing::info!(origins = %origins, "CORS: allowing configured origins");
            base.allow_origin(allowed)
        }
        Err(_) => base,
    }
}

/// Create the complete application router.
pub fn create_app(state: DashboardState) -> Router {
    Router::new()
        .nest("/api/v1", routes::api_routes(state.clone()))
        .merge(routes::stream_routes(state))
        .fallback(serve_asset)
        .layer(TraceLayer::new_for_http())
        .layer(build_cors_layer())
}
