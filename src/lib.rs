//! Lane Sorter: QR-driven three-lane sorting line controller
//!
//! A camera watches the conveyor. When a lane code is decoded, that lane is
//! armed; once its sensor sees the item, a timed push/pull stroke diverts
//! it and the lane count goes up. A browser dashboard shows the live video,
//! lane states and an event feed.
//!
//! ## Modules
//!
//! - **config**: TOML configuration and default constants
//! - **acquisition**: digital I/O (sysfs GPIO, simulated pins) with polarity
//! - **pipeline**: lane board, detection, arrival wait, actuation, broadcast
//! - **api**: Axum dashboard server (REST, WebSocket, MJPEG)
//! - **console**: stdin bench commands for simulate mode

pub mod acquisition;
pub mod api;
pub mod config;
pub mod console;
pub mod pipeline;

pub use config::SorterConfig;
pub use pipeline::{ClientHub, LaneBoard, LaneStatus, SortingCoordinator};
