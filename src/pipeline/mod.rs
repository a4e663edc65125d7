//! Sorting Pipeline Module
//!
//! ## Data Flow
//!
//! ```text
//! FrameSource ─▶ CaptureLoop ─▶ FrameSlot (latest frame only)
//!                                  │
//!                                  ▼
//!                           DetectionLoop ── decode, dedup, classify
//!                                  │ trigger (lane Ready → AwaitingItem)
//!                                  ▼
//!                     wait_for_arrival (one task per armed lane)
//!                                  │ sensor active
//!                                  ▼
//!                         run_cycle (push/pull stroke)
//!                                  │
//!                                  ▼
//!            LaneBoard ◀── StateBroadcaster ──▶ ClientHub ──▶ dashboards
//! ```
//!
//! Each lane is gated by its own status, so cycles on different lanes may
//! overlap. An actuation cycle, once started, always finishes.

pub mod actuation;
pub mod arrival;
pub mod broadcaster;
mod coordinator;
pub mod decoder;
pub mod detection_loop;
pub mod events;
mod hub;
pub mod source;
mod state;

pub use actuation::{CycleReport, StrokeGuard};
pub use arrival::ArrivalOutcome;
pub use broadcaster::StateBroadcaster;
pub use coordinator::{CycleTimings, SortingCoordinator};
pub use decoder::{PayloadDecoder, QrDecoder, RqrrDecoder};
pub use detection_loop::{Classification, Deduplicator, Detection, DetectionLoop, LaneCodeTable};
pub use events::{LogEntry, OutboundMessage, SorterEvent};
pub use hub::ClientHub;
pub use source::{
    CaptureLoop, Frame, FrameError, FrameFormat, FrameSlot, FrameSource, ScriptHandle,
    ScriptedSource, SnapshotFileSource,
};
pub use state::*;
