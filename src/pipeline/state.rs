//! Lane Board and Lane State Machine
//!
//! The single authoritative record of every lane, shared by the detection
//! loop, arrival waits, actuation cycles, the broadcaster and API handlers.
//! It is wrapped in `Arc<RwLock<>>`; every read-modify-write happens under
//! one write guard.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::warn;

use crate::acquisition::LaneReading;
use crate::config::SorterConfig;

/// Number of lanes on the line.
pub const LANE_COUNT: usize = 3;

/// Handle to the lane board shared between workers.
pub type SharedBoard = Arc<RwLock<LaneBoard>>;

// ============================================================================
// Lane Status
// ============================================================================

/// Per-lane state machine.
///
/// ```text
/// Ready ──trigger──▶ AwaitingItem ──arrival──▶ Sorting ──cycle done──▶ Ready
///                         └─────────timeout─────────────────────────▶ Ready
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LaneStatus {
    Ready,
    AwaitingItem,
    Sorting,
}

impl LaneStatus {
    /// Whether `self -> next` is an edge of the state machine.
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Ready, Self::AwaitingItem)
                | (Self::AwaitingItem, Self::Sorting)
                | (Self::AwaitingItem, Self::Ready)
                | (Self::Sorting, Self::Ready)
        )
    }
}

impl std::fmt::Display for LaneStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ready => write!(f, "Ready"),
            Self::AwaitingItem => write!(f, "Awaiting item"),
            Self::Sorting => write!(f, "Sorting"),
        }
    }
}

// ============================================================================
// Lane
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lane {
    pub id: usize,
    pub name: String,
    pub status: LaneStatus,
    /// Completed actuation cycles
    pub count: u64,
    /// Item in front of the sensor, as of the last broadcaster sample
    pub sensor: bool,
    /// Pull actuator engaged, as of the last broadcaster sample
    pub relay_grab: bool,
    /// Push actuator engaged, as of the last broadcaster sample
    pub relay_push: bool,
}

impl Lane {
    pub fn new(id: usize, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            status: LaneStatus::Ready,
            count: 0,
            sensor: false,
            relay_grab: false,
            relay_push: false,
        }
    }
}

/// Timing shown to the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Push dwell in seconds
    pub cycle_delay: f64,
}

// ============================================================================
// Lane Board
// ============================================================================

/// Every lane plus the active timing.
///
/// Serializes to the `state` payload of a `state_update` message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaneBoard {
    pub lanes: Vec<Lane>,
    pub timing_config: TimingConfig,
}

impl LaneBoard {
    pub fn new<S: Into<String>>(names: impl IntoIterator<Item = S>, cycle_delay: f64) -> Self {
        Self {
            lanes: names
                .into_iter()
                .enumerate()
                .map(|(id, name)| Lane::new(id, name))
                .collect(),
            timing_config: TimingConfig { cycle_delay },
        }
    }

    pub fn from_config(config: &SorterConfig) -> Self {
        Self::new(
            config.lanes.iter().map(|l| l.name.clone()),
            config.timing.cycle_delay_secs,
        )
    }

    pub fn into_shared(self) -> SharedBoard {
        Arc::new(RwLock::new(self))
    }

    pub fn lane(&self, idx: usize) -> Option<&Lane> {
        self.lanes.get(idx)
    }

    pub fn status(&self, idx: usize) -> Option<LaneStatus> {
        self.lane(idx).map(|l| l.status)
    }

    pub fn count(&self, idx: usize) -> Option<u64> {
        self.lane(idx).map(|l| l.count)
    }

    pub fn name(&self, idx: usize) -> Option<&str> {
        self.lane(idx).map(|l| l.name.as_str())
    }

    /// Move `idx` from `from` to `to` if it is currently in `from`.
    ///
    /// Returns `false` (and leaves the lane untouched) otherwise.
    fn transition(&mut self, idx: usize, from: LaneStatus, to: LaneStatus) -> bool {
        debug_assert!(from.can_transition_to(to));
        match self.lanes.get_mut(idx) {
            Some(lane) if lane.status == from => {
                lane.status = to;
                true
            }
            _ => false,
        }
    }

    /// Ready → AwaitingItem. A lane in any other state is left alone.
    pub fn try_arm(&mut self, idx: usize) -> bool {
        self.transition(idx, LaneStatus::Ready, LaneStatus::AwaitingItem)
    }

    /// AwaitingItem → Sorting.
    pub fn begin_sort(&mut self, idx: usize) -> bool {
        self.transition(idx, LaneStatus::AwaitingItem, LaneStatus::Sorting)
    }

    /// AwaitingItem → Ready, after an arrival timeout.
    pub fn abandon(&mut self, idx: usize) -> bool {
        self.transition(idx, LaneStatus::AwaitingItem, LaneStatus::Ready)
    }

    /// Sorting → Ready and count the item. Returns the new count.
    pub fn finish_sort(&mut self, idx: usize) -> Option<u64> {
        let lane = self.lanes.get_mut(idx)?;
        if lane.status != LaneStatus::Sorting {
            warn!(lane = idx, status = %lane.status, "finish_sort on a lane that is not sorting");
            return None;
        }
        lane.status = LaneStatus::Ready;
        lane.count += 1;
        Some(lane.count)
    }

    /// Store a fresh I/O sample. Returns the new sensor value if it changed.
    pub fn apply_reading(&mut self, idx: usize, reading: LaneReading) -> Option<bool> {
        let lane = self.lanes.get_mut(idx)?;
        let edge = (lane.sensor != reading.sensor).then_some(reading.sensor);
        lane.sensor = reading.sensor;
        lane.relay_grab = reading.relay_grab;
        lane.relay_push = reading.relay_push;
        edge
    }

    pub fn cycle_delay_secs(&self) -> f64 {
        self.timing_config.cycle_delay
    }
}
