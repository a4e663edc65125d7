//! Sorting Coordinator - shared handle to the lane board, actuators and clients
//!
//! Cloned into every worker (detection loop, arrival waits, actuation cycles,
//! broadcaster, HTTP handlers). All clones share the same board lock,
//! actuator bank, client hub and cancellation token.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::arrival::{self, ArrivalOutcome};
use super::events::SorterEvent;
use super::hub::ClientHub;
use super::state::{LaneBoard, SharedBoard};
use crate::acquisition::{ActuatorBank, DigitalIo};
use crate::config::{SorterConfig, TimingSettings};

/// Durations the arrival wait and the actuation cycle run on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleTimings {
    /// Push dwell
    pub cycle_delay: Duration,
    /// Pause between actuator changes
    pub settle: Duration,
    pub arrival_timeout: Duration,
    pub arrival_poll: Duration,
}

impl From<&TimingSettings> for CycleTimings {
    fn from(t: &TimingSettings) -> Self {
        Self {
            cycle_delay: t.cycle_delay(),
            settle: t.settle(),
            arrival_timeout: t.arrival_timeout(),
            arrival_poll: t.arrival_poll(),
        }
    }
}

/// Handle every worker uses to read and mutate the line.
#[derive(Clone)]
pub struct SortingCoordinator {
    board: SharedBoard,
    actuators: Arc<ActuatorBank>,
    hub: Arc<ClientHub>,
    timings: CycleTimings,
    cancel: CancellationToken,
}

impl SortingCoordinator {
    pub fn new(
        config: &SorterConfig,
        io: Arc<dyn DigitalIo>,
        hub: Arc<ClientHub>,
        cancel: CancellationToken,
    ) -> Self {
        let actuators = Arc::new(ActuatorBank::from_config(io, config));
        info!(
            backend = actuators.backend_name(),
            lanes = actuators.lane_count(),
            cycle_delay = config.timing.cycle_delay_secs,
            "Sorting coordinator initialized"
        );
        Self {
            board: LaneBoard::from_config(config).into_shared(),
            actuators,
            hub,
            timings: CycleTimings::from(&config.timing),
            cancel,
        }
    }

    pub fn board(&self) -> &SharedBoard {
        &self.board
    }

    pub fn actuators(&self) -> &Arc<ActuatorBank> {
        &self.actuators
    }

    pub fn hub(&self) -> &Arc<ClientHub> {
        &self.hub
    }

    pub const fn timings(&self) -> CycleTimings {
        self.timings
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Copy of the current board.
    pub async fn snapshot(&self) -> LaneBoard {
        self.board.read().await.clone()
    }

    /// Put every lane in its resting state (push released, pull engaged).
    ///
    /// Returns the number of lanes that could not be rested.
    pub fn reset_actuators(&self) -> usize {
        let failures = self.actuators.rest_all();
        if failures > 0 {
            warn!(failures, "Some lanes could not be put in their resting state");
        }
        failures
    }

    /// Arm `lane` for `code` and start waiting for the item.
    ///
    /// Returns `None` when the lane is not Ready; the trigger is then a
    /// no-op. The wait runs as its own task; the caller never blocks on it.
    pub async fn trigger(&self, lane: usize, code: &str) -> Option<JoinHandle<ArrivalOutcome>> {
        {
            let mut board = self.board.write().await;
            if !board.try_arm(lane) {
                debug!(lane, code, status = ?board.status(lane), "Lane busy, ignoring trigger");
                return None;
            }
        }

        self.hub.emit(SorterEvent::Qr {
            data: code.to_string(),
        });
        let coordinator = self.clone();
        Some(tokio::spawn(async move {
            arrival::wait_for_arrival(coordinator, lane).await
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::SimulatedIo;
    use crate::pipeline::LaneStatus;

    fn coordinator() -> (SortingCoordinator, Arc<SimulatedIo>) {
        let sim = Arc::new(SimulatedIo::new());
        let coordinator = SortingCoordinator::new(
            &SorterConfig::default(),
            sim.clone(),
            Arc::new(ClientHub::new(16)),
            CancellationToken::new(),
        );
        (coordinator, sim)
    }

    #[test]
    fn test_timings_from_settings() {
        let timings = CycleTimings::from(&TimingSettings::default());
        assert_eq!(timings.settle, Duration::from_millis(200));
        assert_eq!(timings.arrival_timeout, Duration::from_secs(15));
        assert_eq!(timings.arrival_poll, Duration::from_millis(50));
    }

    #[test]
    fn test_reset_actuators_rests_every_lane() {
        let (coordinator, sim) = coordinator();
        assert_eq!(coordinator.reset_actuators(), 0);

        // Active-low relays: pull engaged = low, push released = high
        for pin in [12, 8, 7] {
            assert_eq!(sim.level(pin), Some(false));
        }
        for pin in [11, 13, 15] {
            assert_eq!(sim.level(pin), Some(true));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_trigger_arms_once() {
        let (coordinator, _sim) = coordinator();

        assert!(coordinator.trigger(0, "LOAI1").await.is_some());
        assert!(coordinator.trigger(0, "LOAI1").await.is_none());

        let board = coordinator.snapshot().await;
        assert_eq!(board.status(0), Some(LaneStatus::AwaitingItem));
        assert_eq!(board.status(1), Some(LaneStatus::Ready));
    }
}
