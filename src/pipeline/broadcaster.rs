//! State broadcaster: refresh live I/O into the board and push snapshots.

use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use super::coordinator::SortingCoordinator;
use super::events::SorterEvent;

pub struct StateBroadcaster {
    coordinator: SortingCoordinator,
    period: Duration,
}

impl StateBroadcaster {
    pub const fn new(coordinator: SortingCoordinator, period: Duration) -> Self {
        Self {
            coordinator,
            period,
        }
    }

    /// Sample every lane, emit sensor edges, then publish the snapshot.
    ///
    /// The board lock is held throughout so edges and the snapshot describe
    /// the same instant. A lane whose I/O cannot be read keeps its previous
    /// values. Returns how many clients received the snapshot.
    pub async fn tick(&self) -> usize {
        let hub = self.coordinator.hub();
        let actuators = self.coordinator.actuators();
        let mut board = self.coordinator.board().write().await;

        for lane in 0..board.lanes.len() {
            let reading = match actuators.read_lane(lane) {
                Ok(reading) => reading,
                Err(e) => {
                    debug!(lane, error = %e, "Skipping I/O refresh for lane");
                    continue;
                }
            };
            if let Some(status) = board.apply_reading(lane, reading) {
                let name = board.name(lane).unwrap_or_default().to_string();
                hub.emit(SorterEvent::Sensor { name, status });
            }
        }

        hub.publish_state(&board)
    }

    /// Broadcast on a fixed period until cancelled.
    pub async fn run(self) -> u64 {
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let cancel = self.coordinator.cancel_token().clone();
        let mut ticks = 0u64;

        info!(period = ?self.period, "📡 State broadcaster started");
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            self.tick().await;
            ticks += 1;
        }
        info!(ticks, "State broadcaster stopped");
        ticks
    }
}
